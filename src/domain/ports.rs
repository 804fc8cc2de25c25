use super::events::EngineEvent;
use super::invoice::{Invoice, InvoiceFilter, InvoiceStatus, InvoiceUpdate};
use super::property::Property;
use super::settlement::{TokenBalance, TransferRequest, WalletTransaction};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait InvoiceStore: Send + Sync {
    async fn insert(&self, invoice: Invoice) -> Result<()>;
    async fn get(&self, invoice_id: &str) -> Result<Option<Invoice>>;
    async fn find(&self, filter: &InvoiceFilter) -> Result<Vec<Invoice>>;
    /// Applies `update` only while the stored status equals `expected`, as one
    /// atomic step. Returns the updated invoice, or `None` when the invoice is
    /// missing or its status differs.
    async fn update_if(
        &self,
        invoice_id: &str,
        expected: InvoiceStatus,
        update: InvoiceUpdate,
    ) -> Result<Option<Invoice>>;
}

#[async_trait]
pub trait PropertyStore: Send + Sync {
    async fn insert(&self, property: Property) -> Result<()>;
    async fn get(&self, property_id: &str) -> Result<Option<Property>>;
    async fn find_by_owner(&self, owner_id: &str) -> Result<Vec<Property>>;
}

/// A single text-generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceRequest {
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
    /// Ask the provider for a JSON-only reply where it supports that.
    pub json: bool,
}

/// A generative-text provider. The reply is untyped text.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn complete(&self, request: &InferenceRequest) -> Result<String>;
}

/// The custodial wallet provider's API.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WalletApi: Send + Sync {
    /// Creates a transfer and returns the provider-issued transaction id.
    async fn create_transfer(&self, request: &TransferRequest) -> Result<String>;
    async fn balance(&self, wallet_id: &str) -> Result<Vec<TokenBalance>>;
    async fn transactions(&self, wallet_id: &str, network: &str) -> Result<Vec<WalletTransaction>>;
}

/// Best-effort delivery of engine events to observers.
pub trait NotificationSink: Send + Sync {
    fn publish(&self, event: EngineEvent);
}

pub type InvoiceStoreRef = Arc<dyn InvoiceStore>;
pub type PropertyStoreRef = Arc<dyn PropertyStore>;
pub type InferenceClientRef = Arc<dyn InferenceClient>;
pub type WalletApiRef = Arc<dyn WalletApi>;
pub type NotificationSinkRef = Arc<dyn NotificationSink>;
