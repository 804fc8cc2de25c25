#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rentpilot::domain::invoice::{Invoice, NewInvoice};
use rentpilot::domain::ports::{InferenceClient, InferenceRequest, WalletApi};
use rentpilot::domain::property::Property;
use rentpilot::domain::settlement::{TokenBalance, TransferRequest, WalletTransaction};
use rentpilot::error::{EngineError, Result};
use std::fs::File;
use std::io::{Error, Write};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub fn invoice(id: &str, tenant: &str, amount: &str, due: DateTime<Utc>) -> Invoice {
    Invoice::new(
        id.to_string(),
        NewInvoice {
            property_id: "prop-1".to_string(),
            property_name: "Ocean Apartment".to_string(),
            owner_id: "owner-1".to_string(),
            tenant_id: tenant.to_string(),
            amount: amount.to_string(),
            due_date: Some(due),
            ..NewInvoice::default()
        },
        Utc::now(),
    )
    .unwrap()
}

pub fn property(owner_address: &str) -> Property {
    Property {
        id: "prop-1".to_string(),
        name: "Ocean Apartment".to_string(),
        owner_id: "owner-1".to_string(),
        tenant_id: Some("tenant-1".to_string()),
        monthly_rent: "3".parse().unwrap(),
        token_id: "1".to_string(),
        owner_address: owner_address.to_string(),
    }
}

/// Wallet fake that counts transfer attempts and records what it was asked.
pub struct CountingWallet {
    calls: AtomicUsize,
    delay: Duration,
    fail: bool,
    requests: Mutex<Vec<TransferRequest>>,
}

impl CountingWallet {
    pub fn succeeding() -> Self {
        Self::new(Duration::ZERO, false)
    }

    pub fn failing() -> Self {
        Self::new(Duration::ZERO, true)
    }

    /// Holds every transfer open for `delay`, widening race windows.
    pub fn slow(delay: Duration) -> Self {
        Self::new(delay, false)
    }

    fn new(delay: Duration, fail: bool) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay,
            fail,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<TransferRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl WalletApi for CountingWallet {
    async fn create_transfer(&self, request: &TransferRequest) -> Result<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().unwrap().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(EngineError::ExternalService("503 Service Unavailable".to_string()));
        }
        Ok(format!("circle-tx-{}", n))
    }

    async fn balance(&self, _wallet_id: &str) -> Result<Vec<TokenBalance>> {
        Ok(Vec::new())
    }

    async fn transactions(&self, _wallet_id: &str, _network: &str) -> Result<Vec<WalletTransaction>> {
        Ok(Vec::new())
    }
}

/// Inference fake that always answers with `reply`, or fails when `None`.
pub struct ScriptedInference {
    reply: Option<String>,
    calls: AtomicUsize,
}

impl ScriptedInference {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            reply: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InferenceClient for ScriptedInference {
    async fn complete(&self, _request: &InferenceRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply
            .clone()
            .ok_or_else(|| EngineError::ExternalService("429 Too Many Requests".to_string()))
    }
}

/// Writes an invoices seed CSV. Each row is
/// `(id, tenant, amount, due date)`.
pub fn write_invoices_csv(path: &Path, rows: &[(&str, &str, &str, DateTime<Utc>)]) -> std::result::Result<(), Error> {
    let mut file = File::create(path)?;
    writeln!(file, "id,propertyId,propertyName,ownerId,tenantId,amount,dueDate")?;
    for (id, tenant, amount, due) in rows {
        writeln!(
            file,
            "{},prop-1,Ocean Apartment,owner-1,{},{},{}",
            id,
            tenant,
            amount,
            due.to_rfc3339()
        )?;
    }
    Ok(())
}
