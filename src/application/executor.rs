use super::gateway::PaymentGateway;
use crate::domain::events::EngineEvent;
use crate::domain::invoice::{Invoice, InvoiceFilter, InvoiceStatus, InvoiceUpdate};
use crate::domain::ports::{InvoiceStoreRef, NotificationSinkRef, PropertyStoreRef};
use crate::domain::settlement::{Settlement, TransferRequest};
use crate::error::{EngineError, Result};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Wallet and settlement parameters for tenant-initiated payments.
#[derive(Debug, Clone)]
pub struct PaymentSettings {
    /// Custodial wallet the tenant pays from.
    pub tenant_wallet_id: Option<String>,
    /// Used when the property has no settlement address of its own.
    pub fallback_owner_address: Option<String>,
    pub token_id: String,
    pub network: String,
    /// When false, a simulated settlement fails the payment instead of
    /// marking the invoice paid.
    pub allow_simulated_settlement: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceipt {
    pub invoice: Invoice,
    pub settlement: Settlement,
}

/// Serializes work per invoice id. Entries are dropped once nobody holds or
/// waits on them.
#[derive(Default)]
struct InvoiceLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl InvoiceLocks {
    fn acquire(&self, invoice_id: &str) -> InvoiceLock<'_> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        let lock = locks.entry(invoice_id.to_string()).or_default().clone();
        InvoiceLock {
            locks: self,
            invoice_id: invoice_id.to_string(),
            lock,
        }
    }
}

/// A claim on one invoice's lock. Dropping it, including when the owning
/// future is cancelled, removes the map entry if no one else holds a claim.
struct InvoiceLock<'a> {
    locks: &'a InvoiceLocks,
    invoice_id: String,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for InvoiceLock<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.locks.lock().unwrap_or_else(|e| e.into_inner());
        // One reference in the map, one held here.
        if Arc::strong_count(&self.lock) <= 2 {
            locks.remove(&self.invoice_id);
        }
    }
}

/// Entry point for paying an invoice, shared by user-triggered and automated
/// callers.
///
/// Guarantees at most one successful payment per invoice: calls for the same
/// invoice are serialized, and the `pending -> paid` transition is written
/// with a compare-and-set on the store.
///
/// Serialization is per executor. Share one instance (behind an `Arc`) across
/// every caller; two executors over the same store can both reach the
/// gateway for one invoice; the compare-and-set then rejects the second
/// transition and the transfer's idempotency key lets the provider drop the
/// duplicate.
pub struct PaymentExecutor {
    invoices: InvoiceStoreRef,
    properties: PropertyStoreRef,
    gateway: Arc<PaymentGateway>,
    notifier: NotificationSinkRef,
    settings: PaymentSettings,
    locks: InvoiceLocks,
}

impl PaymentExecutor {
    pub fn new(
        invoices: InvoiceStoreRef,
        properties: PropertyStoreRef,
        gateway: Arc<PaymentGateway>,
        notifier: NotificationSinkRef,
        settings: PaymentSettings,
    ) -> Self {
        Self {
            invoices,
            properties,
            gateway,
            notifier,
            settings,
            locks: InvoiceLocks::default(),
        }
    }

    /// Pays `invoice_id` on behalf of `requester_id`, who must be its tenant.
    #[instrument(skip(self), fields(invoice_id = %invoice_id, requester = %requester_id))]
    pub async fn pay(&self, invoice_id: &str, requester_id: &str) -> Result<PaymentReceipt> {
        let claim = self.locks.acquire(invoice_id);
        let _guard = claim.lock.lock().await;
        self.pay_serialized(invoice_id, requester_id).await
    }

    /// Pays the tenant's pending invoice with the earliest due date.
    pub async fn pay_next_due(&self, tenant_id: &str) -> Result<PaymentReceipt> {
        let filter = InvoiceFilter {
            status: Some(InvoiceStatus::Pending),
            tenant_id: Some(tenant_id.to_string()),
            ..InvoiceFilter::default()
        };
        let next = self
            .invoices
            .find(&filter)
            .await?
            .into_iter()
            .min_by_key(|invoice| invoice.due_date)
            .ok_or_else(|| {
                EngineError::InvoiceNotFound(format!("no pending invoice for tenant {}", tenant_id))
            })?;
        self.pay(&next.id, tenant_id).await
    }

    async fn pay_serialized(&self, invoice_id: &str, requester_id: &str) -> Result<PaymentReceipt> {
        let invoice = self
            .invoices
            .get(invoice_id)
            .await?
            .ok_or_else(|| EngineError::InvoiceNotFound(invoice_id.to_string()))?;

        match invoice.status {
            InvoiceStatus::Paid => return Err(EngineError::AlreadyPaid(invoice.id)),
            InvoiceStatus::Cancelled => return Err(EngineError::Cancelled(invoice.id)),
            InvoiceStatus::Pending | InvoiceStatus::Overdue => {}
        }

        if invoice.tenant_id != requester_id {
            return Err(EngineError::Forbidden(format!(
                "{} is not the tenant of invoice {}",
                requester_id, invoice.id
            )));
        }

        let property = self
            .properties
            .get(&invoice.property_id)
            .await?
            .ok_or_else(|| EngineError::PropertyNotFound(invoice.property_id.clone()))?;

        let destination = Some(property.owner_address)
            .filter(|address| !address.is_empty())
            .or_else(|| self.settings.fallback_owner_address.clone());

        let request = TransferRequest {
            source_wallet_id: self.settings.tenant_wallet_id.clone(),
            destination_address: destination,
            amount: invoice.amount,
            token_id: self.settings.token_id.clone(),
            network: self.settings.network.clone(),
            idempotency_key: Uuid::new_v5(&Uuid::NAMESPACE_OID, invoice.id.as_bytes()).to_string(),
        };
        let settlement = self.gateway.transfer(&request).await;

        if settlement.simulated && !self.settings.allow_simulated_settlement {
            warn!("simulated settlement rejected, invoice left pending");
            return Err(EngineError::ExternalService(
                "transfer could not be settled and simulated settlements are disabled".to_string(),
            ));
        }

        let update = InvoiceUpdate::MarkPaid {
            tx_hash: settlement.reference.clone(),
            paid_at: Utc::now(),
        };
        let paid = match self.invoices.update_if(invoice_id, invoice.status, update).await? {
            Some(paid) => paid,
            None => {
                error!(reference = %settlement.reference, "invoice changed while the transfer was in flight");
                return Err(self.transition_conflict(invoice_id).await);
            }
        };

        info!(
            reference = %settlement.reference,
            simulated = settlement.simulated,
            amount = %paid.amount,
            "payment completed"
        );
        self.notifier.publish(EngineEvent::payment_completed(paid.clone()));

        Ok(PaymentReceipt {
            invoice: paid,
            settlement,
        })
    }

    async fn transition_conflict(&self, invoice_id: &str) -> EngineError {
        match self.invoices.get(invoice_id).await {
            Ok(Some(current)) if current.status == InvoiceStatus::Cancelled => {
                EngineError::Cancelled(current.id)
            }
            Ok(Some(current)) => EngineError::AlreadyPaid(current.id),
            Ok(None) => EngineError::InvoiceNotFound(invoice_id.to_string()),
            Err(e) => e,
        }
    }
}
