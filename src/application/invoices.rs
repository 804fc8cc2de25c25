use crate::domain::events::EngineEvent;
use crate::domain::invoice::{Invoice, InvoiceFilter, InvoiceStatus, InvoiceUpdate, NewInvoice};
use crate::domain::ports::{InvoiceStoreRef, NotificationSinkRef};
use crate::error::{EngineError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::cmp::Reverse;
use tracing::info;
use uuid::Uuid;

/// Which side of an invoice a user is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Owner,
    Tenant,
}

/// Invoice counts for one owner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSummary {
    pub total: usize,
    pub paid: usize,
    /// Pending and not yet due.
    pub pending: usize,
    /// Pending with a past due date.
    pub overdue: usize,
    pub cancelled: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomeReport {
    pub collected: Decimal,
    pub outstanding: Decimal,
    /// Late fees assessed on invoices that are still pending.
    pub late_fees_outstanding: Decimal,
    pub paid_count: usize,
    pub pending_count: usize,
}

/// Owner and tenant operations on invoices outside the payment path.
pub struct InvoiceService {
    invoices: InvoiceStoreRef,
    notifier: NotificationSinkRef,
}

impl InvoiceService {
    pub fn new(invoices: InvoiceStoreRef, notifier: NotificationSinkRef) -> Self {
        Self { invoices, notifier }
    }

    /// Issues a new `pending` invoice and announces it.
    pub async fn create(&self, new: NewInvoice) -> Result<Invoice> {
        let invoice = Invoice::new(Uuid::new_v4().to_string(), new, Utc::now())?;
        self.invoices.insert(invoice.clone()).await?;
        info!(
            invoice_id = %invoice.id,
            property = %invoice.property_name,
            amount = %invoice.amount,
            "invoice created"
        );
        self.notifier.publish(EngineEvent::invoice_created(invoice.clone()));
        Ok(invoice)
    }

    /// Every invoice the user is party to, latest due date first.
    pub async fn list_for(&self, role: Role, user_id: &str) -> Result<Vec<Invoice>> {
        let mut invoices = self.invoices.find(&party_filter(role, user_id)).await?;
        invoices.sort_by_key(|i| Reverse(i.due_date));
        Ok(invoices)
    }

    /// Withdraws a pending invoice. Only its owner may do this.
    pub async fn cancel(&self, invoice_id: &str, owner_id: &str) -> Result<Invoice> {
        self.owned_transition(invoice_id, owner_id, InvoiceUpdate::Cancel)
            .await
    }

    /// Records a settlement that happened outside the engine, such as a
    /// payment made off-platform.
    pub async fn mark_paid(&self, invoice_id: &str, owner_id: &str, reference: &str) -> Result<Invoice> {
        let update = InvoiceUpdate::MarkPaid {
            tx_hash: reference.to_string(),
            paid_at: Utc::now(),
        };
        let paid = self.owned_transition(invoice_id, owner_id, update).await?;
        self.notifier.publish(EngineEvent::invoice_paid(paid.clone()));
        Ok(paid)
    }

    async fn owned_transition(
        &self,
        invoice_id: &str,
        owner_id: &str,
        update: InvoiceUpdate,
    ) -> Result<Invoice> {
        let invoice = self
            .invoices
            .get(invoice_id)
            .await?
            .ok_or_else(|| EngineError::InvoiceNotFound(invoice_id.to_string()))?;
        if invoice.owner_id != owner_id {
            return Err(EngineError::Forbidden(format!(
                "{} does not own invoice {}",
                owner_id, invoice_id
            )));
        }
        check_pending(&invoice)?;

        match self
            .invoices
            .update_if(invoice_id, InvoiceStatus::Pending, update)
            .await?
        {
            Some(updated) => {
                info!(invoice_id, status = %updated.status, "invoice updated");
                Ok(updated)
            }
            None => {
                let current = self
                    .invoices
                    .get(invoice_id)
                    .await?
                    .ok_or_else(|| EngineError::InvoiceNotFound(invoice_id.to_string()))?;
                check_pending(&current)?;
                Err(EngineError::InternalError(Box::new(std::io::Error::other(
                    "conditional update rejected a pending invoice",
                ))))
            }
        }
    }

    pub async fn status_summary(&self, owner_id: &str, now: DateTime<Utc>) -> Result<StatusSummary> {
        let invoices = self.invoices.find(&party_filter(Role::Owner, owner_id)).await?;
        let mut summary = StatusSummary {
            total: invoices.len(),
            ..StatusSummary::default()
        };
        for invoice in &invoices {
            match invoice.status {
                InvoiceStatus::Paid => summary.paid += 1,
                InvoiceStatus::Cancelled => summary.cancelled += 1,
                InvoiceStatus::Overdue => summary.overdue += 1,
                InvoiceStatus::Pending if invoice.is_overdue(now) => summary.overdue += 1,
                InvoiceStatus::Pending => summary.pending += 1,
            }
        }
        Ok(summary)
    }

    pub async fn income_report(&self, owner_id: &str) -> Result<IncomeReport> {
        let invoices = self.invoices.find(&party_filter(Role::Owner, owner_id)).await?;
        let mut report = IncomeReport::default();
        for invoice in &invoices {
            match invoice.status {
                InvoiceStatus::Paid => {
                    report.collected += invoice.amount.value();
                    report.paid_count += 1;
                }
                InvoiceStatus::Pending | InvoiceStatus::Overdue => {
                    report.outstanding += invoice.amount.value();
                    report.late_fees_outstanding +=
                        invoice.late_fee.map(|fee| fee.value()).unwrap_or_default();
                    report.pending_count += 1;
                }
                InvoiceStatus::Cancelled => {}
            }
        }
        Ok(report)
    }

    /// The tenant's paid invoices, most recently paid first.
    pub async fn payment_history(&self, tenant_id: &str, limit: usize) -> Result<Vec<Invoice>> {
        let filter = InvoiceFilter {
            status: Some(InvoiceStatus::Paid),
            tenant_id: Some(tenant_id.to_string()),
            ..InvoiceFilter::default()
        };
        let mut paid = self.invoices.find(&filter).await?;
        paid.sort_by_key(|i| Reverse(i.paid_date));
        paid.truncate(limit);
        Ok(paid)
    }
}

fn party_filter(role: Role, user_id: &str) -> InvoiceFilter {
    match role {
        Role::Owner => InvoiceFilter {
            owner_id: Some(user_id.to_string()),
            ..InvoiceFilter::default()
        },
        Role::Tenant => InvoiceFilter {
            tenant_id: Some(user_id.to_string()),
            ..InvoiceFilter::default()
        },
    }
}

fn check_pending(invoice: &Invoice) -> Result<()> {
    match invoice.status {
        InvoiceStatus::Pending => Ok(()),
        InvoiceStatus::Paid => Err(EngineError::AlreadyPaid(invoice.id.clone())),
        InvoiceStatus::Cancelled => Err(EngineError::Cancelled(invoice.id.clone())),
        InvoiceStatus::Overdue => Err(EngineError::ValidationError(format!(
            "invoice {} is overdue",
            invoice.id
        ))),
    }
}
