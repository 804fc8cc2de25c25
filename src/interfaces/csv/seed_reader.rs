use crate::domain::invoice::{Frequency, Invoice, InvoiceStatus, InvoiceUpdate, NewInvoice};
use crate::domain::property::Property;
use crate::error::{EngineError, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::io::Read;
use uuid::Uuid;

/// One invoice row. Seed files may carry settled history, so status and
/// settlement columns are accepted here but not on `NewInvoice`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InvoiceRecord {
    #[serde(default)]
    id: Option<String>,
    property_id: String,
    property_name: String,
    owner_id: String,
    tenant_id: String,
    amount: String,
    due_date: DateTime<Utc>,
    #[serde(default)]
    status: Option<InvoiceStatus>,
    #[serde(default)]
    tx_hash: Option<String>,
    #[serde(default)]
    paid_date: Option<DateTime<Utc>>,
    #[serde(default)]
    recurring: Option<bool>,
    #[serde(default)]
    frequency: Option<Frequency>,
    #[serde(default)]
    notes: Option<String>,
}

impl InvoiceRecord {
    fn into_invoice(self, now: DateTime<Utc>) -> Result<Invoice> {
        let id = self
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut invoice = Invoice::new(
            id,
            NewInvoice {
                property_id: self.property_id,
                property_name: self.property_name,
                owner_id: self.owner_id,
                tenant_id: self.tenant_id,
                amount: self.amount,
                due_date: Some(self.due_date),
                recurring: self.recurring.unwrap_or_default(),
                frequency: self.frequency.unwrap_or_default(),
                notes: self.notes.unwrap_or_default(),
            },
            now,
        )?;

        match self.status.unwrap_or_default() {
            InvoiceStatus::Pending => {}
            InvoiceStatus::Paid => {
                let tx_hash = self.tx_hash.filter(|h| !h.is_empty()).ok_or_else(|| {
                    EngineError::ValidationError(format!(
                        "paid invoice {} has no txHash",
                        invoice.id
                    ))
                })?;
                let paid_at = self.paid_date.unwrap_or(self.due_date);
                invoice.apply(InvoiceUpdate::MarkPaid { tx_hash, paid_at });
            }
            InvoiceStatus::Cancelled => invoice.apply(InvoiceUpdate::Cancel),
            InvoiceStatus::Overdue => {
                return Err(EngineError::ValidationError(format!(
                    "invoice {}: overdue is derived from the due date, seed it as pending",
                    invoice.id
                )));
            }
        }
        Ok(invoice)
    }
}

/// Reads seed data from a CSV source.
///
/// Wraps `csv::Reader` with whitespace trimming and flexible record lengths.
/// Headers are the camelCase field names (`ownerId`, `dueDate`, ...).
pub struct SeedReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> SeedReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes property rows.
    pub fn properties(self) -> impl Iterator<Item = Result<Property>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(EngineError::from))
    }

    /// Lazily deserializes invoice rows, stamping `now` as the creation time.
    pub fn invoices(self, now: DateTime<Utc>) -> impl Iterator<Item = Result<Invoice>> {
        self.reader
            .into_deserialize::<InvoiceRecord>()
            .map(move |result| result.map_err(EngineError::from)?.into_invoice(now))
    }
}
