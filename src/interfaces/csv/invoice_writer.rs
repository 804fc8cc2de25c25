use crate::domain::decision::PolicyAction;
use crate::domain::invoice::Invoice;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct InvoiceRow<'a> {
    id: &'a str,
    property: &'a str,
    tenant: &'a str,
    amount: String,
    due_date: String,
    status: String,
    late_fee: String,
    decision: &'a str,
    confidence: String,
    tx_hash: &'a str,
    paid_date: String,
}

impl<'a> From<&'a Invoice> for InvoiceRow<'a> {
    fn from(invoice: &'a Invoice) -> Self {
        Self {
            id: &invoice.id,
            property: &invoice.property_name,
            tenant: &invoice.tenant_id,
            amount: invoice.amount.to_string(),
            due_date: invoice.due_date.to_rfc3339(),
            status: invoice.status.to_string(),
            late_fee: invoice.late_fee.map(|f| f.to_string()).unwrap_or_default(),
            decision: invoice.ai_decision.as_ref().map(|d| d.action.name()).unwrap_or_default(),
            confidence: invoice
                .ai_decision
                .as_ref()
                .map(|d| d.confidence.to_string())
                .unwrap_or_default(),
            tx_hash: invoice.tx_hash.as_deref().unwrap_or_default(),
            paid_date: invoice.paid_date.map(|d| d.to_rfc3339()).unwrap_or_default(),
        }
    }
}

/// Writes invoices as a CSV report, one row per invoice.
pub struct InvoiceWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> InvoiceWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_invoices<'a, I>(&mut self, invoices: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a Invoice>,
    {
        for invoice in invoices {
            self.writer.serialize(InvoiceRow::from(invoice))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
