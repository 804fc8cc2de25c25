use super::invoice::Invoice;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventKind {
    #[serde(rename = "invoice:created")]
    InvoiceCreated,
    #[serde(rename = "invoice:paid")]
    InvoicePaid,
    #[serde(rename = "invoice:reminder")]
    InvoiceReminder,
    #[serde(rename = "payment:completed")]
    PaymentCompleted,
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::InvoiceCreated => "invoice:created",
            EventKind::InvoicePaid => "invoice:paid",
            EventKind::InvoiceReminder => "invoice:reminder",
            EventKind::PaymentCompleted => "payment:completed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A named event carrying an invoice snapshot for connected observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineEvent {
    pub kind: EventKind,
    pub invoice: Invoice,
    pub message: String,
}

impl EngineEvent {
    pub fn invoice_created(invoice: Invoice) -> Self {
        let message = format!(
            "New invoice created: {} - ${}",
            invoice.property_name, invoice.amount
        );
        Self {
            kind: EventKind::InvoiceCreated,
            invoice,
            message,
        }
    }

    pub fn invoice_paid(invoice: Invoice) -> Self {
        let message = format!(
            "Invoice marked paid: {} - ${}",
            invoice.property_name, invoice.amount
        );
        Self {
            kind: EventKind::InvoicePaid,
            invoice,
            message,
        }
    }

    pub fn reminder(invoice: Invoice, days_until_due: i64) -> Self {
        let message = format!(
            "Payment reminder: {} - ${} due in {} days",
            invoice.property_name, invoice.amount, days_until_due
        );
        Self {
            kind: EventKind::InvoiceReminder,
            invoice,
            message,
        }
    }

    pub fn payment_completed(invoice: Invoice) -> Self {
        let message = format!(
            "Payment completed: {} - ${}",
            invoice.property_name, invoice.amount
        );
        Self {
            kind: EventKind::PaymentCompleted,
            invoice,
            message,
        }
    }
}
