use super::decision::DecisionRecord;
use crate::error::EngineError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// A non-negative monetary amount in the settlement token's units.
///
/// Wraps `rust_decimal::Decimal` so amounts are never handled as floats.
/// Serializes as a decimal string, which is how invoices carry it on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Amount(Decimal);

impl Amount {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(value: Decimal) -> Result<Self, EngineError> {
        if value >= Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(EngineError::ValidationError(
                "Amount must not be negative".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl FromStr for Amount {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let value = Decimal::from_str(trimmed)
            .or_else(|_| Decimal::from_scientific(trimmed))
            .map_err(|_| EngineError::ValidationError(format!("Invalid amount: {:?}", s)))?;
        Self::new(value)
    }
}

impl TryFrom<String> for Amount {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = EngineError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for String {
    fn from(amount: Amount) -> Self {
        amount.0.normalize().to_string()
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default, Hash)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    #[default]
    Pending,
    Paid,
    Overdue,
    Cancelled,
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    #[default]
    Monthly,
    Weekly,
    Daily,
}

/// A rent obligation issued by a property owner to a tenant.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: String,
    pub property_id: String,
    pub property_name: String,
    pub owner_id: String,
    pub tenant_id: String,
    /// Fixed at creation. Late fees live in `late_fee`.
    pub amount: Amount,
    pub due_date: DateTime<Utc>,
    pub recurring: bool,
    pub frequency: Frequency,
    pub status: InvoiceStatus,
    /// Settlement reference, set once a payment attempt completes.
    pub tx_hash: Option<String>,
    /// Set iff `status == Paid`.
    pub paid_date: Option<DateTime<Utc>>,
    pub late_fee: Option<Amount>,
    pub ai_decision: Option<DecisionRecord>,
    #[serde(default)]
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

/// The fields a caller supplies to issue an invoice.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct NewInvoice {
    pub property_id: String,
    pub property_name: String,
    pub owner_id: String,
    pub tenant_id: String,
    pub amount: String,
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub recurring: bool,
    #[serde(default)]
    pub frequency: Frequency,
    #[serde(default)]
    pub notes: String,
}

impl Invoice {
    /// Builds a `pending` invoice, rejecting missing or malformed fields.
    pub fn new(id: String, new: NewInvoice, now: DateTime<Utc>) -> Result<Self, EngineError> {
        let required = [
            ("propertyId", &new.property_id),
            ("propertyName", &new.property_name),
            ("ownerId", &new.owner_id),
            ("tenantId", &new.tenant_id),
            ("amount", &new.amount),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(EngineError::ValidationError(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }
        let due_date = new.due_date.ok_or_else(|| {
            EngineError::ValidationError("Missing required fields: dueDate".to_string())
        })?;
        let amount: Amount = new.amount.parse()?;

        Ok(Self {
            id,
            property_id: new.property_id,
            property_name: new.property_name,
            owner_id: new.owner_id,
            tenant_id: new.tenant_id,
            amount,
            due_date,
            recurring: new.recurring,
            frequency: new.frequency,
            status: InvoiceStatus::Pending,
            tx_hash: None,
            paid_date: None,
            late_fee: None,
            ai_decision: None,
            notes: new.notes,
            created_at: now,
        })
    }

    /// Pending with a due date in the past.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == InvoiceStatus::Pending && self.due_date < now
    }

    /// Whole days past the due date, rounded down. Zero when not yet due.
    pub fn days_overdue(&self, now: DateTime<Utc>) -> i64 {
        let elapsed = (now - self.due_date).num_seconds();
        if elapsed <= 0 {
            0
        } else {
            elapsed / SECONDS_PER_DAY
        }
    }

    /// Whole days until the due date, rounded up. Zero once due.
    pub fn days_until_due(&self, now: DateTime<Utc>) -> i64 {
        let remaining = (self.due_date - now).num_seconds();
        if remaining <= 0 {
            0
        } else {
            (remaining + SECONDS_PER_DAY - 1) / SECONDS_PER_DAY
        }
    }

    /// Applies an engine mutation in place. Status preconditions are the
    /// store's concern (`update_if`); this only keeps the record consistent.
    pub fn apply(&mut self, update: InvoiceUpdate) {
        match update {
            InvoiceUpdate::Annotate { late_fee, record } => {
                if late_fee.is_some() {
                    self.late_fee = late_fee;
                }
                self.ai_decision = Some(record);
            }
            InvoiceUpdate::MarkPaid { tx_hash, paid_at } => {
                self.status = InvoiceStatus::Paid;
                self.tx_hash = Some(tx_hash);
                self.paid_date = Some(paid_at);
            }
            InvoiceUpdate::Cancel => {
                self.status = InvoiceStatus::Cancelled;
                self.paid_date = None;
            }
        }
    }
}

/// The mutations the engine is allowed to make to a stored invoice.
#[derive(Debug, Clone, PartialEq)]
pub enum InvoiceUpdate {
    /// Policy annotation. Never changes `status` or `amount`.
    Annotate {
        late_fee: Option<Amount>,
        record: DecisionRecord,
    },
    MarkPaid {
        tx_hash: String,
        paid_at: DateTime<Utc>,
    },
    Cancel,
}

/// Equality and due-date range filters understood by every `InvoiceStore`.
#[derive(Debug, Clone, Default)]
pub struct InvoiceFilter {
    pub status: Option<InvoiceStatus>,
    pub owner_id: Option<String>,
    pub tenant_id: Option<String>,
    pub property_id: Option<String>,
    /// Inclusive lower bound on `due_date`.
    pub due_after: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `due_date`.
    pub due_before: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `due_date`.
    pub due_until: Option<DateTime<Utc>>,
}

impl InvoiceFilter {
    pub fn with_status(status: InvoiceStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn matches(&self, invoice: &Invoice) -> bool {
        self.status.is_none_or(|s| invoice.status == s)
            && self.owner_id.as_ref().is_none_or(|o| &invoice.owner_id == o)
            && self.tenant_id.as_ref().is_none_or(|t| &invoice.tenant_id == t)
            && self
                .property_id
                .as_ref()
                .is_none_or(|p| &invoice.property_id == p)
            && self.due_after.is_none_or(|d| invoice.due_date >= d)
            && self.due_before.is_none_or(|d| invoice.due_date < d)
            && self.due_until.is_none_or(|d| invoice.due_date <= d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::decision::{DecisionSource, OverdueAction};
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn sample(now: DateTime<Utc>) -> Invoice {
        Invoice::new(
            "inv-1".to_string(),
            NewInvoice {
                property_id: "prop-1".to_string(),
                property_name: "Ocean Apartment".to_string(),
                owner_id: "owner-1".to_string(),
                tenant_id: "tenant-1".to_string(),
                amount: "3".to_string(),
                due_date: Some(now + Duration::days(5)),
                ..NewInvoice::default()
            },
            now,
        )
        .unwrap()
    }

    #[test]
    fn test_amount_validation() {
        assert!(Amount::new(dec!(0)).is_ok());
        assert!(Amount::new(dec!(12.5)).is_ok());
        assert!(matches!(
            Amount::new(dec!(-1.0)),
            Err(EngineError::ValidationError(_))
        ));
        assert!(matches!(
            "abc".parse::<Amount>(),
            Err(EngineError::ValidationError(_))
        ));
        assert_eq!("2.50".parse::<Amount>().unwrap().value(), dec!(2.5));
    }

    #[test]
    fn test_amount_serializes_as_string() {
        let amount: Amount = "3.00".parse().unwrap();
        assert_eq!(serde_json::to_string(&amount).unwrap(), "\"3\"");
        let back: Amount = serde_json::from_str("\"3.00\"").unwrap();
        assert_eq!(back, amount);
    }

    #[test]
    fn test_new_invoice_is_pending() {
        let now = Utc::now();
        let invoice = sample(now);
        assert_eq!(invoice.status, InvoiceStatus::Pending);
        assert!(invoice.paid_date.is_none());
        assert!(invoice.tx_hash.is_none());
    }

    #[test]
    fn test_new_invoice_reports_missing_fields() {
        let err = Invoice::new(
            "inv-2".to_string(),
            NewInvoice {
                property_id: "prop-1".to_string(),
                amount: "3".to_string(),
                due_date: Some(Utc::now()),
                ..NewInvoice::default()
            },
            Utc::now(),
        )
        .unwrap_err();

        match err {
            EngineError::ValidationError(msg) => {
                assert!(msg.contains("propertyName"));
                assert!(msg.contains("tenantId"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_day_counting() {
        let now = Utc::now();
        let mut invoice = sample(now);

        invoice.due_date = now - Duration::days(8) - Duration::hours(5);
        assert_eq!(invoice.days_overdue(now), 8);
        assert!(invoice.is_overdue(now));

        invoice.due_date = now + Duration::days(2) + Duration::hours(1);
        assert_eq!(invoice.days_until_due(now), 3);
        assert_eq!(invoice.days_overdue(now), 0);
        assert!(!invoice.is_overdue(now));
    }

    #[test]
    fn test_mark_paid_sets_paid_date_with_status() {
        let now = Utc::now();
        let mut invoice = sample(now);
        invoice.apply(InvoiceUpdate::MarkPaid {
            tx_hash: "0xabc".to_string(),
            paid_at: now,
        });
        assert_eq!(invoice.status, InvoiceStatus::Paid);
        assert_eq!(invoice.paid_date, Some(now));
        assert_eq!(invoice.tx_hash.as_deref(), Some("0xabc"));
    }

    #[test]
    fn test_annotation_keeps_status_and_amount() {
        let now = Utc::now();
        let mut invoice = sample(now);
        let amount = invoice.amount;
        invoice.apply(InvoiceUpdate::Annotate {
            late_fee: Some(Amount::new(dec!(0.15)).unwrap()),
            record: DecisionRecord {
                action: OverdueAction::ApplyLateFee,
                reason: "late".to_string(),
                confidence: 90,
                source: DecisionSource::Fallback,
                timestamp: now,
            },
        });
        assert_eq!(invoice.status, InvoiceStatus::Pending);
        assert_eq!(invoice.amount, amount);
        assert_eq!(invoice.late_fee.unwrap().value(), dec!(0.15));
    }

    #[test]
    fn test_filter_date_range() {
        let now = Utc::now();
        let invoice = sample(now);

        let upcoming = InvoiceFilter {
            status: Some(InvoiceStatus::Pending),
            due_after: Some(now),
            due_until: Some(now + Duration::days(7)),
            ..InvoiceFilter::default()
        };
        assert!(upcoming.matches(&invoice));

        let overdue = InvoiceFilter {
            status: Some(InvoiceStatus::Pending),
            due_before: Some(now),
            ..InvoiceFilter::default()
        };
        assert!(!overdue.matches(&invoice));

        let other_tenant = InvoiceFilter {
            tenant_id: Some("tenant-2".to_string()),
            ..InvoiceFilter::default()
        };
        assert!(!other_tenant.matches(&invoice));
    }
}
