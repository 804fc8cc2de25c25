use super::invoice::Amount;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use thiserror::Error;

/// Share of the invoice amount charged as a late fee by the fallback rule.
pub const LATE_FEE_RATE: Decimal = dec!(0.05);
/// Overdue days tolerated before the fallback rule charges a late fee.
pub const LATE_FEE_GRACE_DAYS: i64 = 7;

/// A named action a decision can recommend.
pub trait PolicyAction: Sized + Copy + std::fmt::Debug {
    const ALLOWED: &'static [&'static str];

    fn from_name(name: &str) -> Option<Self>;
    fn name(&self) -> &'static str;
}

/// Actions for an invoice already past its due date.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum OverdueAction {
    ApplyLateFee,
    SendReminder,
    Escalate,
    Wait,
}

impl PolicyAction for OverdueAction {
    const ALLOWED: &'static [&'static str] = &["apply_late_fee", "send_reminder", "escalate", "wait"];

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "apply_late_fee" => Some(Self::ApplyLateFee),
            "send_reminder" => Some(Self::SendReminder),
            "escalate" => Some(Self::Escalate),
            "wait" => Some(Self::Wait),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::ApplyLateFee => "apply_late_fee",
            Self::SendReminder => "send_reminder",
            Self::Escalate => "escalate",
            Self::Wait => "wait",
        }
    }
}

/// Actions for a payment that is not yet due.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum PreDueAction {
    Process,
    Skip,
    ManualReview,
}

impl PolicyAction for PreDueAction {
    const ALLOWED: &'static [&'static str] = &["process", "skip", "manual_review"];

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "process" => Some(Self::Process),
            "skip" => Some(Self::Skip),
            "manual_review" => Some(Self::ManualReview),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Process => "process",
            Self::Skip => "skip",
            Self::ManualReview => "manual_review",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum DecisionSource {
    Inference,
    Fallback,
}

/// The outcome of a policy evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision<A> {
    pub action: A,
    pub reason: String,
    /// 0 to 100.
    pub confidence: u8,
    pub late_fee_amount: Option<Decimal>,
    pub source: DecisionSource,
}

/// Audit record persisted on an invoice when the policy recommends an action.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRecord {
    pub action: OverdueAction,
    pub reason: String,
    pub confidence: u8,
    pub source: DecisionSource,
    pub timestamp: DateTime<Utc>,
}

impl Decision<OverdueAction> {
    pub fn to_record(&self, timestamp: DateTime<Utc>) -> DecisionRecord {
        DecisionRecord {
            action: self.action,
            reason: self.reason.clone(),
            confidence: self.confidence,
            source: self.source,
            timestamp,
        }
    }
}

/// Situation of an invoice past its due date.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatePaymentContext {
    pub days_overdue: i64,
    pub amount: Amount,
    pub tenant_id: String,
    pub property_name: String,
}

impl LatePaymentContext {
    /// Deterministic rule used whenever the inference path is unusable.
    pub fn fallback_decision(&self) -> Decision<OverdueAction> {
        if self.days_overdue > LATE_FEE_GRACE_DAYS {
            Decision {
                action: OverdueAction::ApplyLateFee,
                reason: format!(
                    "More than {} days overdue - standard late fee policy",
                    LATE_FEE_GRACE_DAYS
                ),
                confidence: 90,
                late_fee_amount: Some(self.standard_late_fee()),
                source: DecisionSource::Fallback,
            }
        } else {
            Decision {
                action: OverdueAction::SendReminder,
                reason: format!(
                    "{} days or less overdue - friendly reminder",
                    LATE_FEE_GRACE_DAYS
                ),
                confidence: 95,
                late_fee_amount: Some(Decimal::ZERO),
                source: DecisionSource::Fallback,
            }
        }
    }

    pub fn standard_late_fee(&self) -> Decimal {
        self.amount.value() * LATE_FEE_RATE
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentHistoryEntry {
    pub amount: Amount,
    pub due_date: DateTime<Utc>,
    pub paid_date: Option<DateTime<Utc>>,
}

/// Situation of a payment ahead of its due date.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentContext {
    pub property_id: String,
    pub tenant: String,
    pub amount: Amount,
    pub due_date: DateTime<Utc>,
    pub current_date: DateTime<Utc>,
    pub tenant_balance: Option<Amount>,
    pub history: Vec<PaymentHistoryEntry>,
}

/// Sentinel returned when no trustworthy pre-due decision can be made.
pub fn manual_review(reason: impl Into<String>) -> Decision<PreDueAction> {
    Decision {
        action: PreDueAction::ManualReview,
        reason: reason.into(),
        confidence: 0,
        late_fee_amount: None,
        source: DecisionSource::Fallback,
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ReplyParseError {
    #[error("reply is not valid JSON: {0}")]
    NotJson(String),
    #[error("reply is not a JSON object")]
    NotAnObject,
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("unknown action {found:?}, expected one of {allowed:?}")]
    UnknownAction {
        found: String,
        allowed: &'static [&'static str],
    },
    #[error("confidence must be a number between 0 and 100")]
    InvalidConfidence,
    #[error("lateFeeAmount must be a non-negative number")]
    InvalidLateFee,
}

/// Parses an inference reply into a decision.
///
/// Providers do not enforce a schema, so the reply is treated as untrusted text:
/// an optional Markdown code fence is stripped, then the JSON object must carry
/// an allowed `action` and a `confidence` in 0..=100. `reason` and
/// `lateFeeAmount` are optional.
pub fn parse_reply<A: PolicyAction>(reply: &str) -> Result<Decision<A>, ReplyParseError> {
    let body = strip_code_fence(reply);
    let value: Value =
        serde_json::from_str(body).map_err(|e| ReplyParseError::NotJson(e.to_string()))?;
    let object = value.as_object().ok_or(ReplyParseError::NotAnObject)?;

    let action_name = object
        .get("action")
        .and_then(Value::as_str)
        .ok_or(ReplyParseError::MissingField("action"))?;
    let action = A::from_name(action_name.trim()).ok_or_else(|| ReplyParseError::UnknownAction {
        found: action_name.to_string(),
        allowed: A::ALLOWED,
    })?;

    let confidence = object
        .get("confidence")
        .ok_or(ReplyParseError::MissingField("confidence"))
        .and_then(parse_confidence)?;

    let reason = object
        .get("reason")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let late_fee_amount = match object.get("lateFeeAmount") {
        None | Some(Value::Null) => None,
        Some(v) => Some(parse_decimal(v).ok_or(ReplyParseError::InvalidLateFee)?),
    };
    if late_fee_amount.is_some_and(|fee| fee < Decimal::ZERO) {
        return Err(ReplyParseError::InvalidLateFee);
    }

    Ok(Decision {
        action,
        reason,
        confidence,
        late_fee_amount,
        source: DecisionSource::Inference,
    })
}

fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    // Drop the info string, e.g. "json".
    match rest.find('\n') {
        Some(idx) => rest[idx + 1..].trim(),
        None => rest.trim(),
    }
}

fn parse_confidence(value: &Value) -> Result<u8, ReplyParseError> {
    let confidence = parse_decimal(value).ok_or(ReplyParseError::InvalidConfidence)?;
    if confidence < Decimal::ZERO || confidence > dec!(100) {
        return Err(ReplyParseError::InvalidConfidence);
    }
    confidence.round().to_u8().ok_or(ReplyParseError::InvalidConfidence)
}

fn parse_decimal(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().trim_start_matches('$').to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}
