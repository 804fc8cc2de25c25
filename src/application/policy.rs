use crate::domain::decision::{
    Decision, LatePaymentContext, OverdueAction, PaymentContext, PolicyAction, PreDueAction,
    manual_review, parse_reply,
};
use crate::domain::ports::{InferenceClientRef, InferenceRequest};
use crate::error::{EngineError, Result};
use std::time::Duration;
use tracing::{debug, instrument, warn};

const LATE_PAYMENT_PERSONA: &str = "You are an autonomous AI agent managing real estate rental payments. \
Make fair, reasonable decisions. Be conservative - only act if confident.";

const PRE_DUE_PERSONA: &str = "You are an AI payment agent. Decide if payments should be processed \
automatically. Be conservative - only process if confident.";

/// Turns a payment situation into a recommended action.
///
/// The primary path asks a generative-text provider and parses its reply; any
/// provider error, timeout, or malformed reply resolves to a deterministic
/// answer instead of an error. Evaluation never mutates state.
pub struct DecisionPolicy {
    inference: Option<InferenceClientRef>,
    timeout: Duration,
}

impl DecisionPolicy {
    /// `inference` of `None` means no provider is configured; every decision
    /// then takes the deterministic path.
    pub fn new(inference: Option<InferenceClientRef>, timeout: Duration) -> Self {
        Self { inference, timeout }
    }

    /// Decision for an invoice past its due date.
    #[instrument(skip(self, ctx), fields(days_overdue = ctx.days_overdue, property = %ctx.property_name))]
    pub async fn decide_late_payment(&self, ctx: &LatePaymentContext) -> Decision<OverdueAction> {
        let request = InferenceRequest {
            system: LATE_PAYMENT_PERSONA.to_string(),
            prompt: late_payment_prompt(ctx),
            temperature: 0.3,
            json: true,
        };

        match self.infer::<OverdueAction>(&request).await {
            Ok(mut decision) => {
                // A fee recommendation without a figure gets the standard one.
                if decision.action == OverdueAction::ApplyLateFee && decision.late_fee_amount.is_none() {
                    decision.late_fee_amount = Some(ctx.standard_late_fee());
                }
                debug!(action = decision.action.name(), confidence = decision.confidence, "inference decision");
                decision
            }
            Err(e) => {
                let decision = ctx.fallback_decision();
                warn!(
                    error = %e,
                    action = decision.action.name(),
                    "inference unavailable, using late payment rule"
                );
                decision
            }
        }
    }

    /// Decision for a payment ahead of its due date.
    #[instrument(skip(self, ctx), fields(property_id = %ctx.property_id))]
    pub async fn decide_pre_due(&self, ctx: &PaymentContext) -> Decision<PreDueAction> {
        let request = InferenceRequest {
            system: PRE_DUE_PERSONA.to_string(),
            prompt: pre_due_prompt(ctx),
            temperature: 0.2,
            json: true,
        };

        match self.infer::<PreDueAction>(&request).await {
            Ok(decision) => {
                debug!(action = decision.action.name(), confidence = decision.confidence, "inference decision");
                decision
            }
            Err(e) => {
                warn!(error = %e, "inference unavailable, requesting manual review");
                manual_review("AI decision unavailable")
            }
        }
    }

    async fn infer<A: PolicyAction>(&self, request: &InferenceRequest) -> Result<Decision<A>> {
        let client = self
            .inference
            .as_ref()
            .ok_or_else(|| EngineError::Configuration("no inference provider configured".to_string()))?;

        let reply = tokio::time::timeout(self.timeout, client.complete(request))
            .await
            .map_err(|_| {
                EngineError::ExternalService(format!("inference timed out after {:?}", self.timeout))
            })??;

        parse_reply::<A>(&reply)
            .map_err(|e| EngineError::ExternalService(format!("malformed inference reply: {}", e)))
    }
}

fn late_payment_prompt(ctx: &LatePaymentContext) -> String {
    format!(
        "As an autonomous AI agent managing rental payments, analyze this situation and make a decision:

Context:
- Type: late_payment
- Days Overdue: {days}
- Amount: ${amount}
- Tenant: {tenant}
- Property: {property}

Based on this, decide:
1. What action should be taken? ({actions})
2. If late fee, how much? (reasonable % based on days overdue)
3. Reasoning for decision
4. Confidence level (0-100)

Respond in JSON format with: action, lateFeeAmount, reason, confidence",
        days = ctx.days_overdue,
        amount = ctx.amount,
        tenant = ctx.tenant_id,
        property = ctx.property_name,
        actions = OverdueAction::ALLOWED.join(", "),
    )
}

fn pre_due_prompt(ctx: &PaymentContext) -> String {
    let history = serde_json::to_string(&ctx.history).unwrap_or_else(|_| "[]".to_string());
    let balance = ctx
        .tenant_balance
        .map(|b| b.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    format!(
        "Should this rental payment be processed automatically?

Payment Details:
- Property ID: {property}
- Tenant: {tenant}
- Amount: {amount} USDC
- Due Date: {due}
- Current Date: {now}
- Tenant Balance: {balance} USDC
- Payment History: {history}

Respond with JSON:
{{
  \"action\": \"process\" | \"skip\" | \"manual_review\",
  \"reason\": \"explanation\",
  \"confidence\": 0-100
}}",
        property = ctx.property_id,
        tenant = ctx.tenant,
        amount = ctx.amount,
        due = ctx.due_date.to_rfc3339(),
        now = ctx.current_date.to_rfc3339(),
    )
}
