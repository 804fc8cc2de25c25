mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::{ScriptedInference, invoice};
use rentpilot::application::policy::DecisionPolicy;
use rentpilot::application::scheduler::{MonitoringScheduler, SchedulerSettings};
use rentpilot::domain::decision::{
    DecisionSource, OverdueAction, PaymentContext, PreDueAction,
};
use rentpilot::domain::invoice::{InvoiceStatus, InvoiceUpdate};
use rentpilot::domain::ports::{InferenceClientRef, InvoiceStore};
use rentpilot::infrastructure::broadcast::BroadcastNotifier;
use rentpilot::infrastructure::in_memory::InMemoryInvoiceStore;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

fn scheduler(
    store: &InMemoryInvoiceStore,
    inference: Option<InferenceClientRef>,
    notifier: Arc<BroadcastNotifier>,
) -> MonitoringScheduler {
    MonitoringScheduler::new(
        Arc::new(store.clone()),
        Arc::new(DecisionPolicy::new(inference, Duration::from_secs(5))),
        notifier,
        SchedulerSettings::default(),
    )
}

#[tokio::test]
async fn test_overdue_invoice_gets_rule_based_late_fee() {
    let now = Utc::now();
    let store = InMemoryInvoiceStore::new();
    store
        .insert(invoice("inv-1", "tenant-1", "3", now - ChronoDuration::days(8)))
        .await
        .unwrap();
    let inference = Arc::new(ScriptedInference::unavailable());

    let report = scheduler(&store, Some(inference.clone()), Arc::new(BroadcastNotifier::new(8)))
        .run_cycle_at(now)
        .await
        .unwrap();

    assert_eq!(report.overdue_evaluated, 1);
    assert_eq!(report.late_fees_applied, 1);
    assert_eq!(inference.calls(), 1);

    let stored = store.get("inv-1").await.unwrap().unwrap();
    assert_eq!(stored.status, InvoiceStatus::Pending);
    assert_eq!(stored.late_fee.map(|f| f.value()), Some(dec!(0.15)));
    assert_eq!(stored.amount.value(), dec!(3));
    let record = stored.ai_decision.unwrap();
    assert_eq!(record.action, OverdueAction::ApplyLateFee);
    assert_eq!(record.confidence, 90);
    assert_eq!(record.source, DecisionSource::Fallback);
    assert_eq!(record.timestamp, now);
}

#[tokio::test]
async fn test_inference_reply_drives_annotation() {
    let now = Utc::now();
    let store = InMemoryInvoiceStore::new();
    store
        .insert(invoice("inv-1", "tenant-1", "100", now - ChronoDuration::days(12)))
        .await
        .unwrap();
    let inference = Arc::new(ScriptedInference::replying(
        "```json\n{\"action\":\"apply_late_fee\",\"lateFeeAmount\":7.5,\"reason\":\"twelve days late\",\"confidence\":82}\n```",
    ));

    scheduler(&store, Some(inference), Arc::new(BroadcastNotifier::new(8)))
        .run_cycle_at(now)
        .await
        .unwrap();

    let stored = store.get("inv-1").await.unwrap().unwrap();
    assert_eq!(stored.late_fee.map(|f| f.value()), Some(dec!(7.5)));
    let record = stored.ai_decision.unwrap();
    assert_eq!(record.source, DecisionSource::Inference);
    assert_eq!(record.confidence, 82);
    assert_eq!(record.reason, "twelve days late");
}

#[tokio::test]
async fn test_reminder_decision_leaves_invoice_untouched() {
    let now = Utc::now();
    let store = InMemoryInvoiceStore::new();
    let original = invoice("inv-1", "tenant-1", "3", now - ChronoDuration::days(2));
    store.insert(original.clone()).await.unwrap();

    let report = scheduler(&store, None, Arc::new(BroadcastNotifier::new(8)))
        .run_cycle_at(now)
        .await
        .unwrap();

    assert_eq!(report.overdue_evaluated, 1);
    assert_eq!(report.late_fees_applied, 0);
    assert_eq!(store.get("inv-1").await.unwrap().unwrap(), original);
}

#[tokio::test]
async fn test_each_overdue_invoice_is_evaluated_once_per_cycle() {
    let now = Utc::now();
    let store = InMemoryInvoiceStore::new();
    for (i, days) in [1, 9, 30].into_iter().enumerate() {
        store
            .insert(invoice(
                &format!("inv-{}", i),
                "tenant-1",
                "3",
                now - ChronoDuration::days(days),
            ))
            .await
            .unwrap();
    }
    store
        .insert(invoice("inv-future", "tenant-1", "3", now + ChronoDuration::days(20)))
        .await
        .unwrap();
    let inference = Arc::new(ScriptedInference::unavailable());
    let scheduler = scheduler(&store, Some(inference.clone()), Arc::new(BroadcastNotifier::new(8)));

    let report = scheduler.run_cycle_at(now).await.unwrap();
    assert_eq!(report.overdue_evaluated, 3);
    assert_eq!(report.late_fees_applied, 2);
    assert_eq!(inference.calls(), 3);

    // Fees are recomputed from the fixed amount, so a second pass does not compound them.
    scheduler.run_cycle_at(now + ChronoDuration::hours(1)).await.unwrap();
    assert_eq!(inference.calls(), 6);
    let stored = store.get("inv-2").await.unwrap().unwrap();
    assert_eq!(stored.late_fee.map(|f| f.value()), Some(dec!(0.15)));
}

#[tokio::test]
async fn test_paid_invoice_is_never_annotated() {
    let now = Utc::now();
    let store = InMemoryInvoiceStore::new();
    store
        .insert(invoice("inv-1", "tenant-1", "3", now - ChronoDuration::days(10)))
        .await
        .unwrap();
    store
        .update_if(
            "inv-1",
            InvoiceStatus::Pending,
            InvoiceUpdate::MarkPaid {
                tx_hash: "0xabc".to_string(),
                paid_at: now,
            },
        )
        .await
        .unwrap()
        .unwrap();
    let before = store.get("inv-1").await.unwrap().unwrap();
    let inference = Arc::new(ScriptedInference::unavailable());

    let report = scheduler(&store, Some(inference.clone()), Arc::new(BroadcastNotifier::new(8)))
        .run_cycle_at(now)
        .await
        .unwrap();

    assert_eq!(report.overdue_evaluated, 0);
    assert_eq!(inference.calls(), 0);
    assert_eq!(store.get("inv-1").await.unwrap().unwrap(), before);
}

#[tokio::test]
async fn test_reminders_are_published_for_invoices_due_soon() {
    let now = Utc::now();
    let store = InMemoryInvoiceStore::new();
    store
        .insert(invoice("inv-soon", "tenant-1", "3", now + ChronoDuration::days(2)))
        .await
        .unwrap();
    store
        .insert(invoice("inv-week", "tenant-1", "3", now + ChronoDuration::days(6)))
        .await
        .unwrap();
    let notifier = Arc::new(BroadcastNotifier::new(8));
    let mut events = notifier.subscribe();

    let report = scheduler(&store, None, notifier).run_cycle_at(now).await.unwrap();

    assert_eq!(report.upcoming, 2);
    assert_eq!(report.reminders, 1);
    let event = events.try_recv().unwrap();
    assert_eq!(event.kind.name(), "invoice:reminder");
    assert_eq!(event.invoice.id, "inv-soon");
    assert!(event.message.contains("due in 2 days"));
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_pre_due_decision_does_not_touch_the_store() {
    let now = Utc::now();
    let store = InMemoryInvoiceStore::new();
    let original = invoice("inv-1", "tenant-1", "3", now + ChronoDuration::days(5));
    store.insert(original.clone()).await.unwrap();
    let policy = DecisionPolicy::new(
        Some(Arc::new(ScriptedInference::replying(
            r#"{"action":"process","reason":"good history","confidence":88}"#,
        ))),
        Duration::from_secs(5),
    );

    let decision = policy
        .decide_pre_due(&PaymentContext {
            property_id: original.property_id.clone(),
            tenant: original.tenant_id.clone(),
            amount: original.amount,
            due_date: original.due_date,
            current_date: now,
            tenant_balance: None,
            history: Vec::new(),
        })
        .await;

    assert_eq!(decision.action, PreDueAction::Process);
    assert_eq!(decision.confidence, 88);
    assert_eq!(store.get("inv-1").await.unwrap().unwrap(), original);
}

#[tokio::test]
async fn test_pre_due_without_inference_requires_manual_review() {
    let policy = DecisionPolicy::new(
        Some(Arc::new(ScriptedInference::unavailable())),
        Duration::from_secs(5),
    );
    let now = Utc::now();

    let decision = policy
        .decide_pre_due(&PaymentContext {
            property_id: "prop-1".to_string(),
            tenant: "tenant-1".to_string(),
            amount: "3".parse().unwrap(),
            due_date: now + ChronoDuration::days(5),
            current_date: now,
            tenant_balance: None,
            history: Vec::new(),
        })
        .await;

    assert_eq!(decision.action, PreDueAction::ManualReview);
    assert_eq!(decision.confidence, 0);
    assert_eq!(decision.reason, "AI decision unavailable");
}
