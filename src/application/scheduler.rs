use super::policy::DecisionPolicy;
use crate::domain::decision::{LatePaymentContext, OverdueAction, PolicyAction};
use crate::domain::events::EngineEvent;
use crate::domain::invoice::{Amount, InvoiceFilter, InvoiceStatus, InvoiceUpdate};
use crate::domain::ports::{InvoiceStoreRef, NotificationSinkRef};
use crate::error::{EngineError, Result};
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub check_interval: Duration,
    /// Pending invoices due within this many days are logged as upcoming.
    pub upcoming_window_days: i64,
    /// Pending invoices due within this many days get a reminder event.
    pub reminder_window_days: i64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(60),
            upcoming_window_days: 7,
            reminder_window_days: 3,
        }
    }
}

/// What a single cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub overdue_evaluated: usize,
    pub late_fees_applied: usize,
    pub upcoming: usize,
    pub reminders: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    pub is_running: bool,
    pub check_interval_ms: u64,
    /// Completion time of the latest cycle.
    pub last_check: Option<DateTime<Utc>>,
}

struct Monitor {
    invoices: InvoiceStoreRef,
    policy: Arc<DecisionPolicy>,
    notifier: NotificationSinkRef,
    settings: SchedulerSettings,
    last_check: RwLock<Option<DateTime<Utc>>>,
    /// Held for the whole of a cycle, whoever started it.
    cycle_guard: tokio::sync::Mutex<()>,
}

impl Monitor {
    async fn run_cycle_at(&self, now: DateTime<Utc>) -> Result<CycleReport> {
        let _running = self.cycle_guard.lock().await;
        let result = self.cycle(now).await;
        *self.last_check.write().unwrap_or_else(|e| e.into_inner()) = Some(Utc::now());
        result
    }

    #[instrument(skip(self), fields(now = %now))]
    async fn cycle(&self, now: DateTime<Utc>) -> Result<CycleReport> {
        debug!("running monitoring cycle");
        let mut report = CycleReport::default();
        self.check_overdue(now, &mut report).await?;
        self.check_upcoming(now, &mut report).await?;
        self.send_reminders(now, &mut report).await?;
        info!(
            overdue = report.overdue_evaluated,
            late_fees = report.late_fees_applied,
            upcoming = report.upcoming,
            reminders = report.reminders,
            "monitoring cycle finished"
        );
        Ok(report)
    }

    async fn check_overdue(&self, now: DateTime<Utc>, report: &mut CycleReport) -> Result<()> {
        let filter = InvoiceFilter {
            status: Some(InvoiceStatus::Pending),
            due_before: Some(now),
            ..InvoiceFilter::default()
        };

        for invoice in self.invoices.find(&filter).await? {
            let days_overdue = invoice.days_overdue(now);
            let ctx = LatePaymentContext {
                days_overdue,
                amount: invoice.amount,
                tenant_id: invoice.tenant_id.clone(),
                property_name: invoice.property_name.clone(),
            };
            let decision = self.policy.decide_late_payment(&ctx).await;
            report.overdue_evaluated += 1;

            if decision.action != OverdueAction::ApplyLateFee {
                debug!(
                    invoice_id = %invoice.id,
                    action = decision.action.name(),
                    "no annotation for decision"
                );
                continue;
            }

            let late_fee = decision.late_fee_amount.and_then(|fee| Amount::new(fee).ok());
            let update = InvoiceUpdate::Annotate {
                late_fee,
                record: decision.to_record(now),
            };
            match self.invoices.update_if(&invoice.id, InvoiceStatus::Pending, update).await? {
                Some(_) => {
                    report.late_fees_applied += 1;
                    warn!(
                        invoice_id = %invoice.id,
                        property = %invoice.property_name,
                        days_overdue,
                        late_fee = ?late_fee.map(|f| f.to_string()),
                        confidence = decision.confidence,
                        "late fee applied"
                    );
                }
                None => debug!(invoice_id = %invoice.id, "invoice no longer pending, annotation skipped"),
            }
        }
        Ok(())
    }

    async fn check_upcoming(&self, now: DateTime<Utc>, report: &mut CycleReport) -> Result<()> {
        let filter = due_within(now, self.settings.upcoming_window_days)?;
        for invoice in self.invoices.find(&filter).await? {
            report.upcoming += 1;
            info!(
                invoice_id = %invoice.id,
                property = %invoice.property_name,
                days_until_due = invoice.days_until_due(now),
                "upcoming payment"
            );
        }
        Ok(())
    }

    async fn send_reminders(&self, now: DateTime<Utc>, report: &mut CycleReport) -> Result<()> {
        let filter = due_within(now, self.settings.reminder_window_days)?;
        for invoice in self.invoices.find(&filter).await? {
            report.reminders += 1;
            let days = invoice.days_until_due(now);
            self.notifier.publish(EngineEvent::reminder(invoice, days));
        }
        Ok(())
    }
}

fn due_within(now: DateTime<Utc>, days: i64) -> Result<InvoiceFilter> {
    let until = TimeDelta::try_days(days)
        .and_then(|window| now.checked_add_signed(window))
        .ok_or_else(|| {
            EngineError::Configuration(format!("window of {} days is out of range", days))
        })?;
    Ok(InvoiceFilter {
        status: Some(InvoiceStatus::Pending),
        due_after: Some(now),
        due_until: Some(until),
        ..InvoiceFilter::default()
    })
}

#[derive(Default)]
struct Lifecycle {
    token: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

/// Drives the monitoring cycle on a fixed interval.
///
/// The handle owns its lifecycle: a cancellation token for the timer, the
/// spawned task, and the time of the last completed cycle. Cycles never
/// overlap: timer cycles, manual `run_cycle_at` calls and a cycle still
/// finishing after `stop` all take the same guard.
pub struct MonitoringScheduler {
    monitor: Arc<Monitor>,
    lifecycle: Mutex<Lifecycle>,
}

impl MonitoringScheduler {
    pub fn new(
        invoices: InvoiceStoreRef,
        policy: Arc<DecisionPolicy>,
        notifier: NotificationSinkRef,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            monitor: Arc::new(Monitor {
                invoices,
                policy,
                notifier,
                settings,
                last_check: RwLock::new(None),
                cycle_guard: tokio::sync::Mutex::new(()),
            }),
            lifecycle: Mutex::new(Lifecycle::default()),
        }
    }

    /// Runs one cycle immediately, then one per interval. No-op while running.
    /// Must be called within a Tokio runtime.
    pub fn start(&self) {
        let mut lifecycle = self.lifecycle.lock().unwrap_or_else(|e| e.into_inner());
        if lifecycle.token.is_some() {
            debug!("scheduler already running");
            return;
        }

        let token = CancellationToken::new();
        let monitor = self.monitor.clone();
        let cancelled = token.clone();
        let period = self.monitor.settings.check_interval;

        lifecycle.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if let Err(e) = monitor.run_cycle_at(Utc::now()).await {
                    error!(error = %e, "monitoring cycle failed");
                }
            }
            debug!("scheduler loop exited");
        }));
        lifecycle.token = Some(token);
        info!(interval_secs = period.as_secs(), "monitoring scheduler started");
    }

    /// Cancels the timer. A cycle already in progress runs to completion.
    pub fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(token) = lifecycle.token.take() {
            token.cancel();
            info!("monitoring scheduler stopped");
        }
    }

    /// Stops the timer and waits for the loop, including any in-flight cycle.
    pub async fn shutdown(&self) {
        self.stop();
        let task = {
            let mut lifecycle = self.lifecycle.lock().unwrap_or_else(|e| e.into_inner());
            lifecycle.task.take()
        };
        if let Some(task) = task
            && let Err(e) = task.await
        {
            error!(error = %e, "scheduler task ended abnormally");
        }
    }

    pub fn status(&self) -> SchedulerStatus {
        let is_running = self
            .lifecycle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .token
            .is_some();
        let last_check = *self.monitor.last_check.read().unwrap_or_else(|e| e.into_inner());
        SchedulerStatus {
            is_running,
            check_interval_ms: self.monitor.settings.check_interval.as_millis() as u64,
            last_check,
        }
    }

    /// Runs a single cycle as of `now`, outside the timer.
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> Result<CycleReport> {
        self.monitor.run_cycle_at(now).await
    }
}
