//! Application layer: the monitoring and payment engine.
//!
//! `MonitoringScheduler` drives the periodic cycle, `DecisionPolicy` turns an
//! invoice's situation into an action, `PaymentGateway` moves value through the
//! custodial wallet, and `PaymentExecutor` owns the `pending -> paid` transition.

pub mod executor;
pub mod gateway;
pub mod invoices;
pub mod policy;
pub mod scheduler;
