//! ErrandBit Payment Monitoring
//!
//! Periodic health checks over the payment ledger and the Lightning node.
//!
//! ## Components
//!
//! - **PaymentMonitor**: one `run_cycle()` collects metrics, lists stuck
//!   payments, probes the node, reconciles stuck invoices with the provider
//!   and hands any alerts to an [`AlertSink`].
//! - **Alert policy**: stuck payments, unreachable node, and a low success
//!   rate over a large enough sample. Each rule is evaluated independently.
//! - **PeriodicTask**: runs a job on a fixed interval until stopped.

mod alert;
mod monitor;
mod report;
mod task;

pub use alert::{evaluate_alerts, Alert, AlertSink, LogAlertSink};
pub use monitor::{MonitorConfig, PaymentMonitor};
pub use report::{MonitoringReport, NodeHealth, PaymentMetrics, StuckPayment};
pub use task::PeriodicTask;
