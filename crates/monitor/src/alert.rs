//! Alert policy and delivery

use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;

use errandbit_core::Result;

use crate::{MonitorConfig, NodeHealth, PaymentMetrics, StuckPayment};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Alert {
    StuckPayments { count: usize, oldest_hours: f64 },
    NodeUnreachable { detail: String },
    LowSuccessRate { success_rate: f64, sample: u64 },
}

impl Alert {
    pub fn message(&self) -> String {
        match self {
            Alert::StuckPayments { count, oldest_hours } => format!(
                "{} payment(s) pending past threshold, oldest {:.1}h",
                count, oldest_hours
            ),
            Alert::NodeUnreachable { detail } => {
                format!("Lightning node unreachable: {}", detail)
            }
            Alert::LowSuccessRate {
                success_rate,
                sample,
            } => format!(
                "Payment success rate {:.1}% over {} payments",
                success_rate, sample
            ),
        }
    }
}

/// Apply the alert rules. Each rule fires on its own.
pub fn evaluate_alerts(
    metrics: &PaymentMetrics,
    stuck: &[StuckPayment],
    node: &NodeHealth,
    config: &MonitorConfig,
) -> Vec<Alert> {
    let mut alerts = Vec::new();

    if !stuck.is_empty() {
        let oldest_hours = stuck.iter().map(|s| s.hours_stuck).fold(0.0, f64::max);
        alerts.push(Alert::StuckPayments {
            count: stuck.len(),
            oldest_hours,
        });
    }

    if !node.healthy {
        alerts.push(Alert::NodeUnreachable {
            detail: node.detail.clone(),
        });
    }

    if metrics.total_payments_24h >= config.min_sample
        && metrics.success_rate < config.success_threshold_pct
    {
        alerts.push(Alert::LowSuccessRate {
            success_rate: metrics.success_rate,
            sample: metrics.total_payments_24h,
        });
    }

    alerts
}

/// Destination for alerts (log, email, pager)
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn deliver(&self, alerts: &[Alert]) -> Result<()>;
}

/// Writes each alert as a warning log line
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn deliver(&self, alerts: &[Alert]) -> Result<()> {
        for alert in alerts {
            warn!(alert = ?alert, "Payment alert: {}", alert.message());
        }
        Ok(())
    }
}
