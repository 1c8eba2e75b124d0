use serde::Serialize;

use errandbit_core::{JobId, PaymentHash, PaymentRecord, Timestamp};
use errandbit_lightning::ProviderType;

use crate::Alert;

/// Aggregates over the last 24 hours plus all-time totals
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentMetrics {
    pub total_payments_24h: u64,
    pub successful_payments_24h: u64,
    /// Percent, 100.0 when there were no payments
    pub success_rate: f64,
    pub avg_confirmation_secs: Option<f64>,
    pub stuck_payments: u64,
    pub total_revenue_sats: u64,
    pub pending_payouts: u64,
}

/// A pending payment older than the stuck threshold
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StuckPayment {
    pub payment_hash: PaymentHash,
    pub job_id: JobId,
    pub amount_sats: u64,
    pub created_at: Timestamp,
    pub hours_stuck: f64,
}

impl StuckPayment {
    pub fn from_record(record: &PaymentRecord, now: Timestamp) -> Self {
        let age = now.saturating_sub(record.created_at);
        Self {
            payment_hash: record.payment_hash,
            job_id: record.job_id,
            amount_sats: record.amount_sats,
            created_at: record.created_at,
            hours_stuck: age as f64 / 3600.0,
        }
    }
}

/// Result of the node connectivity probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeHealth {
    pub healthy: bool,
    pub provider: ProviderType,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitoringReport {
    pub generated_at: Timestamp,
    pub metrics: PaymentMetrics,
    pub stuck: Vec<StuckPayment>,
    pub node: NodeHealth,
    pub alerts: Vec<Alert>,
    /// Stuck payments the provider reported as failed during this cycle
    pub reconciled: usize,
}

impl MonitoringReport {
    pub fn is_healthy(&self) -> bool {
        self.alerts.is_empty()
    }
}
