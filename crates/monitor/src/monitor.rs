use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use errandbit_core::{Clock, PaymentStatus, Result, SystemClock};
use errandbit_ledger::PaymentLedger;
use errandbit_lightning::{InvoiceStatus, LightningProvider};

use crate::{
    evaluate_alerts, AlertSink, LogAlertSink, MonitoringReport, NodeHealth, PaymentMetrics,
    StuckPayment,
};

/// Window for the 24h metrics
const METRICS_WINDOW_SECS: u64 = 24 * 3600;

/// Monitoring thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Pending longer than this is stuck
    pub stuck_threshold_secs: u64,
    /// Cap on the stuck list
    pub page_size: usize,
    /// Alert below this success rate (percent)
    pub success_threshold_pct: f64,
    /// Minimum 24h payments before the success rate is judged
    pub min_sample: u64,
    pub health_timeout_secs: u64,
    /// Pending older than this is expired by the sweep
    pub expiry_window_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            stuck_threshold_secs: 2 * 3600,
            page_size: 100,
            success_threshold_pct: 90.0,
            min_sample: 10,
            health_timeout_secs: 10,
            expiry_window_secs: 3600,
        }
    }
}

/// Periodic payment health checks
pub struct PaymentMonitor {
    ledger: PaymentLedger,
    provider: Arc<dyn LightningProvider>,
    sink: Arc<dyn AlertSink>,
    clock: Arc<dyn Clock>,
    config: MonitorConfig,
}

impl PaymentMonitor {
    pub fn new(
        ledger: PaymentLedger,
        provider: Arc<dyn LightningProvider>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            ledger,
            provider,
            sink: Arc::new(LogAlertSink),
            clock: Arc::new(SystemClock),
            config,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// One full monitoring pass: reconcile, report, deliver alerts
    pub async fn run_cycle(&self) -> Result<MonitoringReport> {
        let reconciled = self.reconcile().await?;
        let mut report = self.report().await?;
        report.reconciled = reconciled;

        if report.alerts.is_empty() {
            debug!("Monitoring cycle clean");
        } else {
            warn!("Monitoring cycle raised {} alert(s)", report.alerts.len());
            if let Err(e) = self.sink.deliver(&report.alerts).await {
                warn!("Alert delivery failed: {}", e);
            }
        }
        Ok(report)
    }

    /// Build a report without side effects
    pub async fn report(&self) -> Result<MonitoringReport> {
        let now = self.clock.now();
        let stuck = self.stuck_payments(now)?;
        let metrics = self.metrics(now, stuck.len() as u64)?;
        let node = self.node_health().await;
        let alerts = evaluate_alerts(&metrics, &stuck, &node, &self.config);

        Ok(MonitoringReport {
            generated_at: now,
            metrics,
            stuck,
            node,
            alerts,
            reconciled: 0,
        })
    }

    /// Expire pending payments older than the expiry window
    pub fn sweep_expired(&self) -> Result<usize> {
        let cutoff = self
            .clock
            .now()
            .saturating_sub(self.config.expiry_window_secs);
        self.ledger.expire_stale(cutoff)
    }

    /// Ask the provider about each stuck payment; fail the ones it has failed.
    ///
    /// Lookup errors are skipped, the payment stays pending.
    pub async fn reconcile(&self) -> Result<usize> {
        let now = self.clock.now();
        let cutoff = now.saturating_sub(self.config.stuck_threshold_secs);
        let stuck = self.ledger.stuck_payments(cutoff, self.config.page_size)?;
        let timeout = Duration::from_secs(self.config.health_timeout_secs);

        let mut failed = 0;
        for payment in stuck {
            let lookup = match tokio::time::timeout(
                timeout,
                self.provider.lookup_invoice(&payment.payment_hash),
            )
            .await
            {
                Ok(Ok(lookup)) => lookup,
                Ok(Err(e)) => {
                    debug!("Lookup of {} failed: {}", payment.payment_hash, e);
                    continue;
                }
                Err(_) => {
                    debug!("Lookup of {} timed out", payment.payment_hash);
                    continue;
                }
            };

            if lookup.status == InvoiceStatus::Failed && payment.status == PaymentStatus::Pending {
                self.ledger
                    .mark_failed(&payment.payment_hash, "invoice failed at provider")?;
                failed += 1;
            }
        }

        if failed > 0 {
            info!("Reconciled {} failed invoice(s) with the provider", failed);
        }
        Ok(failed)
    }

    fn stuck_payments(&self, now: u64) -> Result<Vec<StuckPayment>> {
        let cutoff = now.saturating_sub(self.config.stuck_threshold_secs);
        Ok(self
            .ledger
            .stuck_payments(cutoff, self.config.page_size)?
            .iter()
            .map(|record| StuckPayment::from_record(record, now))
            .collect())
    }

    fn metrics(&self, now: u64, stuck_count: u64) -> Result<PaymentMetrics> {
        let window = self
            .ledger
            .window_stats(now.saturating_sub(METRICS_WINDOW_SECS))?;
        let success_rate = if window.total == 0 {
            100.0
        } else {
            window.confirmed as f64 * 100.0 / window.total as f64
        };

        Ok(PaymentMetrics {
            total_payments_24h: window.total,
            successful_payments_24h: window.confirmed,
            success_rate,
            avg_confirmation_secs: window.avg_confirmation_secs,
            stuck_payments: stuck_count,
            total_revenue_sats: self.ledger.total_revenue_sats()?,
            pending_payouts: self.ledger.pending_payouts()?,
        })
    }

    async fn node_health(&self) -> NodeHealth {
        let provider = self.provider.provider_type();
        let timeout = Duration::from_secs(self.config.health_timeout_secs);
        match tokio::time::timeout(timeout, self.provider.health_check()).await {
            Ok(Ok(status)) => NodeHealth {
                healthy: true,
                provider,
                detail: status.detail,
            },
            Ok(Err(e)) => NodeHealth {
                healthy: false,
                provider,
                detail: e.to_string(),
            },
            Err(_) => NodeHealth {
                healthy: false,
                provider,
                detail: format!("no response within {}s", self.config.health_timeout_secs),
            },
        }
    }
}
