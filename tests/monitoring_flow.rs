//! Integration tests for payment monitoring
//!
//! Covers the monitor against a real ledger and the mock node:
//! 1. Stuck detection, expiry sweep and rescan
//! 2. Success-rate alerting over the 24h window
//! 3. Node reachability and provider reconciliation
//! 4. The periodic cycle driven by the daemon's task runner

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use errandbit_core::{Clock, JobRecord, JobStatus, ManualClock, PaymentStatus};
use errandbit_crypto::generate_preimage;
use errandbit_ledger::{ConfirmPayment, NewPayment, PaymentLedger};
use errandbit_lightning::MockProvider;
use errandbit_monitor::{Alert, MonitorConfig, PaymentMonitor, PeriodicTask};

// =============================================================================
// HELPERS
// =============================================================================

const NOW: u64 = 1_750_000_000;
const HOUR: u64 = 3600;

struct Harness {
    ledger: PaymentLedger,
    provider: Arc<MockProvider>,
    clock: Arc<ManualClock>,
    monitor: PaymentMonitor,
}

fn harness() -> Harness {
    let clock = Arc::new(ManualClock::new(NOW));
    let ledger = PaymentLedger::open_in_memory().unwrap();
    let provider = Arc::new(MockProvider::with_clock(clock.clone()));
    let monitor = PaymentMonitor::new(ledger.clone(), provider.clone(), MonitorConfig::default())
        .with_clock(clock.clone());
    Harness {
        ledger,
        provider,
        clock,
        monitor,
    }
}

fn add_job(ledger: &PaymentLedger, id: i64) {
    ledger
        .upsert_job(&JobRecord {
            id,
            price_cents: 2500,
            status: JobStatus::AwaitingPayment,
            client_id: 5,
            runner_id: Some(6),
            runner_lightning_address: None,
        })
        .unwrap();
}

/// `total` job payments created now, `confirmed` of them paid a minute later
fn seed(h: &Harness, total: i64, confirmed: i64) {
    for id in 1..=total {
        add_job(&h.ledger, id);
        let (preimage, hash) = generate_preimage();
        h.ledger
            .create(NewPayment::job_payment(id, hash, 1_000).at(h.clock.now()))
            .unwrap();
        if id <= confirmed {
            h.ledger
                .confirm(&ConfirmPayment {
                    job_id: id,
                    caller_id: 5,
                    payment_hash: hash,
                    preimage,
                    paid_at: h.clock.now() + 60,
                })
                .unwrap();
        } else {
            h.ledger.mark_failed(&hash, "route not found").unwrap();
        }
    }
}

// =============================================================================
// 1. Stuck, sweep, rescan
// =============================================================================

#[tokio::test]
async fn test_stuck_then_swept() {
    let h = harness();
    add_job(&h.ledger, 1);
    let (_, hash) = generate_preimage();
    h.ledger
        .create(NewPayment::job_payment(1, hash, 1_000).at(NOW))
        .unwrap();

    h.clock.advance(3 * HOUR);
    let report = h.monitor.report().await.unwrap();
    assert_eq!(report.stuck.len(), 1);
    assert_eq!(report.stuck[0].payment_hash, hash);
    assert!((report.stuck[0].hours_stuck - 3.0).abs() < 0.01);
    assert_eq!(report.metrics.stuck_payments, 1);
    assert!(matches!(
        report.alerts.as_slice(),
        [Alert::StuckPayments { count: 1, .. }]
    ));

    assert_eq!(h.monitor.sweep_expired().unwrap(), 1);
    assert_eq!(h.monitor.sweep_expired().unwrap(), 0);
    assert_eq!(
        h.ledger.find_by_hash(&hash).unwrap().unwrap().status,
        PaymentStatus::Expired
    );

    let report = h.monitor.report().await.unwrap();
    assert!(report.stuck.is_empty());
    assert!(report.is_healthy());
}

#[tokio::test]
async fn test_stuck_threshold_boundary() {
    let h = harness();
    add_job(&h.ledger, 1);
    add_job(&h.ledger, 2);
    let (_, old) = generate_preimage();
    let (_, young) = generate_preimage();
    h.ledger
        .create(NewPayment::job_payment(1, old, 1_000).at(NOW - 3 * HOUR))
        .unwrap();
    h.ledger
        .create(NewPayment::job_payment(2, young, 1_000).at(NOW - HOUR))
        .unwrap();

    let report = h.monitor.report().await.unwrap();
    let stuck: Vec<_> = report.stuck.iter().map(|s| s.payment_hash).collect();
    assert_eq!(stuck, vec![old]);
}

// =============================================================================
// 2. Success rate
// =============================================================================

#[tokio::test]
async fn test_low_success_rate_alert() {
    let h = harness();
    seed(&h, 20, 16);

    let report = h.monitor.report().await.unwrap();
    assert_eq!(report.metrics.total_payments_24h, 20);
    assert_eq!(report.metrics.successful_payments_24h, 16);
    assert!((report.metrics.success_rate - 80.0).abs() < 1e-9);
    assert_eq!(report.metrics.avg_confirmation_secs, Some(60.0));
    assert_eq!(report.metrics.total_revenue_sats, 16_000);
    assert!(report
        .alerts
        .iter()
        .any(|a| matches!(a, Alert::LowSuccessRate { sample: 20, .. })));
}

#[tokio::test]
async fn test_small_sample_never_alerts() {
    let h = harness();
    seed(&h, 9, 7);

    let report = h.monitor.report().await.unwrap();
    assert_eq!(report.metrics.total_payments_24h, 9);
    assert!(report.alerts.is_empty());
}

#[tokio::test]
async fn test_old_payments_leave_window() {
    let h = harness();
    seed(&h, 20, 16);
    h.clock.advance(25 * HOUR);

    let report = h.monitor.report().await.unwrap();
    assert_eq!(report.metrics.total_payments_24h, 0);
    assert_eq!(report.metrics.success_rate, 100.0);
    assert_eq!(report.metrics.total_revenue_sats, 16_000);
    assert!(report.alerts.is_empty());
}

// =============================================================================
// 3. Node health and reconciliation
// =============================================================================

#[tokio::test]
async fn test_unreachable_node_alert() {
    let h = harness();
    h.provider.set_reachable(false);

    let report = h.monitor.run_cycle().await.unwrap();
    assert!(!report.node.healthy);
    assert!(matches!(
        report.alerts.as_slice(),
        [Alert::NodeUnreachable { .. }]
    ));

    h.provider.set_reachable(true);
    assert!(h.monitor.run_cycle().await.unwrap().is_healthy());
}

#[tokio::test]
async fn test_cycle_fails_invoices_the_node_failed() {
    use errandbit_lightning::LightningProvider;

    let h = harness();
    add_job(&h.ledger, 1);
    let created = h.provider.create_invoice(1_000, "job 1", 3600).await.unwrap();
    h.ledger
        .create(NewPayment::job_payment(1, created.payment_hash, 1_000).at(NOW))
        .unwrap();
    assert!(h.provider.fail(&created.payment_hash));

    h.clock.advance(3 * HOUR);
    let report = h.monitor.run_cycle().await.unwrap();
    assert_eq!(report.reconciled, 1);
    assert!(report.stuck.is_empty());
    assert_eq!(
        h.ledger
            .find_by_hash(&created.payment_hash)
            .unwrap()
            .unwrap()
            .status,
        PaymentStatus::Failed
    );
}

// =============================================================================
// 4. Periodic cycle
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_periodic_cycle() {
    let h = harness();
    let monitor = Arc::new(h.monitor);
    let cycles = Arc::new(AtomicUsize::new(0));

    let counter = cycles.clone();
    let runner = monitor.clone();
    let mut task = PeriodicTask::start("payment-monitor", Duration::from_secs(300), move || {
        let runner = runner.clone();
        let counter = counter.clone();
        async move {
            if runner.run_cycle().await.is_ok() {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }
    });

    tokio::time::sleep(Duration::from_secs(301)).await;
    assert_eq!(cycles.load(Ordering::SeqCst), 1);

    task.stop().await;
    tokio::time::sleep(Duration::from_secs(900)).await;
    assert_eq!(cycles.load(Ordering::SeqCst), 1);
}
