//! Read-only aggregates for the monitoring engine

use rusqlite::params;
use serde::Serialize;

use errandbit_core::{PaymentRecord, Result, Timestamp};

use crate::store::{payment_from_row, PAYMENT_COLUMNS};
use crate::{to_sql_ts, PaymentLedger, SqlResultExt};

/// Job payment counts for a time window
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WindowStats {
    pub total: u64,
    pub confirmed: u64,
    /// Mean `paid_at - created_at` over confirmed payments
    pub avg_confirmation_secs: Option<f64>,
}

impl PaymentLedger {
    /// Pending job payments created at or before `cutoff`, oldest first
    pub fn stuck_payments(&self, cutoff: Timestamp, limit: usize) -> Result<Vec<PaymentRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM payments
                 WHERE status = 'pending' AND tx_type = 'job_payment' AND created_at <= ?1
                 ORDER BY created_at ASC, rowid ASC
                 LIMIT ?2",
                PAYMENT_COLUMNS
            ))
            .db()?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(params![to_sql_ts(cutoff), limit], payment_from_row)
            .db()?;
        rows.collect::<rusqlite::Result<Vec<_>>>().db()
    }

    /// Job payment totals for payments created at or after `since`
    pub fn window_stats(&self, since: Timestamp) -> Result<WindowStats> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN status IN ('confirmed', 'completed') THEN 1 ELSE 0 END), 0),
                AVG(CASE WHEN status IN ('confirmed', 'completed') AND paid_at IS NOT NULL
                         THEN paid_at - created_at END)
             FROM payments
             WHERE tx_type = 'job_payment' AND created_at >= ?1",
            params![to_sql_ts(since)],
            |row| {
                let total: i64 = row.get(0)?;
                let confirmed: i64 = row.get(1)?;
                Ok(WindowStats {
                    total: u64::try_from(total).unwrap_or_default(),
                    confirmed: u64::try_from(confirmed).unwrap_or_default(),
                    avg_confirmation_secs: row.get(2)?,
                })
            },
        )
        .db()
    }

    /// All-time satoshis collected through confirmed job payments
    pub fn total_revenue_sats(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let total: i64 = conn
            .query_row(
                "SELECT COALESCE(SUM(amount_sats), 0) FROM payments
                 WHERE tx_type = 'job_payment' AND status IN ('confirmed', 'completed')",
                [],
                |row| row.get(0),
            )
            .db()?;
        Ok(u64::try_from(total).unwrap_or_default())
    }

    /// Number of runner payouts not yet settled
    pub fn pending_payouts(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM payments WHERE tx_type = 'runner_payout' AND status = 'pending'",
                [],
                |row| row.get(0),
            )
            .db()?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConfirmPayment, NewPayment};
    use errandbit_core::{JobRecord, JobStatus};
    use errandbit_crypto::generate_preimage;

    fn confirmed_payment(ledger: &PaymentLedger, job_id: i64, amount: u64, created: u64, paid: u64) {
        ledger
            .upsert_job(&JobRecord {
                id: job_id,
                price_cents: 100,
                status: JobStatus::AwaitingPayment,
                client_id: 1,
                runner_id: None,
                runner_lightning_address: None,
            })
            .unwrap();
        let (preimage, hash) = generate_preimage();
        ledger
            .create(NewPayment::job_payment(job_id, hash, amount).at(created))
            .unwrap();
        ledger
            .confirm(&ConfirmPayment {
                job_id,
                caller_id: 1,
                payment_hash: hash,
                preimage,
                paid_at: paid,
            })
            .unwrap();
    }

    #[test]
    fn test_empty_ledger_stats() {
        let ledger = PaymentLedger::open_in_memory().unwrap();
        let stats = ledger.window_stats(0).unwrap();
        assert_eq!(stats.total, 0);
        assert_eq!(stats.confirmed, 0);
        assert_eq!(stats.avg_confirmation_secs, None);
        assert_eq!(ledger.total_revenue_sats().unwrap(), 0);
        assert_eq!(ledger.pending_payouts().unwrap(), 0);
    }

    #[test]
    fn test_window_stats_and_revenue() {
        let ledger = PaymentLedger::open_in_memory().unwrap();
        confirmed_payment(&ledger, 1, 1_000, 100, 160);
        confirmed_payment(&ledger, 2, 2_000, 200, 300);
        let (_, pending) = generate_preimage();
        ledger.create(NewPayment::job_payment(3, pending, 500).at(300)).unwrap();
        // Outside the window
        confirmed_payment(&ledger, 4, 4_000, 10, 20);

        let stats = ledger.window_stats(100).unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.confirmed, 2);
        assert_eq!(stats.avg_confirmation_secs, Some(80.0));
        assert_eq!(ledger.total_revenue_sats().unwrap(), 7_000);
    }

    #[test]
    fn test_stuck_payments_oldest_first_with_limit() {
        let ledger = PaymentLedger::open_in_memory().unwrap();
        for (job_id, created) in [(1, 300u64), (2, 100), (3, 200), (4, 900)] {
            let (_, hash) = generate_preimage();
            ledger.create(NewPayment::job_payment(job_id, hash, 10).at(created)).unwrap();
        }

        let stuck = ledger.stuck_payments(300, 100).unwrap();
        assert_eq!(stuck.iter().map(|p| p.job_id).collect::<Vec<_>>(), vec![2, 3, 1]);

        let capped = ledger.stuck_payments(300, 2).unwrap();
        assert_eq!(capped.len(), 2);
    }

    #[test]
    fn test_stuck_payments_ignore_payouts() {
        let ledger = PaymentLedger::open_in_memory().unwrap();
        let (_, payout) = generate_preimage();
        ledger.record_payout(NewPayment::job_payment(1, payout, 90).at(100)).unwrap();
        let (_, job_payment) = generate_preimage();
        ledger.create(NewPayment::job_payment(2, job_payment, 90).at(100)).unwrap();

        let stuck = ledger.stuck_payments(500, 100).unwrap();
        assert_eq!(stuck.iter().map(|p| p.payment_hash).collect::<Vec<_>>(), vec![job_payment]);
    }

    #[test]
    fn test_pending_payouts_count() {
        let ledger = PaymentLedger::open_in_memory().unwrap();
        let (preimage, settled) = generate_preimage();
        ledger.record_payout(NewPayment::job_payment(1, settled, 90)).unwrap();
        let (_, open) = generate_preimage();
        ledger.record_payout(NewPayment::job_payment(2, open, 90)).unwrap();
        ledger.complete_payout(&settled, &preimage, 10).unwrap();

        assert_eq!(ledger.pending_payouts().unwrap(), 1);
        // Payouts are not revenue
        assert_eq!(ledger.total_revenue_sats().unwrap(), 0);
    }
}
