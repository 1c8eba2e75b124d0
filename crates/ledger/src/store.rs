//! Ledger operations

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use tracing::{debug, info, warn};
use uuid::Uuid;

use errandbit_core::{
    Caller, JobId, JobRecord, JobStatus, PaymentError, PaymentHash, PaymentRecord, PaymentStatus,
    Preimage, Result, Timestamp, TransactionType,
};
use errandbit_crypto::preimage_matches;

use crate::{
    from_sql_ts, schema, to_sql_ts, ConfirmPayment, JobQuote, NewPayment, PaymentFilter,
    SqlResultExt,
};

pub(crate) const PAYMENT_COLUMNS: &str = "id, job_id, payment_hash, preimage, amount_sats, status, \
     tx_type, bolt11, failure_reason, created_at, paid_at";

fn parse_column<T: FromStr<Err = PaymentError>>(idx: usize, value: String) -> rusqlite::Result<T> {
    value
        .parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn payment_from_row(row: &Row<'_>) -> rusqlite::Result<PaymentRecord> {
    let amount: i64 = row.get(4)?;
    Ok(PaymentRecord {
        id: row.get(0)?,
        job_id: row.get(1)?,
        payment_hash: parse_column(2, row.get(2)?)?,
        preimage: row.get(3)?,
        amount_sats: u64::try_from(amount).unwrap_or_default(),
        status: parse_column(5, row.get(5)?)?,
        tx_type: parse_column(6, row.get(6)?)?,
        bolt11: row.get(7)?,
        failure_reason: row.get(8)?,
        created_at: from_sql_ts(row.get(9)?),
        paid_at: row.get::<_, Option<i64>>(10)?.map(from_sql_ts),
    })
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<JobRecord> {
    Ok(JobRecord {
        id: row.get(0)?,
        price_cents: row.get(1)?,
        status: parse_column(2, row.get(2)?)?,
        client_id: row.get(3)?,
        runner_id: row.get(4)?,
        runner_lightning_address: row.get(5)?,
    })
}

fn load_job(conn: &Connection, job_id: JobId) -> Result<Option<JobRecord>> {
    conn.query_row(
        "SELECT id, price_cents, status, client_id, runner_id, runner_lightning_address
         FROM jobs WHERE id = ?1",
        params![job_id],
        job_from_row,
    )
    .optional()
    .db()
}

fn load_by_hash(conn: &Connection, hash: &PaymentHash) -> Result<Option<PaymentRecord>> {
    conn.query_row(
        &format!("SELECT {} FROM payments WHERE payment_hash = ?1", PAYMENT_COLUMNS),
        params![hash.to_hex()],
        payment_from_row,
    )
    .optional()
    .db()
}

/// Active (pending or confirmed) job payment for a job, if any
fn load_active_job_payment(conn: &Connection, job_id: JobId) -> Result<Option<PaymentRecord>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM payments
             WHERE job_id = ?1 AND tx_type = 'job_payment'
               AND status IN ('pending', 'confirmed', 'completed')
             ORDER BY created_at DESC LIMIT 1",
            PAYMENT_COLUMNS
        ),
        params![job_id],
        payment_from_row,
    )
    .optional()
    .db()
}

fn insert_pending(tx: &Transaction<'_>, new: &NewPayment) -> Result<PaymentRecord> {
    let record = PaymentRecord {
        id: Uuid::new_v4().to_string(),
        job_id: new.job_id,
        payment_hash: new.payment_hash,
        preimage: None,
        amount_sats: new.amount_sats,
        status: PaymentStatus::Pending,
        tx_type: new.tx_type,
        bolt11: new.bolt11.clone(),
        failure_reason: None,
        created_at: new.created_at,
        paid_at: None,
    };
    let amount = i64::try_from(record.amount_sats)
        .map_err(|_| PaymentError::InvalidRequest("amount out of range".to_string()))?;

    tx.execute(
        &format!(
            "INSERT INTO payments ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            PAYMENT_COLUMNS
        ),
        params![
            record.id,
            record.job_id,
            record.payment_hash.to_hex(),
            record.preimage,
            amount,
            record.status.as_str(),
            record.tx_type.as_str(),
            record.bolt11,
            record.failure_reason,
            to_sql_ts(record.created_at),
            record.paid_at.map(to_sql_ts),
        ],
    )
    .db()?;
    Ok(record)
}

/// Persistent payment ledger
#[derive(Clone)]
pub struct PaymentLedger {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl PaymentLedger {
    /// Open (or create) a ledger database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| PaymentError::Storage(format!("create {}: {}", parent.display(), e)))?;
            }
        }
        let conn = Connection::open(path).db()?;
        schema::init(&conn)?;
        info!("Payment ledger opened at {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory ledger for tests and dry runs
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().db()?;
        schema::init(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // ==================== Jobs ====================

    /// Insert or refresh the mirrored job row
    pub fn upsert_job(&self, job: &JobRecord) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO jobs (id, price_cents, status, client_id, runner_id, runner_lightning_address)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                price_cents = excluded.price_cents,
                status = excluded.status,
                client_id = excluded.client_id,
                runner_id = excluded.runner_id,
                runner_lightning_address = excluded.runner_lightning_address",
            params![
                job.id,
                job.price_cents,
                job.status.as_str(),
                job.client_id,
                job.runner_id,
                job.runner_lightning_address,
            ],
        )
        .db()?;
        debug!("Job {} mirrored with status {}", job.id, job.status);
        Ok(())
    }

    pub fn get_job(&self, job_id: JobId) -> Result<Option<JobRecord>> {
        load_job(&self.conn.lock(), job_id)
    }

    // ==================== Payments ====================

    /// Insert a `pending` payment.
    ///
    /// Rejects a reused payment hash and, for job payments, a job that
    /// already has a pending or confirmed payment.
    pub fn create(&self, new: NewPayment) -> Result<PaymentRecord> {
        if new.amount_sats == 0 {
            return Err(PaymentError::InvalidRequest(
                "payment amount must be positive".to_string(),
            ));
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction().db()?;

        if load_by_hash(&tx, &new.payment_hash)?.is_some() {
            return Err(PaymentError::DuplicatePayment(new.payment_hash.to_hex()));
        }
        if new.tx_type == TransactionType::JobPayment {
            if let Some(active) = load_active_job_payment(&tx, new.job_id)? {
                return Err(match active.status {
                    PaymentStatus::Confirmed => PaymentError::AlreadyConfirmed(new.job_id),
                    _ => PaymentError::PaymentPending(new.job_id),
                });
            }
        }

        let record = insert_pending(&tx, &new)?;
        tx.commit().db()?;

        info!(
            "Payment {} created for job {} ({} sats, {})",
            record.payment_hash, record.job_id, record.amount_sats, record.tx_type.as_str()
        );
        Ok(record)
    }

    /// All payments of a job, newest first
    pub fn find_by_job(&self, job_id: JobId) -> Result<Vec<PaymentRecord>> {
        self.list(&PaymentFilter {
            job_id: Some(job_id),
            ..Default::default()
        })
    }

    pub fn find_by_hash(&self, hash: &PaymentHash) -> Result<Option<PaymentRecord>> {
        load_by_hash(&self.conn.lock(), hash)
    }

    /// Payments matching `filter`, newest first
    pub fn list(&self, filter: &PaymentFilter) -> Result<Vec<PaymentRecord>> {
        let mut clauses = Vec::new();
        let mut values: Vec<rusqlite::types::Value> = Vec::new();

        if let Some(status) = filter.status {
            values.push(status.as_str().to_string().into());
            if status == PaymentStatus::Confirmed {
                clauses.push(format!("status IN (?{}, 'completed')", values.len()));
            } else {
                clauses.push(format!("status = ?{}", values.len()));
            }
        }
        if let Some(tx_type) = filter.tx_type {
            values.push(tx_type.as_str().to_string().into());
            clauses.push(format!("tx_type = ?{}", values.len()));
        }
        if let Some(job_id) = filter.job_id {
            values.push(job_id.into());
            clauses.push(format!("job_id = ?{}", values.len()));
        }

        let mut sql = format!("SELECT {} FROM payments", PAYMENT_COLUMNS);
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY created_at DESC, rowid DESC");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql).db()?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(values), payment_from_row)
            .db()?;
        rows.collect::<rusqlite::Result<Vec<_>>>().db()
    }

    /// Move a payment to `to` through the state machine
    pub fn update_status(
        &self,
        hash: &PaymentHash,
        to: PaymentStatus,
        reason: Option<&str>,
    ) -> Result<PaymentRecord> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().db()?;

        let current = load_by_hash(&tx, hash)?
            .ok_or_else(|| PaymentError::PaymentNotFound(hash.to_hex()))?;
        current.status.ensure_transition(to)?;

        tx.execute(
            "UPDATE payments SET status = ?1, failure_reason = COALESCE(?2, failure_reason)
             WHERE payment_hash = ?3",
            params![to.as_str(), reason, hash.to_hex()],
        )
        .db()?;
        let updated = load_by_hash(&tx, hash)?
            .ok_or_else(|| PaymentError::PaymentNotFound(hash.to_hex()))?;
        tx.commit().db()?;

        info!("Payment {} {} -> {}", hash, current.status, to);
        Ok(updated)
    }

    /// Record a provider-reported failure
    pub fn mark_failed(&self, hash: &PaymentHash, reason: &str) -> Result<PaymentRecord> {
        self.update_status(hash, PaymentStatus::Failed, Some(reason))
    }

    /// Administrative dispute flag
    pub fn mark_disputed(&self, hash: &PaymentHash, caller: &Caller) -> Result<PaymentRecord> {
        if !caller.is_admin() {
            warn!("User {} attempted to dispute payment {}", caller.user_id, hash);
            return Err(PaymentError::Forbidden(
                "only administrators may dispute payments".to_string(),
            ));
        }
        self.update_status(hash, PaymentStatus::Disputed, Some("disputed by administrator"))
    }

    /// Confirm a registered job payment and mark the job paid, atomically.
    ///
    /// The hash must belong to a `pending` row created by [`Self::create`];
    /// a preimage for an invoice this ledger never saw proves nothing.
    ///
    /// The connection lock is held for the whole transaction, so concurrent
    /// confirms for one job are serialised and the loser sees the committed
    /// state.
    pub fn confirm(&self, request: &ConfirmPayment) -> Result<PaymentRecord> {
        if !preimage_matches(&request.preimage, &request.payment_hash) {
            return Err(PaymentError::PreimageMismatch);
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction().db()?;

        let job = load_job(&tx, request.job_id)?
            .ok_or(PaymentError::JobNotFound(request.job_id))?;
        if job.client_id != request.caller_id {
            return Err(PaymentError::Forbidden(
                "only the job's client may confirm payment".to_string(),
            ));
        }
        if job.status == JobStatus::PaymentConfirmed {
            return Err(PaymentError::AlreadyConfirmed(job.id));
        }
        if !job.status.accepts_payment() {
            return Err(PaymentError::InvalidJobState {
                job_id: job.id,
                status: job.status.to_string(),
            });
        }

        if let Some(active) = load_active_job_payment(&tx, job.id)? {
            if active.status == PaymentStatus::Confirmed {
                return Err(PaymentError::AlreadyConfirmed(job.id));
            }
        }

        let record = match load_by_hash(&tx, &request.payment_hash)? {
            Some(row) => {
                if row.job_id != job.id || row.tx_type != TransactionType::JobPayment {
                    return Err(PaymentError::DuplicatePayment(row.payment_hash.to_hex()));
                }
                match row.status {
                    PaymentStatus::Expired => return Err(PaymentError::PaymentExpired),
                    PaymentStatus::Confirmed => return Err(PaymentError::AlreadyConfirmed(job.id)),
                    other => other.ensure_transition(PaymentStatus::Confirmed)?,
                }

                let changed = tx
                    .execute(
                        "UPDATE payments SET status = 'confirmed', preimage = ?1, paid_at = ?2
                         WHERE payment_hash = ?3 AND status = 'pending'",
                        params![
                            request.preimage.to_hex(),
                            to_sql_ts(request.paid_at),
                            request.payment_hash.to_hex()
                        ],
                    )
                    .db()?;
                if changed != 1 {
                    return Err(PaymentError::AlreadyConfirmed(job.id));
                }
                PaymentRecord {
                    preimage: Some(request.preimage.to_hex()),
                    status: PaymentStatus::Confirmed,
                    paid_at: Some(request.paid_at),
                    ..row
                }
            }
            None => {
                warn!(
                    "Confirm for job {} names unregistered invoice {}",
                    job.id, request.payment_hash
                );
                return Err(PaymentError::PaymentNotFound(request.payment_hash.to_hex()));
            }
        };

        let updated = tx
            .execute(
                "UPDATE jobs SET status = ?1 WHERE id = ?2 AND status = ?3",
                params![
                    JobStatus::PaymentConfirmed.as_str(),
                    job.id,
                    JobStatus::AwaitingPayment.as_str()
                ],
            )
            .db()?;
        if updated != 1 {
            return Err(PaymentError::AlreadyConfirmed(job.id));
        }

        tx.commit().db()?;
        info!(
            "Payment {} confirmed for job {} ({} sats)",
            record.payment_hash, job.id, record.amount_sats
        );
        Ok(record)
    }

    /// Expire pending job payments created at or before `cutoff`.
    ///
    /// Only `pending` rows match, so running it twice is harmless. Runner
    /// payouts have no invoice expiry and are left alone.
    pub fn expire_stale(&self, cutoff: Timestamp) -> Result<usize> {
        let conn = self.conn.lock();
        let expired = conn
            .execute(
                "UPDATE payments SET status = 'expired', failure_reason = 'invoice expired'
                 WHERE status = 'pending' AND tx_type = 'job_payment' AND created_at <= ?1",
                params![to_sql_ts(cutoff)],
            )
            .db()?;
        if expired > 0 {
            info!("Expired {} stale pending payments", expired);
        }
        Ok(expired)
    }

    // ==================== Rate quotes ====================

    /// Store the amount locked for a job, replacing any earlier quote
    pub fn save_quote(&self, quote: &JobQuote) -> Result<()> {
        let amount = i64::try_from(quote.amount_sats)
            .map_err(|_| PaymentError::InvalidRequest("amount out of range".to_string()))?;
        let rate = i64::try_from(quote.sats_per_usd)
            .map_err(|_| PaymentError::InvalidRequest("rate out of range".to_string()))?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO job_quotes (job_id, price_cents, sats_per_usd, amount_sats, captured_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(job_id) DO UPDATE SET
                price_cents = excluded.price_cents,
                sats_per_usd = excluded.sats_per_usd,
                amount_sats = excluded.amount_sats,
                captured_at = excluded.captured_at,
                expires_at = excluded.expires_at",
            params![
                quote.job_id,
                quote.price_cents,
                rate,
                amount,
                to_sql_ts(quote.captured_at),
                to_sql_ts(quote.expires_at),
            ],
        )
        .db()?;
        debug!(
            "Quote for job {}: {} sats at {} sats/USD until {}",
            quote.job_id, quote.amount_sats, quote.sats_per_usd, quote.expires_at
        );
        Ok(())
    }

    /// The job's quote if it is still live at `now`
    pub fn live_quote(&self, job_id: JobId, now: Timestamp) -> Result<Option<JobQuote>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT job_id, price_cents, sats_per_usd, amount_sats, captured_at, expires_at
             FROM job_quotes WHERE job_id = ?1 AND expires_at > ?2",
            params![job_id, to_sql_ts(now)],
            |row| {
                Ok(JobQuote {
                    job_id: row.get(0)?,
                    price_cents: row.get(1)?,
                    sats_per_usd: u64::try_from(row.get::<_, i64>(2)?).unwrap_or_default(),
                    amount_sats: u64::try_from(row.get::<_, i64>(3)?).unwrap_or_default(),
                    captured_at: from_sql_ts(row.get(4)?),
                    expires_at: from_sql_ts(row.get(5)?),
                })
            },
        )
        .optional()
        .db()
    }

    // ==================== Payouts ====================

    /// Record an outbound runner payout as `pending`
    pub fn record_payout(&self, mut payout: NewPayment) -> Result<PaymentRecord> {
        payout.tx_type = TransactionType::RunnerPayout;
        self.create(payout)
    }

    /// Mark a runner payout as settled once its preimage is known
    pub fn complete_payout(
        &self,
        hash: &PaymentHash,
        preimage: &Preimage,
        paid_at: Timestamp,
    ) -> Result<PaymentRecord> {
        if !preimage_matches(preimage, hash) {
            return Err(PaymentError::PreimageMismatch);
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction().db()?;

        let row = load_by_hash(&tx, hash)?.ok_or_else(|| PaymentError::PaymentNotFound(hash.to_hex()))?;
        if row.tx_type != TransactionType::RunnerPayout {
            return Err(PaymentError::InvalidRequest(format!(
                "payment {} is not a runner payout",
                hash
            )));
        }
        row.status.ensure_transition(PaymentStatus::Confirmed)?;

        tx.execute(
            "UPDATE payments SET status = 'confirmed', preimage = ?1, paid_at = ?2
             WHERE payment_hash = ?3 AND status = 'pending'",
            params![preimage.to_hex(), to_sql_ts(paid_at), hash.to_hex()],
        )
        .db()?;
        tx.commit().db()?;

        info!("Runner payout {} settled for job {}", hash, row.job_id);
        Ok(PaymentRecord {
            preimage: Some(preimage.to_hex()),
            status: PaymentStatus::Confirmed,
            paid_at: Some(paid_at),
            ..row
        })
    }
}
