//! ErrandBit Payment Ledger
//!
//! Durable record of every payment attempt, backed by SQLite.
//!
//! ## Guarantees
//!
//! - A payment hash appears at most once (unique index).
//! - A job has at most one active (pending or confirmed) job payment
//!   (partial unique index).
//! - Confirmation updates the payment row and the job row in one
//!   transaction. A failure at any step leaves both untouched.
//! - Rows are never deleted. Status changes go through the state machine in
//!   `errandbit-core`.

mod schema;
mod stats;
mod store;

pub use stats::WindowStats;
pub use store::PaymentLedger;

use rusqlite::{ffi, ErrorCode};
use serde::Serialize;

use errandbit_core::{
    JobId, PaymentError, PaymentHash, PaymentStatus, Preimage, Timestamp, TransactionType,
    UserId,
};

/// Row to insert as a fresh `pending` payment
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub job_id: JobId,
    pub payment_hash: PaymentHash,
    pub amount_sats: u64,
    pub tx_type: TransactionType,
    pub bolt11: Option<String>,
    pub created_at: Timestamp,
}

impl NewPayment {
    /// Inbound payment from the job's client
    pub fn job_payment(job_id: JobId, payment_hash: PaymentHash, amount_sats: u64) -> Self {
        Self {
            job_id,
            payment_hash,
            amount_sats,
            tx_type: TransactionType::JobPayment,
            bolt11: None,
            created_at: 0,
        }
    }

    pub fn with_bolt11(mut self, bolt11: impl Into<String>) -> Self {
        self.bolt11 = Some(bolt11.into());
        self
    }

    pub fn at(mut self, created_at: Timestamp) -> Self {
        self.created_at = created_at;
        self
    }
}

/// Input to the confirm transaction
#[derive(Debug, Clone)]
pub struct ConfirmPayment {
    pub job_id: JobId,
    pub caller_id: UserId,
    pub payment_hash: PaymentHash,
    pub preimage: Preimage,
    pub paid_at: Timestamp,
}

/// Invoice amount locked for a job when its payment instruction is issued.
///
/// Validation and invoice creation reuse it until `expires_at`, so a rate
/// change never moves the amount the client was told to pay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JobQuote {
    pub job_id: JobId,
    pub price_cents: i64,
    pub sats_per_usd: u64,
    pub amount_sats: u64,
    pub captured_at: Timestamp,
    pub expires_at: Timestamp,
}

/// Filter for [`PaymentLedger::list`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct PaymentFilter {
    pub status: Option<PaymentStatus>,
    pub tx_type: Option<TransactionType>,
    pub job_id: Option<JobId>,
    pub limit: Option<usize>,
}

/// Map a SQLite error onto the payment taxonomy
pub(crate) fn storage_error(e: rusqlite::Error) -> PaymentError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == ErrorCode::ConstraintViolation
                && err.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            PaymentError::DuplicatePayment(format!("constraint violation: {}", e))
        }
        _ => PaymentError::Storage(e.to_string()),
    }
}

pub(crate) trait SqlResultExt<T> {
    fn db(self) -> errandbit_core::Result<T>;
}

impl<T> SqlResultExt<T> for rusqlite::Result<T> {
    fn db(self) -> errandbit_core::Result<T> {
        self.map_err(storage_error)
    }
}

pub(crate) fn to_sql_ts(ts: Timestamp) -> i64 {
    i64::try_from(ts).unwrap_or(i64::MAX)
}

pub(crate) fn from_sql_ts(value: i64) -> Timestamp {
    u64::try_from(value).unwrap_or_default()
}
