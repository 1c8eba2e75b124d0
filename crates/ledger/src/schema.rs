//! Table and index definitions

use rusqlite::Connection;

use crate::SqlResultExt;

const CREATE_JOBS: &str = "CREATE TABLE IF NOT EXISTS jobs (
    id INTEGER PRIMARY KEY,
    price_cents INTEGER NOT NULL,
    status TEXT NOT NULL,
    client_id INTEGER NOT NULL,
    runner_id INTEGER,
    runner_lightning_address TEXT
)";

const CREATE_PAYMENTS: &str = "CREATE TABLE IF NOT EXISTS payments (
    id TEXT PRIMARY KEY,
    job_id INTEGER NOT NULL,
    payment_hash TEXT NOT NULL,
    preimage TEXT,
    amount_sats INTEGER NOT NULL CHECK (amount_sats > 0),
    status TEXT NOT NULL,
    tx_type TEXT NOT NULL,
    bolt11 TEXT,
    failure_reason TEXT,
    created_at INTEGER NOT NULL,
    paid_at INTEGER
)";

const CREATE_JOB_QUOTES: &str = "CREATE TABLE IF NOT EXISTS job_quotes (
    job_id INTEGER PRIMARY KEY,
    price_cents INTEGER NOT NULL,
    sats_per_usd INTEGER NOT NULL,
    amount_sats INTEGER NOT NULL CHECK (amount_sats > 0),
    captured_at INTEGER NOT NULL,
    expires_at INTEGER NOT NULL
)";

const INDEXES: &[&str] = &[
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_payments_hash ON payments(payment_hash)",
    // One live job payment per job. Expired and failed rows fall out of the
    // index so a retry with a new hash is possible.
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_payments_active_job ON payments(job_id) \
     WHERE tx_type = 'job_payment' AND status IN ('pending', 'confirmed', 'completed')",
    "CREATE INDEX IF NOT EXISTS idx_payments_job ON payments(job_id)",
    "CREATE INDEX IF NOT EXISTS idx_payments_status_created ON payments(status, created_at)",
];

pub(crate) fn init(conn: &Connection) -> errandbit_core::Result<()> {
    conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")
        .db()?;
    conn.execute(CREATE_JOBS, []).db()?;
    conn.execute(CREATE_PAYMENTS, []).db()?;
    conn.execute(CREATE_JOB_QUOTES, []).db()?;
    for index in INDEXES {
        conn.execute(index, []).db()?;
    }
    Ok(())
}
