use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{PaymentError, Result};

/// Job identifier (owned by the job service)
pub type JobId = i64;

/// User identifier (owned by the auth service)
pub type UserId = i64;

/// Unix timestamp in seconds
pub type Timestamp = u64;

/// Length of a payment hash / preimage in hex characters
pub const HASH_HEX_LEN: usize = 64;

/// Satoshis per bitcoin
pub const SATS_PER_BTC: u64 = 100_000_000;

/// Decode a 32-byte value from exactly 64 hex characters
pub fn parse_hex32(field: &'static str, value: &str) -> Result<[u8; 32]> {
    if value.len() != HASH_HEX_LEN {
        return Err(PaymentError::InvalidFormat {
            field,
            reason: format!("expected {} hex characters, got {}", HASH_HEX_LEN, value.len()),
        });
    }
    let mut out = [0u8; 32];
    hex::decode_to_slice(value, &mut out).map_err(|e| PaymentError::InvalidFormat {
        field,
        reason: e.to_string(),
    })?;
    Ok(out)
}

/// SHA-256 payment hash identifying one invoice / payment attempt
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PaymentHash([u8; 32]);

impl PaymentHash {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for PaymentHash {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self> {
        parse_hex32("payment_hash", s).map(Self)
    }
}

impl TryFrom<String> for PaymentHash {
    type Error = PaymentError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<PaymentHash> for String {
    fn from(hash: PaymentHash) -> Self {
        hash.to_hex()
    }
}

impl fmt::Display for PaymentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for PaymentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PaymentHash({})", self.to_hex())
    }
}

/// Payment secret revealed to the payer once an invoice is settled
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Preimage([u8; 32]);

impl Preimage {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for Preimage {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self> {
        parse_hex32("preimage", s).map(Self)
    }
}

// Never print the secret itself
impl fmt::Debug for Preimage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Preimage(..)")
    }
}

/// Job status as owned by the job service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Open,
    Accepted,
    InProgress,
    AwaitingPayment,
    PaymentConfirmed,
    Completed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Accepted => "accepted",
            Self::InProgress => "in_progress",
            Self::AwaitingPayment => "awaiting_payment",
            Self::PaymentConfirmed => "payment_confirmed",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl FromStr for JobStatus {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "open" => Ok(Self::Open),
            "accepted" => Ok(Self::Accepted),
            "in_progress" => Ok(Self::InProgress),
            "awaiting_payment" => Ok(Self::AwaitingPayment),
            "payment_confirmed" => Ok(Self::PaymentConfirmed),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(PaymentError::Storage(format!("unknown job status: {}", other))),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Invoice issued, awaiting proof
    Pending,
    /// Proof verified (terminal)
    Confirmed,
    /// Proof rejected or provider-reported failure (terminal)
    Failed,
    /// No proof before the expiry window closed (terminal)
    Expired,
    /// Administrative override, awaiting human review
    Disputed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
            Self::Expired => "expired",
            Self::Disputed => "disputed",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            // "completed" is what older rows carry
            "confirmed" | "completed" => Ok(Self::Confirmed),
            "failed" => Ok(Self::Failed),
            "expired" => Ok(Self::Expired),
            "disputed" => Ok(Self::Disputed),
            other => Err(PaymentError::Storage(format!("unknown payment status: {}", other))),
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Inbound collection from the client for a job
    JobPayment,
    /// Outbound settlement to the runner
    RunnerPayout,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JobPayment => "job_payment",
            Self::RunnerPayout => "runner_payout",
        }
    }
}

impl FromStr for TransactionType {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "job_payment" => Ok(Self::JobPayment),
            "runner_payout" => Ok(Self::RunnerPayout),
            other => Err(PaymentError::Storage(format!("unknown transaction type: {}", other))),
        }
    }
}

/// Caller role as asserted by the auth service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Client,
    Runner,
    Admin,
}

impl FromStr for Role {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "client" => Ok(Self::Client),
            "runner" => Ok(Self::Runner),
            "admin" => Ok(Self::Admin),
            _ => Err(PaymentError::Unauthorized),
        }
    }
}

/// Authenticated caller identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: UserId,
    pub role: Role,
}

impl Caller {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Job row as mirrored from the job service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    /// Agreed price in fiat minor units (cents)
    pub price_cents: i64,
    pub status: JobStatus,
    pub client_id: UserId,
    pub runner_id: Option<UserId>,
    pub runner_lightning_address: Option<String>,
}

/// A persisted payment attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentRecord {
    pub id: String,
    pub job_id: JobId,
    pub payment_hash: PaymentHash,
    /// Hex preimage, present once confirmed
    pub preimage: Option<String>,
    pub amount_sats: u64,
    pub status: PaymentStatus,
    pub tx_type: TransactionType,
    pub bolt11: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: Timestamp,
    pub paid_at: Option<Timestamp>,
}

/// Point-in-time exchange rate captured when an invoice amount is derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateQuote {
    pub sats_per_usd: u64,
    pub captured_at: Timestamp,
}

impl RateQuote {
    /// Convert a fiat price in cents to satoshis, rounding half up.
    ///
    /// Zero results are rejected: a job is never settled for nothing.
    pub fn sats_for_cents(&self, price_cents: i64) -> Result<u64> {
        if price_cents <= 0 {
            return Err(PaymentError::InvalidRequest(format!(
                "job price must be positive, got {} cents",
                price_cents
            )));
        }
        let scaled = (price_cents as u128) * (self.sats_per_usd as u128);
        let sats = (scaled + 50) / 100;
        let sats = u64::try_from(sats)
            .map_err(|_| PaymentError::InvalidRequest("converted amount overflows".to_string()))?;
        if sats == 0 {
            return Err(PaymentError::InvalidRequest(
                "converted amount is zero satoshis".to_string(),
            ));
        }
        Ok(sats)
    }
}
