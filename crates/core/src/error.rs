use serde::Serialize;
use thiserror::Error;

/// Coarse error category, mapped one-to-one onto an HTTP status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    RateLimited,
    Internal,
}

impl ErrorKind {
    /// HTTP status code for this kind
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation => 400,
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::RateLimited => 429,
            Self::Internal => 500,
        }
    }

    /// Whether the error detail may be shown to the caller
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Internal)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaymentError {
    #[error("Invalid invoice: {0}")]
    InvalidInvoice(String),

    #[error("Invoice has no amount")]
    MissingAmount,

    #[error("Invoice amount mismatch: expected {expected} sats, got {actual} sats")]
    AmountMismatch { expected: u64, actual: u64 },

    #[error("Invoice expired")]
    InvoiceExpired,

    #[error("Invalid {field}: {reason}")]
    InvalidFormat { field: &'static str, reason: String },

    #[error("Preimage does not match payment hash")]
    PreimageMismatch,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Job {job_id} is {status}, expected awaiting_payment")]
    InvalidJobState { job_id: i64, status: String },

    #[error("Payment expired before proof was submitted")]
    PaymentExpired,

    #[error("Authentication required")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Job not found: {0}")]
    JobNotFound(i64),

    #[error("Payment not found: {0}")]
    PaymentNotFound(String),

    #[error("Payment already confirmed for job {0}")]
    AlreadyConfirmed(i64),

    #[error("Duplicate payment hash: {0}")]
    DuplicatePayment(String),

    #[error("A payment is already pending for job {0}")]
    PaymentPending(i64),

    #[error("Invalid payment transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Lightning provider error: {0}")]
    Provider(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PaymentError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInvoice(_)
            | Self::MissingAmount
            | Self::AmountMismatch { .. }
            | Self::InvoiceExpired
            | Self::InvalidFormat { .. }
            | Self::PreimageMismatch
            | Self::InvalidRequest(_)
            | Self::InvalidJobState { .. }
            | Self::PaymentExpired => ErrorKind::Validation,
            Self::Unauthorized => ErrorKind::Unauthorized,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::JobNotFound(_) | Self::PaymentNotFound(_) => ErrorKind::NotFound,
            Self::AlreadyConfirmed(_)
            | Self::DuplicatePayment(_)
            | Self::PaymentPending(_)
            | Self::InvalidTransition { .. } => ErrorKind::Conflict,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::Provider(_) | Self::Storage(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Stable, machine-readable reason code
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInvoice(_) => "invalid_invoice",
            Self::MissingAmount => "amount_missing",
            Self::AmountMismatch { .. } => "amount_mismatch",
            Self::InvoiceExpired => "invoice_expired",
            Self::InvalidFormat { .. } => "invalid_format",
            Self::PreimageMismatch => "preimage_mismatch",
            Self::InvalidRequest(_) => "invalid_request",
            Self::InvalidJobState { .. } => "invalid_job_state",
            Self::PaymentExpired => "payment_expired",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::JobNotFound(_) => "job_not_found",
            Self::PaymentNotFound(_) => "payment_not_found",
            Self::AlreadyConfirmed(_) => "already_confirmed",
            Self::DuplicatePayment(_) => "duplicate_payment",
            Self::PaymentPending(_) => "payment_pending",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::RateLimited { .. } => "rate_limited",
            Self::Provider(_) | Self::Storage(_) | Self::Internal(_) => "internal_error",
        }
    }

    /// HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        self.kind().status_code()
    }

    /// Message safe to return to the caller. Internal details stay in the logs.
    pub fn public_message(&self) -> String {
        if self.kind().is_client_error() {
            self.to_string()
        } else {
            "Internal server error".to_string()
        }
    }

    /// Retry hint carried by rate-limit rejections
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PaymentError>;
