//! Payment state machine
//!
//! ```text
//!   pending ──► confirmed ──► disputed
//!      │  └───► expired
//!      │  └───► failed
//!      └──────────────────► disputed
//! ```
//!
//! Nothing re-enters `pending`. A retry after `failed` or `expired` is a new
//! payment with a new payment hash.

use crate::{JobStatus, PaymentError, PaymentStatus, Result};

impl PaymentStatus {
    /// Whether no automatic transition leaves this state
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Whether this payment still blocks a new payment for the same job
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed)
    }

    /// Transition table consulted by every ledger write
    pub fn can_transition_to(&self, to: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, to),
            (Pending, Confirmed)
                | (Pending, Expired)
                | (Pending, Failed)
                | (Pending, Disputed)
                | (Confirmed, Disputed)
        )
    }

    /// Like [`can_transition_to`](Self::can_transition_to) but as a `Result`
    pub fn ensure_transition(&self, to: PaymentStatus) -> Result<()> {
        if self.can_transition_to(to) {
            Ok(())
        } else {
            Err(PaymentError::InvalidTransition {
                from: self.as_str().to_string(),
                to: to.as_str().to_string(),
            })
        }
    }
}

impl JobStatus {
    /// Whether the job is waiting on the client's payment
    pub fn accepts_payment(&self) -> bool {
        *self == JobStatus::AwaitingPayment
    }
}
