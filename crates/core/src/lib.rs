//! ErrandBit Core Types
//!
//! Fundamental data structures shared by every payment crate: jobs, payments,
//! the payment state machine, the error taxonomy and the injectable clock.

mod clock;
mod error;
mod state;
mod types;

pub use clock::*;
pub use error::*;
pub use state::*;
pub use types::*;
