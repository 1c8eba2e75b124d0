//! ErrandBit Abuse Guard
//!
//! Per-identifier sliding-window rate limits for the payment endpoints, and
//! cheap payload screens that run before any decoding or database access.

mod limiter;
mod screen;

pub use limiter::{AbuseGuard, GuardAction, GuardPolicies, RatePolicy};
pub use screen::{screen_hex_field, screen_invoice_payload, screen_job_id};
