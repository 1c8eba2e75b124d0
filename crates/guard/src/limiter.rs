//! Sliding-window request log
//!
//! Each (action, identifier) pair keeps the timestamps of its accepted
//! requests inside the current window. A request is refused once the log is
//! full; the caller is told how long until the oldest entry ages out.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use errandbit_core::{Clock, PaymentError, Result, SystemClock, Timestamp};

/// Rate-limited operation classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardAction {
    /// Instruction lookup, invoice validation and invoice requests
    Payment,
    /// Payment confirmation
    Confirm,
    /// Monitoring and cleanup endpoints
    Monitoring,
}

impl GuardAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Payment => "payment",
            Self::Confirm => "confirm",
            Self::Monitoring => "monitoring",
        }
    }
}

impl fmt::Display for GuardAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `max_requests` per `window_secs`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatePolicy {
    pub max_requests: u32,
    pub window_secs: u64,
}

impl RatePolicy {
    pub const fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window_secs,
        }
    }
}

/// Policy per action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardPolicies {
    pub payment: RatePolicy,
    pub confirm: RatePolicy,
    pub monitoring: RatePolicy,
}

impl Default for GuardPolicies {
    fn default() -> Self {
        Self {
            payment: RatePolicy::new(10, 60),
            confirm: RatePolicy::new(5, 60),
            monitoring: RatePolicy::new(30, 60),
        }
    }
}

impl GuardPolicies {
    pub fn for_action(&self, action: GuardAction) -> RatePolicy {
        match action {
            GuardAction::Payment => self.payment,
            GuardAction::Confirm => self.confirm,
            GuardAction::Monitoring => self.monitoring,
        }
    }
}

type Key = (GuardAction, String);

/// In-memory rate limiter. Counters are ephemeral and reset on restart.
pub struct AbuseGuard {
    policies: GuardPolicies,
    log: Mutex<HashMap<Key, VecDeque<Timestamp>>>,
    clock: Arc<dyn Clock>,
}

impl AbuseGuard {
    pub fn new(policies: GuardPolicies) -> Self {
        Self::with_clock(policies, Arc::new(SystemClock))
    }

    pub fn with_clock(policies: GuardPolicies, clock: Arc<dyn Clock>) -> Self {
        Self {
            policies,
            log: Mutex::new(HashMap::new()),
            clock,
        }
    }

    pub fn policies(&self) -> &GuardPolicies {
        &self.policies
    }

    /// Record a request, or refuse it with a retry hint
    pub fn check(&self, action: GuardAction, identifier: &str) -> Result<()> {
        let policy = self.policies.for_action(action);
        let now = self.clock.now();

        let mut log = self.log.lock();
        let entries = log
            .entry((action, identifier.to_string()))
            .or_default();
        while let Some(&oldest) = entries.front() {
            if oldest.saturating_add(policy.window_secs) <= now {
                entries.pop_front();
            } else {
                break;
            }
        }

        if entries.len() >= policy.max_requests as usize {
            let oldest = entries.front().copied().unwrap_or(now);
            let retry_after_secs = oldest
                .saturating_add(policy.window_secs)
                .saturating_sub(now)
                .max(1);
            warn!(
                "Rate limit hit: {} by {} ({} in {}s), retry in {}s",
                action, identifier, policy.max_requests, policy.window_secs, retry_after_secs
            );
            return Err(PaymentError::RateLimited { retry_after_secs });
        }

        entries.push_back(now);
        Ok(())
    }

    /// Drop identifiers whose entries have all aged out
    pub fn purge(&self) -> usize {
        let now = self.clock.now();
        let mut log = self.log.lock();
        let before = log.len();
        log.retain(|(action, _), entries| {
            let window = self.policies.for_action(*action).window_secs;
            entries
                .back()
                .map(|&newest| newest.saturating_add(window) > now)
                .unwrap_or(false)
        });
        let removed = before - log.len();
        if removed > 0 {
            debug!("Abuse guard purged {} idle identifiers", removed);
        }
        removed
    }

    /// Number of identifiers currently tracked
    pub fn tracked(&self) -> usize {
        self.log.lock().len()
    }
}
