//! Fiat → satoshi rate oracle

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use errandbit_core::{Clock, RateQuote, SystemClock};

use crate::{LightningError, Result};

/// Source of the current exchange rate.
///
/// The quote is captured when an invoice amount is derived and is never
/// re-derived for the same payment.
#[async_trait]
pub trait RateOracle: Send + Sync {
    async fn quote(&self) -> Result<RateQuote>;
}

/// Oracle returning an operator-configured rate
pub struct FixedRateOracle {
    sats_per_usd: RwLock<u64>,
    clock: Arc<dyn Clock>,
}

impl FixedRateOracle {
    pub fn new(sats_per_usd: u64) -> Self {
        Self::with_clock(sats_per_usd, Arc::new(SystemClock))
    }

    pub fn with_clock(sats_per_usd: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            sats_per_usd: RwLock::new(sats_per_usd),
            clock,
        }
    }

    pub fn set_rate(&self, sats_per_usd: u64) {
        *self.sats_per_usd.write() = sats_per_usd;
    }
}

#[async_trait]
impl RateOracle for FixedRateOracle {
    async fn quote(&self) -> Result<RateQuote> {
        let sats_per_usd = *self.sats_per_usd.read();
        if sats_per_usd == 0 {
            return Err(LightningError::Config("exchange rate not configured".to_string()));
        }
        Ok(RateQuote {
            sats_per_usd,
            captured_at: self.clock.now(),
        })
    }
}
