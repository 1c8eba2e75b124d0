//! Lightning provider abstraction
//!
//! The Lightning node is an external service. Every call may be slow or fail,
//! so each one returns a `Result` and callers put their own timeout around
//! anything on a request path.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use errandbit_core::{PaymentHash, Preimage};

use crate::lnbits::LnbitsProvider;
use crate::mock::MockProvider;
use crate::{LightningError, Result};

/// Lightning provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    /// In-memory provider for development and tests
    #[default]
    Mock,
    /// LNbits wallet REST API
    Lnbits,
}

impl FromStr for ProviderType {
    type Err = LightningError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "mock" => Ok(ProviderType::Mock),
            "lnbits" => Ok(ProviderType::Lnbits),
            _ => Err(LightningError::Config(format!(
                "Unknown provider type: {} (supported: mock, lnbits)",
                s
            ))),
        }
    }
}

/// Provider configuration
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub provider: ProviderType,
    /// Base URL of the provider API (LNbits only)
    pub api_url: String,
    /// Invoice/read key (LNbits only)
    pub api_key: String,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider: ProviderType::Mock,
            api_url: "http://127.0.0.1:5000".to_string(),
            api_key: String::new(),
            request_timeout_secs: 10,
        }
    }
}

impl ProviderConfig {
    /// Mock configuration for development
    pub fn mock() -> Self {
        Self::default()
    }

    /// LNbits configuration
    pub fn lnbits(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            provider: ProviderType::Lnbits,
            api_url: api_url.into(),
            api_key: api_key.into(),
            ..Default::default()
        }
    }
}

/// Invoice as issued by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedInvoice {
    pub payment_hash: PaymentHash,
    pub bolt11: String,
}

/// Provider-side status of an invoice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Pending,
    Paid,
    Failed,
    NotFound,
}

/// Result of an invoice lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceLookup {
    pub payment_hash: PaymentHash,
    pub status: InvoiceStatus,
    /// Revealed once the invoice is paid
    pub preimage: Option<Preimage>,
    pub amount_sats: Option<u64>,
}

impl InvoiceLookup {
    pub fn not_found(payment_hash: PaymentHash) -> Self {
        Self {
            payment_hash,
            status: InvoiceStatus::NotFound,
            preimage: None,
            amount_sats: None,
        }
    }
}

/// Successful connectivity probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeStatus {
    pub provider: ProviderType,
    pub detail: String,
}

/// Lightning provider trait - implemented by all providers
#[async_trait]
pub trait LightningProvider: Send + Sync {
    /// Create an invoice for `amount_sats`
    async fn create_invoice(
        &self,
        amount_sats: u64,
        description: &str,
        expiry_secs: u64,
    ) -> Result<CreatedInvoice>;

    /// Look up an invoice by payment hash
    async fn lookup_invoice(&self, payment_hash: &PaymentHash) -> Result<InvoiceLookup>;

    /// Liveness probe against the node
    async fn health_check(&self) -> Result<NodeStatus>;

    /// Get the provider type
    fn provider_type(&self) -> ProviderType;
}

/// Build a provider from configuration
pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn LightningProvider>> {
    match config.provider {
        ProviderType::Mock => Ok(Arc::new(MockProvider::new())),
        ProviderType::Lnbits => Ok(Arc::new(LnbitsProvider::new(config.clone())?)),
    }
}
