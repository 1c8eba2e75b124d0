//! In-memory Lightning provider
//!
//! Issues real, signed regtest BOLT11 invoices so the validator sees the same
//! encoding it would see in production. Settlement is driven by the test or
//! operator through [`MockProvider::settle`] and [`MockProvider::fail`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use async_trait::async_trait;
use bitcoin::hashes::{sha256, Hash as _};
use bitcoin::secp256k1::{Secp256k1, SecretKey};
use lightning_invoice::{Currency, InvoiceBuilder, PaymentSecret};
use parking_lot::RwLock;
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{debug, info};

use errandbit_core::{Clock, PaymentHash, Preimage, SystemClock, Timestamp};
use errandbit_crypto::generate_preimage;

use crate::provider::{
    CreatedInvoice, InvoiceLookup, InvoiceStatus, LightningProvider, NodeStatus, ProviderType,
};
use crate::{LightningError, Result};

/// Parameters for signing an invoice locally
#[derive(Debug, Clone)]
pub struct InvoiceParams {
    pub payment_hash: PaymentHash,
    /// `None` produces an amountless invoice
    pub amount_msats: Option<u64>,
    pub description: String,
    pub created_at: Timestamp,
    pub expiry_secs: u64,
}

/// Sign a regtest invoice with a throwaway node key
pub fn sign_invoice(params: &InvoiceParams) -> Result<String> {
    let mut key_bytes = [0u8; 32];
    OsRng.fill_bytes(&mut key_bytes);
    let node_key = SecretKey::from_slice(&key_bytes)
        .map_err(|e| LightningError::InvoiceCreation(format!("node key: {}", e)))?;

    let mut secret = [0u8; 32];
    OsRng.fill_bytes(&mut secret);

    let mut builder = InvoiceBuilder::new(Currency::Regtest)
        .description(params.description.clone())
        .payment_hash(sha256::Hash::from_byte_array(*params.payment_hash.as_bytes()))
        .payment_secret(PaymentSecret(secret))
        .timestamp(UNIX_EPOCH + Duration::from_secs(params.created_at))
        .min_final_cltv_expiry_delta(144)
        .expiry_time(Duration::from_secs(params.expiry_secs));
    if let Some(msats) = params.amount_msats {
        builder = builder.amount_milli_satoshis(msats);
    }

    let secp = Secp256k1::new();
    let invoice = builder
        .build_signed(|msg| secp.sign_ecdsa_recoverable(msg, &node_key))
        .map_err(|e| LightningError::InvoiceCreation(e.to_string()))?;

    Ok(invoice.to_string())
}

struct MockInvoice {
    preimage: Preimage,
    amount_sats: u64,
    status: InvoiceStatus,
}

/// In-memory state for mock mode
#[derive(Default)]
struct MockState {
    invoices: HashMap<PaymentHash, MockInvoice>,
    unreachable: bool,
}

/// Provider that keeps invoices in memory
pub struct MockProvider {
    state: Arc<RwLock<MockState>>,
    clock: Arc<dyn Clock>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(RwLock::new(MockState::default())),
            clock,
        }
    }

    /// Mark an invoice as paid and reveal its preimage
    pub fn settle(&self, payment_hash: &PaymentHash) -> Option<Preimage> {
        let mut state = self.state.write();
        let invoice = state.invoices.get_mut(payment_hash)?;
        invoice.status = InvoiceStatus::Paid;
        info!("Mock provider: settled invoice {}", payment_hash);
        Some(invoice.preimage)
    }

    /// Mark an invoice as failed (cancelled by the node)
    pub fn fail(&self, payment_hash: &PaymentHash) -> bool {
        let mut state = self.state.write();
        match state.invoices.get_mut(payment_hash) {
            Some(invoice) => {
                invoice.status = InvoiceStatus::Failed;
                info!("Mock provider: failed invoice {}", payment_hash);
                true
            }
            None => false,
        }
    }

    /// Simulate the node going offline (or coming back)
    pub fn set_reachable(&self, reachable: bool) {
        self.state.write().unreachable = !reachable;
    }

    /// Preimage for an invoice this provider issued
    pub fn preimage_of(&self, payment_hash: &PaymentHash) -> Option<Preimage> {
        self.state.read().invoices.get(payment_hash).map(|i| i.preimage)
    }

    pub fn invoice_count(&self) -> usize {
        self.state.read().invoices.len()
    }

    fn ensure_reachable(&self) -> Result<()> {
        if self.state.read().unreachable {
            return Err(LightningError::Unavailable("mock node offline".to_string()));
        }
        Ok(())
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LightningProvider for MockProvider {
    async fn create_invoice(
        &self,
        amount_sats: u64,
        description: &str,
        expiry_secs: u64,
    ) -> Result<CreatedInvoice> {
        self.ensure_reachable()?;

        let (preimage, payment_hash) = generate_preimage();
        let amount_msats = amount_sats
            .checked_mul(1000)
            .ok_or_else(|| LightningError::InvoiceCreation("amount overflows msats".to_string()))?;
        let bolt11 = sign_invoice(&InvoiceParams {
            payment_hash,
            amount_msats: Some(amount_msats),
            description: description.to_string(),
            created_at: self.clock.now(),
            expiry_secs,
        })?;

        self.state.write().invoices.insert(
            payment_hash,
            MockInvoice {
                preimage,
                amount_sats,
                status: InvoiceStatus::Pending,
            },
        );
        debug!("Mock provider: issued invoice {} for {} sats", payment_hash, amount_sats);

        Ok(CreatedInvoice {
            payment_hash,
            bolt11,
        })
    }

    async fn lookup_invoice(&self, payment_hash: &PaymentHash) -> Result<InvoiceLookup> {
        self.ensure_reachable()?;

        let state = self.state.read();
        Ok(match state.invoices.get(payment_hash) {
            Some(invoice) => InvoiceLookup {
                payment_hash: *payment_hash,
                status: invoice.status,
                preimage: (invoice.status == InvoiceStatus::Paid).then_some(invoice.preimage),
                amount_sats: Some(invoice.amount_sats),
            },
            None => InvoiceLookup::not_found(*payment_hash),
        })
    }

    async fn health_check(&self) -> Result<NodeStatus> {
        self.ensure_reachable()?;
        Ok(NodeStatus {
            provider: ProviderType::Mock,
            detail: format!("mock node up, {} invoices", self.invoice_count()),
        })
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::Mock
    }
}
