//! ErrandBit Lightning
//!
//! Everything that talks about, or to, the Lightning Network.
//!
//! ## Components
//!
//! - **Invoice validation**: decode a BOLT11 payment request and check it
//!   against the server-computed amount and its embedded expiry.
//! - **LightningProvider**: the external node (invoice creation, invoice
//!   lookup, connectivity probe). Two modes:
//!   - **Mock**: in-memory, signs real regtest invoices, for development
//!     and tests.
//!   - **LNbits**: REST calls to an LNbits wallet.
//! - **RateOracle**: fiat → satoshi conversion rate, captured once when an
//!   invoice amount is derived.

mod invoice;
mod lnbits;
mod mock;
mod provider;
mod rates;

pub use invoice::{decode_invoice, validate_invoice, DecodedInvoice, MAX_INVOICE_LEN};
pub use lnbits::LnbitsProvider;
pub use mock::{sign_invoice, InvoiceParams, MockProvider};
pub use provider::{
    create_provider, CreatedInvoice, InvoiceLookup, InvoiceStatus, LightningProvider, NodeStatus,
    ProviderConfig, ProviderType,
};
pub use rates::{FixedRateOracle, RateOracle};

use errandbit_core::PaymentError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LightningError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Provider API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("Provider request timed out")]
    Timeout,

    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Invoice creation failed: {0}")]
    InvoiceCreation(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for LightningError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LightningError::Timeout
        } else {
            LightningError::Http(e.to_string())
        }
    }
}

impl From<LightningError> for PaymentError {
    fn from(e: LightningError) -> Self {
        PaymentError::Provider(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LightningError>;
