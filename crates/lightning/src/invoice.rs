//! BOLT11 invoice decoding and policy checks

use bitcoin::hashes::Hash as _;
use lightning_invoice::{Bolt11Invoice, Bolt11InvoiceDescription};
use serde::Serialize;

use errandbit_core::{PaymentError, PaymentHash, Result, Timestamp};

/// Longest invoice string accepted before decoding is attempted
pub const MAX_INVOICE_LEN: usize = 2048;

/// Fields extracted from a structurally valid invoice
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedInvoice {
    pub payment_hash: PaymentHash,
    /// Encoded amount in millisatoshis, if any
    pub amount_msats: Option<u64>,
    /// Unix seconds at which the invoice was signed
    pub created_at: Timestamp,
    /// Unix seconds after which the invoice can no longer be paid
    pub expires_at: Timestamp,
    pub description: Option<String>,
}

impl DecodedInvoice {
    /// Whole-satoshi amount, `None` for amountless or sub-satoshi invoices
    pub fn amount_sats(&self) -> Option<u64> {
        match self.amount_msats {
            Some(msats) if msats % 1000 == 0 => Some(msats / 1000),
            _ => None,
        }
    }

    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }
}

/// Decode a BOLT11 string without applying any payment policy.
///
/// Checks the bech32 encoding, the semantic rules and the payee signature.
pub fn decode_invoice(bolt11: &str) -> Result<DecodedInvoice> {
    let trimmed = bolt11.trim();
    if trimmed.is_empty() {
        return Err(PaymentError::InvalidInvoice("empty invoice".to_string()));
    }
    if trimmed.len() > MAX_INVOICE_LEN {
        return Err(PaymentError::InvalidInvoice(format!(
            "invoice longer than {} characters",
            MAX_INVOICE_LEN
        )));
    }

    let invoice: Bolt11Invoice = trimmed
        .parse()
        .map_err(|e| PaymentError::InvalidInvoice(format!("{}", e)))?;

    let created_at = invoice.duration_since_epoch().as_secs();
    let expires_at = created_at.saturating_add(invoice.expiry_time().as_secs());
    let description = match invoice.description() {
        Bolt11InvoiceDescription::Direct(d) => Some(d.to_string()),
        Bolt11InvoiceDescription::Hash(_) => None,
    };

    Ok(DecodedInvoice {
        payment_hash: PaymentHash::from_bytes(invoice.payment_hash().to_byte_array()),
        amount_msats: invoice.amount_milli_satoshis(),
        created_at,
        expires_at,
        description,
    })
}

/// Decode an invoice and check it against the expected job amount.
///
/// Exact match only: the expected amount is computed server-side from the
/// agreed job price, so there is no tolerance band. Amountless invoices are
/// never accepted.
pub fn validate_invoice(bolt11: &str, expected_sats: u64, now: Timestamp) -> Result<DecodedInvoice> {
    let decoded = decode_invoice(bolt11)?;

    let msats = match decoded.amount_msats {
        None | Some(0) => return Err(PaymentError::MissingAmount),
        Some(msats) => msats,
    };

    if decoded.amount_sats() != Some(expected_sats) {
        return Err(PaymentError::AmountMismatch {
            expected: expected_sats,
            actual: msats / 1000,
        });
    }

    if decoded.is_expired_at(now) {
        return Err(PaymentError::InvoiceExpired);
    }

    Ok(decoded)
}
