//! Payload screens applied before decoding

use errandbit_core::{parse_hex32, JobId, PaymentError, Result, HASH_HEX_LEN};

/// Reject oversized or obviously non-Lightning invoice strings
pub fn screen_invoice_payload(bolt11: &str, max_len: usize) -> Result<()> {
    let trimmed = bolt11.trim();
    if trimmed.is_empty() {
        return Err(PaymentError::InvalidInvoice("empty invoice".to_string()));
    }
    if trimmed.len() > max_len {
        return Err(PaymentError::InvalidInvoice(format!(
            "invoice longer than {} characters",
            max_len
        )));
    }
    if !trimmed.get(..2).is_some_and(|p| p.eq_ignore_ascii_case("ln")) {
        return Err(PaymentError::InvalidInvoice(
            "not a Lightning payment request".to_string(),
        ));
    }
    Ok(())
}

/// Require exactly 64 hex characters
pub fn screen_hex_field(field: &'static str, value: &str) -> Result<()> {
    if value.len() != HASH_HEX_LEN {
        return Err(PaymentError::InvalidFormat {
            field,
            reason: format!("expected {} hex characters, got {}", HASH_HEX_LEN, value.len()),
        });
    }
    parse_hex32(field, value).map(|_| ())
}

pub fn screen_job_id(job_id: JobId) -> Result<()> {
    if job_id <= 0 {
        return Err(PaymentError::InvalidRequest(format!(
            "job_id must be positive, got {}",
            job_id
        )));
    }
    Ok(())
}
