use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use errandbit_core::{PaymentHash, Preimage, Result};

/// Hash a preimage into its payment hash
pub fn payment_hash_for(preimage: &Preimage) -> PaymentHash {
    let digest = Sha256::digest(preimage.as_bytes());
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    PaymentHash::from_bytes(out)
}

/// Check a parsed preimage against a parsed payment hash in constant time
pub fn preimage_matches(preimage: &Preimage, payment_hash: &PaymentHash) -> bool {
    let computed = payment_hash_for(preimage);
    bool::from(computed.as_bytes().ct_eq(payment_hash.as_bytes()))
}

/// Verify a hex preimage against a hex payment hash.
///
/// Both inputs must be exactly 64 hex characters; anything else is a format
/// error raised before hashing. A well-formed mismatch is `Ok(false)`.
pub fn verify_preimage(preimage_hex: &str, payment_hash_hex: &str) -> Result<bool> {
    let preimage: Preimage = preimage_hex.parse()?;
    let payment_hash: PaymentHash = payment_hash_hex.parse()?;
    Ok(preimage_matches(&preimage, &payment_hash))
}

/// Generate a fresh random preimage and its payment hash
pub fn generate_preimage() -> (Preimage, PaymentHash) {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    let preimage = Preimage::from_bytes(bytes);
    let hash = payment_hash_for(&preimage);
    (preimage, hash)
}
