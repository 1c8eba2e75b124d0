//! ErrandBit Cryptography
//!
//! Preimage verification: the one cryptographic check that proves a
//! Lightning payment reached the payee's node.

mod preimage;

pub use preimage::*;
