// src/fingerprint.rs
//! Content fingerprinting for intermediate deduplication

use sha2::{Digest, Sha256};
use std::fmt;

/// Content hash of a DER certificate blob. Two intermediates with equal
/// bytes have equal fingerprints regardless of where they appear in a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Fingerprint raw certificate bytes. Pure; safe to call concurrently.
    pub fn of(der: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(der);
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for Fingerprint {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}
