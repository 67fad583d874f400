//! Observability helpers for the identity service.
//!
//! # Privacy by Default
//!
//! Handlers use `#[instrument(skip_all)]` and add fields explicitly:
//! - **SAFE**: logged in plaintext (account IDs, outcomes, stages)
//! - **HASHED**: emails, via [`hash_for_correlation`]
//! - **NEVER**: passwords, authorization codes, tokens, key material

pub mod metrics;

use sha2::{Digest, Sha256};

/// Hash a field value for correlation in logs (SHA-256, first 8 hex chars).
///
/// Used for emails, which need correlation across log entries but must not
/// be stored in plaintext. Input is lowercased so the same mailbox always
/// produces the same hash.
pub fn hash_for_correlation(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.to_lowercase().as_bytes());
    let result = hasher.finalize();
    hex::encode(result.get(..4).unwrap_or_default())
}
