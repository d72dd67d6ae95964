//! Content fingerprinting.
//!
//! Every text item is keyed in the cache by the SHA-256 digest of its exact
//! byte content. Fingerprinting is deliberately byte-exact: no case folding,
//! no whitespace trimming. Two inputs differing by a trailing space are two
//! distinct cache entries; callers that want normalization normalize before
//! calling.

use sha2::{Digest, Sha256};

/// Number of hex characters in a fingerprint (SHA-256 → 32 bytes → 64 chars).
pub const FINGERPRINT_LEN: usize = 64;

/// Compute the cache fingerprint for a text item.
///
/// Deterministic and total: the same input always produces the same
/// lowercase hex digest, regardless of process, position, or insertion
/// order.
pub fn fingerprint(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}
