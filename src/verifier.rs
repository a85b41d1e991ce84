//! Content integrity checks.

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 digest of `data`
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// True when `payload` hashes to `expected_hash` (case-sensitive)
pub fn verify(payload: &[u8], expected_hash: &str) -> bool {
    sha256_hex(payload) == expected_hash
}

/// Whether `s` looks like a SHA-256 hex digest
pub fn is_sha256_hex(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit())
}
