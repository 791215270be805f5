//! Password digests (SHA-256, lowercase hex, no salt)

use sha2::{Digest, Sha256};

/// Length of a hex-encoded SHA-256 digest
pub const DIGEST_LEN: usize = 64;

/// Hash a plaintext password into its hex digest.
/// Total over any input, including the empty string.
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// Whether `value` looks like a digest produced by [`hash_password`]
pub fn is_digest(value: &str) -> bool {
    value.len() == DIGEST_LEN && value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
