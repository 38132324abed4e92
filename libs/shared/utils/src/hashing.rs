use sha2::{Digest, Sha256};

/// SHA-256, hex encoded. Used for CAPTCHA token hashes (the raw token is
/// never persisted) and for hashing emails before they reach any log line.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}
