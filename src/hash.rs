//! Deterministic fingerprints: SHA-256 truncated to 16 hex chars.
//!
//! Every identity in the system (`order_key`, `intent_hash`, `inputs_hash`)
//! is a truncated SHA-256 so that fingerprints are reproducible across
//! machines and runs, unlike `DefaultHasher` output.

use sha2::{Digest, Sha256};

/// Length of a truncated fingerprint in hex characters.
pub const FINGERPRINT_LEN: usize = 16;

/// SHA-256 over `data`, hex-encoded and truncated to 16 chars.
pub fn fingerprint(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    let mut out = String::with_capacity(FINGERPRINT_LEN);
    for byte in digest.iter().take(FINGERPRINT_LEN / 2) {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable() {
        // Known SHA-256 prefix of the empty string.
        assert_eq!(fingerprint(b""), "e3b0c44298fc1c14");
    }

    #[test]
    fn fingerprint_len() {
        assert_eq!(fingerprint(b"anything").len(), FINGERPRINT_LEN);
    }

    #[test]
    fn fingerprint_differs_on_input() {
        assert_ne!(fingerprint(b"a"), fingerprint(b"b"));
    }
}
