// hash.rs — SHA-256 hashing utilities.
//
// All hashes in AI-Box are SHA-256, hex-encoded lowercase. Full digests are
// 64 hex characters; content hashes that appear inside log records (policy
// version, input hash) use a 16-character prefix to keep lines readable.

use sha2::{Digest, Sha256};

/// Length of the short hex prefix used for content hashes in log records.
pub const SHORT_HASH_LEN: usize = 16;

/// Hash arbitrary bytes, returning a lowercase hex-encoded SHA-256 string.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Hash a UTF-8 string, returning a lowercase hex-encoded SHA-256 string.
pub fn sha256_hex_str(s: &str) -> String {
    sha256_hex(s.as_bytes())
}

/// Short content hash: the first [`SHORT_HASH_LEN`] hex characters of the
/// SHA-256 digest. Used for policy version hashes and decision input hashes.
pub fn short_hash(data: &[u8]) -> String {
    let mut h = sha256_hex(data);
    h.truncate(SHORT_HASH_LEN);
    h
}
