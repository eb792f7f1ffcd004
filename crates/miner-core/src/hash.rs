//! The block digest function.
//!
//! The network's proof-of-work hash is treated as an opaque
//! deterministic function from header bytes to a 32-byte digest; this
//! client uses double SHA-256.

use sha2::{Digest, Sha256};

/// Compute the proof-of-work digest of a full block header.
#[inline]
pub fn block_digest(header: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(header);
    let second = Sha256::digest(first);
    let mut out = [0u8; 32];
    out.copy_from_slice(&second);
    out
}

/// Hex form of a digest for logs and the dashboard.
pub fn digest_hex(digest: &[u8; 32]) -> String {
    hex::encode(digest)
}
