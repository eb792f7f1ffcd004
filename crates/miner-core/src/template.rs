//! Block template and solution value types.

use crate::amount::Amount;

/// Size of the nonce appended to the header prefix, in bytes.
pub const NONCE_SIZE: usize = 8;

/// A block-construction template received from the node.
///
/// Immutable once received. A newer template supersedes this one;
/// solutions for superseded templates must be discarded, never
/// submitted.
#[derive(Debug, Clone)]
pub struct BlockTemplate {
    /// Opaque unique job identifier assigned by the node.
    pub job_id: String,
    /// 256-bit big-endian target the digest must be strictly below.
    pub target: [u8; 32],
    /// Header bytes up to but excluding the nonce; the miner appends
    /// an 8-byte little-endian nonce to complete the header.
    pub header_prefix: Vec<u8>,
    /// Chain height (or DAG score) this template builds on.
    pub height: u64,
    /// Gross block reward reported by the node for this template.
    pub reward: Amount,
    /// Unix timestamp at which the node issued the template.
    pub issued_at: u64,
}

impl BlockTemplate {
    /// Assemble the full header for a given nonce.
    pub fn full_header(&self, nonce: u64) -> Vec<u8> {
        let mut header = Vec::with_capacity(self.header_prefix.len() + NONCE_SIZE);
        header.extend_from_slice(&self.header_prefix);
        header.extend_from_slice(&nonce.to_le_bytes());
        header
    }
}

/// A solved template: the winning nonce plus the digest that beat the
/// target. Consumed exactly once by submission.
#[derive(Debug, Clone)]
pub struct Solution {
    /// Job this solution belongs to; must still be the current job at
    /// submission time.
    pub job_id: String,
    /// The winning nonce.
    pub nonce: u64,
    /// header_prefix ++ little-endian nonce bytes.
    pub full_header: Vec<u8>,
    /// The digest that satisfied the target.
    pub digest: [u8; 32],
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(prefix: &[u8]) -> BlockTemplate {
        BlockTemplate {
            job_id: "job-1".into(),
            target: [0xFF; 32],
            header_prefix: prefix.to_vec(),
            height: 100,
            reward: Amount::from_units(50),
            issued_at: 1_700_000_000,
        }
    }

    #[test]
    fn test_full_header_appends_le_nonce() {
        let t = template(b"prefix");
        let header = t.full_header(0x0102_0304_0506_0708);

        assert_eq!(&header[..6], b"prefix");
        assert_eq!(
            &header[6..],
            &[0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01]
        );
        assert_eq!(header.len(), t.header_prefix.len() + NONCE_SIZE);
    }
}
