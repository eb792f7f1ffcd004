//! The nonce search engine.
//!
//! Iterates a bounded nonce range over a template's header prefix,
//! digesting each candidate header and comparing it against the
//! target. The caller bounds the number of nonces per call so it can
//! refresh stale templates, and supplies a cancellation flag that is
//! polled at least once per batch so shutdown halts the search within
//! a bounded number of hashes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use thiserror::Error;

use crate::difficulty::digest_below_target;
use crate::hash::block_digest;
use crate::template::{BlockTemplate, Solution};

/// Nonces hashed between cancellation checks.
pub const CANCEL_POLL_BATCH: u64 = 512;

/// Job-level search failures. These are never fatal to the process;
/// the caller requests a fresh template.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("template {job_id} has an empty header prefix")]
    MissingHeaderPrefix { job_id: String },
}

/// What a bounded search call produced.
#[derive(Debug)]
pub enum SearchOutcome {
    /// A digest below the target was found.
    Found {
        solution: Solution,
        hashes_tried: u64,
    },
    /// The nonce budget ran out without a solution.
    Exhausted { hashes_tried: u64 },
    /// The cancellation flag was raised mid-search.
    Cancelled { hashes_tried: u64 },
}

impl SearchOutcome {
    pub fn hashes_tried(&self) -> u64 {
        match self {
            SearchOutcome::Found { hashes_tried, .. }
            | SearchOutcome::Exhausted { hashes_tried }
            | SearchOutcome::Cancelled { hashes_tried } => *hashes_tried,
        }
    }
}

/// Hashes-per-second meter for the job in progress.
#[derive(Debug)]
pub struct HashrateMeter {
    hashes: u64,
    started: Instant,
}

impl HashrateMeter {
    pub fn new() -> Self {
        HashrateMeter {
            hashes: 0,
            started: Instant::now(),
        }
    }

    /// Restart the meter for a new job.
    pub fn reset(&mut self) {
        self.hashes = 0;
        self.started = Instant::now();
    }

    pub fn record(&mut self, hashes: u64) {
        self.hashes += hashes;
    }

    pub fn hashes(&self) -> u64 {
        self.hashes
    }

    /// Instantaneous rate in hashes per second; 0 when no time has
    /// elapsed yet.
    pub fn rate(&self) -> f64 {
        let elapsed = self.started.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            0.0
        } else {
            self.hashes as f64 / elapsed
        }
    }
}

impl Default for HashrateMeter {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives nonce iteration for one worker. Each worker owns its own
/// engine and a disjoint slice of the nonce space.
#[derive(Debug, Default)]
pub struct HashSearchEngine {
    meter: HashrateMeter,
}

impl HashSearchEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current throughput for the job in progress.
    pub fn hashrate(&self) -> f64 {
        self.meter.rate()
    }

    /// Try up to `max_nonces` nonces starting at `nonce_start`,
    /// returning the first solution whose digest is strictly below the
    /// template's target.
    ///
    /// The cancellation flag is polled once per [`CANCEL_POLL_BATCH`]
    /// hashes; a raised flag stops the search within one batch.
    pub fn search(
        &mut self,
        template: &BlockTemplate,
        nonce_start: u64,
        max_nonces: u64,
        cancel: &AtomicBool,
    ) -> Result<SearchOutcome, SearchError> {
        if template.header_prefix.is_empty() {
            return Err(SearchError::MissingHeaderPrefix {
                job_id: template.job_id.clone(),
            });
        }

        self.meter.reset();

        // One reusable header buffer; only the trailing nonce bytes
        // change per iteration.
        let prefix_len = template.header_prefix.len();
        let mut header = template.full_header(nonce_start);

        let end = nonce_start.saturating_add(max_nonces);
        let mut nonce = nonce_start;
        let mut tried: u64 = 0;

        while nonce < end {
            if cancel.load(Ordering::Relaxed) {
                return Ok(SearchOutcome::Cancelled { hashes_tried: tried });
            }

            let batch_end = end.min(nonce.saturating_add(CANCEL_POLL_BATCH));
            let batch_start = nonce;

            while nonce < batch_end {
                header[prefix_len..].copy_from_slice(&nonce.to_le_bytes());
                let digest = block_digest(&header);
                tried += 1;

                if digest_below_target(&digest, &template.target) {
                    self.meter.record(nonce - batch_start + 1);
                    return Ok(SearchOutcome::Found {
                        solution: Solution {
                            job_id: template.job_id.clone(),
                            nonce,
                            full_header: header,
                            digest,
                        },
                        hashes_tried: tried,
                    });
                }
                nonce += 1;
            }

            self.meter.record(nonce - batch_start);
        }

        Ok(SearchOutcome::Exhausted { hashes_tried: tried })
    }
}
