//! Shared mining counters and the periodic dashboard snapshot.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant};

use miner_core::AllocationState;

use crate::connector::ConnectionState;

/// Counters shared by all worker threads. Everything is atomic so the
/// dashboard reads without taking a lock.
pub struct MinerStats {
    started: Instant,
    hashes: AtomicU64,
    accepted: AtomicU64,
    rejected: AtomicU64,
    connection_state: AtomicU8,
}

impl MinerStats {
    pub fn new() -> Self {
        MinerStats {
            started: Instant::now(),
            hashes: AtomicU64::new(0),
            accepted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            connection_state: AtomicU8::new(ConnectionState::Disconnected.as_u8()),
        }
    }

    pub fn record_hashes(&self, count: u64) {
        self.hashes.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_connection_state(&self, state: ConnectionState) {
        self.connection_state.store(state.as_u8(), Ordering::Relaxed);
    }

    /// Average hashrate since start, in hashes per second.
    pub fn hashrate(&self) -> f64 {
        let elapsed = self.started.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            return 0.0;
        }
        self.hashes.load(Ordering::Relaxed) as f64 / elapsed
    }

    pub fn snapshot(&self, allocation: AllocationState) -> StatsSnapshot {
        StatsSnapshot {
            hashrate: self.hashrate(),
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            connection_state: ConnectionState::from_u8(
                self.connection_state.load(Ordering::Relaxed),
            ),
            allocation,
            uptime: self.started.elapsed(),
        }
    }
}

impl Default for MinerStats {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time view for the dashboard.
#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    pub hashrate: f64,
    pub accepted: u64,
    pub rejected: u64,
    pub connection_state: ConnectionState,
    pub allocation: AllocationState,
    pub uptime: Duration,
}

impl StatsSnapshot {
    pub fn render(&self) -> String {
        format!(
            "up {}s | {} | {} | blocks {} accepted / {} rejected | gross {} | fee {} | secondary {} (target {}) | net {}",
            self.uptime.as_secs(),
            self.connection_state,
            format_hash_rate(self.hashrate),
            self.accepted,
            self.rejected,
            self.allocation.cumulative_gross,
            self.allocation.cumulative_fee,
            self.allocation.cumulative_secondary,
            if self.allocation.target_met { "met" } else { "open" },
            self.allocation.cumulative_user_net,
        )
    }
}

/// Human-readable hashrate.
pub fn format_hash_rate(rate: f64) -> String {
    if rate >= 1e9 {
        format!("{:.2} GH/s", rate / 1e9)
    } else if rate >= 1e6 {
        format!("{:.2} MH/s", rate / 1e6)
    } else if rate >= 1e3 {
        format!("{:.2} KH/s", rate / 1e3)
    } else {
        format!("{:.1} H/s", rate)
    }
}
