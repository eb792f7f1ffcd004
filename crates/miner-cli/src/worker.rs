//! Worker threads: fetch a template, search a nonce slice, submit.
//!
//! Each worker owns a search engine and a disjoint starting point in
//! the nonce space; the connector, reward engine and stats are shared
//! behind locks. Workers never hold the connector lock while hashing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use miner_core::{HashSearchEngine, RewardAllocationEngine, SearchOutcome, ValidatedAddress};

use crate::connector::{ConnectorError, NodeConnector, SubmitOutcome};
use crate::stats::MinerStats;

/// Nonces a worker burns through before refreshing its template.
pub const NONCES_PER_FETCH: u64 = 1 << 22;

/// Backoff after a failed fetch, polled against shutdown in small
/// steps so Ctrl-C stays responsive.
const IDLE_BACKOFF: Duration = Duration::from_secs(5);
const IDLE_POLL_STEP: Duration = Duration::from_millis(100);

/// State shared by every worker and the dashboard.
pub struct SharedState {
    pub connector: Arc<Mutex<NodeConnector>>,
    pub rewards: Arc<Mutex<RewardAllocationEngine>>,
    pub stats: Arc<MinerStats>,
    pub shutdown: Arc<AtomicBool>,
    /// Job id of the newest template any worker has seen. Solutions
    /// for older jobs are discarded instead of submitted.
    pub latest_job: Arc<Mutex<Option<String>>>,
}

/// Starting nonce for worker `id` of `workers`: the space is cut into
/// equal disjoint slices so workers never duplicate effort.
pub fn partition_start(id: u64, workers: u64) -> u64 {
    id.wrapping_mul(u64::MAX / workers.max(1))
}

enum Cycle {
    Continue,
    Stop,
}

pub struct Worker {
    id: u64,
    payout: ValidatedAddress,
    shared: SharedState,
    engine: HashSearchEngine,
    /// Next nonce to try within the current job.
    cursor: u64,
    cursor_base: u64,
    current_job: Option<String>,
}

impl Worker {
    pub fn new(id: u64, workers: u64, payout: ValidatedAddress, shared: SharedState) -> Self {
        let base = partition_start(id, workers);
        Worker {
            id,
            payout,
            shared,
            engine: HashSearchEngine::new(),
            cursor: base,
            cursor_base: base,
            current_job: None,
        }
    }

    pub fn run(mut self) {
        info!(worker = self.id, start_nonce = self.cursor, "worker started");
        while !self.shared.shutdown.load(Ordering::Relaxed) {
            if let Cycle::Stop = self.cycle() {
                break;
            }
        }
        info!(worker = self.id, "worker stopped");
    }

    /// One fetch/search/submit round.
    fn cycle(&mut self) -> Cycle {
        let template = {
            let mut connector = self.shared.connector.lock();
            let result = connector.get_block_template(&self.payout);
            self.shared.stats.set_connection_state(connector.state());
            result
        };

        let template = match template {
            Ok(t) => t,
            Err(ConnectorError::ShuttingDown) => return Cycle::Stop,
            Err(e) => {
                warn!(worker = self.id, error = %e, "template fetch failed");
                return self.idle_wait();
            }
        };

        if self.current_job.as_deref() != Some(template.job_id.as_str()) {
            debug!(worker = self.id, job_id = %template.job_id, height = template.height, "new job");
            self.current_job = Some(template.job_id.clone());
            self.cursor = self.cursor_base;
        }
        *self.shared.latest_job.lock() = Some(template.job_id.clone());

        let outcome = match self.engine.search(
            &template,
            self.cursor,
            NONCES_PER_FETCH,
            &self.shared.shutdown,
        ) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(worker = self.id, error = %e, "unusable job");
                self.current_job = None;
                return self.idle_wait();
            }
        };
        self.shared.stats.record_hashes(outcome.hashes_tried());

        match outcome {
            SearchOutcome::Found { solution, .. } => {
                self.cursor = solution.nonce.saturating_add(1);
                if self.is_stale(&solution.job_id) {
                    debug!(worker = self.id, job_id = %solution.job_id, "discarding stale solution");
                    return Cycle::Continue;
                }
                self.submit(&solution, template.reward);
                Cycle::Continue
            }
            SearchOutcome::Exhausted { .. } => {
                self.cursor = self.cursor.saturating_add(NONCES_PER_FETCH);
                Cycle::Continue
            }
            SearchOutcome::Cancelled { .. } => Cycle::Stop,
        }
    }

    /// A solution is stale when some worker has already published a
    /// newer job id.
    fn is_stale(&self, job_id: &str) -> bool {
        self.shared
            .latest_job
            .lock()
            .as_deref()
            .is_some_and(|latest| latest != job_id)
    }

    fn submit(&mut self, solution: &miner_core::Solution, reward: miner_core::Amount) {
        let outcome = {
            let mut connector = self.shared.connector.lock();
            let result = connector.submit_solution(solution);
            self.shared.stats.set_connection_state(connector.state());
            result
        };

        match outcome {
            Ok(SubmitOutcome::Accepted) => {
                self.shared.stats.record_accepted();
                let payouts = self.shared.rewards.lock().process_reward(reward);
                for payout in &payouts {
                    info!(
                        kind = payout.kind.name(),
                        recipient = %payout.recipient,
                        amount = %payout.amount,
                        "payout instruction"
                    );
                }
            }
            Ok(SubmitOutcome::Rejected { reason }) => {
                self.shared.stats.record_rejected();
                warn!(worker = self.id, %reason, "block rejected");
            }
            Err(e) => {
                self.shared.stats.record_rejected();
                warn!(worker = self.id, error = %e, "submission failed");
            }
        }
    }

    fn idle_wait(&self) -> Cycle {
        let mut waited = Duration::ZERO;
        while waited < IDLE_BACKOFF {
            if self.shared.shutdown.load(Ordering::Relaxed) {
                return Cycle::Stop;
            }
            std::thread::sleep(IDLE_POLL_STEP);
            waited += IDLE_POLL_STEP;
        }
        Cycle::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{ConnectorConfig, NodeConnector};
    use crate::rpc::{RpcError, RpcTransport, METHOD_GET_BLOCK_TEMPLATE, METHOD_SUBMIT_BLOCK};
    use miner_core::{validate_address, Amount, RewardConfig, UNITS_PER_COIN};
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::net::SocketAddr;

    const USER: &str = "kaspa:qzrhasap30pzrth070tx6m0nslk03xl0qgmpguex68nmd68g277fuqfsqg0ls";
    const FEE: &str = "kaspa:qqggvdrxjqdgwql4aac8hg0pq2v4z5p46l86f98hq7ax29k7x55v7sycs9kvm";
    const SECONDARY: &str =
        "kaspa:qq2efzv0y3vm97wp2dkeu2vhzjhhjdaz9gzqyqm0402dxj98kgsgs2xf9k3mr";

    // Compact bits whose expanded target starts 0x7fffff: with the
    // prefix below, nonce 0 digests above it and nonce 1 below it.
    const EASY_BITS: u32 = 0x227f_ffff;
    const PREFIX: &[u8] = b"worker-test-prefix";

    struct Sequenced {
        responses: Arc<Mutex<VecDeque<(String, Result<Value, RpcError>)>>>,
    }

    impl RpcTransport for Sequenced {
        fn call(&mut self, method: &str, _params: Value) -> Result<Value, RpcError> {
            if method == crate::rpc::METHOD_GET_INFO {
                return Ok(json!({"version": "0.14.1", "synced": true}));
            }
            let (expected, response) = self
                .responses
                .lock()
                .pop_front()
                .unwrap_or_else(|| panic!("unexpected call to {method}"));
            assert_eq!(expected, method);
            response
        }
    }

    fn shared_state(
        responses: Arc<Mutex<VecDeque<(String, Result<Value, RpcError>)>>>,
    ) -> SharedState {
        let shutdown = Arc::new(AtomicBool::new(false));
        let config = ConnectorConfig {
            endpoint: Some(SocketAddr::from(([127, 0, 0, 1], 16110))),
            retry_delay: Duration::ZERO,
            ..ConnectorConfig::default()
        };
        let connector = NodeConnector::with_dialer(
            config,
            Arc::clone(&shutdown),
            Box::new(move |_| {
                Ok(Box::new(Sequenced {
                    responses: Arc::clone(&responses),
                }))
            }),
        );
        let rewards = RewardAllocationEngine::new(RewardConfig {
            user_address: validate_address(USER).unwrap(),
            fee_address: validate_address(FEE).unwrap(),
            secondary_address: validate_address(SECONDARY).unwrap(),
            fee_percent: 10,
            target_usd: 10.0,
            initial_price: Some(0.1),
        });
        SharedState {
            connector: Arc::new(Mutex::new(connector)),
            rewards: Arc::new(Mutex::new(rewards)),
            stats: Arc::new(MinerStats::new()),
            shutdown,
            latest_job: Arc::new(Mutex::new(None)),
        }
    }

    fn template_value(job_id: &str) -> Value {
        json!({
            "job_id": job_id,
            "bits": EASY_BITS,
            "header_prefix": hex::encode(PREFIX),
            "height": 100,
            "reward": 50 * UNITS_PER_COIN,
            "timestamp": 1_700_000_000,
        })
    }

    #[test]
    fn test_partition_starts_are_disjoint_and_ordered() {
        let starts: Vec<u64> = (0..8).map(|i| partition_start(i, 8)).collect();
        assert_eq!(starts[0], 0);
        for pair in starts.windows(2) {
            assert!(pair[1] - pair[0] >= NONCES_PER_FETCH);
        }
    }

    #[test]
    fn test_partition_single_worker_starts_at_zero() {
        assert_eq!(partition_start(0, 1), 0);
        assert_eq!(partition_start(0, 0), 0);
    }

    #[test]
    fn test_cycle_finds_submits_and_allocates() {
        let responses = Arc::new(Mutex::new(VecDeque::from([
            (
                METHOD_GET_BLOCK_TEMPLATE.to_string(),
                Ok(template_value("job-1")),
            ),
            (
                METHOD_SUBMIT_BLOCK.to_string(),
                Ok(json!({"accepted": true})),
            ),
        ])));
        let shared = shared_state(Arc::clone(&responses));
        let stats = Arc::clone(&shared.stats);
        let rewards = Arc::clone(&shared.rewards);

        let mut worker = Worker::new(0, 1, validate_address(USER).unwrap(), shared);
        assert!(matches!(worker.cycle(), Cycle::Continue));

        assert!(responses.lock().is_empty());
        // Nonce 1 solves, so the cursor has moved past it
        assert_eq!(worker.cursor, 2);

        let snap = stats.snapshot(rewards.lock().state());
        assert_eq!(snap.accepted, 1);
        assert_eq!(snap.rejected, 0);
        // 50-coin gross: 5 fee, 45 toward the open secondary target
        let alloc = snap.allocation;
        assert_eq!(alloc.cumulative_gross, Amount::from_units(50 * UNITS_PER_COIN));
        assert_eq!(alloc.cumulative_fee, Amount::from_units(5 * UNITS_PER_COIN));
        assert_eq!(
            alloc.cumulative_secondary,
            Amount::from_units(45 * UNITS_PER_COIN)
        );
    }

    #[test]
    fn test_cycle_records_rejection() {
        let responses = Arc::new(Mutex::new(VecDeque::from([
            (
                METHOD_GET_BLOCK_TEMPLATE.to_string(),
                Ok(template_value("job-1")),
            ),
            (
                METHOD_SUBMIT_BLOCK.to_string(),
                Ok(json!({"accepted": false, "reason": "stale block", "retryable": false})),
            ),
        ])));
        let shared = shared_state(Arc::clone(&responses));
        let stats = Arc::clone(&shared.stats);
        let rewards = Arc::clone(&shared.rewards);

        let mut worker = Worker::new(0, 1, validate_address(USER).unwrap(), shared);
        worker.cycle();

        let snap = stats.snapshot(rewards.lock().state());
        assert_eq!(snap.accepted, 0);
        assert_eq!(snap.rejected, 1);
        // No payout on rejection
        assert!(snap.allocation.cumulative_gross.is_zero());
    }

    #[test]
    fn test_stale_check_tracks_the_latest_job() {
        let responses = Arc::new(Mutex::new(VecDeque::new()));
        let shared = shared_state(Arc::clone(&responses));
        let latest_job = Arc::clone(&shared.latest_job);
        let worker = Worker::new(0, 1, validate_address(USER).unwrap(), shared);

        // Nothing published yet: not stale
        assert!(!worker.is_stale("job-1"));

        *latest_job.lock() = Some("job-1".into());
        assert!(!worker.is_stale("job-1"));

        // Another worker published a newer job
        *latest_job.lock() = Some("job-2".into());
        assert!(worker.is_stale("job-1"));
    }

    #[test]
    fn test_new_job_resets_cursor_to_partition_base() {
        let responses = Arc::new(Mutex::new(VecDeque::from([
            (
                METHOD_GET_BLOCK_TEMPLATE.to_string(),
                Ok(template_value("job-1")),
            ),
            (
                METHOD_SUBMIT_BLOCK.to_string(),
                Ok(json!({"accepted": true})),
            ),
            (
                METHOD_GET_BLOCK_TEMPLATE.to_string(),
                Ok(template_value("job-2")),
            ),
            (
                METHOD_SUBMIT_BLOCK.to_string(),
                Ok(json!({"accepted": true})),
            ),
        ])));
        let shared = shared_state(Arc::clone(&responses));

        let mut worker = Worker::new(0, 1, validate_address(USER).unwrap(), shared);
        worker.cycle();
        assert_eq!(worker.cursor, 2);

        // Same prefix under a new job id: the cursor restarts at the
        // partition base and finds the same nonce again.
        worker.cycle();
        assert_eq!(worker.cursor, 2);
        assert_eq!(worker.current_job.as_deref(), Some("job-2"));
    }

    #[test]
    fn test_shutdown_stops_the_cycle() {
        let responses = Arc::new(Mutex::new(VecDeque::new()));
        let shared = shared_state(Arc::clone(&responses));
        shared.shutdown.store(true, Ordering::Relaxed);

        let worker = Worker::new(0, 1, validate_address(USER).unwrap(), shared);
        // run() must return without any RPC traffic
        worker.run();
        assert!(responses.lock().is_empty());
    }
}
