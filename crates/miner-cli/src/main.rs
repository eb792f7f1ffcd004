//! Solo miner entry point: wires the connector, reward engine and
//! worker pool together and runs the dashboard loop until Ctrl-C.

mod config;
mod connector;
mod resources;
mod rpc;
mod stats;
mod worker;

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use parking_lot::Mutex;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use miner_core::{RewardAllocationEngine, RewardConfig};

use config::{Cli, MinerConfig};
use connector::{ConnectorConfig, NodeConnector};
use stats::MinerStats;
use worker::{SharedState, Worker};

const DASHBOARD_POLL: Duration = Duration::from_millis(250);
const DASHBOARD_INTERVAL: Duration = Duration::from_secs(5);

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match MinerConfig::from_cli(cli) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let inventory = resources::probe(config.cpu_cores);
    info!(
        logical = inventory.logical_cores,
        workers = inventory.usable_cores,
        "core inventory"
    );
    if config.ram_percent > 0 {
        info!(
            ram_percent = config.ram_percent,
            "ram reservation accepted; the hash cache is not active in this build"
        );
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    spawn_signal_listener(Arc::clone(&shutdown));

    let connector = NodeConnector::new(
        ConnectorConfig {
            endpoint: config.endpoint,
            ..ConnectorConfig::default()
        },
        Arc::clone(&shutdown),
    );
    let rewards = RewardAllocationEngine::new(RewardConfig {
        user_address: config.user_address.clone(),
        fee_address: config.fee_address.clone(),
        secondary_address: config.secondary_address.clone(),
        fee_percent: config.fee_percent,
        target_usd: config.allocation_target_usd,
        initial_price: config.price,
    });

    let shared = SharedState {
        connector: Arc::new(Mutex::new(connector)),
        rewards: Arc::new(Mutex::new(rewards)),
        stats: Arc::new(MinerStats::new()),
        shutdown: Arc::clone(&shutdown),
        latest_job: Arc::new(Mutex::new(None)),
    };

    let workers = inventory.usable_cores as u64;
    let mut handles = Vec::with_capacity(inventory.usable_cores);
    for id in 0..workers {
        let worker = Worker::new(
            id,
            workers,
            config.user_address.clone(),
            SharedState {
                connector: Arc::clone(&shared.connector),
                rewards: Arc::clone(&shared.rewards),
                stats: Arc::clone(&shared.stats),
                shutdown: Arc::clone(&shared.shutdown),
                latest_job: Arc::clone(&shared.latest_job),
            },
        );
        let spawned = std::thread::Builder::new()
            .name(format!("miner-{id}"))
            .spawn(move || worker.run());
        match spawned {
            Ok(handle) => handles.push(handle),
            Err(e) => {
                error!(worker = id, error = %e, "failed to spawn worker thread");
                shutdown.store(true, Ordering::Relaxed);
                break;
            }
        }
    }

    // Dashboard loop on the main thread.
    let mut last_report = Instant::now();
    while !shutdown.load(Ordering::Relaxed) {
        std::thread::sleep(DASHBOARD_POLL);
        if last_report.elapsed() >= DASHBOARD_INTERVAL {
            let snapshot = shared.stats.snapshot(shared.rewards.lock().state());
            info!("{}", snapshot.render());
            last_report = Instant::now();
        }
    }

    info!("shutting down; waiting for workers");
    for handle in handles {
        if handle.join().is_err() {
            warn!("a worker thread panicked during shutdown");
        }
    }

    let snapshot = shared.stats.snapshot(shared.rewards.lock().state());
    info!("final: {}", snapshot.render());
    ExitCode::SUCCESS
}

/// Flip the shared shutdown flag on Ctrl-C. The signal wait runs on a
/// dedicated thread with a minimal runtime so the mining path stays
/// synchronous.
fn spawn_signal_listener(shutdown: Arc<AtomicBool>) {
    let spawned = std::thread::Builder::new()
        .name("signal-listener".into())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    error!(error = %e, "cannot wait for shutdown signal");
                    return;
                }
            };
            if let Err(e) = runtime.block_on(tokio::signal::ctrl_c()) {
                error!(error = %e, "signal wait failed");
                return;
            }
            info!("interrupt received; stopping after the current batch");
            shutdown.store(true, Ordering::Relaxed);
        });
    if let Err(e) = spawned {
        error!(error = %e, "failed to start the signal listener");
    }
}
