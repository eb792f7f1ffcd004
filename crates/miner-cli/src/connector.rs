//! The node connector: session lifecycle, template fetch and
//! solution submission.
//!
//! The connector owns exactly one session at a time and tracks it
//! through an explicit state machine. `Degraded` means the node is
//! reachable but unusable (unsynced, or a call just failed); no
//! template is handed out while Degraded. When the endpoint was not
//! fixed by configuration, a failed session triggers rediscovery of
//! the candidate list instead of retrying the same address forever.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use miner_core::{bits_to_target, Amount, BlockTemplate, Solution, ValidatedAddress};

use crate::rpc::{
    NodeInfo, RpcError, RpcTransport, SubmitRecord, TcpTransport, TemplateRecord,
    METHOD_GET_BLOCK_TEMPLATE, METHOD_GET_INFO, METHOD_SUBMIT_BLOCK,
};

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Degraded = 3,
}

impl ConnectionState {
    pub fn name(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Degraded => "degraded",
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> ConnectionState {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Degraded,
            _ => ConnectionState::Disconnected,
        }
    }
}

impl core::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Connector tuning. Defaults match a local node setup.
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// Fixed endpoint; `None` probes the candidate list.
    pub endpoint: Option<SocketAddr>,
    /// Ordered local candidates for auto-discovery.
    pub candidates: Vec<SocketAddr>,
    /// Timeout for the cheap liveness probe when dialing.
    pub probe_timeout: Duration,
    /// Per-RPC timeout once a session is up.
    pub call_timeout: Duration,
    /// Attempt budget for template fetches.
    pub fetch_attempts: u32,
    /// Attempt budget for transient submission failures.
    pub submit_attempts: u32,
    /// Fixed delay between retry attempts.
    pub retry_delay: Duration,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        ConnectorConfig {
            endpoint: None,
            candidates: default_candidates(),
            probe_timeout: Duration::from_millis(500),
            call_timeout: Duration::from_secs(10),
            fetch_attempts: 3,
            submit_attempts: 3,
            retry_delay: Duration::from_secs(2),
        }
    }
}

/// Local node ports probed in order: mainnet, the testnets, devnet.
fn default_candidates() -> Vec<SocketAddr> {
    [16110, 16210, 16310, 17110]
        .into_iter()
        .map(|port| SocketAddr::from(([127, 0, 0, 1], port)))
        .collect()
}

/// Result of a submission the node actually answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted,
    /// Content-invalid rejection. Terminal for this solution; never
    /// retried.
    Rejected { reason: String },
}

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("no reachable node among {candidates} candidate endpoints")]
    NoEndpoint { candidates: usize },
    #[error("node is not synced (sync score {sync_score})")]
    Unsynced { sync_score: u64 },
    #[error("{op} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        op: &'static str,
        attempts: u32,
        last: RpcError,
    },
    #[error("shutdown requested")]
    ShuttingDown,
    #[error("invalid template {field}: {detail}")]
    InvalidTemplate {
        field: &'static str,
        detail: String,
    },
    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// Transport factory; swapped out by tests.
pub type Dialer = Box<dyn Fn(SocketAddr) -> Result<Box<dyn RpcTransport>, RpcError> + Send>;

/// Manages the session to one remote node.
pub struct NodeConnector {
    config: ConnectorConfig,
    dialer: Dialer,
    shutdown: Arc<AtomicBool>,
    state: ConnectionState,
    endpoint: Option<SocketAddr>,
    transport: Option<Box<dyn RpcTransport>>,
}

impl NodeConnector {
    pub fn new(config: ConnectorConfig, shutdown: Arc<AtomicBool>) -> Self {
        let probe_timeout = config.probe_timeout;
        let call_timeout = config.call_timeout;
        let dialer: Dialer = Box::new(move |addr| {
            TcpTransport::connect(addr, probe_timeout, call_timeout)
                .map(|t| Box::new(t) as Box<dyn RpcTransport>)
        });
        Self::with_dialer(config, shutdown, dialer)
    }

    /// Construct with a custom dialer. Used by tests to inject
    /// scripted transports.
    pub fn with_dialer(config: ConnectorConfig, shutdown: Arc<AtomicBool>, dialer: Dialer) -> Self {
        NodeConnector {
            config,
            dialer,
            shutdown,
            state: ConnectionState::Disconnected,
            endpoint: None,
            transport: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The resolved session endpoint, if any.
    pub fn endpoint(&self) -> Option<SocketAddr> {
        self.endpoint
    }

    /// Tear the session down. Auto-discovered endpoints are forgotten,
    /// so the next connect re-probes the candidate list.
    pub fn close(&mut self) {
        self.transport = None;
        self.endpoint = None;
        self.state = ConnectionState::Disconnected;
    }

    /// Bring the session to a usable state: connected, and the node
    /// reports itself fully synced.
    pub fn ensure_ready(&mut self) -> Result<(), ConnectorError> {
        if self.transport.is_none() {
            self.connect()?;
        }
        match self.rpc_get_info() {
            Ok(info) if info.synced => {
                self.state = ConnectionState::Connected;
                Ok(())
            }
            Ok(info) => {
                // Reachable but unusable; keep the session and wait
                // for a later probe to report synced.
                self.state = ConnectionState::Degraded;
                Err(ConnectorError::Unsynced {
                    sync_score: info.sync_score,
                })
            }
            Err(e) => {
                self.drop_session();
                Err(e.into())
            }
        }
    }

    /// Fetch the newest block template. Requires readiness; retries
    /// transient failures up to the configured budget with a fixed
    /// delay, re-verifying readiness before each retry. A failed
    /// readiness check aborts the whole call.
    pub fn get_block_template(
        &mut self,
        payout: &ValidatedAddress,
    ) -> Result<BlockTemplate, ConnectorError> {
        self.ensure_ready()?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.rpc_get_template(payout) {
                Ok(record) => {
                    debug!(job_id = %record.job_id, height = record.height, "received block template");
                    return template_from_record(record);
                }
                Err(e) if e.is_transient() && attempt < self.config.fetch_attempts => {
                    warn!(attempt, error = %e, "template fetch failed; retrying");
                    self.drop_session();
                    self.pause_between_attempts()?;
                    self.ensure_ready()?;
                }
                Err(e) if e.is_transient() => {
                    self.drop_session();
                    return Err(ConnectorError::RetriesExhausted {
                        op: "get_block_template",
                        attempts: attempt,
                        last: e,
                    });
                }
                Err(e) => {
                    self.drop_session();
                    return Err(e.into());
                }
            }
        }
    }

    /// Submit a solved block. Transient failures are retried with a
    /// bounded budget; a rejection the node marks non-retryable is
    /// terminal and returned immediately without consuming budget.
    pub fn submit_solution(
        &mut self,
        solution: &Solution,
    ) -> Result<SubmitOutcome, ConnectorError> {
        self.ensure_ready()?;

        let header_hex = hex::encode(&solution.full_header);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.rpc_submit(&header_hex) {
                Ok(record) if record.accepted => {
                    info!(job_id = %solution.job_id, nonce = solution.nonce, "block accepted");
                    return Ok(SubmitOutcome::Accepted);
                }
                Ok(record) => {
                    let reason = record.reason.unwrap_or_else(|| "rejected".into());
                    if record.retryable && attempt < self.config.submit_attempts {
                        warn!(attempt, %reason, "transient submission rejection; retrying");
                        self.pause_between_attempts()?;
                        self.ensure_ready()?;
                    } else if record.retryable {
                        return Err(ConnectorError::RetriesExhausted {
                            op: "submit_solution",
                            attempts: attempt,
                            last: RpcError::Node {
                                message: reason,
                                retryable: true,
                            },
                        });
                    } else {
                        return Ok(SubmitOutcome::Rejected { reason });
                    }
                }
                Err(RpcError::Node {
                    message,
                    retryable: false,
                }) => {
                    // Node-level terminal error counts as a rejection
                    return Ok(SubmitOutcome::Rejected { reason: message });
                }
                Err(e) if attempt < self.config.submit_attempts => {
                    warn!(attempt, error = %e, "submission transport failure; retrying");
                    self.drop_session();
                    self.pause_between_attempts()?;
                    self.ensure_ready()?;
                }
                Err(e) => {
                    self.drop_session();
                    return Err(ConnectorError::RetriesExhausted {
                        op: "submit_solution",
                        attempts: attempt,
                        last: e,
                    });
                }
            }
        }
    }

    fn connect(&mut self) -> Result<(), ConnectorError> {
        self.state = ConnectionState::Connecting;

        let fixed = self.config.endpoint.or(self.endpoint);
        match fixed {
            Some(addr) => match (self.dialer)(addr) {
                Ok(transport) => {
                    self.transport = Some(transport);
                    self.endpoint = Some(addr);
                    Ok(())
                }
                Err(e) => {
                    self.state = ConnectionState::Disconnected;
                    if self.config.endpoint.is_none() {
                        self.endpoint = None;
                    }
                    Err(e.into())
                }
            },
            None => {
                let (addr, transport) = self.discover()?;
                self.endpoint = Some(addr);
                self.transport = Some(transport);
                Ok(())
            }
        }
    }

    /// Probe the candidate list in order. The dialer's short connect
    /// timeout is the liveness check; a candidate that dials must also
    /// answer the session-info query before it is accepted.
    fn discover(&mut self) -> Result<(SocketAddr, Box<dyn RpcTransport>), ConnectorError> {
        for &candidate in &self.config.candidates {
            if self.shutdown.load(Ordering::Relaxed) {
                return Err(ConnectorError::ShuttingDown);
            }
            match (self.dialer)(candidate) {
                Ok(mut transport) => {
                    match transport.call(METHOD_GET_INFO, json!({})) {
                        Ok(value) => match serde_json::from_value::<NodeInfo>(value) {
                            Ok(node) => {
                                info!(endpoint = %candidate, version = %node.version, "discovered node");
                                return Ok((candidate, transport));
                            }
                            Err(e) => {
                                debug!(endpoint = %candidate, error = %e, "malformed session info")
                            }
                        },
                        Err(e) => {
                            debug!(endpoint = %candidate, error = %e, "session-info query failed")
                        }
                    }
                }
                Err(e) => debug!(endpoint = %candidate, error = %e, "candidate not reachable"),
            }
        }
        self.state = ConnectionState::Disconnected;
        Err(ConnectorError::NoEndpoint {
            candidates: self.config.candidates.len(),
        })
    }

    fn drop_session(&mut self) {
        self.state = ConnectionState::Degraded;
        self.transport = None;
        if self.config.endpoint.is_none() {
            // Auto-discovered endpoint may have moved; re-probe
            self.endpoint = None;
        }
    }

    /// Fixed inter-attempt delay; abandoned when shutdown is raised.
    fn pause_between_attempts(&self) -> Result<(), ConnectorError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(ConnectorError::ShuttingDown);
        }
        std::thread::sleep(self.config.retry_delay);
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(ConnectorError::ShuttingDown);
        }
        Ok(())
    }

    fn transport_mut(&mut self) -> Result<&mut (dyn RpcTransport + 'static), RpcError> {
        self.transport
            .as_deref_mut()
            .ok_or_else(|| RpcError::Protocol("no active session".into()))
    }

    fn rpc_get_info(&mut self) -> Result<NodeInfo, RpcError> {
        let value = self.transport_mut()?.call(METHOD_GET_INFO, json!({}))?;
        serde_json::from_value(value).map_err(|e| RpcError::Protocol(e.to_string()))
    }

    fn rpc_get_template(&mut self, payout: &ValidatedAddress) -> Result<TemplateRecord, RpcError> {
        let params = json!({ "pay_address": payout.display });
        let value = self
            .transport_mut()?
            .call(METHOD_GET_BLOCK_TEMPLATE, params)?;
        serde_json::from_value(value).map_err(|e| RpcError::Protocol(e.to_string()))
    }

    fn rpc_submit(&mut self, header_hex: &str) -> Result<SubmitRecord, RpcError> {
        let params = json!({ "header": header_hex });
        let value = self.transport_mut()?.call(METHOD_SUBMIT_BLOCK, params)?;
        serde_json::from_value(value).map_err(|e| RpcError::Protocol(e.to_string()))
    }
}

/// Expand a wire template record into the mining representation.
fn template_from_record(record: TemplateRecord) -> Result<BlockTemplate, ConnectorError> {
    let header_prefix =
        hex::decode(&record.header_prefix).map_err(|e| ConnectorError::InvalidTemplate {
            field: "header_prefix",
            detail: e.to_string(),
        })?;
    if header_prefix.is_empty() {
        return Err(ConnectorError::InvalidTemplate {
            field: "header_prefix",
            detail: "empty".into(),
        });
    }

    Ok(BlockTemplate {
        job_id: record.job_id,
        target: bits_to_target(record.bits),
        header_prefix,
        height: record.height,
        reward: Amount::from_units(record.reward),
        issued_at: record.timestamp,
    })
}
