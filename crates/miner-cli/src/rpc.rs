//! Node RPC records and the blocking wire transport.
//!
//! The node speaks a line-delimited JSON request/response protocol
//! over TCP. The connector only sees the [`RpcTransport`] trait, so
//! tests drive it with scripted in-process transports.

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const METHOD_GET_INFO: &str = "getInfo";
pub const METHOD_GET_BLOCK_TEMPLATE: &str = "getBlockTemplate";
pub const METHOD_SUBMIT_BLOCK: &str = "submitBlock";

/// RPC failures, split into transport-level problems (retryable) and
/// node-reported errors (retryable only if the node says so).
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed response: {0}")]
    Protocol(String),
    #[error("node error: {message}")]
    Node { message: String, retryable: bool },
}

impl RpcError {
    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            RpcError::Io(_) | RpcError::Protocol(_) => true,
            RpcError::Node { retryable, .. } => *retryable,
        }
    }
}

/// `getInfo` response: node identity and sync status.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeInfo {
    pub version: String,
    pub synced: bool,
    #[serde(default)]
    pub sync_score: u64,
}

/// `getBlockTemplate` response as it comes off the wire. The compact
/// difficulty bits and hex header prefix are expanded by the
/// connector.
#[derive(Debug, Clone, Deserialize)]
pub struct TemplateRecord {
    pub job_id: String,
    pub bits: u32,
    pub header_prefix: String,
    pub height: u64,
    pub reward: u64,
    pub timestamp: u64,
}

/// `submitBlock` response.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitRecord {
    pub accepted: bool,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub retryable: bool,
}

/// A blocking request/response channel to one node.
pub trait RpcTransport: Send {
    fn call(&mut self, method: &str, params: Value) -> Result<Value, RpcError>;
}

#[derive(Debug, Serialize)]
struct Request<'a> {
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct Response {
    id: u64,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default)]
    retryable: bool,
}

/// Line-delimited JSON over a TCP stream with bounded timeouts.
pub struct TcpTransport {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    next_id: u64,
}

impl TcpTransport {
    /// Connect with a short probe timeout (the cheap liveness check;
    /// dead candidates fail fast here) and a longer per-call timeout
    /// for the session.
    pub fn connect(
        addr: SocketAddr,
        probe_timeout: Duration,
        call_timeout: Duration,
    ) -> Result<Self, RpcError> {
        let stream = TcpStream::connect_timeout(&addr, probe_timeout)?;
        stream.set_read_timeout(Some(call_timeout))?;
        stream.set_write_timeout(Some(call_timeout))?;
        stream.set_nodelay(true)?;
        let writer = stream.try_clone()?;
        Ok(TcpTransport {
            reader: BufReader::new(stream),
            writer,
            next_id: 0,
        })
    }
}

impl RpcTransport for TcpTransport {
    fn call(&mut self, method: &str, params: Value) -> Result<Value, RpcError> {
        self.next_id += 1;
        let request = Request {
            id: self.next_id,
            method,
            params,
        };

        let mut line =
            serde_json::to_vec(&request).map_err(|e| RpcError::Protocol(e.to_string()))?;
        line.push(b'\n');
        self.writer.write_all(&line)?;
        self.writer.flush()?;

        let mut buf = String::new();
        let read = self.reader.read_line(&mut buf)?;
        if read == 0 {
            return Err(RpcError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "node closed the connection",
            )));
        }

        let response: Response =
            serde_json::from_str(buf.trim()).map_err(|e| RpcError::Protocol(e.to_string()))?;
        if response.id != self.next_id {
            return Err(RpcError::Protocol(format!(
                "response id {} does not match request id {}",
                response.id, self.next_id
            )));
        }
        if let Some(err) = response.error {
            return Err(RpcError::Node {
                message: err.message,
                retryable: err.retryable,
            });
        }
        response
            .result
            .ok_or_else(|| RpcError::Protocol("response carries neither result nor error".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_node_info_parsing() {
        let info: NodeInfo = serde_json::from_value(json!({
            "version": "0.14.1",
            "synced": true,
            "sync_score": 812_211
        }))
        .unwrap();
        assert!(info.synced);
        assert_eq!(info.sync_score, 812_211);

        // sync_score is optional
        let info: NodeInfo =
            serde_json::from_value(json!({"version": "0.14.1", "synced": false})).unwrap();
        assert!(!info.synced);
        assert_eq!(info.sync_score, 0);
    }

    #[test]
    fn test_submit_record_defaults() {
        let record: SubmitRecord = serde_json::from_value(json!({"accepted": true})).unwrap();
        assert!(record.accepted);
        assert!(record.reason.is_none());
        assert!(!record.retryable);
    }

    #[test]
    fn test_error_classification() {
        let io = RpcError::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "timed out",
        ));
        assert!(io.is_transient());

        let busy = RpcError::Node {
            message: "node busy".into(),
            retryable: true,
        };
        assert!(busy.is_transient());

        let invalid = RpcError::Node {
            message: "bad block".into(),
            retryable: false,
        };
        assert!(!invalid.is_transient());
    }
}
