use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Smallest payload the benchmark accepts: the 8-byte `number` field.
pub const MIN_MSG_SIZE: usize = 8;

/// Route of the echo operation, shared by the HTTP server and the bus responder.
pub const PING_PATH: &str = "/ping.v1.PingService/Ping";

/// Subject (and virtual host) the echo service listens on when tunnelled over the bus.
pub const DEFAULT_SERVICE_HOST: &str = "localhost.bus";

/// Endpoint used when none is given on the command line.
pub const DEFAULT_URL: &str = "mem://local";

/// Error types for PingBench operations
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PingBenchError {
    #[error("Connection failure: {0}")]
    ConnectionFailure(String),

    #[error("Couldn't receive end-to-end test message on {subject} within {waited_ms} ms")]
    RoutingTimeout { subject: String, waited_ms: u64 },

    #[error("RPC failure: {0}")]
    RpcFailure(String),

    #[error("Empty sample set")]
    EmptySampleSet,

    #[error("Unable to write {path}: {reason}")]
    ArtifactWriteFailure { path: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for PingBench operations
pub type Result<T> = std::result::Result<T, PingBenchError>;

/// Request of the echo operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingRequest {
    pub number: i64,
    #[serde(default)]
    pub text: String,
}

/// Response of the echo operation; mirrors the request field for field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingResponse {
    pub number: i64,
    #[serde(default)]
    pub text: String,
}

impl From<PingRequest> for PingResponse {
    fn from(request: PingRequest) -> Self {
        Self { number: request.number, text: request.text }
    }
}

/// HTTP-shaped request carried as the payload of a bus message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcRequestFrame {
    pub method: String,
    pub path: String,
    pub body: String,
}

/// Reply to an [`RpcRequestFrame`], published on the request's reply subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcResponseFrame {
    pub status: u16,
    pub body: String,
}

/// JSON error envelope returned by the echo service for all error responses
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Layout of an in-process bus cluster, loadable from a JSON file.
///
/// `route_delay_ms` is how long a subscription created on one node takes to
/// become visible to publishers connected to the other nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    pub nodes: Vec<String>,
    #[serde(default)]
    pub route_delay_ms: u64,
    #[serde(default)]
    pub credentials: Option<String>,
}

impl Default for Topology {
    fn default() -> Self {
        Self { nodes: vec!["local".to_string()], route_delay_ms: 0, credentials: None }
    }
}

/// TLS settings applied by transports that speak TLS.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsOptions {
    /// Use TLS but skip certificate verification.
    pub insecure: bool,
    pub ca_file: Option<PathBuf>,
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
}
