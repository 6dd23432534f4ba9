//! In-process clustered message bus.
//!
//! A [`Cluster`] is a set of named nodes. Clients attach to a node with
//! [`Cluster::connect`] using `mem://<node>` URLs and then publish and
//! subscribe on dot-separated subjects. Messages published on one node reach
//! subscribers on every node, but a subscription only becomes visible to the
//! *other* nodes once the cluster's route delay has elapsed; anything
//! published to it remotely before then is dropped, as on a real routed bus.

use pingbench_common::PingBenchError;
use std::time::Duration;
use thiserror::Error;

mod cluster;
mod connection;
mod subject;

pub use cluster::Cluster;
pub use connection::{ConnectOptions, Connection, Message, Stats, Subscription};
pub use subject::{new_inbox, subject_matches};

/// URL scheme accepted by [`Cluster::connect`].
pub const URL_SCHEME: &str = "mem://";

/// Error types for bus operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("no servers available for connection: {0}")]
    NoServers(String),

    #[error("authorization violation")]
    AuthorizationViolation,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("invalid subject: {0:?}")]
    InvalidSubject(String),

    #[error("no responders available for request on {0:?}")]
    NoResponders(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

/// Result type for bus operations
pub type Result<T> = std::result::Result<T, BusError>;

impl From<BusError> for PingBenchError {
    fn from(err: BusError) -> Self {
        match err {
            BusError::InvalidUrl(_)
            | BusError::NoServers(_)
            | BusError::AuthorizationViolation
            | BusError::ConnectionClosed => PingBenchError::ConnectionFailure(err.to_string()),
            BusError::InvalidSubject(_)
            | BusError::NoResponders(_)
            | BusError::Timeout(_) => PingBenchError::RpcFailure(err.to_string()),
        }
    }
}
