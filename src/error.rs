use std::io;

use thiserror::Error;

use crate::types::HostPort;

/// Problems with the run's inputs. All of these are raised before any probe is sent.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid port token {token:?}: {reason}")]
    InvalidPortToken { token: String, reason: String },

    #[error("invalid port range {token:?}: start {start} > end {end}")]
    InvertedRange { token: String, start: u32, end: u32 },

    #[error("invalid host:port entry {0:?}")]
    InvalidHostPort(String),

    #[error("invalid target {target:?}: {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to fetch config {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("malformed config JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Fatal scan failures. Refused and timed-out probes are not errors.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("probe to {target} failed ({kind:?}): {source}")]
    Probe {
        target: HostPort,
        kind: io::ErrorKind,
        #[source]
        source: io::Error,
    },

    #[error("probe task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
