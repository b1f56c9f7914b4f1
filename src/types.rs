use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// One scan target, and the unit of the expectation set.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostPort {
    pub host: String,
    pub port: u16,
}

impl HostPort {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for HostPort {
    type Err = ConfigError;

    /// Parses `host:port`. The port is taken after the last colon so bracket-free
    /// IPv6 literals like `::1:22` still split on the port.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| ConfigError::InvalidHostPort(s.to_string()))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(ConfigError::InvalidHostPort(s.to_string()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidHostPort(s.to_string()))?;
        Ok(HostPort::new(host, port))
    }
}

/// Allow-listed open ports. Loaded once, read-only afterwards.
pub type ExpectationSet = HashSet<HostPort>;

/// Ordered, shuffled list of targets handed to the scanner.
pub type TargetList = Vec<HostPort>;

/// Targets that accepted a connection. Order is not meaningful.
pub type ScanResult = Vec<HostPort>;
