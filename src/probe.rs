use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time;

use crate::error::ScanError;
use crate::types::HostPort;

/// Per-attempt connect budget. Keeps a filtered port from pinning a concurrency slot.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Transport used by the scanner to attempt one connection.
///
/// `Ok(())` means the target accepted the connection. Implementations must not
/// apply their own retry; the scanner makes exactly one attempt per target.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, target: &HostPort) -> io::Result<()>;
}

/// Plain TCP connect, followed by a best-effort graceful close.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, target: &HostPort) -> io::Result<()> {
        let mut stream = TcpStream::connect((target.host.as_str(), target.port)).await?;
        // Close failures say nothing about whether the port is open.
        let _ = stream.shutdown().await;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Open,
    /// Refused, or no answer within the per-attempt timeout.
    Closed,
}

/// Make one connection attempt and classify it.
///
/// Refusals and timeouts are negative results. Every other I/O error is returned
/// as a fatal [`ScanError`], since hiding it would report the port as closed.
pub async fn probe<C: Connector + ?Sized>(
    connector: &C,
    target: &HostPort,
    per_attempt: Duration,
) -> Result<ProbeOutcome, ScanError> {
    match time::timeout(per_attempt, connector.connect(target)).await {
        Ok(Ok(())) => Ok(ProbeOutcome::Open),
        Err(_elapsed) => Ok(ProbeOutcome::Closed),
        Ok(Err(e)) => match e.kind() {
            io::ErrorKind::ConnectionRefused | io::ErrorKind::TimedOut => Ok(ProbeOutcome::Closed),
            kind => Err(ScanError::Probe {
                target: target.clone(),
                kind,
                source: e,
            }),
        },
    }
}
