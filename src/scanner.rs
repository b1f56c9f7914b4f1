use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::ScanError;
use crate::probe::{probe, Connector, ProbeOutcome, DEFAULT_PROBE_TIMEOUT};
use crate::types::{HostPort, ScanResult};

/// Bounded-parallel TCP connect scanner with a wall-clock budget for the whole run.
#[derive(Debug, Clone)]
pub struct Scanner {
    parallelism: usize,
    timeout: Duration,
    probe_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Complete,
    TimedOut,
    Cancelled,
}

impl ScanState {
    fn as_str(self) -> &'static str {
        match self {
            ScanState::Complete => "complete",
            ScanState::TimedOut => "timed out",
            ScanState::Cancelled => "cancelled",
        }
    }
}

const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

type ProbeResult = Result<Option<HostPort>, ScanError>;

impl Scanner {
    /// `parallelism` caps simultaneously open sockets; `timeout` bounds the entire scan.
    pub fn new(parallelism: usize, timeout: Duration) -> Self {
        let clamped = parallelism.clamp(1, Semaphore::MAX_PERMITS);
        if clamped != parallelism {
            warn!("Parallelism {parallelism} is out of range; using {clamped}");
        }
        Self {
            parallelism: clamped,
            timeout,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    pub fn with_probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    pub async fn scan<C: Connector>(
        &self,
        targets: &[HostPort],
        connector: Arc<C>,
    ) -> Result<ScanResult, ScanError> {
        self.scan_with_cancel(targets, connector, CancellationToken::new())
            .await
    }

    /// Probe every target, at most `parallelism` at a time, and return those that accepted.
    ///
    /// Reaching the deadline or `cancel` stops admission, drops in-flight probes and
    /// returns what was found so far. That is a normal return, not an error. A probe
    /// failing with anything other than refusal or timeout aborts the whole scan.
    pub async fn scan_with_cancel<C: Connector>(
        &self,
        targets: &[HostPort],
        connector: Arc<C>,
        cancel: CancellationToken,
    ) -> Result<ScanResult, ScanError> {
        let started = Instant::now();
        info!(
            "Scanning {} targets (parallelism {}, timeout {:?}, per-probe {:?})",
            targets.len(),
            self.parallelism,
            self.timeout,
            self.probe_timeout
        );

        let sem = Arc::new(Semaphore::new(self.parallelism));
        let mut set: JoinSet<ProbeResult> = JoinSet::new();
        let mut open: ScanResult = Vec::new();
        let mut pending = targets.iter();
        let mut next = pending.next();

        // Budgets too large to represent as an instant never expire in practice.
        let deadline_at = started
            .checked_add(self.timeout)
            .unwrap_or_else(|| started + FAR_FUTURE);
        let deadline = time::sleep_until(deadline_at);
        tokio::pin!(deadline);

        let state = loop {
            if next.is_none() && set.is_empty() {
                break ScanState::Complete;
            }

            tokio::select! {
                biased;

                _ = &mut deadline => break ScanState::TimedOut,
                _ = cancel.cancelled() => break ScanState::Cancelled,

                joined = set.join_next(), if !set.is_empty() => {
                    if let Some(joined) = joined {
                        if let Err(e) = collect(joined, &mut open) {
                            set.abort_all();
                            return Err(e);
                        }
                    }
                }

                permit = sem.clone().acquire_owned(), if next.is_some() => {
                    let Ok(permit) = permit else {
                        break ScanState::Cancelled;
                    };
                    if let Some(target) = next.take() {
                        let connector = Arc::clone(&connector);
                        let target = target.clone();
                        let per_attempt = self.probe_timeout;
                        set.spawn(async move {
                            let _permit = permit; // held until the probe finishes
                            match probe(connector.as_ref(), &target, per_attempt).await? {
                                ProbeOutcome::Open => Ok(Some(target)),
                                ProbeOutcome::Closed => Ok(None),
                            }
                        });
                    }
                    next = pending.next();
                }
            }
        };

        if state != ScanState::Complete {
            // Keep probes that already finished; drop the rest without further I/O.
            while let Some(joined) = set.try_join_next() {
                collect(joined, &mut open)?;
            }
            let dropped = set.len();
            set.abort_all();
            if dropped > 0 {
                debug!("Dropped {dropped} in-flight probes");
            }
            if state == ScanState::TimedOut {
                warn!("Scan deadline of {:?} reached before all targets were probed", self.timeout);
            }
        }

        info!(
            "Scan {} after {:?}: {} open",
            state.as_str(),
            started.elapsed(),
            open.len()
        );
        Ok(open)
    }
}

fn collect(
    joined: Result<ProbeResult, tokio::task::JoinError>,
    open: &mut ScanResult,
) -> Result<(), ScanError> {
    if let Some(target) = joined?? {
        debug!("{target} is open");
        open.push(target);
    }
    Ok(())
}
