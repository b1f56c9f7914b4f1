use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hopps::error::ScanError;
use hopps::probe::Connector;
use hopps::scanner::Scanner;
use hopps::types::HostPort;
use tokio::net::TcpListener;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

/// Fake transport: ports listed in `open` accept, everything else refuses.
/// Tracks how many connects are in flight at once.
struct Instrumented {
    open: Vec<u16>,
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl Instrumented {
    fn new(open: Vec<u16>, delay: Duration) -> Self {
        Self {
            open,
            delay,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Connector for Instrumented {
    async fn connect(&self, target: &HostPort) -> io::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.open.contains(&target.port) {
            Ok(())
        } else {
            Err(io::Error::from(io::ErrorKind::ConnectionRefused))
        }
    }
}

/// Never resolves on `hang_port`, opens immediately on every other port.
struct HangsOn {
    hang_port: u16,
}

#[async_trait]
impl Connector for HangsOn {
    async fn connect(&self, target: &HostPort) -> io::Result<()> {
        if target.port == self.hang_port {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

struct FailsOn {
    port: u16,
}

#[async_trait]
impl Connector for FailsOn {
    async fn connect(&self, target: &HostPort) -> io::Result<()> {
        if target.port == self.port {
            return Err(io::Error::from(io::ErrorKind::PermissionDenied));
        }
        Err(io::Error::from(io::ErrorKind::ConnectionRefused))
    }
}

fn targets(host: &str, ports: impl IntoIterator<Item = u16>) -> Vec<HostPort> {
    ports.into_iter().map(|p| HostPort::new(host, p)).collect()
}

fn sorted(mut v: Vec<HostPort>) -> Vec<HostPort> {
    v.sort();
    v
}

#[tokio::test]
async fn zero_targets_return_immediately() {
    let scanner = Scanner::new(8, Duration::from_secs(30));
    let started = Instant::now();
    let open = scanner
        .scan(&[], Arc::new(Instrumented::new(vec![], Duration::ZERO)))
        .await
        .unwrap();
    assert!(open.is_empty());
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn peak_in_flight_never_exceeds_parallelism() {
    for parallelism in [1usize, 5, 50] {
        let connector = Arc::new(Instrumented::new(vec![], Duration::from_millis(5)));
        let list = targets("10.0.0.1", 1..=120);
        let scanner = Scanner::new(parallelism, Duration::from_secs(30));
        scanner.scan(&list, connector.clone()).await.unwrap();
        let peak = connector.peak.load(Ordering::SeqCst);
        assert!(peak <= parallelism, "peak {peak} > {parallelism}");
        assert!(peak >= 1);
        assert_eq!(connector.calls.load(Ordering::SeqCst), list.len());
    }
}

#[tokio::test]
async fn collects_only_open_targets() {
    let connector = Arc::new(Instrumented::new(vec![22, 443], Duration::from_millis(1)));
    let mut list = targets("A", [80, 22, 443, 8080]);
    list.extend(targets("B", [22, 25]));
    let open = Scanner::new(3, Duration::from_secs(30))
        .scan(&list, connector)
        .await
        .unwrap();
    assert_eq!(
        sorted(open),
        vec![
            HostPort::new("A", 22),
            HostPort::new("A", 443),
            HostPort::new("B", 22),
        ]
    );
}

#[tokio::test]
async fn duplicate_targets_are_reported_per_success() {
    let connector = Arc::new(Instrumented::new(vec![80], Duration::ZERO));
    let list = targets("A", [80, 80]);
    let open = Scanner::new(2, Duration::from_secs(30))
        .scan(&list, connector)
        .await
        .unwrap();
    assert_eq!(open, vec![HostPort::new("A", 80), HostPort::new("A", 80)]);
}

#[tokio::test]
async fn deadline_returns_partial_results_without_hanging() {
    // With the per-probe timeout far beyond the scan budget, only the global deadline can end the scan.
    let mut list = targets("A", [1, 2, 3]);
    list.extend(targets("A", [9; 4]));
    let scanner = Scanner::new(8, Duration::from_millis(300))
        .with_probe_timeout(Duration::from_secs(3600));
    let started = Instant::now();
    let open = scanner
        .scan(&list, Arc::new(HangsOn { hang_port: 9 }))
        .await
        .unwrap();
    let elapsed = started.elapsed();
    assert!(elapsed < Duration::from_secs(2), "took {elapsed:?}");
    assert_eq!(sorted(open), targets("A", [1, 2, 3]));
}

#[tokio::test]
async fn nothing_is_admitted_after_the_deadline() {
    let connector = Arc::new(Instrumented::new(vec![], Duration::from_millis(100)));
    let list = targets("A", 1..=50);
    let open = Scanner::new(1, Duration::from_millis(250))
        .scan(&list, connector.clone())
        .await
        .unwrap();
    assert!(open.is_empty());
    let calls = connector.calls.load(Ordering::SeqCst);
    assert!(calls <= 4, "{calls} probes started within a 250ms budget");
    time::sleep(Duration::from_millis(300)).await;
    assert_eq!(connector.calls.load(Ordering::SeqCst), calls);
}

#[tokio::test]
async fn hung_probe_is_bounded_by_probe_timeout() {
    let list = targets("A", [9, 10]);
    let open = Scanner::new(2, Duration::from_secs(30))
        .with_probe_timeout(Duration::from_millis(50))
        .scan(&list, Arc::new(HangsOn { hang_port: 9 }))
        .await
        .unwrap();
    assert_eq!(open, vec![HostPort::new("A", 10)]);
}

#[tokio::test]
async fn non_refusal_error_aborts_the_scan() {
    let list = targets("A", 1..=20);
    let err = Scanner::new(4, Duration::from_secs(30))
        .scan(&list, Arc::new(FailsOn { port: 13 }))
        .await
        .unwrap_err();
    match err {
        ScanError::Probe { target, kind, .. } => {
            assert_eq!(target, HostPort::new("A", 13));
            assert_eq!(kind, io::ErrorKind::PermissionDenied);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn cancellation_stops_the_scan_like_a_deadline() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let connector = Arc::new(Instrumented::new(vec![80], Duration::ZERO));
    let open = Scanner::new(4, Duration::from_secs(30))
        .scan_with_cancel(&targets("A", [80, 81]), connector.clone(), cancel)
        .await
        .unwrap();
    assert!(open.is_empty());
    assert_eq!(connector.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn scans_real_loopback_sockets() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let open_port = listener.local_addr().unwrap().port();
    let closed_port = {
        let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
        l.local_addr().unwrap().port()
    };
    let list = targets("127.0.0.1", [open_port, closed_port]);
    let open = Scanner::new(2, Duration::from_secs(10))
        .scan(&list, Arc::new(hopps::probe::TcpConnector))
        .await
        .unwrap();
    assert_eq!(open, vec![HostPort::new("127.0.0.1", open_port)]);
}

/// Stops the scan from inside the connect, so the probe has already finished
/// when the scanner notices the stop.
struct StopsScan {
    cancel: CancellationToken,
    fail: bool,
}

#[async_trait]
impl Connector for StopsScan {
    async fn connect(&self, _target: &HostPort) -> io::Result<()> {
        self.cancel.cancel();
        if self.fail {
            Err(io::Error::from(io::ErrorKind::PermissionDenied))
        } else {
            Ok(())
        }
    }
}

#[tokio::test]
async fn huge_timeout_does_not_overflow_the_deadline() {
    let scanner = Scanner::new(4, Duration::from_secs(u64::MAX));
    let open = scanner
        .scan(&[], Arc::new(hopps::probe::TcpConnector))
        .await
        .unwrap();
    assert!(open.is_empty());

    let connector = Arc::new(Instrumented::new(vec![80], Duration::ZERO));
    let open = scanner
        .scan(&targets("A", [80, 81]), connector)
        .await
        .unwrap();
    assert_eq!(open, vec![HostPort::new("A", 80)]);
}

#[tokio::test]
async fn zero_parallelism_still_scans_one_at_a_time() {
    let scanner = Scanner::new(0, Duration::from_secs(30));
    assert_eq!(scanner.parallelism(), 1);
    let connector = Arc::new(Instrumented::new(vec![], Duration::from_millis(1)));
    scanner
        .scan(&targets("A", 1..=5), connector.clone())
        .await
        .unwrap();
    assert_eq!(connector.peak.load(Ordering::SeqCst), 1);
    assert_eq!(connector.calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn finished_open_result_is_kept_when_the_scan_stops() {
    let cancel = CancellationToken::new();
    let connector = Arc::new(StopsScan {
        cancel: cancel.clone(),
        fail: false,
    });
    let open = Scanner::new(1, Duration::from_secs(30))
        .scan_with_cancel(&targets("A", [80]), connector, cancel)
        .await
        .unwrap();
    assert_eq!(open, vec![HostPort::new("A", 80)]);
}

#[tokio::test]
async fn fatal_error_finished_before_the_stop_still_fails_the_scan() {
    let cancel = CancellationToken::new();
    let connector = Arc::new(StopsScan {
        cancel: cancel.clone(),
        fail: true,
    });
    let err = Scanner::new(1, Duration::from_secs(30))
        .scan_with_cancel(&targets("A", [22]), connector, cancel)
        .await
        .unwrap_err();
    assert!(
        matches!(err, ScanError::Probe { kind: io::ErrorKind::PermissionDenied, .. }),
        "{err:?}"
    );
}
