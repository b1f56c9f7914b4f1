use std::iter;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio_util::sync::CancellationToken;

use hopps::config::load_config;
use hopps::inventory::StaticInventory;
use hopps::metrics::{EmfSink, LogSink, MetricSink};
use hopps::pipeline::{self, Settings};
use hopps::ports::DEFAULT_PORT_SPEC;
use hopps::probe::TcpConnector;

/// hopps — scans public IPs for TCP ports that are open unexpectedly.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "hopps",
    version,
    about = "Scans public IPs for TCP ports that are open unexpectedly.",
    long_about = None
)]
struct Cli {
    /// The TCP port numbers to scan. Example: "1-1024,18080".
    #[arg(long, default_value = DEFAULT_PORT_SPEC)]
    ports: String,

    /// Maximum time the port scanner is allowed to run (in seconds).
    #[arg(long, default_value_t = 240)]
    timeout: u64,

    /// Maximum number of sockets to attempt to open at once.
    /// Defaults to min(32, open file limit / 2).
    #[arg(long, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    parallelism: Option<usize>,

    /// JSON file defining expected open host:port pairs. May be a local path, s3:// or http(s):// URL.
    /// s3:// objects are fetched without credentials, so private buckets need a presigned https:// URL.
    /// Example: {"argv": [], "expectations": {"open": ["192.231.42.1:53"]}}
    #[arg(long)]
    config: Option<String>,

    /// CloudWatch namespace to report to.
    #[arg(long, default_value = "Hopps")]
    cloudwatch_namespace: String,

    /// CloudWatch metric for the number of unexpected open ports.
    #[arg(long, default_value = "NumUnexpectedPortsOpen")]
    cloudwatch_metric: String,

    /// Hosts to scan: IPs, hostnames or IPv4 CIDRs, comma-separated. Overrides `targets` in the config.
    #[arg(long, value_delimiter = ',')]
    targets: Vec<String>,

    /// Connect timeout for a single probe in milliseconds.
    #[arg(long = "probe-timeout-ms", default_value_t = 1000)]
    probe_timeout_ms: u64,

    /// Take all other options from the config's `argv` list instead of the command line.
    #[arg(long = "argv-from-config", default_value_t = false)]
    argv_from_config: bool,

    /// Where to send the unexpected-port count.
    #[arg(long = "metric-sink", value_enum, default_value_t = SinkKind::Log)]
    metric_sink: SinkKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SinkKind {
    /// Log the metric only.
    Log,
    /// Print a CloudWatch Embedded Metric Format line on stdout.
    Emf,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("argv: {:?}", std::env::args().collect::<Vec<_>>());

    let mut cli = Cli::parse();
    let config = load_config(cli.config.as_deref())
        .await
        .context("config: failed to load")?;
    if cli.argv_from_config {
        let argv = iter::once("hopps".to_string()).chain(config.argv.iter().cloned());
        cli = Cli::try_parse_from(argv).context("config: invalid argv")?;
    }
    info!("Configuration: {cli:?}");

    let expectations = config
        .expectation_set()
        .context("config: invalid expectations")?;
    let entries = if cli.targets.is_empty() {
        &config.targets
    } else {
        &cli.targets
    };
    let inventory = StaticInventory::from_entries(entries).context("config: invalid targets")?;
    if inventory.hosts().is_empty() {
        warn!("No hosts to scan; pass --targets or set `targets` in the config");
    }

    let settings = Settings {
        ports: cli.ports.clone(),
        timeout: Duration::from_secs(cli.timeout),
        parallelism: cli.parallelism.unwrap_or_else(default_parallelism),
        probe_timeout: Duration::from_millis(cli.probe_timeout_ms),
        namespace: cli.cloudwatch_namespace.clone(),
        metric: cli.cloudwatch_metric.clone(),
    };

    // Ctrl-C stops admitting probes and reports what was found so far.
    let cancel = CancellationToken::new();
    let cancel_ctrlc = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_ctrlc.cancel();
        }
    });

    let sink: Box<dyn MetricSink> = match cli.metric_sink {
        SinkKind::Log => Box::new(LogSink),
        SinkKind::Emf => Box::new(EmfSink),
    };

    let mut rng = StdRng::from_entropy();
    pipeline::run(
        &settings,
        &expectations,
        &inventory,
        Arc::new(TcpConnector),
        sink.as_ref(),
        &mut rng,
        cancel,
    )
    .await?;
    Ok(())
}

/// Half the open-file limit, capped at 32.
#[cfg(unix)]
fn default_parallelism() -> usize {
    use rlimit::Resource;

    match Resource::NOFILE.get() {
        Ok((soft, _)) => (soft / 2).clamp(1, 32) as usize,
        Err(e) => {
            warn!("Could not read the open file limit ({e}); using parallelism 32");
            32
        }
    }
}

#[cfg(not(unix))]
fn default_parallelism() -> usize {
    32
}
