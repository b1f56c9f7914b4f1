use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::info;
use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::inventory::PublicIpProvider;
use crate::metrics::{MetricSink, Unit};
use crate::ports::parse_port_spec;
use crate::probe::Connector;
use crate::report::report_results;
use crate::scanner::Scanner;
use crate::targets::generate_targets;
use crate::types::ExpectationSet;

/// Effective options for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub ports: String,
    pub timeout: Duration,
    pub parallelism: usize,
    pub probe_timeout: Duration,
    pub namespace: String,
    pub metric: String,
}

/// One full pass: parse ports, list hosts, shuffle targets, scan, diff, push the count.
///
/// Port spec errors surface before the inventory is queried or any probe is sent.
/// Returns the number of unexpected open ports.
pub async fn run<C, R>(
    settings: &Settings,
    expectations: &ExpectationSet,
    inventory: &dyn PublicIpProvider,
    connector: Arc<C>,
    sink: &dyn MetricSink,
    rng: &mut R,
    cancel: CancellationToken,
) -> Result<usize>
where
    C: Connector,
    R: Rng + ?Sized,
{
    let ports = parse_port_spec(&settings.ports).context("parse: invalid --ports")?;

    let hosts = inventory
        .public_ips()
        .await
        .context("inventory: failed to list public IPs")?;
    info!("Found public IPs: {hosts:?}");

    let targets = generate_targets(&hosts, &ports, rng);
    info!("Scanning {} ip:port pairs.", targets.len());

    let scanner = Scanner::new(settings.parallelism, settings.timeout)
        .with_probe_timeout(settings.probe_timeout);
    let open = scanner
        .scan_with_cancel(&targets, connector, cancel)
        .await
        .context("scan")?;

    let unexpected = report_results(&open, expectations);

    sink.push(
        &settings.namespace,
        &settings.metric,
        unexpected as u64,
        Unit::Count,
    )
    .await
    .context("metric: failed to push unexpected-port count")?;

    Ok(unexpected)
}
