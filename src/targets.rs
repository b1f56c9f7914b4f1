use rand::seq::SliceRandom;
use rand::Rng;

use crate::types::{HostPort, TargetList};

/// Build every `(host, port)` pair, host-major, then shuffle the whole list.
///
/// Shuffling keeps a deadline-truncated scan from always covering the same
/// leading hosts and ports. The RNG is passed in so callers can seed it.
pub fn generate_targets<R: Rng + ?Sized>(hosts: &[String], ports: &[u16], rng: &mut R) -> TargetList {
    let mut targets = cartesian(hosts, ports);
    targets.shuffle(rng);
    targets
}

fn cartesian(hosts: &[String], ports: &[u16]) -> TargetList {
    let mut out = Vec::with_capacity(hosts.len() * ports.len());
    for host in hosts {
        for &port in ports {
            out.push(HostPort::new(host.clone(), port));
        }
    }
    out
}
