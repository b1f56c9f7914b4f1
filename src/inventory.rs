use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};

use anyhow::Result;
use async_trait::async_trait;
use ipnet::{IpNet, Ipv4Net};

use crate::error::ConfigError;

/// Source of the public addresses to scan. Implementations list live hosts only.
#[async_trait]
pub trait PublicIpProvider: Send + Sync {
    async fn public_ips(&self) -> Result<Vec<String>>;
}

/// Fixed host list taken from the command line or the config document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticInventory {
    hosts: Vec<String>,
}

impl StaticInventory {
    /// Build from entries that are IPs, hostnames or IPv4 CIDRs.
    ///
    /// CIDRs expand to their host addresses. Duplicates are dropped, first seen wins.
    pub fn from_entries<S: AsRef<str>>(entries: &[S]) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        let mut hosts = Vec::new();
        for entry in entries {
            let entry = entry.as_ref().trim();
            if entry.is_empty() {
                continue;
            }
            for host in expand_entry(entry)? {
                if seen.insert(host.clone()) {
                    hosts.push(host);
                }
            }
        }
        Ok(Self { hosts })
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }
}

#[async_trait]
impl PublicIpProvider for StaticInventory {
    async fn public_ips(&self) -> Result<Vec<String>> {
        Ok(self.hosts.clone())
    }
}

fn expand_entry(entry: &str) -> Result<Vec<String>, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidTarget {
        target: entry.to_string(),
        reason,
    };
    if !entry.contains('/') {
        return Ok(vec![entry.to_string()]);
    }
    match entry.parse::<IpNet>().map_err(|e| invalid(e.to_string()))? {
        IpNet::V4(n4) => Ok(expand_ipv4net_hosts(n4)
            .into_iter()
            .map(|ip| IpAddr::V4(ip).to_string())
            .collect()),
        IpNet::V6(_) => Err(invalid("IPv6 networks are too large to scan".into())),
    }
}

/// Host addresses of an IPv4 network. /31 and /32 have no network/broadcast pair,
/// so every address in them is a host.
fn expand_ipv4net_hosts(net: Ipv4Net) -> Vec<Ipv4Addr> {
    let start = u32::from(net.network());
    let end = u32::from(net.broadcast());
    if net.prefix_len() >= 31 {
        return (start..=end).map(Ipv4Addr::from).collect();
    }
    (start + 1..end).map(Ipv4Addr::from).collect()
}
