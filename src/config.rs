use log::info;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::types::{ExpectationSet, HostPort};

/// The JSON configuration document.
///
/// ```json
/// {"argv": ["--ports", "22,443"],
///  "targets": ["203.0.113.10"],
///  "expectations": {"open": ["203.0.113.10:443"]}}
/// ```
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Command-line options, used when options come from the config instead of the process.
    pub argv: Vec<String>,
    pub expectations: Expectations,
    /// Hosts to scan (IPs, hostnames or IPv4 CIDRs) for the static inventory.
    pub targets: Vec<String>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Expectations {
    pub open: Vec<ExpectationEntry>,
}

/// `"host:port"` or `["host", port]`.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum ExpectationEntry {
    Text(String),
    Pair(String, u16),
}

impl ExpectationEntry {
    pub fn to_host_port(&self) -> Result<HostPort, ConfigError> {
        match self {
            ExpectationEntry::Text(s) => s.parse(),
            ExpectationEntry::Pair(host, port) => Ok(HostPort::new(host.clone(), *port)),
        }
    }
}

impl Config {
    pub fn expectation_set(&self) -> Result<ExpectationSet, ConfigError> {
        self.expectations
            .open
            .iter()
            .map(ExpectationEntry::to_host_port)
            .collect()
    }
}

pub fn parse_config(bytes: &[u8]) -> Result<Config, ConfigError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Load the config from `path`, or an empty config when no path is given.
pub async fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    info!("Reading config from {path}");
    let bytes = read_config_bytes(path).await?;
    parse_config(&bytes)
}

/// Fetch raw config bytes from a local path, an `s3://bucket/key` URI or an `http(s)://` URL.
///
/// S3 objects are read anonymously. A bucket outside the default region answers with its
/// region in `x-amz-bucket-region`, and the request is repeated once against that region.
pub async fn read_config_bytes(path: &str) -> Result<Vec<u8>, ConfigError> {
    if let Some(rest) = path.strip_prefix("s3://") {
        let location = S3Location::parse(rest).ok_or_else(|| ConfigError::Fetch {
            url: path.to_string(),
            reason: "expected s3://bucket/key".into(),
        })?;
        return fetch_s3(&location).await;
    }
    if path.starts_with("http://") || path.starts_with("https://") {
        let resp = get(path).await?;
        return body(path, resp).await;
    }
    tokio::fs::read(path).await.map_err(|source| ConfigError::Read {
        path: path.to_string(),
        source,
    })
}

const BUCKET_REGION_HEADER: &str = "x-amz-bucket-region";

#[derive(Debug, Clone, PartialEq, Eq)]
struct S3Location {
    bucket: String,
    key: String,
}

impl S3Location {
    fn parse(bucket_and_key: &str) -> Option<Self> {
        let (bucket, key) = bucket_and_key.split_once('/')?;
        let key = key.trim_start_matches('/');
        if bucket.is_empty() || key.is_empty() {
            return None;
        }
        Some(Self {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    /// Path-style addressing so bucket names containing dots still resolve.
    fn url(&self, region: Option<&str>) -> String {
        match region {
            Some(region) => format!("https://s3.{region}.amazonaws.com/{}/{}", self.bucket, self.key),
            None => format!("https://s3.amazonaws.com/{}/{}", self.bucket, self.key),
        }
    }
}

async fn fetch_s3(location: &S3Location) -> Result<Vec<u8>, ConfigError> {
    let url = location.url(None);
    let resp = get(&url).await?;
    if resp.status().is_success() {
        return body(&url, resp).await;
    }
    let region = resp
        .headers()
        .get(BUCKET_REGION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let Some(region) = region else {
        return body(&url, resp).await;
    };
    let regional = location.url(Some(&region));
    info!("Bucket {} is in {region}; retrying at {regional}", location.bucket);
    let resp = get(&regional).await?;
    body(&regional, resp).await
}

async fn get(url: &str) -> Result<reqwest::Response, ConfigError> {
    reqwest::get(url).await.map_err(|e| ConfigError::Fetch {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

async fn body(url: &str, resp: reqwest::Response) -> Result<Vec<u8>, ConfigError> {
    let fail = |reason: String| ConfigError::Fetch {
        url: url.to_string(),
        reason,
    };
    let status = resp.status();
    if !status.is_success() {
        return Err(fail(format!("HTTP {status}")));
    }
    let bytes = resp.bytes().await.map_err(|e| fail(e.to_string()))?;
    Ok(bytes.to_vec())
}
