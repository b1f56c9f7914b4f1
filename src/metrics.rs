use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use log::info;
use serde_json::{json, Value};
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Count,
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Count => f.write_str("Count"),
        }
    }
}

/// Destination for the final anomaly count. Sinks forward once; no batching or retry.
#[async_trait]
pub trait MetricSink: Send + Sync {
    async fn push(&self, namespace: &str, metric: &str, value: u64, unit: Unit) -> Result<()>;
}

/// Only logs the metric.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl MetricSink for LogSink {
    async fn push(&self, namespace: &str, metric: &str, value: u64, unit: Unit) -> Result<()> {
        info!("{namespace}/{metric}={value} ({unit})");
        Ok(())
    }
}

/// Prints a CloudWatch Embedded Metric Format document on stdout.
///
/// When running as a serverless function, CloudWatch extracts the metric from the log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmfSink;

impl EmfSink {
    pub fn document(namespace: &str, metric: &str, value: u64, unit: Unit, timestamp_ms: i64) -> Value {
        let mut doc = json!({
            "_aws": {
                "Timestamp": timestamp_ms,
                "CloudWatchMetrics": [{
                    "Namespace": namespace,
                    "Dimensions": [[]],
                    "Metrics": [{"Name": metric, "Unit": unit.to_string()}]
                }]
            }
        });
        doc[metric] = json!(value);
        doc
    }
}

#[async_trait]
impl MetricSink for EmfSink {
    async fn push(&self, namespace: &str, metric: &str, value: u64, unit: Unit) -> Result<()> {
        let now_ms = (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64;
        let doc = Self::document(namespace, metric, value, unit, now_ms);
        info!("{namespace}/{metric}={value}");
        println!("{}", serde_json::to_string(&doc)?);
        Ok(())
    }
}
