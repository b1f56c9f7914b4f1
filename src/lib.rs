//! Library crate for hopps: finds TCP ports open unexpectedly on a fleet's public IPs.
pub mod config;
pub mod error;
pub mod inventory;
pub mod metrics;
pub mod pipeline;
pub mod ports;
pub mod probe;
pub mod report;
pub mod scanner;
pub mod targets;
pub mod types;
