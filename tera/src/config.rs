//! Top-level configuration for a tera node.
//!
//! This module aggregates configuration for:
//!
//! - storage (RocksDB path and creation flags),
//! - the similarity kernel (weights and threshold),
//! - the metrics exporter (enable flag + listen address),
//! - node behaviour (interests, peers, demo extension interval).
//!
//! The goal is to have a single `TeraConfig` struct that higher-level
//! binaries (e.g. `main.rs` or the API gateway) can construct from
//! defaults, config files, or environment variables as needed.

use std::net::SocketAddr;

use crate::similarity::KernelParams;
use crate::store::RocksDbConfig;

/// Configuration for the Prometheus metrics exporter.
#[derive(Clone, Debug)]
pub struct MetricsConfig {
    /// Whether to run a `/metrics` HTTP exporter.
    pub enabled: bool,
    /// Address to bind the metrics HTTP server to.
    pub listen_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        // Safe to unwrap: this is a fixed, valid address literal.
        let addr: SocketAddr = "127.0.0.1:9898"
            .parse()
            .expect("hard-coded metrics listen address should parse");
        Self {
            enabled: true,
            listen_addr: addr,
        }
    }
}

/// Node-level behaviour knobs.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// Interests this node admits extensions for.
    pub interests: Vec<String>,
    /// Known peer addresses, reported by the boundary API.
    pub peers: Vec<String>,
    /// Interval between demo-node chain extensions, in seconds.
    pub extend_interval_secs: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            interests: vec![
                "machine learning".to_string(),
                "distributed storage".to_string(),
            ],
            peers: Vec::new(),
            extend_interval_secs: 5,
        }
    }
}

/// Top-level configuration for a tera node.
///
/// This aggregates all the sub-configs needed to wire up a typical
/// node:
///
/// - persistent storage (`storage`),
/// - similarity kernel parameters (`kernel`),
/// - Prometheus metrics exporter (`metrics`),
/// - node behaviour (`node`).
#[derive(Clone, Debug, Default)]
pub struct TeraConfig {
    pub storage: RocksDbConfig,
    pub kernel: KernelParams,
    pub metrics: MetricsConfig,
    pub node: NodeConfig,
}
