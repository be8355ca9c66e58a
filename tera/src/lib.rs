//! Tera library crate.
//!
//! This crate provides the core building blocks for a
//! content-addressed extension store whose primary identifier is a
//! homomorphic set hash:
//!
//! - group arithmetic and set hashing (`hash`),
//! - semantic feature extraction (`features`),
//! - the parameterised similarity kernel (`similarity`),
//! - strongly-typed domain types (`types`),
//! - the transactional content store and extension graph (`store`),
//! - the two-gate admission policy (`gatekeeper`),
//! - wire message schema for the gossip transport (`protocol`),
//! - in-process gossip simulation and boundary hooks (`gossip`),
//! - Prometheus-based metrics (`metrics`),
//! - and a top-level node configuration (`config`).
//!
//! Higher-level binaries can compose these pieces to build nodes,
//! gateways, and experiment harnesses.

pub mod config;
pub mod error;
pub mod features;
pub mod gatekeeper;
pub mod gossip;
pub mod hash;
pub mod metrics;
pub mod protocol;
pub mod similarity;
pub mod store;
pub mod types;

// Re-export top-level configuration types.
pub use config::{MetricsConfig, NodeConfig, TeraConfig};

// Re-export the error type.
pub use error::TeraError;

// Re-export the hash primitive.
pub use hash::{GroupHash, HASH_LEN, combine, element_hash, extend, set_hash, verify_extension};

// Re-export features and the similarity kernel.
pub use features::{Features, extract};
pub use similarity::{KernelParams, rank_by_similarity, relevant, similarity};

// Re-export domain types.
pub use types::{Content, DualHash, Extension};

// Re-export the store, its backends, and its result types.
pub use store::{
    AuditReport, BlockRole, ChainVerification, DefaultStore, ExtensionRecord, MemoryBackend,
    MemoryStore, RocksDbBackend, RocksDbConfig, StepVerification, StoredBlock, TeraStore,
};

// Re-export the gatekeeper.
pub use gatekeeper::{BlockReason, Decision, GateCounters, Gatekeeper, InterestFilter, Query};

// Re-export the wire protocol and gossip surface.
pub use gossip::{CancelToken, NodeDecision, PropagationReport, SimNetwork, SimNode};
pub use protocol::{
    ExtensionMessage, GOSSIP_TOPIC, Inbound, PROTOCOL_VERSION, QueryMessage, QueryResponseMessage,
};

// Re-export metrics registry and exporter.
pub use metrics::{GatekeeperMetrics, MetricsRegistry, StoreMetrics, run_prometheus_http_server};
