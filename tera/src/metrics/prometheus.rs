//! Prometheus-backed metrics and HTTP exporter.
//!
//! This module defines a [`MetricsRegistry`] that owns a Prometheus
//! registry and strongly-typed gatekeeper/store metrics, and an
//! async HTTP exporter that serves `/metrics` using `hyper`.

use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use bytes::Bytes;
use http_body_util::Full;
use hyper::{
    Method, Request, Response, StatusCode, body::Incoming, header, server::conn::http1,
    service::service_fn,
};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder,
};

use crate::gatekeeper::{BlockReason, Decision};

/// Gatekeeper-related Prometheus metrics.
///
/// These are registered into a [`Registry`] and updated from
/// admission decisions via [`GatekeeperMetrics::record`].
#[derive(Clone)]
pub struct GatekeeperMetrics {
    /// Total extensions inspected by the gatekeeper.
    pub extensions_seen: IntCounter,
    /// Extensions blocked at the crypto gate.
    pub crypto_blocked: IntCounter,
    /// Extensions blocked at the semantic gate.
    pub semantic_blocked: IntCounter,
    /// Extensions admitted and re-announced.
    pub forwarded: IntCounter,
    /// Distribution of similarity scores seen at the semantic gate.
    pub similarity_score: Histogram,
}

impl GatekeeperMetrics {
    /// Registers gatekeeper metrics into the given `Registry`.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let extensions_seen = IntCounter::with_opts(Opts::new(
            "gatekeeper_extensions_seen_total",
            "Total number of extensions inspected by the gatekeeper",
        ))?;
        registry.register(Box::new(extensions_seen.clone()))?;

        let crypto_blocked = IntCounter::with_opts(Opts::new(
            "gatekeeper_crypto_blocked_total",
            "Extensions rejected because the homomorphic equality failed",
        ))?;
        registry.register(Box::new(crypto_blocked.clone()))?;

        let semantic_blocked = IntCounter::with_opts(Opts::new(
            "gatekeeper_semantic_blocked_total",
            "Extensions rejected because no interest found them relevant",
        ))?;
        registry.register(Box::new(semantic_blocked.clone()))?;

        let forwarded = IntCounter::with_opts(Opts::new(
            "gatekeeper_forwarded_total",
            "Extensions admitted and re-announced",
        ))?;
        registry.register(Box::new(forwarded.clone()))?;

        let similarity_score = Histogram::with_opts(
            HistogramOpts::new(
                "gatekeeper_similarity_score",
                "Similarity scores computed at the semantic gate (0..1)",
            )
            .buckets(vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0]),
        )?;
        registry.register(Box::new(similarity_score.clone()))?;

        Ok(Self {
            extensions_seen,
            crypto_blocked,
            semantic_blocked,
            forwarded,
            similarity_score,
        })
    }

    /// Records one admission decision.
    pub fn record(&self, decision: &Decision) {
        self.extensions_seen.inc();
        match decision.reason {
            Some(BlockReason::Crypto) => self.crypto_blocked.inc(),
            Some(BlockReason::Semantic) => self.semantic_blocked.inc(),
            None => self.forwarded.inc(),
        }
        if let Some(score) = decision.similarity {
            self.similarity_score.observe(score);
        }
    }
}

/// Store-related Prometheus metrics.
#[derive(Clone)]
pub struct StoreMetrics {
    /// Number of blocks currently stored.
    pub blocks: IntGauge,
    /// Total stored payload bytes.
    pub stored_bytes: IntGauge,
}

impl StoreMetrics {
    /// Registers store metrics into the given `Registry`.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let blocks = IntGauge::with_opts(Opts::new(
            "store_blocks",
            "Number of blocks currently stored",
        ))?;
        registry.register(Box::new(blocks.clone()))?;

        let stored_bytes = IntGauge::with_opts(Opts::new(
            "store_bytes",
            "Total stored payload bytes across all blocks",
        ))?;
        registry.register(Box::new(stored_bytes.clone()))?;

        Ok(Self {
            blocks,
            stored_bytes,
        })
    }
}

/// Wrapper around a Prometheus registry and the node metrics.
///
/// This is the main handle you pass around in a node. It can be
/// wrapped in an [`Arc`] and shared across threads/tasks.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,
    pub gatekeeper: GatekeeperMetrics,
    pub store: StoreMetrics,
}

impl MetricsRegistry {
    /// Creates a new `MetricsRegistry` with a fresh underlying
    /// `Registry` and registers the gatekeeper and store metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("tera".to_string()), None)?;
        let gatekeeper = GatekeeperMetrics::register(&registry)?;
        let store = StoreMetrics::register(&registry)?;
        Ok(Self {
            registry,
            gatekeeper,
            store,
        })
    }

    /// Encodes all metrics in this registry into the Prometheus text
    /// format.
    pub fn gather_text(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::warn!("failed to encode Prometheus metrics: {e}");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Runs an HTTP server that exposes Prometheus metrics.
///
/// The server listens on `addr` and serves `GET /metrics` with the
/// Prometheus text exposition format. All other paths return 404.
///
/// This function is `async` and is intended to be spawned onto a
/// Tokio runtime.
pub async fn run_prometheus_http_server(
    metrics: Arc<MetricsRegistry>,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let svc = service_fn(move |req| {
                let metrics = metrics.clone();
                handle_request(req, metrics)
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, svc).await {
                tracing::warn!("prometheus HTTP server error: {err}");
            }
        });
    }
}

async fn handle_request(
    req: Request<Incoming>,
    metrics: Arc<MetricsRegistry>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let body = metrics.gather_text();
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
                .body(Full::new(Bytes::from(body)))
                .unwrap())
        }
        _ => Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("not found")))
            .unwrap()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gatekeeper::BlockReason;
    use prometheus::Registry;

    fn forwarded_decision(score: f64) -> Decision {
        Decision {
            forward: true,
            reason: None,
            crypto_valid: true,
            similarity: Some(score),
        }
    }

    #[test]
    fn gatekeeper_metrics_register_and_record() {
        let registry = Registry::new();
        let metrics = GatekeeperMetrics::register(&registry).expect("register metrics");

        metrics.record(&forwarded_decision(0.74));
        metrics.record(&Decision {
            forward: false,
            reason: Some(BlockReason::Crypto),
            crypto_valid: false,
            similarity: None,
        });
        metrics.record(&Decision {
            forward: false,
            reason: Some(BlockReason::Semantic),
            crypto_valid: true,
            similarity: Some(0.12),
        });

        assert_eq!(metrics.extensions_seen.get(), 3);
        assert_eq!(metrics.crypto_blocked.get(), 1);
        assert_eq!(metrics.semantic_blocked.get(), 1);
        assert_eq!(metrics.forwarded.get(), 1);
    }

    #[test]
    fn metrics_registry_gather_text_works() {
        let registry = MetricsRegistry::new().expect("create metrics registry");
        registry.gatekeeper.record(&forwarded_decision(0.5));
        registry.store.blocks.set(3);

        let text = registry.gather_text();
        assert!(text.contains("gatekeeper_extensions_seen_total"));
        assert!(text.contains("store_blocks"));
    }
}
