// api-gateway/src/main.rs

//! API gateway binary.
//!
//! This binary exposes a small HTTP API on top of the `tera` crate:
//!
//! - `GET /health`
//! - `POST /publish` (root content or gatekept extensions)
//! - `POST /query` (similarity ranking over stored content)
//! - `GET /stats`, `GET /peers`, `POST /shutdown`
//!
//! It embeds a RocksDB-backed store, the node's gatekeeper and
//! interest filter, and a Prometheus metrics exporter on `/metrics`.

mod config;
mod routes;
mod state;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tokio::signal;
use tokio::sync::Notify;

use config::ApiConfig;
use routes::{extensions, health, node};
use state::{AppState, SharedState};
use tera::{DefaultStore, Gatekeeper, InterestFilter, MetricsRegistry, TeraConfig};

#[tokio::main]
async fn main() {
    // Basic tracing setup.
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "api_gateway=info,tera=info".to_string()),
        )
        .init();

    if let Err(e) = run().await {
        eprintln!("fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    // For now we use default configs. These can be externalised later.
    let api_cfg = ApiConfig::default();
    let node_cfg = TeraConfig::default();

    // ---------------------------
    // Metrics
    // ---------------------------

    let metrics = Arc::new(
        MetricsRegistry::new()
            .map_err(|e| format!("failed to initialise metrics registry: {e}"))?,
    );

    // Metrics exporter.
    if node_cfg.metrics.enabled {
        let metrics_clone = metrics.clone();
        let addr = node_cfg.metrics.listen_addr;
        tokio::spawn(async move {
            if let Err(e) = tera::run_prometheus_http_server(metrics_clone, addr).await {
                eprintln!("metrics HTTP server error: {e}");
            }
        });
        tracing::info!("metrics exporter listening on http://{}/metrics", addr);
    }

    // ---------------------------
    // Storage + gatekeeper
    // ---------------------------

    let store = DefaultStore::open(&node_cfg.storage).map_err(|e| {
        format!(
            "failed to open RocksDB store at {}: {e}",
            node_cfg.storage.path
        )
    })?;

    let filter = InterestFilter::new(node_cfg.node.interests.clone(), node_cfg.kernel)
        .map_err(|e| format!("invalid kernel parameters: {e}"))?;
    let gatekeeper = Gatekeeper::new();

    // ---------------------------
    // Shared state
    // ---------------------------

    let app_state: SharedState = Arc::new(AppState {
        store,
        gatekeeper,
        filter,
        metrics: metrics.clone(),
        peers: node_cfg.node.peers.clone(),
        shutdown: Notify::new(),
    });

    // ---------------------------
    // HTTP router
    // ---------------------------

    let app = Router::new()
        .route("/health", get(health::health))
        .route("/publish", post(extensions::publish))
        .route("/query", post(extensions::query))
        .route("/stats", get(node::stats))
        .route("/peers", get(node::peers))
        .route("/shutdown", post(node::shutdown))
        .with_state(app_state.clone());

    // ---------------------------
    // axum 0.8 server (hyper 1 / tokio 1.48 style)
    // ---------------------------

    tracing::info!("API gateway listening on http://{}", api_cfg.listen_addr);

    let listener = tokio::net::TcpListener::bind(api_cfg.listen_addr)
        .await
        .map_err(|e| format!("failed to bind {}: {e}", api_cfg.listen_addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(app_state))
        .await
        .map_err(|e| format!("API server error: {e}"))?;

    Ok(())
}

/// Waits for Ctrl-C or the `/shutdown` route, used for graceful
/// shutdown.
async fn shutdown_signal(state: SharedState) {
    tokio::select! {
        _ = signal::ctrl_c() => {},
        _ = state.shutdown.notified() => {},
    }
    tracing::info!("shutdown signal received");
}
