// src/main.rs
//
// Minimal demo node that wires up the tera library:
//
// - RocksDB-backed store
// - Gatekeeper with an interest filter built from the node config
// - Prometheus metrics exporter on /metrics
// - Simple loop that extends a demo chain at a fixed interval, with
//   every extension passing through the gatekeeper first.

use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use tera::{
    Content, DefaultStore, Gatekeeper, InterestFilter, MetricsRegistry, TeraConfig,
    run_prometheus_http_server,
};

#[tokio::main]
async fn main() {
    if let Err(err) = run_node().await {
        eprintln!("fatal error: {err}");
        std::process::exit(1);
    }
}

async fn run_node() -> Result<(), String> {
    // For now, just use defaults. Later you can load from a file/CLI/env.
    let cfg = TeraConfig::default();

    // ---------------------------
    // Metrics registry + exporter
    // ---------------------------

    let metrics = Arc::new(
        MetricsRegistry::new()
            .map_err(|e| format!("failed to initialise metrics registry: {e}"))?,
    );

    if cfg.metrics.enabled {
        let metrics_clone = metrics.clone();
        let addr = cfg.metrics.listen_addr;
        tokio::spawn(async move {
            if let Err(e) = run_prometheus_http_server(metrics_clone, addr).await {
                eprintln!("metrics HTTP server error: {e}");
            }
        });
        eprintln!("metrics exporter listening on http://{}/metrics", addr);
    }

    // ---------------------------
    // Storage backend (RocksDB)
    // ---------------------------

    let store = DefaultStore::open(&cfg.storage).map_err(|e| {
        format!(
            "failed to open RocksDB store at {}: {e}",
            cfg.storage.path
        )
    })?;

    // ---------------------------
    // Gatekeeper + interest filter
    // ---------------------------

    let filter = InterestFilter::new(cfg.node.interests.clone(), cfg.kernel)
        .map_err(|e| format!("invalid kernel parameters: {e}"))?;
    let gatekeeper = Gatekeeper::new();

    // ---------------------------
    // Seed root (idempotent)
    // ---------------------------

    let mut tip = Content::new("machine learning and distributed storage demo chain");
    store
        .put(&tip.data)
        .map_err(|e| format!("failed to seed root content: {e}"))?;

    let interval = cfg.node.extend_interval_secs;
    eprintln!(
        "starting demo node with extend_interval_secs={} root={}",
        interval,
        tip.dual.crypto.to_hex()
    );

    // ---------------------------
    // Main extension loop
    // ---------------------------

    let mut sequence = 0u64;
    loop {
        let timestamp = current_unix_timestamp();
        let delta = format!(" learning update {sequence} at {timestamp}");
        let (ext, child) = tip.extend(delta.as_bytes(), Some(timestamp), Some("demo-node".to_string()));

        let decision = gatekeeper.admit(&ext, &filter);
        metrics.gatekeeper.record(&decision);

        if decision.forward {
            match store.add_extension(&ext) {
                Ok(_) => {
                    println!(
                        "extended chain child={} similarity={:.3}",
                        child.dual.crypto.to_hex(),
                        decision.similarity.unwrap_or_default(),
                    );
                    tip = child;
                    sequence += 1;
                }
                Err(e) => {
                    eprintln!("failed to store extension: {e}");
                }
            }
        } else {
            eprintln!(
                "gatekeeper blocked demo extension: {:?}",
                decision.reason
            );
        }

        if let (Ok(blocks), Ok(bytes)) = (store.count(), store.total_size()) {
            metrics.store.blocks.set(blocks as i64);
            metrics.store.stored_bytes.set(bytes as i64);
        }

        tokio::time::sleep(Duration::from_secs(interval.max(1))).await;
    }
}

/// Returns the current wall-clock time as seconds since Unix epoch.
///
/// On error (system clock before epoch) this falls back to 0.
fn current_unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs()
}
