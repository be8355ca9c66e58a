//! Shared application state for the gateway.

use std::sync::Arc;

use tokio::sync::Notify;

use tera::{DefaultStore, Gatekeeper, InterestFilter, MetricsRegistry};

/// Shared state held by the API and background tasks.
///
/// This is wrapped in an [`Arc`] and passed to request handlers via
/// Axum's `State` extractor. The store and gatekeeper are internally
/// synchronised, so no outer lock is needed.
pub struct AppState {
    /// Durable content store and extension graph.
    pub store: DefaultStore,
    /// Two-gate admission policy with its counters.
    pub gatekeeper: Gatekeeper,
    /// Interests this node admits extensions for.
    pub filter: InterestFilter,
    /// Metrics registry shared between the gatekeeper and the API.
    pub metrics: Arc<MetricsRegistry>,
    /// Known peer addresses, reported by `GET /peers`.
    pub peers: Vec<String>,
    /// Signalled by `POST /shutdown` to stop the server gracefully.
    pub shutdown: Notify,
}

/// Thread-safe alias for `AppState`.
pub type SharedState = Arc<AppState>;
