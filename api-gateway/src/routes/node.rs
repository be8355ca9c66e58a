use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use tera::GateCounters;

use crate::routes::extensions::as_http_error;
use crate::state::SharedState;

/// Response body for `GET /stats`.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    /// Gatekeeper admission counters.
    pub gatekeeper: GateCounters,
    /// Number of blocks currently stored.
    pub blocks: usize,
    /// Total stored payload bytes.
    pub total_size: u64,
}

/// `GET /stats`
///
/// Reports gatekeeper counters and store totals, refreshing the
/// store gauges as a side effect.
pub async fn stats(
    State(state): State<SharedState>,
) -> Result<(StatusCode, Json<StatsResponse>), (StatusCode, String)> {
    let blocks = state.store.count().map_err(as_http_error)?;
    let total_size = state.store.total_size().map_err(as_http_error)?;

    state.metrics.store.blocks.set(blocks as i64);
    state.metrics.store.stored_bytes.set(total_size as i64);

    Ok((
        StatusCode::OK,
        Json(StatsResponse {
            gatekeeper: state.gatekeeper.counters(),
            blocks,
            total_size,
        }),
    ))
}

/// Response body for `GET /peers`.
#[derive(Debug, Serialize)]
pub struct PeersResponse {
    pub peers: Vec<String>,
}

/// `GET /peers`
///
/// Lists the peer addresses this node knows about.
pub async fn peers(State(state): State<SharedState>) -> (StatusCode, Json<PeersResponse>) {
    (
        StatusCode::OK,
        Json(PeersResponse {
            peers: state.peers.clone(),
        }),
    )
}

/// Response body for `POST /shutdown`.
#[derive(Debug, Serialize)]
pub struct ShutdownResponse {
    pub status: &'static str,
}

/// `POST /shutdown`
///
/// Asks the server to shut down gracefully. In-flight requests
/// complete before the process exits.
pub async fn shutdown(State(state): State<SharedState>) -> (StatusCode, Json<ShutdownResponse>) {
    state.shutdown.notify_waiters();
    (
        StatusCode::ACCEPTED,
        Json(ShutdownResponse {
            status: "shutting down",
        }),
    )
}
