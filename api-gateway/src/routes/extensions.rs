use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};

use tera::{Content, DualHash, GroupHash, KernelParams, TeraError, extract, rank_by_similarity};

use crate::state::SharedState;

/// Request body for `POST /publish`.
///
/// Two modes:
///
/// - `content` alone publishes root content;
/// - `parent_hex` + `delta` publishes an extension of a stored
///   parent, which must pass the gatekeeper to be admitted.
#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    /// Root content to store, for root publishes.
    pub content: Option<String>,
    /// Hex hash of the stored parent, for extension publishes.
    pub parent_hex: Option<String>,
    /// Bytes to append to the parent, for extension publishes.
    pub delta: Option<String>,
    /// Optional publisher identity recorded on the edge.
    pub publisher: Option<String>,
}

/// Response body for `POST /publish`.
#[derive(Debug, Serialize)]
pub struct PublishResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
}

/// `POST /publish`
///
/// Stores root content directly, or runs a candidate extension
/// through the gatekeeper and records it only when admitted.
pub async fn publish(
    State(state): State<SharedState>,
    Json(body): Json<PublishRequest>,
) -> Result<(StatusCode, Json<PublishResponse>), (StatusCode, String)> {
    match (body.content, body.parent_hex, body.delta) {
        (Some(content), None, None) => publish_root(&state, content.as_bytes()),
        (None, Some(parent_hex), Some(delta)) => {
            publish_extension(&state, &parent_hex, delta.as_bytes(), body.publisher)
        }
        _ => Err((
            StatusCode::BAD_REQUEST,
            "pass either content, or parent_hex and delta".to_string(),
        )),
    }
}

fn publish_root(
    state: &SharedState,
    content: &[u8],
) -> Result<(StatusCode, Json<PublishResponse>), (StatusCode, String)> {
    let (hash, _) = state.store.put(content).map_err(as_http_error)?;
    Ok((
        StatusCode::CREATED,
        Json(PublishResponse {
            status: "stored",
            hash: Some(hash.to_hex()),
            reason: None,
            similarity: None,
        }),
    ))
}

fn publish_extension(
    state: &SharedState,
    parent_hex: &str,
    delta: &[u8],
    publisher: Option<String>,
) -> Result<(StatusCode, Json<PublishResponse>), (StatusCode, String)> {
    let parent_hash = GroupHash::from_hex(parent_hex).map_err(as_http_error)?;

    // The parent's full bytes are needed to derive the child's
    // features; the crypto hash stays the stored one (for a non-root
    // parent it is not the element hash of the bytes).
    let parent_bytes = state.store.reconstruct(&parent_hash).map_err(as_http_error)?;
    let parent = Content {
        dual: DualHash {
            crypto: parent_hash,
            semantic: extract(&parent_bytes),
        },
        data: parent_bytes,
    };

    let (ext, child) = parent.extend(delta, Some(current_unix_timestamp()), publisher);
    let decision = state.gatekeeper.admit(&ext, &state.filter);
    state.metrics.gatekeeper.record(&decision);

    if !decision.forward {
        return Ok((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(PublishResponse {
                status: "blocked",
                hash: None,
                reason: decision.reason.map(|r| r.to_string()),
                similarity: decision.similarity,
            }),
        ));
    }

    state.store.add_extension(&ext).map_err(as_http_error)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(PublishResponse {
            status: "forwarded",
            hash: Some(child.dual.crypto.to_hex()),
            reason: None,
            similarity: decision.similarity,
        }),
    ))
}

/// Request body for `POST /query`.
#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    /// Query text to rank stored content against.
    pub content: String,
    /// Kernel parameters; the node defaults apply when omitted.
    pub params: Option<KernelParams>,
    /// Maximum number of matches to return (default 10).
    pub limit: Option<usize>,
}

/// One ranked match in a query response.
#[derive(Debug, Serialize)]
pub struct QueryMatch {
    pub hash: String,
    pub score: f64,
}

/// Response body for `POST /query`.
#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub matches: Vec<QueryMatch>,
}

/// `POST /query`
///
/// Ranks every stored content (reconstructed from its chain) by
/// similarity to the query text, best first.
pub async fn query(
    State(state): State<SharedState>,
    Json(body): Json<QueryRequest>,
) -> Result<(StatusCode, Json<QueryResponse>), (StatusCode, String)> {
    let params = body.params.unwrap_or(*state.filter.params());
    params.validate().map_err(as_http_error)?;

    let query_features = extract(body.content.as_bytes());
    let limit = body.limit.unwrap_or(10);

    let hashes = state.store.list().map_err(as_http_error)?;
    let mut features = Vec::with_capacity(hashes.len());
    for hash in &hashes {
        let bytes = state.store.reconstruct(hash).map_err(as_http_error)?;
        features.push(extract(&bytes));
    }

    let matches = rank_by_similarity(&query_features, &features, &params)
        .into_iter()
        .take(limit)
        .map(|(index, score)| QueryMatch {
            hash: hashes[index].to_hex(),
            score,
        })
        .collect();

    Ok((StatusCode::OK, Json(QueryResponse { matches })))
}

pub(crate) fn as_http_error(err: TeraError) -> (StatusCode, String) {
    let status = match &err {
        TeraError::NotFound(_) => StatusCode::NOT_FOUND,
        TeraError::InvalidEncoding(_) | TeraError::InvalidParameters(_) => StatusCode::BAD_REQUEST,
        TeraError::InvalidExtension(_) => StatusCode::UNPROCESSABLE_ENTITY,
        TeraError::CorruptIndex(_) | TeraError::TransactionFailed(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, err.to_string())
}

fn current_unix_timestamp() -> u64 {
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs()
}
