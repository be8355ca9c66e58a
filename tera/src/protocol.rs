//! Wire message schema consumed by the gossip transport.
//!
//! The transport only ever sees framed JSON envelopes:
//!
//! ```json
//! {"type": "extension", "version": "tera/1.0.0", "payload": { ... }}
//! ```
//!
//! Type is one of `extension`, `query`, or `query_response`; a
//! version mismatch rejects the message on receive. The transport
//! itself (peer discovery, pub/sub, framing) lives outside the core;
//! it only needs to deliver bytes shaped like this on the
//! [`GOSSIP_TOPIC`].

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TeraError;
use crate::features::Features;
use crate::hash::GroupHash;
use crate::similarity::KernelParams;
use crate::types::{DualHash, Extension};

/// Protocol version string compared on receive.
pub const PROTOCOL_VERSION: &str = "tera/1.0.0";

/// Gossip topic the transport publishes extension envelopes on.
pub const GOSSIP_TOPIC: &str = "tera/extensions/v1";

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    version: String,
    payload: Value,
}

/// An extension announcement: both dual hashes plus the delta bytes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExtensionMessage {
    /// Hex group hash of the parent.
    pub parent_crypto: String,
    /// Feature record of the parent content.
    pub parent_semantic: Features,
    /// Base64 delta bytes.
    pub new_data: String,
    /// Hex group hash of the child.
    pub new_crypto: String,
    /// Feature record of the child content.
    pub new_semantic: Features,
    /// Wall-clock publication time, seconds since Unix epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    /// Opaque publisher identity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
}

impl ExtensionMessage {
    /// Encodes an extension for the wire.
    pub fn from_extension(ext: &Extension) -> Self {
        Self {
            parent_crypto: ext.parent.crypto.to_hex(),
            parent_semantic: ext.parent.semantic.clone(),
            new_data: BASE64.encode(&ext.delta),
            new_crypto: ext.child.crypto.to_hex(),
            new_semantic: ext.child.semantic.clone(),
            timestamp: ext.timestamp,
            publisher: ext.publisher.clone(),
        }
    }

    /// Decodes the wire form back into an [`Extension`].
    ///
    /// Only parses; the crypto check is the gatekeeper's job.
    pub fn to_extension(&self) -> Result<Extension, TeraError> {
        let delta = BASE64
            .decode(self.new_data.as_bytes())
            .map_err(|e| TeraError::InvalidEncoding(format!("malformed delta base64: {e}")))?;
        Ok(Extension {
            parent: DualHash {
                crypto: GroupHash::from_hex(&self.parent_crypto)?,
                semantic: self.parent_semantic.clone(),
            },
            delta,
            child: DualHash {
                crypto: GroupHash::from_hex(&self.new_crypto)?,
                semantic: self.new_semantic.clone(),
            },
            timestamp: self.timestamp,
            publisher: self.publisher.clone(),
        })
    }
}

/// A similarity query against a peer's store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryMessage {
    /// Base64 query bytes.
    pub content: String,
    /// Kernel parameters the peer should match with.
    pub params: KernelParams,
    /// Optional hash to resume a paged walk from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_hash: Option<String>,
    /// Correlates the response with this request.
    pub request_id: String,
}

impl QueryMessage {
    /// Builds a query message over raw content bytes.
    pub fn new(content: &[u8], params: KernelParams, request_id: impl Into<String>) -> Self {
        Self {
            content: BASE64.encode(content),
            params,
            from_hash: None,
            request_id: request_id.into(),
        }
    }

    /// Decodes the query bytes.
    pub fn content_bytes(&self) -> Result<Vec<u8>, TeraError> {
        BASE64
            .decode(self.content.as_bytes())
            .map_err(|e| TeraError::InvalidEncoding(format!("malformed query base64: {e}")))
    }
}

/// Matches returned for a [`QueryMessage`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryResponseMessage {
    /// Request this responds to.
    pub request_id: String,
    /// Matching extensions, best first.
    pub matches: Vec<ExtensionMessage>,
}

/// A message decoded from the wire.
#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    /// An extension announcement.
    Extension(ExtensionMessage),
    /// A similarity query.
    Query(QueryMessage),
    /// A response to an earlier query.
    QueryResponse(QueryResponseMessage),
}

fn encode<T: Serialize>(kind: &str, payload: &T) -> Result<Vec<u8>, TeraError> {
    let envelope = Envelope {
        kind: kind.to_string(),
        version: PROTOCOL_VERSION.to_string(),
        payload: serde_json::to_value(payload)?,
    };
    Ok(serde_json::to_vec(&envelope)?)
}

/// Frames an extension message for the wire.
pub fn encode_extension(msg: &ExtensionMessage) -> Result<Vec<u8>, TeraError> {
    encode("extension", msg)
}

/// Frames a query message for the wire.
pub fn encode_query(msg: &QueryMessage) -> Result<Vec<u8>, TeraError> {
    encode("query", msg)
}

/// Frames a query response for the wire.
pub fn encode_query_response(msg: &QueryResponseMessage) -> Result<Vec<u8>, TeraError> {
    encode("query_response", msg)
}

/// Decodes a framed envelope, rejecting version mismatches and
/// unknown message types.
pub fn decode(bytes: &[u8]) -> Result<Inbound, TeraError> {
    let envelope: Envelope = serde_json::from_slice(bytes)?;
    if envelope.version != PROTOCOL_VERSION {
        return Err(TeraError::InvalidEncoding(format!(
            "unsupported protocol version {:?}, expected {PROTOCOL_VERSION:?}",
            envelope.version
        )));
    }
    match envelope.kind.as_str() {
        "extension" => Ok(Inbound::Extension(serde_json::from_value(envelope.payload)?)),
        "query" => Ok(Inbound::Query(serde_json::from_value(envelope.payload)?)),
        "query_response" => Ok(Inbound::QueryResponse(serde_json::from_value(
            envelope.payload,
        )?)),
        other => Err(TeraError::InvalidEncoding(format!(
            "unknown message type {other:?}"
        ))),
    }
}
