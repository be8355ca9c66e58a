//! Persisted JSON forms and the on-disk keyspace layout.
//!
//! Every value in the store is canonical JSON under one of five fixed
//! key prefixes:
//!
//! - `blk:<hex>` -> [`StoredBlock`] (`{hash, data: b64, size, timestamp}`),
//! - `idx:<hex>` -> [`BlockRole`] (root or delta marker),
//! - `ext:<hex>` -> [`ExtensionRecord`], keyed by child hash,
//! - `children:<hex>` -> JSON array of child hex strings,
//! - `root:<hex>` -> JSON array of descendant hex strings.

use serde::{Deserialize, Serialize};

use crate::hash::GroupHash;
use crate::types::{DualHash, Extension};

/// Key prefix for stored blobs.
pub const BLOCK_PREFIX: &str = "blk:";
/// Key prefix for block role markers.
pub const ROLE_PREFIX: &str = "idx:";
/// Key prefix for extension records, keyed by child hash.
pub const EXT_PREFIX: &str = "ext:";
/// Key prefix for child indices, keyed by parent hash.
pub const CHILDREN_PREFIX: &str = "children:";
/// Key prefix for descendant indices, keyed by root hash.
pub const ROOT_PREFIX: &str = "root:";

pub(crate) fn block_key(hash: &GroupHash) -> String {
    format!("{BLOCK_PREFIX}{}", hash.to_hex())
}

pub(crate) fn role_key(hash: &GroupHash) -> String {
    format!("{ROLE_PREFIX}{}", hash.to_hex())
}

pub(crate) fn ext_key(hash: &GroupHash) -> String {
    format!("{EXT_PREFIX}{}", hash.to_hex())
}

pub(crate) fn children_key(hash: &GroupHash) -> String {
    format!("{CHILDREN_PREFIX}{}", hash.to_hex())
}

pub(crate) fn root_key(hash: &GroupHash) -> String {
    format!("{ROOT_PREFIX}{}", hash.to_hex())
}

/// Serde helper encoding byte payloads as standard base64 strings.
mod b64 {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}

/// One persisted blob.
///
/// Root content stores its full bytes; a child stores only its delta
/// bytes, keyed by the child's group hash.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredBlock {
    /// Group hash the blob is keyed by.
    pub hash: GroupHash,
    /// The blob bytes, base64 in the persisted JSON.
    #[serde(with = "b64")]
    pub data: Vec<u8>,
    /// Length of `data` in bytes.
    pub size: u64,
    /// Wall-clock storage time, seconds since Unix epoch.
    pub timestamp: u64,
}

/// Whether a block holds full root bytes or only a delta.
///
/// A block must never appear as both; `add_extension` refuses a child
/// that is already marked as a root.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockRole {
    /// Block stores full content bytes.
    Root,
    /// Block stores only the delta bytes of an edge.
    Delta,
}

/// Persisted form of an accepted edge, keyed by child hash.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExtensionRecord {
    /// Parent group hash, hex in the persisted JSON.
    pub parent: GroupHash,
    /// Child group hash, hex in the persisted JSON.
    pub child: GroupHash,
    /// Delta bytes, base64 in the persisted JSON.
    #[serde(with = "b64")]
    pub delta: Vec<u8>,
    /// Full dual hash of the child.
    pub child_dual_hash: DualHash,
    /// Wall-clock publication time, if the publisher supplied one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    /// Opaque publisher identity, if supplied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
}

impl ExtensionRecord {
    /// Builds the persisted record for an accepted extension.
    pub fn from_extension(ext: &Extension) -> Self {
        Self {
            parent: ext.parent.crypto,
            child: ext.child.crypto,
            delta: ext.delta.clone(),
            child_dual_hash: ext.child.clone(),
            timestamp: ext.timestamp,
            publisher: ext.publisher.clone(),
        }
    }
}
