//! Core domain types shared across the store.
//!
//! The goal is to avoid "naked" byte buffers and hash pairs in public
//! APIs: content always travels with its [`DualHash`], and a candidate
//! edge in the extension graph is an [`Extension`] value carrying both
//! endpoints.

use serde::{Deserialize, Serialize};

use crate::features::{Features, extract};
use crate::hash::{self, GroupHash, element_hash};

/// Cryptographic identity plus semantic fingerprint of one piece of
/// content.
///
/// The two halves describe the same bytes: `crypto` is the homomorphic
/// group hash (for roots, the element hash of the bytes; for children,
/// the parent hash extended by the delta), and `semantic` is the
/// feature record extracted from the full content.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DualHash {
    /// Homomorphic group hash of the content.
    pub crypto: GroupHash,
    /// Extracted feature record of the content.
    pub semantic: Features,
}

impl DualHash {
    /// Builds the dual hash of root content: element hash plus
    /// extracted features of the same bytes.
    pub fn of(data: &[u8]) -> Self {
        Self {
            crypto: element_hash(data),
            semantic: extract(data),
        }
    }
}

/// Raw bytes together with their dual hash.
///
/// A content is a *root* when it is not the child of any recorded
/// edge.
#[derive(Clone, Debug, PartialEq)]
pub struct Content {
    /// The full content bytes.
    pub data: Vec<u8>,
    /// Dual hash of `data`.
    pub dual: DualHash,
}

impl Content {
    /// Builds root content from raw bytes, computing its dual hash.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        let dual = DualHash::of(&data);
        Self { data, dual }
    }

    /// Derives a child by appending `delta` to this content.
    ///
    /// The child's crypto hash is the O(1) homomorphic extension of
    /// this content's hash; its features are extracted from the full
    /// child bytes. Returns the edge and the child content.
    pub fn extend(
        &self,
        delta: &[u8],
        timestamp: Option<u64>,
        publisher: Option<String>,
    ) -> (Extension, Content) {
        let mut child_data = self.data.clone();
        child_data.extend_from_slice(delta);

        let child_dual = DualHash {
            crypto: hash::extend(&self.dual.crypto, delta),
            semantic: extract(&child_data),
        };
        let child = Content {
            data: child_data,
            dual: child_dual.clone(),
        };
        let extension = Extension {
            parent: self.dual.clone(),
            delta: delta.to_vec(),
            child: child_dual,
            timestamp,
            publisher,
        };
        (extension, child)
    }
}

/// A candidate edge in the extension graph: parent, delta, child.
///
/// The mandatory invariant is
/// `child.crypto == parent.crypto + e(delta) (mod p)`; every consumer
/// checks it via [`Extension::crypto_valid`] before trusting the edge.
#[derive(Clone, Debug, PartialEq)]
pub struct Extension {
    /// Dual hash of the parent content.
    pub parent: DualHash,
    /// Bytes appended to the parent to produce the child.
    pub delta: Vec<u8>,
    /// Dual hash of the child content.
    pub child: DualHash,
    /// Wall-clock publication time, seconds since Unix epoch.
    pub timestamp: Option<u64>,
    /// Opaque publisher identity.
    pub publisher: Option<String>,
}

impl Extension {
    /// Checks the homomorphic extension equality for this edge.
    pub fn crypto_valid(&self) -> bool {
        hash::verify_extension(&self.parent.crypto, &self.child.crypto, &self.delta)
    }
}
