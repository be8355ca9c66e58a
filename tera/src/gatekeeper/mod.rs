//! Two-gate admission policy for inbound extensions.
//!
//! The gatekeeper decides whether a candidate extension should be
//! stored and forwarded. It runs two gates in order:
//!
//! 1. **crypto**: the homomorphic extension equality must hold for
//!    the claimed parent, delta, and child;
//! 2. **semantic**: the child's features must be relevant to the
//!    query (or to at least one declared interest).
//!
//! The gatekeeper never raises: an invalid extension becomes a
//! counted, structured rejection. Its counters are the only
//! non-transactional shared state in the core and are updated
//! atomically.

pub mod interest;

pub use interest::InterestFilter;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::error::TeraError;
use crate::features::{Features, extract};
use crate::similarity::{KernelParams, similarity};
use crate::types::Extension;

/// Which gate blocked an extension.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockReason {
    /// The homomorphic extension equality failed.
    Crypto,
    /// The extension is valid but not relevant enough.
    Semantic,
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::Crypto => f.write_str("crypto"),
            BlockReason::Semantic => f.write_str("semantic"),
        }
    }
}

/// Outcome of a single admission decision.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Decision {
    /// `true` when the extension should be stored and re-announced.
    pub forward: bool,
    /// Which gate blocked, when `forward` is `false`.
    pub reason: Option<BlockReason>,
    /// Result of the crypto gate.
    pub crypto_valid: bool,
    /// Similarity score from the semantic gate; absent when the
    /// crypto gate already blocked.
    pub similarity: Option<f64>,
}

/// A content query: features of the query text plus kernel
/// parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    /// Features extracted from the query text.
    pub features: Features,
    /// Kernel parameters, validated at construction.
    pub params: KernelParams,
}

impl Query {
    /// Builds a query from raw text, validating the parameters.
    pub fn new(text: &[u8], params: KernelParams) -> Result<Self, TeraError> {
        params.validate()?;
        Ok(Self {
            features: extract(text),
            params,
        })
    }
}

/// Plain-number snapshot of the gatekeeper counters.
///
/// The counters always satisfy
/// `total_seen == crypto_blocked + semantic_blocked + forwarded`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct GateCounters {
    /// Extensions inspected.
    pub total_seen: u64,
    /// Extensions blocked at the crypto gate.
    pub crypto_blocked: u64,
    /// Extensions blocked at the semantic gate.
    pub semantic_blocked: u64,
    /// Extensions admitted and re-announced.
    pub forwarded: u64,
}

/// The two-gate admission policy with its monotonic counters.
#[derive(Debug, Default)]
pub struct Gatekeeper {
    total_seen: AtomicU64,
    crypto_blocked: AtomicU64,
    semantic_blocked: AtomicU64,
    forwarded: AtomicU64,
}

impl Gatekeeper {
    /// Creates a gatekeeper with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decides whether `ext` should be forwarded for a single query.
    pub fn should_forward(&self, ext: &Extension, query: &Query) -> Decision {
        self.total_seen.fetch_add(1, Ordering::Relaxed);

        if !ext.crypto_valid() {
            self.crypto_blocked.fetch_add(1, Ordering::Relaxed);
            return Decision {
                forward: false,
                reason: Some(BlockReason::Crypto),
                crypto_valid: false,
                similarity: None,
            };
        }

        let score = similarity(&ext.child.semantic, &query.features, &query.params);
        if score < query.params.threshold {
            self.semantic_blocked.fetch_add(1, Ordering::Relaxed);
            return Decision {
                forward: false,
                reason: Some(BlockReason::Semantic),
                crypto_valid: true,
                similarity: Some(score),
            };
        }

        self.forwarded.fetch_add(1, Ordering::Relaxed);
        Decision {
            forward: true,
            reason: None,
            crypto_valid: true,
            similarity: Some(score),
        }
    }

    /// Decides whether `ext` should be admitted by a node holding an
    /// interest filter: the semantic gate passes iff any interest
    /// matches.
    pub fn admit(&self, ext: &Extension, filter: &InterestFilter) -> Decision {
        self.total_seen.fetch_add(1, Ordering::Relaxed);

        if !ext.crypto_valid() {
            self.crypto_blocked.fetch_add(1, Ordering::Relaxed);
            return Decision {
                forward: false,
                reason: Some(BlockReason::Crypto),
                crypto_valid: false,
                similarity: None,
            };
        }

        let best = filter.best_match(&ext.child.semantic);
        let score = best.map(|(_, score)| score);
        if score.is_none_or(|s| s < filter.params().threshold) {
            self.semantic_blocked.fetch_add(1, Ordering::Relaxed);
            return Decision {
                forward: false,
                reason: Some(BlockReason::Semantic),
                crypto_valid: true,
                similarity: score,
            };
        }

        self.forwarded.fetch_add(1, Ordering::Relaxed);
        Decision {
            forward: true,
            reason: None,
            crypto_valid: true,
            similarity: score,
        }
    }

    /// Snapshots the counters.
    pub fn counters(&self) -> GateCounters {
        GateCounters {
            total_seen: self.total_seen.load(Ordering::Relaxed),
            crypto_blocked: self.crypto_blocked.load(Ordering::Relaxed),
            semantic_blocked: self.semantic_blocked.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::element_hash;
    use crate::similarity::KernelParams;
    use crate::types::Content;

    fn params_with_threshold(threshold: f64) -> KernelParams {
        KernelParams {
            threshold,
            ..KernelParams::default()
        }
    }

    #[test]
    fn forwards_a_valid_relevant_extension() {
        let gate = Gatekeeper::new();
        let root = Content::new("Machine learning basics");
        let (ext, _) = root.extend(b" and neural networks", None, None);
        let query =
            Query::new(b"machine learning", params_with_threshold(0.3)).expect("query");

        let decision = gate.should_forward(&ext, &query);
        assert!(decision.forward);
        assert!(decision.crypto_valid);
        assert!(decision.similarity.expect("score") >= 0.3);

        let counters = gate.counters();
        assert_eq!(counters.total_seen, 1);
        assert_eq!(counters.forwarded, 1);
        assert_eq!(counters.crypto_blocked, 0);
        assert_eq!(counters.semantic_blocked, 0);
    }

    #[test]
    fn blocks_a_forged_child_hash_at_the_crypto_gate() {
        let gate = Gatekeeper::new();
        let root = Content::new("legitimate root");
        let (mut ext, _) = root.extend(b" honest delta", None, None);
        ext.child.crypto = element_hash(b"completely different content");

        let query =
            Query::new(b"legitimate root", params_with_threshold(0.1)).expect("query");
        let decision = gate.should_forward(&ext, &query);

        assert!(!decision.forward);
        assert_eq!(decision.reason, Some(BlockReason::Crypto));
        assert!(!decision.crypto_valid);
        assert!(decision.similarity.is_none());
        assert_eq!(gate.counters().crypto_blocked, 1);
    }

    #[test]
    fn blocks_an_irrelevant_extension_at_the_semantic_gate() {
        let gate = Gatekeeper::new();
        let root = Content::new("cooking recipes");
        let (ext, _) = root.extend(b" for Italian pasta", None, None);

        let query = Query::new(b"machine learning algorithms", params_with_threshold(0.5))
            .expect("query");
        let decision = gate.should_forward(&ext, &query);

        assert!(!decision.forward);
        assert_eq!(decision.reason, Some(BlockReason::Semantic));
        assert!(decision.crypto_valid);
        assert!(decision.similarity.expect("score") < 0.5);
        assert_eq!(gate.counters().semantic_blocked, 1);
    }

    #[test]
    fn counters_always_sum_to_total_seen() {
        let gate = Gatekeeper::new();
        let root = Content::new("machine learning");
        let query = Query::new(b"machine learning", params_with_threshold(0.3)).expect("query");

        // One forwarded, one semantic-blocked, one crypto-blocked.
        let (good, _) = root.extend(b" and statistics", None, None);
        gate.should_forward(&good, &query);

        let off_topic = Content::new("gardening");
        let (weird, _) = off_topic.extend(b" with succulents", None, None);
        gate.should_forward(&weird, &query);

        let (mut forged, _) = root.extend(b" tail", None, None);
        forged.child.crypto = element_hash(b"forged");
        gate.should_forward(&forged, &query);

        let c = gate.counters();
        assert_eq!(
            c.total_seen,
            c.crypto_blocked + c.semantic_blocked + c.forwarded
        );
        assert_eq!(c.total_seen, 3);
    }

    #[test]
    fn admit_passes_when_any_interest_matches() {
        let gate = Gatekeeper::new();
        let filter = InterestFilter::new(
            vec![
                "quantum chemistry".to_string(),
                "machine learning".to_string(),
            ],
            params_with_threshold(0.3),
        )
        .expect("filter");

        let root = Content::new("Machine learning basics");
        let (ext, _) = root.extend(b" and neural networks", None, None);

        let decision = gate.admit(&ext, &filter);
        assert!(decision.forward, "decision: {decision:?}");
        assert_eq!(gate.counters().forwarded, 1);
    }

    #[test]
    fn admit_blocks_when_no_interest_matches() {
        let gate = Gatekeeper::new();
        let filter = InterestFilter::new(
            vec!["quantum chemistry".to_string()],
            params_with_threshold(0.6),
        )
        .expect("filter");

        let root = Content::new("cooking recipes");
        let (ext, _) = root.extend(b" for Italian pasta", None, None);

        let decision = gate.admit(&ext, &filter);
        assert!(!decision.forward);
        assert_eq!(decision.reason, Some(BlockReason::Semantic));
    }
}
