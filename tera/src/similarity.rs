//! Parameterised similarity kernel over [`Features`] records.
//!
//! The kernel blends three components:
//!
//! - **semantic**: cosine similarity of the term-frequency vectors,
//! - **lexical**: Jaccard similarity of the character n-gram sets,
//! - **structural**: closeness of word and unique-word counts,
//!
//! weighted by [`KernelParams`] and clamped to `[0, 1]`. A candidate
//! is *relevant* when its score reaches the configured threshold.

use serde::{Deserialize, Serialize};

use crate::error::TeraError;
use crate::features::Features;

/// Weights and threshold for the similarity kernel.
///
/// All fields live in `[0, 1]`. Weights need not sum to one; they are
/// normalised on use. Validation is a total function: it rejects
/// out-of-range weights, an all-zero weight vector, and thresholds
/// outside `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct KernelParams {
    /// Weight of the TF-cosine component.
    pub w_sem: f64,
    /// Weight of the n-gram Jaccard component.
    pub w_lex: f64,
    /// Weight of the count-structure component.
    pub w_struct: f64,
    /// Minimum score required for relevance.
    pub threshold: f64,
}

impl Default for KernelParams {
    fn default() -> Self {
        Self {
            w_sem: 0.5,
            w_lex: 0.3,
            w_struct: 0.2,
            threshold: 0.3,
        }
    }
}

impl KernelParams {
    /// Validates every field against its range.
    pub fn validate(&self) -> Result<(), TeraError> {
        for (name, w) in [
            ("w_sem", self.w_sem),
            ("w_lex", self.w_lex),
            ("w_struct", self.w_struct),
        ] {
            if !(0.0..=1.0).contains(&w) {
                return Err(TeraError::InvalidParameters(format!(
                    "{name}={w} is outside [0, 1]"
                )));
            }
        }
        if self.w_sem + self.w_lex + self.w_struct <= 0.0 {
            return Err(TeraError::InvalidParameters(
                "all similarity weights are zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(TeraError::InvalidParameters(format!(
                "threshold={} is outside [0, 1]",
                self.threshold
            )));
        }
        Ok(())
    }
}

/// Cosine similarity of two TF vectors over the union of their keys.
/// Zero if either vector has zero magnitude.
fn cosine_tf(a: &Features, b: &Features) -> f64 {
    let mut dot = 0.0;
    for (token, va) in &a.tf {
        if let Some(vb) = b.tf.get(token) {
            dot += va * vb;
        }
    }
    let mag_a: f64 = a.tf.values().map(|v| v * v).sum::<f64>().sqrt();
    let mag_b: f64 = b.tf.values().map(|v| v * v).sum::<f64>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}

/// Jaccard similarity of the n-gram sets. Two empty sets are fully
/// similar.
fn jaccard_ngrams(a: &Features, b: &Features) -> f64 {
    if a.ngrams.is_empty() && b.ngrams.is_empty() {
        return 1.0;
    }
    let intersection = a.ngrams.intersection(&b.ngrams).count();
    let union = a.ngrams.union(&b.ngrams).count();
    if union == 0 {
        return 1.0;
    }
    intersection as f64 / union as f64
}

/// Average closeness of the word and unique-word counts. A count pair
/// that is zero on both sides contributes nothing; if every pair is
/// zero the texts are structurally identical.
fn structural(a: &Features, b: &Features) -> f64 {
    let mut parts: Vec<f64> = Vec::with_capacity(2);
    for (x, y) in [
        (a.word_count, b.word_count),
        (a.unique_words, b.unique_words),
    ] {
        let max = x.max(y);
        if max == 0 {
            continue;
        }
        parts.push(1.0 - x.abs_diff(y) as f64 / max as f64);
    }
    if parts.is_empty() {
        return 1.0;
    }
    parts.iter().sum::<f64>() / parts.len() as f64
}

/// Weighted similarity of two feature records, in `[0, 1]`.
///
/// Weights are normalised to sum to one before blending; an all-zero
/// weight vector scores zero (callers validating their
/// [`KernelParams`] never reach that branch).
pub fn similarity(a: &Features, b: &Features, params: &KernelParams) -> f64 {
    let total = params.w_sem + params.w_lex + params.w_struct;
    if total <= 0.0 {
        return 0.0;
    }
    let score = (params.w_sem * cosine_tf(a, b)
        + params.w_lex * jaccard_ngrams(a, b)
        + params.w_struct * structural(a, b))
        / total;
    score.clamp(0.0, 1.0)
}

/// Threshold test: `similarity(a, b) >= params.threshold`.
pub fn relevant(a: &Features, b: &Features, params: &KernelParams) -> bool {
    similarity(a, b, params) >= params.threshold
}

/// Scores every candidate against the query and returns
/// `(candidate index, score)` pairs sorted by descending score.
pub fn rank_by_similarity(
    query: &Features,
    candidates: &[Features],
    params: &KernelParams,
) -> Vec<(usize, f64)> {
    let mut ranked: Vec<(usize, f64)> = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| (i, similarity(query, c, params)))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked
}
