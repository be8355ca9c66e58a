//! Semantic feature extraction.
//!
//! A [`Features`] record is the semantic fingerprint of one piece of
//! content: a normalised term-frequency map, a character 3-gram set,
//! basic counts, and the top keywords. Features are recomputed on
//! demand from bytes and never mutated in place.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

/// Character n-gram length used for the lexical fingerprint.
pub const NGRAM_LEN: usize = 3;

/// Maximum number of entries kept in [`Features::top_keywords`].
pub const MAX_TOP_KEYWORDS: usize = 10;

/// Semantic fingerprint of one piece of content.
///
/// Ordered map/set types keep the serialised form canonical, so the
/// same text always produces byte-identical JSON.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Features {
    /// Lowercase token -> frequency in `[0, 1]`, normalised by the
    /// total token count.
    pub tf: BTreeMap<String, f64>,
    /// Set of 3-character substrings of the lowercased raw text. For
    /// text shorter than the n-gram length this holds the full
    /// lowercased text (the empty string for empty input).
    pub ngrams: BTreeSet<String>,
    /// Total number of tokens.
    pub word_count: usize,
    /// Number of distinct tokens.
    pub unique_words: usize,
    /// Number of characters in the raw text.
    pub char_count: usize,
    /// Highest-frequency tokens, at most [`MAX_TOP_KEYWORDS`], ties
    /// broken by first occurrence in the text.
    pub top_keywords: Vec<String>,
}

/// Extracts a [`Features`] record from raw bytes.
///
/// The text is interpreted as UTF-8 (lossily) and lowercased. Tokens
/// are maximal runs of Unicode letters and numbers; everything else is
/// a separator. N-grams are taken over the lowercased raw text, not
/// the token stream.
pub fn extract(data: &[u8]) -> Features {
    let raw = String::from_utf8_lossy(data);
    let text = raw.to_lowercase();

    // Token counts, remembering first-occurrence order for stable
    // keyword ties.
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    for token in text.split(|c: char| !c.is_alphanumeric()) {
        if token.is_empty() {
            continue;
        }
        if !counts.contains_key(token) {
            order.push(token.to_string());
        }
        *counts.entry(token.to_string()).or_insert(0) += 1;
    }

    let word_count: usize = counts.values().sum();
    let unique_words = counts.len();

    let mut tf = BTreeMap::new();
    if word_count > 0 {
        for (token, count) in &counts {
            tf.insert(token.clone(), *count as f64 / word_count as f64);
        }
    }

    let chars: Vec<char> = text.chars().collect();
    let mut ngrams = BTreeSet::new();
    if chars.len() < NGRAM_LEN {
        ngrams.insert(text.clone());
    } else {
        for window in chars.windows(NGRAM_LEN) {
            ngrams.insert(window.iter().collect());
        }
    }

    // Stable sort: descending count, insertion order on ties.
    let mut ranked: Vec<(&String, usize)> =
        order.iter().map(|t| (t, counts[t])).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    let top_keywords = ranked
        .into_iter()
        .take(MAX_TOP_KEYWORDS)
        .map(|(t, _)| t.clone())
        .collect();

    Features {
        tf,
        ngrams,
        word_count,
        unique_words,
        char_count: raw.chars().count(),
        top_keywords,
    }
}
