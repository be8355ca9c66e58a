//! Interest filters: what a node considers relevant.

use crate::error::TeraError;
use crate::features::{Features, extract};
use crate::similarity::{KernelParams, relevant, similarity};

/// A list of interest strings plus the kernel parameters used to
/// match content against them.
///
/// Interest features are extracted once at construction; matching a
/// candidate is the OR over the interests of the underlying kernel
/// test.
#[derive(Clone, Debug)]
pub struct InterestFilter {
    interests: Vec<String>,
    features: Vec<Features>,
    params: KernelParams,
}

impl InterestFilter {
    /// Builds a filter, validating the kernel parameters.
    pub fn new(interests: Vec<String>, params: KernelParams) -> Result<Self, TeraError> {
        params.validate()?;
        let features = interests.iter().map(|i| extract(i.as_bytes())).collect();
        Ok(Self {
            interests,
            features,
            params,
        })
    }

    /// The declared interest strings.
    pub fn interests(&self) -> &[String] {
        &self.interests
    }

    /// The kernel parameters this filter matches with.
    pub fn params(&self) -> &KernelParams {
        &self.params
    }

    /// `true` iff the candidate is relevant to at least one interest.
    pub fn matches(&self, candidate: &Features) -> bool {
        self.features
            .iter()
            .any(|interest| relevant(interest, candidate, &self.params))
    }

    /// The best-scoring interest for the candidate, as
    /// `(interest index, score)`. `None` when the filter is empty.
    pub fn best_match(&self, candidate: &Features) -> Option<(usize, f64)> {
        self.features
            .iter()
            .enumerate()
            .map(|(i, interest)| (i, similarity(interest, candidate, &self.params)))
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }
}
