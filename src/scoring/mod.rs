// src/scoring/mod.rs - Similarity scorer seam used by aggregation and linking
pub mod duke;
pub mod embedded;
pub mod precomputed;

use anyhow::Result;

use crate::models::{Dataset, PowerPlant, SimilarityLink};

pub use duke::DukeScorer;
pub use embedded::{EmbeddedScorer, EmbeddedScorerConfig};
pub use precomputed::PrecomputedScorer;

/// A record handed to a scorer, addressed by its index in its dataset.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub label: &'a str,
    pub index: usize,
    pub plant: &'a PowerPlant,
}

/// Candidates for the given record indices of `dataset`.
pub fn candidates<'a>(dataset: &'a Dataset, indices: &[usize]) -> Vec<Candidate<'a>> {
    indices
        .iter()
        .filter_map(|&index| {
            dataset.records.get(index).map(|plant| Candidate {
                label: dataset.label.as_str(),
                index,
                plant,
            })
        })
        .collect()
}

/// One scorer invocation.
#[derive(Debug, Clone)]
pub enum ScoringBatch<'a> {
    /// Find duplicate pairs within one dataset.
    Deduplicate { records: Vec<Candidate<'a>> },
    /// Link records of two datasets. With `single_match`, each left record
    /// links to at most one right record.
    Link {
        left: Vec<Candidate<'a>>,
        right: Vec<Candidate<'a>>,
        single_match: bool,
    },
}

impl ScoringBatch<'_> {
    pub fn is_empty(&self) -> bool {
        match self {
            ScoringBatch::Deduplicate { records } => records.len() < 2,
            ScoringBatch::Link { left, right, .. } => left.is_empty() || right.is_empty(),
        }
    }
}

/// Black-box similarity engine. Implementations hold no state between
/// calls; every input arrives through `batch` and every result leaves
/// through the returned links. Pairs judged non-matching are omitted.
/// Link indices are the `Candidate::index` values of the batch.
pub trait SimilarityScorer: Send + Sync {
    fn name(&self) -> &str;

    /// Fails with `MatchingError::ScorerUnavailable` when the engine
    /// cannot run at all.
    fn check_available(&self) -> Result<()> {
        Ok(())
    }

    fn score(&self, batch: &ScoringBatch<'_>) -> Result<Vec<SimilarityLink>>;
}
