// src/scoring/precomputed.rs - Scorer replaying previously computed links

use anyhow::Result;
use std::collections::{BTreeMap, HashSet};

use crate::models::SimilarityLink;
use crate::scoring::{Candidate, ScoringBatch, SimilarityScorer};

/// Replays stored links instead of comparing records. Links are keyed by
/// dataset label (deduplication) or by label pair (linking) and filtered
/// to the candidates of each batch, so country-wise partitioning still
/// applies.
#[derive(Debug, Clone, Default)]
pub struct PrecomputedScorer {
    duplicates: BTreeMap<String, Vec<SimilarityLink>>,
    links: BTreeMap<(String, String), Vec<SimilarityLink>>,
}

impl PrecomputedScorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_duplicates(mut self, label: &str, links: Vec<SimilarityLink>) -> Self {
        self.duplicates
            .entry(label.to_string())
            .or_default()
            .extend(links);
        self
    }

    pub fn with_links(mut self, left: &str, right: &str, links: Vec<SimilarityLink>) -> Self {
        self.links
            .entry((left.to_string(), right.to_string()))
            .or_default()
            .extend(links);
        self
    }
}

fn indices(candidates: &[Candidate<'_>]) -> HashSet<usize> {
    candidates.iter().map(|c| c.index).collect()
}

impl SimilarityScorer for PrecomputedScorer {
    fn name(&self) -> &str {
        "precomputed"
    }

    fn score(&self, batch: &ScoringBatch<'_>) -> Result<Vec<SimilarityLink>> {
        let links = match batch {
            ScoringBatch::Deduplicate { records } => {
                let Some(first) = records.first() else {
                    return Ok(Vec::new());
                };
                let allowed = indices(records);
                self.duplicates
                    .get(first.label)
                    .map(|stored| {
                        stored
                            .iter()
                            .filter(|l| allowed.contains(&l.left) && allowed.contains(&l.right))
                            .copied()
                            .collect()
                    })
                    .unwrap_or_default()
            }
            ScoringBatch::Link {
                left,
                right,
                single_match,
            } => {
                let (Some(l), Some(r)) = (left.first(), right.first()) else {
                    return Ok(Vec::new());
                };
                let (allowed_left, allowed_right) = (indices(left), indices(right));
                let key = (l.label.to_string(), r.label.to_string());
                let mut found: Vec<SimilarityLink> = self
                    .links
                    .get(&key)
                    .map(|stored| {
                        stored
                            .iter()
                            .filter(|x| {
                                allowed_left.contains(&x.left) && allowed_right.contains(&x.right)
                            })
                            .copied()
                            .collect()
                    })
                    .unwrap_or_default();
                if *single_match {
                    let mut best: BTreeMap<usize, SimilarityLink> = BTreeMap::new();
                    for link in found {
                        let keep = best
                            .get(&link.left)
                            .map_or(true, |current| link.score > current.score);
                        if keep {
                            best.insert(link.left, link);
                        }
                    }
                    found = best.into_values().collect();
                }
                found
            }
        };
        Ok(links)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PowerPlant;

    #[test]
    fn test_links_are_filtered_to_batch_candidates() {
        let plants = vec![PowerPlant::new(); 3];
        let scorer = PrecomputedScorer::new().with_duplicates(
            "A",
            vec![SimilarityLink::new(0, 1, 0.99), SimilarityLink::new(1, 2, 0.99)],
        );
        let batch = ScoringBatch::Deduplicate {
            records: vec![
                Candidate { label: "A", index: 0, plant: &plants[0] },
                Candidate { label: "A", index: 1, plant: &plants[1] },
            ],
        };
        let links = scorer.score(&batch).unwrap();
        assert_eq!(links, vec![SimilarityLink::new(0, 1, 0.99)]);
    }

    #[test]
    fn test_single_match_keeps_highest_score() {
        let plants = vec![PowerPlant::new(); 2];
        let scorer = PrecomputedScorer::new().with_links(
            "A",
            "B",
            vec![SimilarityLink::new(0, 0, 0.9), SimilarityLink::new(0, 1, 0.95)],
        );
        let batch = ScoringBatch::Link {
            left: vec![Candidate { label: "A", index: 0, plant: &plants[0] }],
            right: vec![
                Candidate { label: "B", index: 0, plant: &plants[0] },
                Candidate { label: "B", index: 1, plant: &plants[1] },
            ],
            single_match: true,
        };
        assert_eq!(scorer.score(&batch).unwrap(), vec![SimilarityLink::new(0, 1, 0.95)]);
    }
}
