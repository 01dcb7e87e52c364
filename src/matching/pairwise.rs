// src/matching/pairwise.rs - Best-match linking of two datasets
use anyhow::{Context, Result};
use std::collections::HashMap;

use crate::models::stats_models::{LinkStats, MatchingStage};
use crate::models::{Dataset, LinkTable, SimilarityLink};
use crate::scoring::{candidates, ScoringBatch, SimilarityScorer};
use crate::utils::progress_bars::logging::StageLogger;

/// Reduce raw links to one pair per right-hand record, keeping the
/// highest score (ties: smaller left index). Pairs come out in the order
/// their right index first appears.
pub fn best_matches(links: &[SimilarityLink]) -> Vec<(usize, usize)> {
    let mut order: Vec<usize> = Vec::new();
    let mut best: HashMap<usize, SimilarityLink> = HashMap::new();
    for link in links {
        match best.get(&link.right) {
            None => {
                order.push(link.right);
                best.insert(link.right, *link);
            }
            Some(current) => {
                let better = link.score > current.score
                    || (link.score == current.score && link.left < current.left);
                if better {
                    best.insert(link.right, *link);
                }
            }
        }
    }
    order
        .into_iter()
        .filter_map(|right| best.get(&right).map(|l| (l.left, l.right)))
        .collect()
}

/// Link `left` against `right` in single-match mode and keep the best
/// matches. With `country_wise`, only records of the same country are
/// compared; partitions without candidates on either side are skipped.
pub fn compare_two_datasets(
    left: &Dataset,
    right: &Dataset,
    scorer: &dyn SimilarityScorer,
    country_wise: bool,
) -> Result<(LinkTable, LinkStats)> {
    let logger = StageLogger::new(MatchingStage::Linking);
    let context = format!("{} ↔ {}", left.label, right.label);
    let mut stats = LinkStats {
        left_label: left.label.clone(),
        right_label: right.label.clone(),
        ..Default::default()
    };
    let table = LinkTable::new(left.label.clone(), right.label.clone());
    if left.is_empty() || right.is_empty() {
        logger.log_debug(&format!("{}: empty dataset, nothing to compare", context));
        return Ok((table, stats));
    }

    let partitions: Vec<(Option<String>, Vec<usize>, Vec<usize>)> = if country_wise {
        left.partition_by_country()
            .into_iter()
            .map(|(country, left_indices)| {
                let right_indices = match &country {
                    Some(c) => right.indices_in_country(Some(c.as_str())),
                    None => Vec::new(),
                };
                (country, left_indices, right_indices)
            })
            .collect()
    } else {
        vec![(None, (0..left.len()).collect(), (0..right.len()).collect())]
    };

    let mut raw: Vec<SimilarityLink> = Vec::new();
    for (country, left_indices, right_indices) in &partitions {
        if country_wise && country.is_none() {
            stats.partitions_skipped += 1;
            logger.log_partition_skipped(&context, None, "records without country");
            continue;
        }
        let batch = ScoringBatch::Link {
            left: candidates(left, left_indices),
            right: candidates(right, right_indices),
            single_match: true,
        };
        if batch.is_empty() {
            stats.partitions_skipped += 1;
            logger.log_partition_skipped(&context, country.as_deref(), "no candidates");
            continue;
        }
        let links = scorer
            .score(&batch)
            .with_context(|| format!("Linking {} failed", context))?;
        stats.partitions_compared += 1;
        logger.log_partition_scored(&context, country.as_deref(), links.len());
        raw.extend(links);
    }

    stats.raw_links = raw.len();
    let pairs = best_matches(&raw);
    stats.best_matches = pairs.len();
    Ok((table.with_pairs(pairs), stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Field, PowerPlant};
    use crate::scoring::PrecomputedScorer;
    use anyhow::bail;

    struct FailingScorer;

    impl SimilarityScorer for FailingScorer {
        fn name(&self) -> &str {
            "failing"
        }

        fn score(&self, _batch: &ScoringBatch<'_>) -> Result<Vec<SimilarityLink>> {
            bail!("scorer must not be called")
        }
    }

    fn in_country(country: &str) -> PowerPlant {
        PowerPlant::new().with_text(Field::Country, country)
    }

    #[test]
    fn test_best_matches_keeps_highest_score_per_right_record() {
        let links = vec![
            SimilarityLink::new(0, 5, 0.90),
            SimilarityLink::new(1, 5, 0.99),
            SimilarityLink::new(2, 3, 0.95),
            SimilarityLink::new(4, 3, 0.95),
        ];
        assert_eq!(best_matches(&links), vec![(1, 5), (2, 3)]);
        assert!(best_matches(&[]).is_empty());
    }

    #[test]
    fn test_empty_dataset_yields_empty_table_without_scoring() {
        let empty = Dataset::new("A", Vec::new());
        let other = Dataset::new("B", vec![in_country("Germany")]);
        let (table, stats) = compare_two_datasets(&empty, &other, &FailingScorer, true).unwrap();
        assert!(table.is_empty());
        assert_eq!((table.left_label.as_str(), table.right_label.as_str()), ("A", "B"));
        assert_eq!(stats.partitions_compared, 0);
    }

    #[test]
    fn test_country_partitions_are_skipped_when_unmatched() {
        let left = Dataset::new(
            "A",
            vec![in_country("Germany"), in_country("France"), PowerPlant::new()],
        );
        let right = Dataset::new("B", vec![in_country("France"), in_country("Germany")]);
        let scorer = PrecomputedScorer::new().with_links(
            "A",
            "B",
            vec![
                SimilarityLink::new(0, 1, 0.99),
                // cross-country link never reaches a batch
                SimilarityLink::new(1, 1, 0.99),
                SimilarityLink::new(1, 0, 0.98),
            ],
        );
        let (table, stats) = compare_two_datasets(&left, &right, &scorer, true).unwrap();
        assert_eq!(table.pairs, vec![(0, 1), (1, 0)]);
        assert_eq!(stats.partitions_compared, 2);
        assert_eq!(stats.partitions_skipped, 1);
    }

    #[test]
    fn test_scorer_failure_propagates() {
        let left = Dataset::new("A", vec![in_country("Germany")]);
        let right = Dataset::new("B", vec![in_country("Germany")]);
        assert!(compare_two_datasets(&left, &right, &FailingScorer, false).is_err());
    }
}
