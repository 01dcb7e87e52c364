// src/matching/extend.rs - Extend canonical plants by non-matched records
use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::cleaning::aggregation::{aggregate_units, AggregationOptions};
use crate::models::stats_models::MatchingStage;
use crate::models::{CanonicalPlant, Dataset, Field, PowerPlant};
use crate::scoring::SimilarityScorer;
use crate::utils::progress_bars::logging::StageLogger;

/// Ids of `label` already attributed to some canonical plant.
pub fn known_ids<'a>(canonical: &'a [CanonicalPlant], label: &str) -> HashSet<&'a str> {
    canonical
        .iter()
        .filter_map(|c| c.project_ids.get(label))
        .flatten()
        .map(String::as_str)
        .collect()
}

/// Whether any of the record's ids is among `known`. Records without ids
/// are never included.
pub fn is_included(record: &PowerPlant, known: &HashSet<&str>) -> bool {
    record
        .project_ids()
        .map_or(false, |ids| ids.iter().any(|id| known.contains(id.as_str())))
}

/// Append the records of `extension` that no canonical plant covers yet,
/// as single-source canonical plants. When `aggregation` is given, the
/// added records are first aggregated into plants. Returns the number of
/// plants added.
pub fn extend_by_non_matched(
    canonical: &mut Vec<CanonicalPlant>,
    extension: &Dataset,
    aggregation: Option<(&dyn SimilarityScorer, &AggregationOptions)>,
    target_columns: &[Field],
) -> Result<usize> {
    let logger = StageLogger::new(MatchingStage::Extension);
    logger.log_start(&format!("'{}' ({} records)", extension.label, extension.len()));
    if extension.is_empty() {
        return Ok(0);
    }

    let label = extension.label.as_str();
    let known = known_ids(canonical, label);
    let remaining: Vec<PowerPlant> = extension
        .records
        .iter()
        .filter(|r| !is_included(r, &known))
        .cloned()
        .collect();
    logger.log_phase(
        "filtered",
        Some(&format!("{} of {} records not yet matched", remaining.len(), extension.len())),
    );

    let mut added = Dataset::new(label, remaining);
    if let Some((scorer, options)) = aggregation {
        if !added.is_empty() {
            added = aggregate_units(&added, scorer, options)?.0;
        }
    }

    let mut next_id = canonical.iter().map(|c| c.id + 1).max().unwrap_or(0);
    let count = added.len();
    for record in added.records {
        let ids: BTreeSet<String> = record.project_ids().cloned().unwrap_or_default();
        let mut project_ids = BTreeMap::new();
        if !ids.is_empty() {
            project_ids.insert(label.to_string(), ids);
        }
        let mut plant = record.restrict_to(target_columns);
        plant.set(Field::ProjectId, None);
        canonical.push(CanonicalPlant {
            id: next_id,
            plant,
            project_ids,
        });
        next_id += 1;
    }
    logger.log_completion(&format!("{} plants added from '{}'", count, label));
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SimilarityLink;
    use crate::scoring::PrecomputedScorer;

    fn existing() -> Vec<CanonicalPlant> {
        let mut project_ids = BTreeMap::new();
        project_ids.insert("EXT".to_string(), BTreeSet::from(["e1".to_string()]));
        vec![CanonicalPlant {
            id: 0,
            plant: PowerPlant::new().with_text(Field::Name, "Matched"),
            project_ids,
        }]
    }

    fn record(name: &str, id: &str) -> PowerPlant {
        PowerPlant::new()
            .with_text(Field::Name, name)
            .with_text(Field::Country, "Germany")
            .with_number(Field::Capacity, 10.0)
            .with_ids(Field::ProjectId, [id])
    }

    #[test]
    fn test_only_unmatched_records_are_added() {
        let mut canonical = existing();
        let extension = Dataset::new("EXT", vec![record("Matched", "e1"), record("Fresh", "e2")]);
        let added = extend_by_non_matched(&mut canonical, &extension, None, &Field::ALL).unwrap();
        assert_eq!(added, 1);
        assert_eq!(canonical.len(), 2);
        assert_eq!(canonical[1].id, 1);
        assert_eq!(canonical[1].plant.name(), Some("Fresh"));
        assert!(canonical[1].project_ids["EXT"].contains("e2"));
    }

    #[test]
    fn test_added_records_can_be_aggregated() {
        let mut canonical = existing();
        let extension = Dataset::new(
            "EXT",
            vec![record("Fresh", "e2"), record("Fresh", "e3"), record("Matched", "e1")],
        );
        let scorer = PrecomputedScorer::new().with_duplicates(
            "EXT",
            vec![SimilarityLink::new(0, 1, 0.99), SimilarityLink::new(1, 0, 0.99)],
        );
        let options = AggregationOptions {
            pre_clean_name: false,
            ..Default::default()
        };
        let added = extend_by_non_matched(
            &mut canonical,
            &extension,
            Some((&scorer as &dyn SimilarityScorer, &options)),
            &Field::ALL,
        )
        .unwrap();
        assert_eq!(added, 1);
        assert_eq!(canonical[1].plant.capacity(), Some(20.0));
        assert_eq!(canonical[1].project_ids["EXT"].len(), 2);
    }

    #[test]
    fn test_records_without_ids_are_never_included() {
        let known: HashSet<&str> = HashSet::from(["e1"]);
        assert!(!is_included(&PowerPlant::new(), &known));
        assert!(is_included(&record("x", "e1"), &known));
        assert_eq!(known_ids(&existing(), "EXT").len(), 1);
        assert!(known_ids(&existing(), "OTHER").is_empty());
    }
}
