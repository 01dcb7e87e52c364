// src/matching/reduce.rs - Reduce match groups to canonical plants
use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet};

use crate::cleaning::technology::normalize_technology;
use crate::errors::MatchingError;
use crate::models::stats_models::MatchingStage;
use crate::models::{CanonicalPlant, Field, FieldValue, MatchedTable, PowerPlant};
use crate::utils::constants::{DEFAULT_FUELTYPE, DEFAULT_SET};
use crate::utils::progress_bars::logging::StageLogger;

/// Generic values that must not win over a specific value from a less
/// reliable source.
const LOW_PRIORITY: [(Field, &str); 2] = [(Field::Set, DEFAULT_SET), (Field::Fueltype, DEFAULT_FUELTYPE)];

/// Labels present in `table`, most reliable first. Equal scores keep the
/// table's label order.
pub fn reliability_ranking(
    table: &MatchedTable,
    scores: &BTreeMap<String, u32>,
) -> Result<Vec<String>> {
    let mut ranked: Vec<(String, u32)> = Vec::new();
    for label in &table.labels {
        let present = table.rows.iter().any(|r| r.sources.contains_key(label));
        if !present {
            continue;
        }
        let score = scores
            .get(label)
            .copied()
            .ok_or_else(|| MatchingError::MissingReliabilityScore {
                label: label.clone(),
            })?;
        ranked.push((label.clone(), score));
    }
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    Ok(ranked.into_iter().map(|(label, _)| label).collect())
}

/// Blank low-priority values; returns the fields that had one.
fn demote(plant: &mut PowerPlant) -> Vec<Field> {
    let mut blanked = Vec::new();
    for (field, generic) in LOW_PRIORITY {
        if plant.text(field) == Some(generic) {
            plant.set(field, None);
            blanked.push(field);
        }
    }
    blanked
}

fn reduce_group(
    members: &[(&str, &PowerPlant)],
    target_columns: &[Field],
) -> (PowerPlant, BTreeMap<String, BTreeSet<String>>) {
    let mut blanked: BTreeSet<Field> = BTreeSet::new();
    let demoted: Vec<PowerPlant> = members
        .iter()
        .map(|(_, plant)| {
            let mut plant = (*plant).clone();
            blanked.extend(demote(&mut plant));
            plant
        })
        .collect();
    let ordered: Vec<&PowerPlant> = demoted.iter().collect();

    let mut canonical = PowerPlant::new();
    for &field in target_columns {
        if field == Field::ProjectId {
            continue;
        }
        canonical.set(field, field.reduction_aggregation().apply(field, &ordered));
    }

    for (field, generic) in LOW_PRIORITY {
        if blanked.contains(&field) && !canonical.has(field) {
            canonical.set(field, Some(FieldValue::Text(generic.to_string())));
        }
    }

    let normalized = canonical
        .text(Field::Technology)
        .and_then(|t| normalize_technology(t, false));
    if canonical.has(Field::Technology) {
        canonical.set(Field::Technology, normalized.map(FieldValue::Text));
    }

    let project_ids = members
        .iter()
        .filter_map(|(label, plant)| plant.project_ids().map(|ids| (label.to_string(), ids.clone())))
        .collect();
    (canonical, project_ids)
}

/// Collapse every match group into one canonical plant. Per field the
/// most reliable source with a value wins, except dates (earliest
/// commissioning, latest retrofit and retirement) and id sets (union).
/// `projectID` keeps every source's ids for provenance.
pub fn reduce_matched_table(
    table: &MatchedTable,
    scores: &BTreeMap<String, u32>,
) -> Result<Vec<CanonicalPlant>> {
    let logger = StageLogger::new(MatchingStage::Reduction);
    let ranking = reliability_ranking(table, scores)?;
    logger.log_start(&format!("{} match groups ranked {}", table.len(), ranking.join(" > ")));

    let mut plants = Vec::with_capacity(table.len());
    for (id, row) in table.rows.iter().enumerate() {
        let members: Vec<(&str, &PowerPlant)> = ranking
            .iter()
            .filter_map(|label| row.sources.get(label).map(|p| (label.as_str(), p)))
            .collect();
        if members.is_empty() {
            logger.log_debug(&format!("group {} has no sources, skipped", row.group_id));
            continue;
        }
        let (plant, project_ids) = reduce_group(&members, &table.target_columns);
        plants.push(CanonicalPlant {
            id,
            plant,
            project_ids,
        });
    }
    logger.log_completion(&format!("{} canonical plants", plants.len()));
    Ok(plants)
}
