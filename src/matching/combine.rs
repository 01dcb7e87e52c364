// src/matching/combine.rs - Materialize correspondences into the wide matched table
use anyhow::Result;
use std::collections::BTreeMap;

use crate::errors::MatchingError;
use crate::models::stats_models::MatchingStage;
use crate::models::{CorrespondenceTable, Dataset, Field, MatchedRow, MatchedTable};
use crate::utils::progress_bars::logging::StageLogger;

/// Attach every dataset's full record (restricted to `target_columns`)
/// to the match groups of `correspondence`. Groups keep the row order of
/// the correspondence table and are numbered from zero.
pub fn combine_datasets(
    correspondence: &CorrespondenceTable,
    datasets: &[Dataset],
    target_columns: &[Field],
) -> Result<MatchedTable> {
    let logger = StageLogger::new(MatchingStage::Combination);
    let mut columns: Vec<(&str, &Dataset)> = Vec::with_capacity(correspondence.labels.len());
    for label in &correspondence.labels {
        let dataset = datasets
            .iter()
            .find(|d| &d.label == label)
            .ok_or_else(|| MatchingError::UnknownDataset {
                label: label.clone(),
            })?;
        columns.push((label.as_str(), dataset));
    }

    let mut target_columns = target_columns.to_vec();
    target_columns.sort();
    target_columns.dedup();

    let mut rows = Vec::with_capacity(correspondence.len());
    for (group_id, entries) in correspondence.rows.iter().enumerate() {
        let mut sources = BTreeMap::new();
        for (entry, (label, dataset)) in entries.iter().zip(&columns) {
            let Some(index) = *entry else { continue };
            let record = dataset.records.get(index).ok_or_else(|| {
                MatchingError::RecordIndexOutOfRange {
                    label: label.to_string(),
                    index,
                    len: dataset.len(),
                }
            })?;
            sources.insert(label.to_string(), record.restrict_to(&target_columns));
        }
        rows.push(MatchedRow { group_id, sources });
    }
    logger.log_completion(&format!(
        "{} match groups over {} sources",
        rows.len(),
        columns.len()
    ));

    Ok(MatchedTable {
        labels: correspondence.labels.clone(),
        target_columns,
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PowerPlant;

    fn dataset(label: &str, names: &[&str]) -> Dataset {
        Dataset::new(
            label,
            names
                .iter()
                .map(|n| {
                    PowerPlant::new()
                        .with_text(Field::Name, n)
                        .with_text(Field::File, "raw.csv")
                })
                .collect(),
        )
    }

    #[test]
    fn test_rows_align_records_by_correspondence() {
        let correspondence = CorrespondenceTable {
            labels: vec!["A".into(), "B".into()],
            rows: vec![vec![Some(1), Some(0)], vec![None, Some(1)]],
        };
        let datasets = vec![dataset("B", &["b0", "b1"]), dataset("A", &["a0", "a1"])];
        let table = combine_datasets(&correspondence, &datasets, &[Field::Name]).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0].sources["A"].name(), Some("a1"));
        assert_eq!(table.rows[0].sources["B"].name(), Some("b0"));
        assert!(!table.rows[1].sources.contains_key("A"));
        assert!(!table.rows[0].sources["A"].has(Field::File));
    }

    #[test]
    fn test_unknown_label_and_bad_index_are_errors() {
        let correspondence = CorrespondenceTable {
            labels: vec!["A".into(), "C".into()],
            rows: vec![vec![Some(0), None]],
        };
        let err = combine_datasets(&correspondence, &[dataset("A", &["a0"])], &Field::ALL)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MatchingError>(),
            Some(MatchingError::UnknownDataset { .. })
        ));

        let correspondence = CorrespondenceTable {
            labels: vec!["A".into()],
            rows: vec![vec![Some(3)]],
        };
        let err = combine_datasets(&correspondence, &[dataset("A", &["a0"])], &Field::ALL)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MatchingError>(),
            Some(MatchingError::RecordIndexOutOfRange { index: 3, len: 1, .. })
        ));
    }
}
