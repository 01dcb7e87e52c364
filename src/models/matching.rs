// src/models/matching.rs

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::models::core::{Field, FieldValue, PowerPlant};

/// A scored pair of record indices produced by a similarity scorer.
/// In deduplication mode both indices refer to the same dataset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SimilarityLink {
    pub left: usize,
    pub right: usize,
    pub score: f64,
}

impl SimilarityLink {
    pub fn new(left: usize, right: usize, score: f64) -> Self {
        Self {
            left,
            right,
            score: score.clamp(0.0, 1.0),
        }
    }
}

/// Best matches between two datasets, one row per linked record pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkTable {
    pub left_label: String,
    pub right_label: String,
    pub pairs: Vec<(usize, usize)>,
}

impl LinkTable {
    pub fn new(left_label: impl Into<String>, right_label: impl Into<String>) -> Self {
        Self {
            left_label: left_label.into(),
            right_label: right_label.into(),
            pairs: Vec::new(),
        }
    }

    pub fn with_pairs(mut self, pairs: Vec<(usize, usize)>) -> Self {
        self.pairs = pairs;
        self
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn mentions(&self, label: &str) -> bool {
        self.left_label == label || self.right_label == label
    }

    /// Pairs re-oriented as `(index in label, (other label, index in other))`.
    pub fn oriented(&self, label: &str) -> Option<(&str, Vec<(usize, usize)>)> {
        if self.left_label == label {
            Some((self.right_label.as_str(), self.pairs.clone()))
        } else if self.right_label == label {
            Some((
                self.left_label.as_str(),
                self.pairs.iter().map(|&(l, r)| (r, l)).collect(),
            ))
        } else {
            None
        }
    }
}

/// Multi-way correspondence: one column per dataset label, one row per
/// match group; entries are record indices or missing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrespondenceTable {
    pub labels: Vec<String>,
    pub rows: Vec<Vec<Option<usize>>>,
}

impl CorrespondenceTable {
    pub fn empty(labels: &[String]) -> Self {
        Self {
            labels: labels.to_vec(),
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    /// Non-missing entries of one column, in row order.
    pub fn column(&self, label: &str) -> Vec<usize> {
        match self.column_index(label) {
            Some(c) => self.rows.iter().filter_map(|row| row[c]).collect(),
            None => Vec::new(),
        }
    }
}

/// One match group of the wide matched table: each present source
/// contributes its full record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchedRow {
    pub group_id: usize,
    pub sources: BTreeMap<String, PowerPlant>,
}

/// Wide matched table, logically keyed by (group, field, source).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchedTable {
    pub labels: Vec<String>,
    pub target_columns: Vec<Field>,
    pub rows: Vec<MatchedRow>,
}

impl MatchedTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The (field → source → value) view of one group.
    pub fn field_values(&self, row: usize, field: Field) -> BTreeMap<&str, &FieldValue> {
        self.rows
            .get(row)
            .map(|r| {
                r.sources
                    .iter()
                    .filter_map(|(label, plant)| plant.get(field).map(|v| (label.as_str(), v)))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Terminal output row: one plant per match group with full provenance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalPlant {
    pub id: usize,
    pub plant: PowerPlant,
    /// source label → source-local ids
    pub project_ids: BTreeMap<String, BTreeSet<String>>,
}

impl CanonicalPlant {
    pub fn sources(&self) -> Vec<&str> {
        self.project_ids.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_table_orientation() {
        let table = LinkTable::new("A", "B").with_pairs(vec![(0, 3), (2, 1)]);
        let (other, pairs) = table.oriented("B").unwrap();
        assert_eq!(other, "A");
        assert_eq!(pairs, vec![(3, 0), (1, 2)]);
        assert!(table.oriented("C").is_none());
        assert!(table.mentions("A") && table.mentions("B"));
        assert!(!table.mentions("C"));
    }

    #[test]
    fn test_similarity_link_score_is_clamped() {
        assert_eq!(SimilarityLink::new(0, 1, 1.7).score, 1.0);
        assert_eq!(SimilarityLink::new(0, 1, -0.2).score, 0.0);
    }

    #[test]
    fn test_matched_table_field_view() {
        let mut sources = BTreeMap::new();
        sources.insert("A".to_string(), PowerPlant::new().with_number(Field::Capacity, 10.0));
        sources.insert("B".to_string(), PowerPlant::new());
        let table = MatchedTable {
            labels: vec!["A".into(), "B".into()],
            target_columns: Field::ALL.to_vec(),
            rows: vec![MatchedRow { group_id: 0, sources }],
        };
        let view = table.field_values(0, Field::Capacity);
        assert_eq!(view.len(), 1);
        assert_eq!(view["A"].as_number(), Some(10.0));
    }
}
