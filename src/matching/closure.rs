// src/matching/closure.rs - Closure of pairwise links into multi-way matches
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use crate::models::stats_models::MatchingStage;
use crate::models::{CorrespondenceTable, LinkTable};
use crate::utils::progress_bars::logging::StageLogger;

type Row = Vec<Option<usize>>;

fn missing_count(row: &Row) -> usize {
    row.iter().filter(|v| v.is_none()).count()
}

/// Lexicographic order in which a missing entry sorts after any index.
fn compare_rows(a: &Row, b: &Row) -> Ordering {
    let key = |v: &Option<usize>| match v {
        Some(i) => (false, *i),
        None => (true, 0),
    };
    a.iter().map(key).cmp(b.iter().map(key))
}

/// Everything reachable through one label: each of its indices joined
/// with its partners in every table mentioning it. Several partners from
/// the same dataset multiply into several rows.
fn base_rows(link_tables: &[LinkTable], labels: &[String], pivot: usize) -> Vec<Row> {
    let label = labels[pivot].as_str();
    // pivot index → column → partners, both in first-seen order
    let mut joined: Vec<(usize, BTreeMap<usize, Vec<usize>>)> = Vec::new();
    let mut position: BTreeMap<usize, usize> = BTreeMap::new();

    for table in link_tables.iter().filter(|t| !t.is_empty() && t.mentions(label)) {
        let Some((other, pairs)) = table.oriented(label) else { continue };
        let Some(column) = labels.iter().position(|l| l == other) else { continue };
        if column == pivot {
            continue;
        }
        for (index, partner) in pairs {
            let slot = *position.entry(index).or_insert_with(|| {
                joined.push((index, BTreeMap::new()));
                joined.len() - 1
            });
            let partners = joined[slot].1.entry(column).or_default();
            if !partners.contains(&partner) {
                partners.push(partner);
            }
        }
    }

    let mut rows = Vec::new();
    for (index, partners) in joined {
        let mut expanded: Vec<Row> = vec![{
            let mut row = vec![None; labels.len()];
            row[pivot] = Some(index);
            row
        }];
        for (column, options) in partners {
            expanded = expanded
                .into_iter()
                .flat_map(|row| {
                    options.iter().map(move |&partner| {
                        let mut row = row.clone();
                        row[column] = Some(partner);
                        row
                    })
                })
                .collect();
        }
        rows.extend(expanded);
    }
    rows
}

/// Keep, for every index of `column`, only the most complete row (ties:
/// the smallest row). Rows missing that column are all kept.
fn resolve_column(rows: Vec<Row>, column: usize) -> Vec<Row> {
    let mut chosen: BTreeMap<usize, Row> = BTreeMap::new();
    let mut unassigned = Vec::new();
    for row in rows {
        let Some(index) = row[column] else {
            unassigned.push(row);
            continue;
        };
        let replace = match chosen.get(&index) {
            None => true,
            Some(current) => match missing_count(&row).cmp(&missing_count(current)) {
                Ordering::Less => true,
                Ordering::Equal => compare_rows(&row, current) == Ordering::Less,
                Ordering::Greater => false,
            },
        };
        if replace {
            chosen.insert(index, row);
        }
    }
    let mut resolved: Vec<Row> = chosen.into_values().collect();
    resolved.extend(unassigned);
    resolved
}

/// Close pairwise link tables over all `labels` into one correspondence
/// table. Indirect matches (A–B, B–C) end up in one row; conflicting
/// chains are broken in favour of the most complete row. No index of any
/// label appears in more than one row. Rows are ordered by descending
/// number of matched datasets, then lexicographically.
pub fn cross_matches(link_tables: &[LinkTable], labels: &[String]) -> CorrespondenceTable {
    let logger = StageLogger::new(MatchingStage::Closure);
    logger.log_start(&format!("{} link tables over {}", link_tables.len(), labels.join(", ")));

    if link_tables.iter().all(LinkTable::is_empty) {
        logger.log_warning("no pairwise links found, returning an empty correspondence table");
        return CorrespondenceTable::empty(labels);
    }

    let mut seen: HashSet<Row> = HashSet::new();
    let mut rows: Vec<Row> = Vec::new();
    for pivot in 0..labels.len() {
        for row in base_rows(link_tables, labels, pivot) {
            if seen.insert(row.clone()) {
                rows.push(row);
            }
        }
    }
    logger.log_phase("merged", Some(&format!("{} distinct candidate rows", rows.len())));

    for column in 0..labels.len() {
        rows = resolve_column(rows, column);
    }

    rows.sort_by(|a, b| {
        missing_count(a)
            .cmp(&missing_count(b))
            .then_with(|| compare_rows(a, b))
    });

    for (column, label) in labels.iter().enumerate() {
        if rows.iter().all(|row| row[column].is_none()) {
            logger.log_warning(&format!("no match reached dataset '{}'", label));
        }
    }
    logger.log_completion(&format!("{} match groups", rows.len()));

    CorrespondenceTable {
        labels: labels.to_vec(),
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_transitive_links_close_into_one_row() {
        let tables = vec![
            LinkTable::new("A", "B").with_pairs(vec![(1, 1)]),
            LinkTable::new("B", "C").with_pairs(vec![(1, 1)]),
        ];
        let table = cross_matches(&tables, &labels(&["A", "B", "C"]));
        assert_eq!(table.rows, vec![vec![Some(1), Some(1), Some(1)]]);
    }

    #[test]
    fn test_conflict_prefers_fewer_missing_then_smallest_row() {
        let tables = vec![
            LinkTable::new("A", "B").with_pairs(vec![(1, 1), (2, 1)]),
            LinkTable::new("B", "C").with_pairs(vec![(1, 5)]),
        ];
        let table = cross_matches(&tables, &labels(&["A", "B", "C"]));
        assert_eq!(table.rows, vec![vec![Some(1), Some(1), Some(5)]]);

        let tables = vec![LinkTable::new("A", "B").with_pairs(vec![(2, 1), (1, 1)])];
        let table = cross_matches(&tables, &labels(&["A", "B"]));
        assert_eq!(table.rows, vec![vec![Some(1), Some(1)]]);
    }

    #[test]
    fn test_indices_are_unique_per_column_and_rows_sorted_by_richness() {
        let tables = vec![
            LinkTable::new("A", "B").with_pairs(vec![(0, 0), (1, 2)]),
            LinkTable::new("A", "C").with_pairs(vec![(0, 3), (4, 4)]),
            LinkTable::new("B", "C").with_pairs(vec![(0, 3), (2, 7)]),
        ];
        let table = cross_matches(&tables, &labels(&["A", "B", "C"]));
        for column in 0..3 {
            let values: Vec<usize> = table.rows.iter().filter_map(|r| r[column]).collect();
            let unique: HashSet<usize> = values.iter().copied().collect();
            assert_eq!(values.len(), unique.len());
        }
        assert_eq!(table.rows[0], vec![Some(0), Some(0), Some(3)]);
        let counts: Vec<usize> = table.rows.iter().map(|r| 3 - missing_count(r)).collect();
        assert!(counts.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_result_is_independent_of_table_order() {
        let a = LinkTable::new("A", "B").with_pairs(vec![(0, 0), (1, 1)]);
        let b = LinkTable::new("C", "B").with_pairs(vec![(3, 1), (2, 0)]);
        let names = labels(&["A", "B", "C"]);
        assert_eq!(
            cross_matches(&[a.clone(), b.clone()], &names),
            cross_matches(&[b, a], &names)
        );
    }

    #[test]
    fn test_no_links_gives_empty_table_with_labels() {
        let tables = vec![LinkTable::new("A", "B")];
        let table = cross_matches(&tables, &labels(&["A", "B"]));
        assert!(table.is_empty());
        assert_eq!(table.labels, labels(&["A", "B"]));
        assert!(cross_matches(&[], &labels(&["A"])).is_empty());
    }
}
