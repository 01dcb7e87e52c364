// src/cleaning/aggregation.rs - Within-source unit aggregation via clique detection
use anyhow::{Context, Result};
use log::{debug, warn};
use petgraph::algo;
use petgraph::graph::{DiGraph, NodeIndex, UnGraph};
use std::collections::BTreeSet;
use std::time::Instant;

use crate::cleaning::names::clean_powerplant_names;
use crate::models::stats_models::AggregationStats;
use crate::models::{Aggregation, Dataset, Field, PowerPlant, SimilarityLink};
use crate::scoring::{candidates, ScoringBatch, SimilarityScorer};

#[derive(Debug, Clone)]
pub struct AggregationOptions {
    /// Only look for duplicates among records of the same country.
    pub country_wise: bool,
    /// Clean names before scoring.
    pub pre_clean_name: bool,
    pub target_columns: Vec<Field>,
}

impl Default for AggregationOptions {
    fn default() -> Self {
        Self {
            country_wise: true,
            pre_clean_name: true,
            target_columns: Field::ALL.to_vec(),
        }
    }
}

/// Undirected graph holding an edge only where the duplicate links
/// point both ways. Out-of-range and self links are ignored.
fn reciprocal_graph(record_count: usize, links: &[SimilarityLink]) -> UnGraph<usize, ()> {
    let mut directed: DiGraph<usize, ()> = DiGraph::with_capacity(record_count, links.len());
    for i in 0..record_count {
        directed.add_node(i);
    }
    for link in links {
        if link.left == link.right || link.left >= record_count || link.right >= record_count {
            continue;
        }
        let (a, b) = (NodeIndex::new(link.left), NodeIndex::new(link.right));
        if directed.find_edge(a, b).is_none() {
            directed.add_edge(a, b, ());
        }
    }

    let mut undirected: UnGraph<usize, ()> = UnGraph::with_capacity(record_count, 0);
    for i in 0..record_count {
        undirected.add_node(i);
    }
    for edge in directed.edge_indices() {
        if let Some((a, b)) = directed.edge_endpoints(edge) {
            if a < b && directed.find_edge(b, a).is_some() {
                undirected.add_edge(a, b, ());
            }
        }
    }
    undirected
}

/// Every maximal clique of `graph` as sets of record indices.
fn maximal_cliques(graph: &UnGraph<usize, ()>) -> Vec<BTreeSet<usize>> {
    algo::maximal_cliques(graph)
        .into_iter()
        .map(|clique| clique.into_iter().map(NodeIndex::index).collect())
        .collect()
}

/// Group record indices `0..record_count` into plants. Groups are the
/// maximal cliques of the reciprocal duplicate graph; a record in several
/// cliques joins the largest one (ties: the lexicographically smaller
/// member list), records
/// in no clique stay alone. Groups come back ordered by smallest member.
pub fn find_unit_groups(record_count: usize, links: &[SimilarityLink]) -> Vec<Vec<usize>> {
    let graph = reciprocal_graph(record_count, links);
    let mut cliques: Vec<BTreeSet<usize>> = maximal_cliques(&graph)
        .into_iter()
        .filter(|c| c.len() > 1)
        .collect();
    cliques.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    let mut assigned = vec![false; record_count];
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for clique in cliques {
        let members: Vec<usize> = clique.into_iter().filter(|&i| !assigned[i]).collect();
        for &i in &members {
            assigned[i] = true;
        }
        if !members.is_empty() {
            groups.push(members);
        }
    }
    groups.extend((0..record_count).filter(|&i| !assigned[i]).map(|i| vec![i]));
    groups.sort_by_key(|g| g[0]);
    groups
}

/// Merge the members of one group field by field.
pub fn aggregate_group(members: &[&PowerPlant], target_columns: &[Field]) -> PowerPlant {
    let mut plant = PowerPlant::new();
    for &field in target_columns {
        plant.set(field, field.unit_aggregation().apply(field, members));
    }
    plant
}

fn has_zero_capacity_weighting(members: &[&PowerPlant], target_columns: &[Field]) -> bool {
    let weighted = target_columns
        .iter()
        .filter(|f| f.unit_aggregation() == Aggregation::WeightedMean)
        .any(|&f| members.iter().any(|m| m.has(f)));
    let total: f64 = members.iter().filter_map(|m| m.capacity()).sum();
    weighted && total == 0.0
}

/// Aggregate units of one dataset into plants using the scorer's
/// duplicate links. The result is restricted to `target_columns` and
/// name-cleaned.
pub fn aggregate_units(
    dataset: &Dataset,
    scorer: &dyn SimilarityScorer,
    options: &AggregationOptions,
) -> Result<(Dataset, AggregationStats)> {
    let start = Instant::now();
    let mut stats = AggregationStats {
        dataset: dataset.label.clone(),
        records_in: dataset.len(),
        ..Default::default()
    };
    if dataset.is_empty() {
        return Ok((dataset.clone(), stats));
    }

    let working = if options.pre_clean_name {
        clean_powerplant_names(dataset)
    } else {
        dataset.clone()
    };

    let partitions: Vec<Vec<usize>> = if options.country_wise {
        working
            .partition_by_country()
            .into_iter()
            .filter_map(|(country, indices)| match country {
                Some(_) => Some(indices),
                None => {
                    debug!(
                        "Skipping {} records without country in '{}'",
                        indices.len(),
                        working.label
                    );
                    None
                }
            })
            .collect()
    } else {
        vec![(0..working.len()).collect()]
    };

    let mut links: Vec<SimilarityLink> = Vec::new();
    for indices in &partitions {
        let batch = ScoringBatch::Deduplicate {
            records: candidates(&working, indices),
        };
        if batch.is_empty() {
            continue;
        }
        let found = scorer
            .score(&batch)
            .with_context(|| format!("Deduplication of '{}' failed", working.label))?;
        links.extend(found);
    }
    stats.duplicate_links = links.len();
    stats.reciprocal_edges = reciprocal_graph(working.len(), &links).edge_count();

    let groups = find_unit_groups(working.len(), &links);
    let mut records = Vec::with_capacity(groups.len());
    for group in &groups {
        let members: Vec<&PowerPlant> = group.iter().map(|&i| &working.records[i]).collect();
        if members.len() > 1 {
            stats.multi_unit_groups += 1;
        }
        if has_zero_capacity_weighting(&members, &options.target_columns) {
            stats.zero_capacity_groups += 1;
        }
        records.push(aggregate_group(&members, &options.target_columns));
    }
    if stats.zero_capacity_groups > 0 {
        warn!(
            "⚠️ {} groups in '{}' have zero total capacity, their weighted means are left missing",
            stats.zero_capacity_groups, working.label
        );
    }

    let aggregated = clean_powerplant_names(&Dataset::new(working.label.clone(), records));
    stats.records_out = aggregated.len();
    debug!(
        "Aggregated '{}' in {:.2?}: {} → {} records",
        aggregated.label,
        start.elapsed(),
        stats.records_in,
        stats.records_out
    );
    Ok((aggregated, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::PrecomputedScorer;

    fn both_ways(a: usize, b: usize) -> [SimilarityLink; 2] {
        [SimilarityLink::new(a, b, 0.99), SimilarityLink::new(b, a, 0.99)]
    }

    #[test]
    fn test_one_directional_link_does_not_merge() {
        let mut links: Vec<SimilarityLink> = both_ways(0, 1).to_vec();
        links.extend(both_ways(1, 2));
        links.push(SimilarityLink::new(0, 2, 0.99));
        let groups = find_unit_groups(3, &links);
        // 0-1 and 1-2 are separate cliques; 1 joins the one with the smaller member
        assert_eq!(groups, vec![vec![0, 1], vec![2]]);

        links.push(SimilarityLink::new(2, 0, 0.99));
        assert_eq!(find_unit_groups(3, &links), vec![vec![0, 1, 2]]);
    }

    #[test]
    fn test_record_joins_largest_clique() {
        let mut links = Vec::new();
        for (a, b) in [(0, 1), (2, 3), (2, 4), (3, 4)] {
            links.extend(both_ways(a, b));
        }
        links.extend(both_ways(1, 2));
        let groups = find_unit_groups(5, &links);
        assert_eq!(groups, vec![vec![0, 1], vec![2, 3, 4]]);
    }

    #[test]
    fn test_maximal_cliques_of_reciprocal_graph() {
        let mut links = Vec::new();
        for (a, b) in [(0, 1), (1, 2), (0, 2), (2, 3)] {
            links.extend(both_ways(a, b));
        }
        let graph = reciprocal_graph(5, &links);
        let mut cliques: Vec<BTreeSet<usize>> =
            maximal_cliques(&graph).into_iter().filter(|c| c.len() > 1).collect();
        cliques.sort();
        assert_eq!(
            cliques,
            vec![BTreeSet::from([0, 1, 2]), BTreeSet::from([2, 3])]
        );
    }

    #[test]
    fn test_equal_cliques_sharing_a_member_resolve_by_order() {
        let mut links = both_ways(0, 2).to_vec();
        links.extend(both_ways(0, 1));
        assert_eq!(find_unit_groups(3, &links), vec![vec![0, 1], vec![2]]);
    }

    #[test]
    fn test_malformed_links_yield_singletons() {
        let links = vec![SimilarityLink::new(0, 0, 1.0), SimilarityLink::new(1, 7, 1.0)];
        assert_eq!(find_unit_groups(2, &links), vec![vec![0], vec![1]]);
        assert!(find_unit_groups(0, &[]).is_empty());
    }

    fn unit(name: &str, capacity: f64) -> PowerPlant {
        PowerPlant::new()
            .with_text(Field::Name, name)
            .with_text(Field::Country, "Germany")
            .with_text(Field::Fueltype, "Hard Coal")
            .with_number(Field::Capacity, capacity)
    }

    #[test]
    fn test_aggregate_units_conserves_capacity() {
        let dataset = Dataset::new(
            "UNITS",
            vec![
                unit("Heyden", 50.0).with_number(Field::DateIn, 1987.0),
                unit("Heyden", 30.0).with_number(Field::DateIn, 1975.0),
                unit("Heyden", 20.0).with_ids(Field::ProjectId, ["u3"]),
                unit("Scholven", 10.0),
            ],
        );
        let mut links = both_ways(0, 1).to_vec();
        links.extend(both_ways(0, 2));
        links.extend(both_ways(1, 2));
        let scorer = PrecomputedScorer::new().with_duplicates("UNITS", links);
        let options = AggregationOptions {
            pre_clean_name: false,
            ..Default::default()
        };

        let (aggregated, stats) = aggregate_units(&dataset, &scorer, &options).unwrap();
        assert_eq!(aggregated.len(), 2);
        assert_eq!(stats.multi_unit_groups, 1);
        assert_eq!(stats.reciprocal_edges, 3);

        let heyden = &aggregated.records[0];
        assert_eq!(heyden.name(), Some("Heyden"));
        assert_eq!(heyden.capacity(), Some(100.0));
        assert_eq!(heyden.number(Field::DateIn), Some(1975.0));
        assert_eq!(heyden.project_ids().map(|ids| ids.len()), Some(1));

        let total: f64 = aggregated.records.iter().filter_map(|r| r.capacity()).sum();
        assert_eq!(total, 110.0);
    }

    #[test]
    fn test_empty_dataset_is_returned_unchanged() {
        let dataset = Dataset::new("EMPTY", Vec::new());
        let scorer = PrecomputedScorer::new();
        let (aggregated, stats) =
            aggregate_units(&dataset, &scorer, &AggregationOptions::default()).unwrap();
        assert!(aggregated.is_empty());
        assert_eq!(stats.records_out, 0);
    }
}
