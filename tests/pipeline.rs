use std::collections::BTreeMap;
use std::sync::Arc;

use plant_matching_lib::cleaning::{aggregate_units, AggregationOptions};
use plant_matching_lib::matching::{combine_multiple_datasets, reduce_matched_table, PoolOptions};
use plant_matching_lib::models::{Dataset, Field, PowerPlant};
use plant_matching_lib::scoring::{EmbeddedScorer, SimilarityScorer};
use plant_matching_lib::utils::io::{read_dataset, write_canonical, write_dataset};

const EMSLAND: (f64, f64) = (52.4747, 7.3172);
const ISAR: (f64, f64) = (48.6056, 12.2925);

fn plant(name: &str, capacity: f64, position: (f64, f64), id: &str) -> PowerPlant {
    PowerPlant::new()
        .with_text(Field::Name, name)
        .with_text(Field::Country, "Germany")
        .with_text(Field::Fueltype, "Nuclear")
        .with_number(Field::Capacity, capacity)
        .with_number(Field::Lat, position.0)
        .with_number(Field::Lon, position.1)
        .with_ids(Field::ProjectId, [id])
}

/// Unit-level registry: Emsland is reported as two blocks.
fn units() -> Dataset {
    Dataset::new(
        "UNITS",
        vec![
            plant("Emsland", 700.0, EMSLAND, "U1").with_number(Field::DateIn, 1990.0),
            plant("Isar", 1400.0, ISAR, "U3"),
            plant("Emsland", 700.0, EMSLAND, "U2").with_number(Field::DateIn, 1988.0),
        ],
    )
}

/// Plant-level registry with slightly different figures.
fn plants() -> Dataset {
    Dataset::new(
        "PLANTS",
        vec![
            plant("Isar", 1410.0, ISAR, "P2"),
            plant("Emsland", 1390.0, EMSLAND, "P1")
                .with_number(Field::DateIn, 1987.0)
                .with_text(Field::Technology, "steam turbine"),
        ],
    )
}

#[tokio::test]
async fn test_units_are_aggregated_linked_and_reduced() {
    let scorer = Arc::new(EmbeddedScorer::default());

    let (aggregated, stats) =
        aggregate_units(&units(), scorer.as_ref(), &AggregationOptions::default()).unwrap();
    assert_eq!(stats.records_in, 3);
    assert_eq!(aggregated.len(), 2);
    let emsland = &aggregated.records[0];
    assert_eq!(emsland.name(), Some("Emsland"));
    assert_eq!(emsland.capacity(), Some(1400.0));
    assert_eq!(emsland.number(Field::DateIn), Some(1988.0));
    assert_eq!(emsland.project_ids().map(|ids| ids.len()), Some(2));

    let shared: Arc<dyn SimilarityScorer> = scorer;
    let (matched, link_stats) = combine_multiple_datasets(
        Arc::new(vec![aggregated, plants()]),
        shared,
        &PoolOptions {
            workers: 2,
            ..Default::default()
        },
        &Field::ALL,
        None,
    )
    .await
    .unwrap();
    assert_eq!(link_stats.len(), 1);
    assert_eq!(link_stats[0].best_matches, 2);
    assert_eq!(matched.len(), 2);
    assert!(matched.rows.iter().all(|row| row.sources.len() == 2));

    let scores: BTreeMap<String, u32> =
        [("UNITS".to_string(), 5), ("PLANTS".to_string(), 3)].into_iter().collect();
    let canonical = reduce_matched_table(&matched, &scores).unwrap();
    assert_eq!(canonical.len(), 2);

    let emsland = canonical
        .iter()
        .find(|c| c.plant.name() == Some("Emsland"))
        .unwrap();
    // the more reliable unit registry wins capacity, dates take the earliest
    assert_eq!(emsland.plant.capacity(), Some(1400.0));
    assert_eq!(emsland.plant.number(Field::DateIn), Some(1987.0));
    assert_eq!(emsland.plant.text(Field::Technology), Some("Steam Turbine"));
    assert_eq!(emsland.sources(), vec!["PLANTS", "UNITS"]);
    assert_eq!(emsland.project_ids["UNITS"].len(), 2);
    assert!(emsland.project_ids["PLANTS"].contains("P1"));
}

#[tokio::test]
async fn test_sources_in_different_countries_stay_apart() {
    let scorer: Arc<dyn SimilarityScorer> = Arc::new(EmbeddedScorer::default());
    let french = Dataset::new(
        "FR",
        vec![plant("Emsland", 1400.0, EMSLAND, "F1").with_text(Field::Country, "France")],
    );
    let german = Dataset::new("DE", vec![plant("Emsland", 1400.0, EMSLAND, "D1")]);

    let (matched, link_stats) = combine_multiple_datasets(
        Arc::new(vec![french, german]),
        scorer,
        &PoolOptions::default(),
        &Field::ALL,
        None,
    )
    .await
    .unwrap();
    assert!(matched.is_empty());
    assert_eq!(link_stats[0].partitions_skipped, 1);
}

#[test]
fn test_aggregated_dataset_survives_csv() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("UNITS.csv");
    let scorer = EmbeddedScorer::default();
    let (aggregated, _) =
        aggregate_units(&units(), &scorer, &AggregationOptions::default()).unwrap();

    write_dataset(&path, &aggregated, &Field::ALL).unwrap();
    let reread = read_dataset(&path, "UNITS").unwrap();
    assert_eq!(reread.len(), aggregated.len());
    assert_eq!(reread.records[0].project_ids(), aggregated.records[0].project_ids());

    let canonical_path = dir.path().join("out").join("powerplants.csv");
    write_canonical(&canonical_path, &[], &Field::ALL).unwrap();
    assert!(canonical_path.exists());
}
