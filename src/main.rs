use anyhow::{Context, Result};
use chrono::Utc;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{info, warn};
use plant_matching_lib::cleaning::{clean_technology, AggregationOptions};
use plant_matching_lib::errors::MatchingError;
use plant_matching_lib::matching::{
    aggregate_datasets, combine_multiple_datasets, extend_by_non_matched, reduce_matched_table,
    run_on_pool_runtime, PoolOptions,
};
use plant_matching_lib::models::stats_models::{MatchingStage, PipelineStats};
use plant_matching_lib::models::Dataset;
use plant_matching_lib::scoring::{DukeScorer, EmbeddedScorer, SimilarityScorer};
use plant_matching_lib::utils::config::{
    config_filter, load_sources_config, reliability_scores, MatchingConfig, ScorerKind,
    SourcesConfig,
};
use plant_matching_lib::utils::env::load_env;
use plant_matching_lib::utils::get_memory_usage;
use plant_matching_lib::utils::io::{read_dataset, write_canonical, write_matched_long};
use plant_matching_lib::utils::progress_bars::logging::{
    log_pipeline_completion, log_pipeline_phase, log_pipeline_start,
};
use plant_matching_lib::utils::progress_bars::progress_config::ProgressConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

fn build_scorer(config: &MatchingConfig) -> Result<Arc<dyn SimilarityScorer>> {
    match config.scorer {
        ScorerKind::Embedded => Ok(Arc::new(EmbeddedScorer::default())),
        ScorerKind::Duke => {
            let home = config.duke_home.clone().ok_or_else(|| {
                MatchingError::Configuration("SCORER=duke requires DUKE_HOME".to_string())
            })?;
            Ok(Arc::new(DukeScorer::new(home).with_timeout(config.task_timeout)))
        }
    }
}

/// Read `<DATA_DIR>/<label>.csv`, apply the configured filters and
/// normalize technologies.
fn load_source(label: &str, config: &MatchingConfig, sources: &SourcesConfig) -> Result<Dataset> {
    let path = config.data_dir.join(format!("{}.csv", label));
    let raw = read_dataset(&path, label)
        .with_context(|| format!("Failed to load source '{}'", label))?;
    let source_config = sources.get(label);
    if source_config.is_none() {
        warn!("⚠️ Source '{}' has no entry in {}", label, config.sources_config.display());
    }
    let filtered = config_filter(&raw, config, source_config);
    info!("📥 {}: {} records ({} after filtering)", label, raw.len(), filtered.len());
    Ok(clean_technology(&filtered, false))
}

fn output_path(config: &MatchingConfig, name: &str) -> PathBuf {
    config.output_dir.join(name)
}

fn main() -> Result<()> {
    run_on_pool_runtime(run())?
}

async fn run() -> Result<()> {
    env_logger::init();
    info!("Starting power plant matching pipeline");
    load_env();

    let config = MatchingConfig::from_env().context("Invalid matching configuration")?;
    config.log_config();

    let progress_config = ProgressConfig::from_env();
    info!(
        "Progress tracking: enabled={}, detailed={}",
        progress_config.enabled, progress_config.detailed
    );
    let multi_progress = progress_config.create_multi_progress();
    let stage_progress: Option<&MultiProgress> = if progress_config.should_show_detailed() {
        multi_progress.as_ref()
    } else {
        None
    };

    let main_pb = multi_progress.as_ref().map(|mp| {
        let pb = mp.add(ProgressBar::new(5));
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▉▊▋▌▍▎▏  "),
        );
        pb.set_message("Loading sources...");
        pb
    });

    let sources_config = load_sources_config(&config.sources_config)?;
    let labels: Vec<String> = if config.matching_sources.is_empty() {
        sources_config.keys().cloned().collect()
    } else {
        config.matching_sources.clone()
    };
    if labels.is_empty() {
        return Err(MatchingError::Configuration("no matching sources configured".to_string()).into());
    }

    let run_id = Uuid::new_v4().to_string();
    let run_timestamp = Utc::now();
    let scorer = build_scorer(&config)?;
    let pool = PoolOptions::from_config(&config);
    log_pipeline_start(&run_id, &labels, pool.workers, scorer.name());
    info!("🕒 Run started at {}", run_timestamp.to_rfc3339());
    let mut stats = PipelineStats::new(run_id.clone(), labels.clone());

    // Phase 1: load and aggregate units
    let stage_start = Instant::now();
    let aggregation = AggregationOptions {
        country_wise: config.country_wise,
        target_columns: config.target_columns.clone(),
        ..Default::default()
    };
    let mut datasets: Vec<Option<Dataset>> = Vec::with_capacity(labels.len());
    let mut unit_level: Vec<(usize, Dataset)> = Vec::new();
    for (position, label) in labels.iter().enumerate() {
        let dataset = load_source(label, &config, &sources_config)?;
        let already_plants = sources_config
            .get(label)
            .map_or(false, |s| s.aggregated_units);
        if already_plants {
            let records = dataset
                .records
                .iter()
                .map(|r| r.restrict_to(&config.target_columns))
                .collect();
            datasets.push(Some(Dataset::new(label.clone(), records)));
        } else {
            datasets.push(None);
            unit_level.push((position, dataset));
        }
    }
    let (positions, to_aggregate): (Vec<usize>, Vec<Dataset>) = unit_level.into_iter().unzip();
    let (aggregated, aggregation_stats) = aggregate_datasets(
        to_aggregate,
        scorer.clone(),
        aggregation.clone(),
        &pool,
        stage_progress,
    )
    .await?;
    for (position, dataset) in positions.into_iter().zip(aggregated) {
        datasets[position] = Some(dataset);
    }
    let datasets: Vec<Dataset> = datasets.into_iter().flatten().collect();
    stats.aggregation = aggregation_stats;
    stats.record_time(MatchingStage::Aggregation, stage_start.elapsed());
    if let Some(pb) = &main_pb {
        pb.inc(1);
        pb.set_message("Linking datasets...");
    }

    // Phase 2: pairwise links, closure and combination
    let stage_start = Instant::now();
    let (matched, link_stats) = combine_multiple_datasets(
        Arc::new(datasets),
        scorer.clone(),
        &pool,
        &config.target_columns,
        stage_progress,
    )
    .await?;
    stats.links = link_stats;
    stats.match_groups = matched.len();
    stats.record_time(MatchingStage::Linking, stage_start.elapsed());

    let sources_tag = labels.join("_");
    let matched_path = output_path(&config, &format!("Matched_{}.csv", sources_tag));
    write_matched_long(&matched_path, &matched)?;
    info!("💾 Matched table written to {}", matched_path.display());
    if let Some(pb) = &main_pb {
        pb.inc(1);
        pb.set_message("Reducing match groups...");
    }

    // Phase 3: reduction
    let stage_start = Instant::now();
    log_pipeline_phase("Reduction", Some(&format!("{} match groups", matched.len())));
    let scores = reliability_scores(&sources_config);
    let mut canonical = reduce_matched_table(&matched, &scores)?;
    stats.canonical_plants = canonical.len();
    stats.record_time(MatchingStage::Reduction, stage_start.elapsed());

    let reduced_path = output_path(&config, &format!("Matched_{}_reduced.csv", sources_tag));
    write_canonical(&reduced_path, &canonical, &config.target_columns)?;
    info!("💾 Reduced table written to {}", reduced_path.display());
    if let Some(pb) = &main_pb {
        pb.inc(1);
        pb.set_message("Extending by non-matched records...");
    }

    // Phase 4: extension
    let stage_start = Instant::now();
    if !config.extension_sources.is_empty() {
        log_pipeline_phase("Extension", Some(&config.extension_sources.join(", ")));
    }
    for label in &config.extension_sources {
        let dataset = load_source(label, &config, &sources_config)?;
        let aggregate = !sources_config
            .get(label)
            .map_or(false, |s| s.aggregated_units);
        let scorer_ref: &dyn SimilarityScorer = scorer.as_ref();
        let options = aggregate.then_some((scorer_ref, &aggregation));
        let added =
            extend_by_non_matched(&mut canonical, &dataset, options, &config.target_columns)
                .with_context(|| format!("Failed to extend by '{}'", label))?;
        stats.extended_plants += added;
    }
    stats.record_time(MatchingStage::Extension, stage_start.elapsed());
    if let Some(pb) = &main_pb {
        pb.inc(1);
        pb.set_message("Writing results...");
    }

    let final_path = output_path(&config, "powerplants.csv");
    write_canonical(&final_path, &canonical, &config.target_columns)?;
    info!("💾 Final plant list ({} plants) written to {}", canonical.len(), final_path.display());
    if let Some(pb) = &main_pb {
        pb.inc(1);
        pb.finish_with_message("Pipeline complete");
    }

    let memory = if progress_config.should_show_memory() {
        Some(get_memory_usage().await)
    } else {
        None
    };
    log_pipeline_completion(&stats, memory);
    Ok(())
}
