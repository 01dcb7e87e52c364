// src/matching/manager.rs - Worker pool coordination of aggregation and linking
use anyhow::{anyhow, Context, Result};
use futures::future::join_all;
use indicatif::{MultiProgress, ProgressBar};
use log::{debug, info};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::cleaning::aggregation::{aggregate_units, AggregationOptions};
use crate::matching::closure::cross_matches;
use crate::matching::combine::combine_datasets;
use crate::matching::pairwise::compare_two_datasets;
use crate::models::stats_models::{AggregationStats, LinkStats};
use crate::models::{CorrespondenceTable, Dataset, Field, LinkTable, MatchedTable};
use crate::scoring::SimilarityScorer;
use crate::utils::config::MatchingConfig;
use crate::utils::progress_bars::logging::{
    log_aggregation_stats, log_link_stats, log_pipeline_phase, log_task_failed, log_task_slot,
};
use crate::utils::progress_bars::progress_config::stage_progress_bar;

/// How long runtime shutdown waits for blocking workers still running,
/// e.g. the scorer call of a timed-out task.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Maximum number of scorer invocations running at once.
    pub workers: usize,
    pub country_wise: bool,
    /// Per-task limit; a task exceeding it fails the whole run.
    pub task_timeout: Option<Duration>,
}

impl PoolOptions {
    pub fn from_config(config: &MatchingConfig) -> Self {
        Self {
            workers: config.worker_count(),
            country_wise: config.country_wise,
            task_timeout: config.task_timeout,
        }
    }
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            country_wise: true,
            task_timeout: None,
        }
    }
}

/// Drive `future` on a fresh multi-threaded runtime and shut it down
/// without waiting on abandoned blocking workers past `SHUTDOWN_GRACE`.
pub fn run_on_pool_runtime<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;
    let output = runtime.block_on(future);
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    Ok(output)
}

fn spawn_task<T, F>(
    name: String,
    work: F,
    semaphore: Arc<Semaphore>,
    timeout: Option<Duration>,
    progress: Option<ProgressBar>,
) -> JoinHandle<Result<T>>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::spawn(async move {
        log_task_slot(&name, false);
        let _permit = semaphore
            .acquire_owned()
            .await
            .context("Failed to acquire semaphore permit")?;
        log_task_slot(&name, true);

        let start = Instant::now();
        let blocking = tokio::task::spawn_blocking(work);
        let joined = match timeout {
            Some(limit) => tokio::time::timeout(limit, blocking)
                .await
                .map_err(|_| anyhow!("{} timed out after {:?}", name, limit))?,
            None => blocking.await,
        };
        let result = joined
            .with_context(|| format!("{} panicked", name))
            .and_then(|r| r);

        if let Err(e) = &result {
            log_task_failed(&name, start.elapsed(), &format!("{:#}", e));
        } else {
            debug!("{} finished in {:.2?}", name, start.elapsed());
        }
        if let Some(pb) = progress {
            pb.inc(1);
        }
        result
    })
}

/// Run all tasks on a bounded pool and wait for every one of them.
/// Results keep the task order; the first failure fails the run.
async fn run_pool<T, F>(
    tasks: Vec<(String, F)>,
    options: &PoolOptions,
    progress: Option<ProgressBar>,
) -> Result<Vec<T>>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(options.workers.max(1)));
    let handles: Vec<JoinHandle<Result<T>>> = tasks
        .into_iter()
        .map(|(name, work)| {
            spawn_task(
                name,
                work,
                semaphore.clone(),
                options.task_timeout,
                progress.clone(),
            )
        })
        .collect();

    let joined = join_all(handles).await;
    if let Some(pb) = &progress {
        pb.finish_and_clear();
    }

    let mut results = Vec::with_capacity(joined.len());
    for outcome in joined {
        let result = outcome.context("Worker task failed to join")??;
        results.push(result);
    }
    Ok(results)
}

/// Aggregate the units of every dataset into plants, in parallel.
pub async fn aggregate_datasets(
    datasets: Vec<Dataset>,
    scorer: Arc<dyn SimilarityScorer>,
    aggregation: AggregationOptions,
    options: &PoolOptions,
    multi_progress: Option<&MultiProgress>,
) -> Result<(Vec<Dataset>, Vec<AggregationStats>)> {
    if datasets.is_empty() {
        return Ok((Vec::new(), Vec::new()));
    }
    scorer.check_available()?;
    log_pipeline_phase(
        "Aggregation",
        Some(&format!("{} datasets, {} workers", datasets.len(), options.workers)),
    );

    let progress = stage_progress_bar(multi_progress, datasets.len() as u64, "aggregating units");
    let tasks: Vec<_> = datasets
        .into_iter()
        .map(|dataset| {
            let scorer = scorer.clone();
            let aggregation = aggregation.clone();
            let name = format!("aggregation of '{}'", dataset.label);
            (name, move || aggregate_units(&dataset, scorer.as_ref(), &aggregation))
        })
        .collect();

    let results = run_pool(tasks, options, progress).await?;
    let (aggregated, stats): (Vec<Dataset>, Vec<AggregationStats>) = results.into_iter().unzip();
    stats.iter().for_each(log_aggregation_stats);
    Ok((aggregated, stats))
}

/// Link every pair of datasets and close the links into one
/// correspondence table over all dataset labels.
pub async fn link_multiple_datasets(
    datasets: Arc<Vec<Dataset>>,
    scorer: Arc<dyn SimilarityScorer>,
    options: &PoolOptions,
    multi_progress: Option<&MultiProgress>,
) -> Result<(CorrespondenceTable, Vec<LinkStats>)> {
    let labels: Vec<String> = datasets.iter().map(|d| d.label.clone()).collect();
    scorer.check_available()?;

    let mut tasks = Vec::new();
    for i in 0..datasets.len() {
        for j in (i + 1)..datasets.len() {
            let datasets = datasets.clone();
            let scorer = scorer.clone();
            let country_wise = options.country_wise;
            let name = format!("linking {} ↔ {}", labels[i], labels[j]);
            tasks.push((name, move || {
                compare_two_datasets(&datasets[i], &datasets[j], scorer.as_ref(), country_wise)
            }));
        }
    }
    log_pipeline_phase(
        "Linking",
        Some(&format!("{} pairwise comparisons, {} workers", tasks.len(), options.workers)),
    );

    let progress = stage_progress_bar(multi_progress, tasks.len() as u64, "linking datasets");
    let results = run_pool(tasks, options, progress).await?;

    let (tables, stats): (Vec<LinkTable>, Vec<LinkStats>) = results.into_iter().unzip();
    stats.iter().for_each(log_link_stats);

    log_pipeline_phase("Closure", None);
    let correspondence = cross_matches(&tables, &labels);
    info!(
        "🕸️ {} match groups across {} datasets",
        correspondence.len(),
        labels.len()
    );
    Ok((correspondence, stats))
}

/// Link, close and materialize: the wide matched table of all datasets.
pub async fn combine_multiple_datasets(
    datasets: Arc<Vec<Dataset>>,
    scorer: Arc<dyn SimilarityScorer>,
    options: &PoolOptions,
    target_columns: &[Field],
    multi_progress: Option<&MultiProgress>,
) -> Result<(MatchedTable, Vec<LinkStats>)> {
    let (correspondence, stats) =
        link_multiple_datasets(datasets.clone(), scorer, options, multi_progress).await?;
    log_pipeline_phase("Combination", None);
    let table = combine_datasets(&correspondence, &datasets, target_columns)?;
    Ok((table, stats))
}
