// src/utils/progress_bars/logging.rs - Logging helpers for the matching stages
use log::{debug, error, info, warn};
use std::time::{Duration, Instant};

use crate::models::stats_models::{AggregationStats, LinkStats, MatchingStage, PipelineStats};

fn stage_labels(stage: MatchingStage) -> (&'static str, &'static str) {
    match stage {
        MatchingStage::Aggregation => ("AGGREGATION", "🧱"),
        MatchingStage::Linking => ("LINKING", "🔗"),
        MatchingStage::Closure => ("CLOSURE", "🕸️"),
        MatchingStage::Combination => ("COMBINATION", "🧩"),
        MatchingStage::Reduction => ("REDUCTION", "🗜️"),
        MatchingStage::Extension => ("EXTENSION", "➕"),
    }
}

#[derive(Clone)]
pub struct StageLogger {
    stage_name: &'static str,
    stage_emoji: &'static str,
    start_time: Instant,
}

impl StageLogger {
    pub fn new(stage: MatchingStage) -> Self {
        let (stage_name, stage_emoji) = stage_labels(stage);
        Self {
            stage_name,
            stage_emoji,
            start_time: Instant::now(),
        }
    }

    pub fn log_start(&self, subject: &str) {
        info!(
            "[{}] {} 🚀 Starting {} of {}",
            self.stage_name,
            self.stage_emoji,
            self.stage_name.to_lowercase(),
            subject
        );
    }

    pub fn log_phase(&self, phase: &str, details: Option<&str>) {
        let elapsed = self.start_time.elapsed();
        match details {
            Some(details) => info!(
                "[{}] {} 🔄 Phase: {} - {} [+{:.1}s]",
                self.stage_name,
                self.stage_emoji,
                phase,
                details,
                elapsed.as_secs_f32()
            ),
            None => info!(
                "[{}] {} 🔄 Phase: {} [+{:.1}s]",
                self.stage_name,
                self.stage_emoji,
                phase,
                elapsed.as_secs_f32()
            ),
        }
    }

    pub fn log_partition_skipped(&self, context: &str, country: Option<&str>, reason: &str) {
        warn!(
            "[{}] {} ⏭️  {}: skipping partition '{}' ({})",
            self.stage_name,
            self.stage_emoji,
            context,
            country.unwrap_or("<no country>"),
            reason
        );
    }

    pub fn log_partition_scored(&self, context: &str, country: Option<&str>, links: usize) {
        debug!(
            "[{}] {} {}: partition '{}' produced {} links",
            self.stage_name,
            self.stage_emoji,
            context,
            country.unwrap_or("<all>"),
            links
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!("[{}] {} ⚠️  {}", self.stage_name, self.stage_emoji, message);
    }

    pub fn log_debug(&self, message: &str) {
        debug!("[{}] {} {}", self.stage_name, self.stage_emoji, message);
    }

    pub fn log_completion(&self, summary: &str) {
        info!(
            "[{}] {} ✅ COMPLETED in {:.2?}: {}",
            self.stage_name,
            self.stage_emoji,
            self.start_time.elapsed(),
            summary
        );
    }
}

// Pipeline-level logging functions
pub fn log_pipeline_start(run_id: &str, sources: &[String], workers: usize, scorer: &str) {
    info!("🚀 ===== POWER PLANT MATCHING STARTING =====");
    info!("📅 Run ID: {}", run_id);
    info!("⚙️  Configuration:");
    info!("   • Sources: {}", sources.join(", "));
    info!("   • Pairwise comparisons: {}", sources.len() * sources.len().saturating_sub(1) / 2);
    info!("   • Worker pool: {} simultaneous tasks", workers);
    info!("   • Similarity scorer: {}", scorer);
    info!("=============================================");
}

pub fn log_pipeline_phase(phase: &str, details: Option<&str>) {
    match details {
        Some(details) => info!("🔄 Pipeline Phase: {} - {}", phase, details),
        None => info!("🔄 Pipeline Phase: {}", phase),
    }
}

pub fn log_task_slot(task: &str, slot_acquired: bool) {
    if slot_acquired {
        debug!("🚦 {} acquired a worker slot", task);
    } else {
        debug!("⏳ {} waiting for a worker slot...", task);
    }
}

pub fn log_task_failed(task: &str, duration: Duration, error: &str) {
    error!("❌ {} failed after {:.2?}: {}", task, duration, error);
}

pub fn log_aggregation_stats(stats: &AggregationStats) {
    info!(
        "🧱 {}: {} units → {} plants ({} multi-unit groups, {} reciprocal duplicate edges)",
        stats.dataset,
        stats.records_in,
        stats.records_out,
        stats.multi_unit_groups,
        stats.reciprocal_edges
    );
}

pub fn log_link_stats(stats: &LinkStats) {
    info!(
        "🔗 {} ↔ {}: {} raw links → {} best matches ({} partitions compared, {} skipped)",
        stats.left_label,
        stats.right_label,
        stats.raw_links,
        stats.best_matches,
        stats.partitions_compared,
        stats.partitions_skipped
    );
}

pub fn log_pipeline_completion(stats: &PipelineStats, memory_mb: Option<u64>) {
    info!("🎉 ===== POWER PLANT MATCHING COMPLETED =====");
    info!("📅 Run ID: {}", stats.run_id);
    info!("⏱️  Total Duration: {:.2?}", stats.total_time());
    info!("🎯 Match groups: {}", stats.match_groups);
    info!("🏭 Canonical plants: {}", stats.canonical_plants);
    if stats.extended_plants > 0 {
        info!("➕ Plants added by extension: {}", stats.extended_plants);
    }
    info!("");
    info!("📈 Stage Breakdown:");
    for (stage, duration) in &stats.stage_times {
        let (name, emoji) = stage_labels(*stage);
        info!("   {} {}: {:.2?}", emoji, name, duration);
    }
    if let Some(mb) = memory_mb {
        info!("💾 Memory in use: {} MB", mb);
    }
    info!("=============================================");
}
