// src/models/stats_models.rs

use serde::Serialize;
use std::time::Duration;

/// Pipeline stages, used for log prefixes and timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MatchingStage {
    Aggregation,
    Linking,
    Closure,
    Combination,
    Reduction,
    Extension,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregationStats {
    pub dataset: String,
    pub records_in: usize,
    pub records_out: usize,
    pub duplicate_links: usize,
    pub reciprocal_edges: usize,
    pub multi_unit_groups: usize,
    pub zero_capacity_groups: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LinkStats {
    pub left_label: String,
    pub right_label: String,
    pub partitions_compared: usize,
    pub partitions_skipped: usize,
    pub raw_links: usize,
    pub best_matches: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineStats {
    pub run_id: String,
    pub sources: Vec<String>,
    pub aggregation: Vec<AggregationStats>,
    pub links: Vec<LinkStats>,
    pub match_groups: usize,
    pub canonical_plants: usize,
    pub extended_plants: usize,
    #[serde(skip)]
    pub stage_times: Vec<(MatchingStage, Duration)>,
}

impl PipelineStats {
    pub fn new(run_id: impl Into<String>, sources: Vec<String>) -> Self {
        Self {
            run_id: run_id.into(),
            sources,
            ..Default::default()
        }
    }

    pub fn record_time(&mut self, stage: MatchingStage, elapsed: Duration) {
        self.stage_times.push((stage, elapsed));
    }

    pub fn total_time(&self) -> Duration {
        self.stage_times.iter().map(|(_, d)| *d).sum()
    }
}
