// src/utils/config.rs - Environment and per-source configuration
use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::MatchingError;
use crate::models::{Dataset, Field, FieldValue, PowerPlant};
use crate::utils::constants::DEFAULT_PROCESS_LIMIT;

/// Fixed query restricting a source to records whose `field` takes one
/// of `values` (case-insensitive).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordFilter {
    pub field: Field,
    pub values: Vec<String>,
}

impl RecordFilter {
    pub fn matches(&self, plant: &PowerPlant) -> bool {
        let cell = match plant.get(self.field) {
            Some(FieldValue::Ids(ids)) => {
                return ids
                    .iter()
                    .any(|id| self.values.iter().any(|v| v.eq_ignore_ascii_case(id)))
            }
            Some(value) => value.to_cell(),
            None => return false,
        };
        self.values.iter().any(|v| v.eq_ignore_ascii_case(&cell))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub reliability_score: Option<u32>,
    /// Records are already whole plants; skip unit aggregation.
    #[serde(default)]
    pub aggregated_units: bool,
    #[serde(default)]
    pub filter: Option<RecordFilter>,
}

pub type SourcesConfig = BTreeMap<String, SourceConfig>;

pub fn load_sources_config(path: &Path) -> Result<SourcesConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read sources config {}", path.display()))?;
    let sources: SourcesConfig = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse sources config {}", path.display()))?;
    debug!("Loaded {} source definitions from {}", sources.len(), path.display());
    Ok(sources)
}

/// Reliability scores of all sources that define one.
pub fn reliability_scores(sources: &SourcesConfig) -> BTreeMap<String, u32> {
    sources
        .iter()
        .filter_map(|(label, cfg)| cfg.reliability_score.map(|s| (label.clone(), s)))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScorerKind {
    Embedded,
    Duke,
}

#[derive(Debug, Clone)]
pub struct MatchingConfig {
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub sources_config: PathBuf,
    /// Empty means every source of the sources config.
    pub matching_sources: Vec<String>,
    pub extension_sources: Vec<String>,
    pub target_countries: Vec<String>,
    pub target_fueltypes: Vec<String>,
    pub target_columns: Vec<Field>,
    pub parallel: bool,
    pub process_limit: usize,
    pub country_wise: bool,
    pub scorer: ScorerKind,
    pub duke_home: Option<PathBuf>,
    /// Upper bound for a single aggregation or linking task.
    pub task_timeout: Option<Duration>,
}

fn split_list(raw: Option<String>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_flag(raw: Option<String>, default: bool) -> bool {
    raw.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

impl MatchingConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key lookup. `projectID` is always
    /// part of the target columns since provenance depends on it.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = |key: &str, default: &str| {
            PathBuf::from(lookup(key).unwrap_or_else(|| default.to_string()))
        };

        let mut target_columns = Vec::new();
        for name in split_list(lookup("TARGET_COLUMNS")) {
            let field = Field::from_name(&name).ok_or_else(|| {
                MatchingError::Configuration(format!("unknown target column '{}'", name))
            })?;
            if !target_columns.contains(&field) {
                target_columns.push(field);
            }
        }
        if target_columns.is_empty() {
            target_columns = Field::ALL.to_vec();
        }
        if !target_columns.contains(&Field::ProjectId) {
            target_columns.push(Field::ProjectId);
        }
        target_columns.sort();

        let scorer = match lookup("SCORER").as_deref().map(str::trim) {
            None | Some("") | Some("embedded") => ScorerKind::Embedded,
            Some("duke") => ScorerKind::Duke,
            Some(other) => {
                return Err(
                    MatchingError::Configuration(format!("unknown scorer '{}'", other)).into(),
                )
            }
        };
        let duke_home = lookup("DUKE_HOME").map(PathBuf::from);
        if scorer == ScorerKind::Duke && duke_home.is_none() {
            return Err(MatchingError::Configuration(
                "SCORER=duke requires DUKE_HOME".to_string(),
            )
            .into());
        }

        let process_limit = match lookup("PROCESS_LIMIT") {
            Some(raw) => raw.trim().parse::<usize>().map_err(|e| {
                MatchingError::Configuration(format!("invalid PROCESS_LIMIT '{}': {}", raw, e))
            })?,
            None => DEFAULT_PROCESS_LIMIT,
        };

        let task_timeout = match lookup("TASK_TIMEOUT_SECONDS") {
            Some(raw) => Some(Duration::from_secs(raw.trim().parse::<u64>().map_err(|e| {
                MatchingError::Configuration(format!(
                    "invalid TASK_TIMEOUT_SECONDS '{}': {}",
                    raw, e
                ))
            })?)),
            None => None,
        };

        Ok(Self {
            data_dir: path("DATA_DIR", "data/in"),
            output_dir: path("OUTPUT_DIR", "data/out"),
            sources_config: path("SOURCES_CONFIG", "sources.json"),
            matching_sources: split_list(lookup("MATCHING_SOURCES")),
            extension_sources: split_list(lookup("EXTENSION_SOURCES")),
            target_countries: split_list(lookup("TARGET_COUNTRIES")),
            target_fueltypes: split_list(lookup("TARGET_FUELTYPES")),
            target_columns,
            parallel: parse_flag(lookup("PARALLEL_LINKING"), true),
            process_limit: process_limit.max(1),
            country_wise: parse_flag(lookup("COUNTRY_WISE"), true),
            scorer,
            duke_home,
            task_timeout,
        })
    }

    /// Pool size: min(cores, limit) when parallel, otherwise one.
    pub fn worker_count(&self) -> usize {
        if self.parallel {
            num_cpus::get().min(self.process_limit).max(1)
        } else {
            1
        }
    }

    pub fn log_config(&self) {
        info!("⚙️  Matching configuration:");
        info!("   📂 Input: {}", self.data_dir.display());
        info!("   📂 Output: {}", self.output_dir.display());
        if self.matching_sources.is_empty() {
            info!("   🗂️  Matching sources: all configured sources");
        } else {
            info!("   🗂️  Matching sources: {}", self.matching_sources.join(", "));
        }
        if !self.extension_sources.is_empty() {
            info!("   ➕ Extension sources: {}", self.extension_sources.join(", "));
        }
        if self.target_countries.is_empty() {
            info!("   🌍 Countries: no filter");
        } else {
            info!("   🌍 Countries: {}", self.target_countries.join(", "));
        }
        if !self.target_fueltypes.is_empty() {
            info!("   🔥 Fueltypes: {}", self.target_fueltypes.join(", "));
        }
        info!(
            "   🧮 Workers: {} ({}), country-wise: {}, scorer: {:?}",
            self.worker_count(),
            if self.parallel { "parallel" } else { "sequential" },
            self.country_wise,
            self.scorer
        );
        if let Some(limit) = self.task_timeout {
            info!("   ⏱️  Task timeout: {:?}", limit);
        }
    }
}

/// Restrict a dataset to the target countries and fueltypes and to the
/// source's own filter.
pub fn config_filter(
    dataset: &Dataset,
    config: &MatchingConfig,
    source: Option<&SourceConfig>,
) -> Dataset {
    let in_list = |list: &[String], value: Option<&str>| {
        list.is_empty()
            || value.map_or(false, |v| list.iter().any(|x| x.eq_ignore_ascii_case(v)))
    };
    let records: Vec<PowerPlant> = dataset
        .records
        .iter()
        .filter(|r| in_list(&config.target_countries, r.country()))
        .filter(|r| in_list(&config.target_fueltypes, r.text(Field::Fueltype)))
        .filter(|r| {
            source
                .and_then(|s| s.filter.as_ref())
                .map_or(true, |f| f.matches(r))
        })
        .cloned()
        .collect();
    debug!(
        "Config filter kept {}/{} records of '{}'",
        records.len(),
        dataset.len(),
        dataset.label
    );
    Dataset::new(dataset.label.clone(), records)
}
