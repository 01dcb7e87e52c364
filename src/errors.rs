// src/errors.rs

use thiserror::Error;

/// Fatal conditions of a matching run. Everything recoverable degrades to
/// empty or missing values instead and never surfaces here.
#[derive(Debug, Error)]
pub enum MatchingError {
    #[error("no reliability score configured for source '{label}'")]
    MissingReliabilityScore { label: String },
    #[error("similarity scorer '{scorer}' is unavailable: {reason}")]
    ScorerUnavailable { scorer: String, reason: String },
    #[error("similarity scorer '{scorer}' failed: {details}")]
    ScorerFailed { scorer: String, details: String },
    #[error("similarity scorer '{scorer}' produced malformed output at line {line}: {details}")]
    MalformedScorerOutput {
        scorer: String,
        line: usize,
        details: String,
    },
    #[error("dataset '{label}' is not part of this run")]
    UnknownDataset { label: String },
    #[error("record index {index} out of range for dataset '{label}' ({len} records)")]
    RecordIndexOutOfRange {
        label: String,
        index: usize,
        len: usize,
    },
    #[error("configuration error: {0}")]
    Configuration(String),
}
