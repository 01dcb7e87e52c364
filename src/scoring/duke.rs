// src/scoring/duke.rs - Similarity scoring through the external Duke engine

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::errors::MatchingError;
use crate::models::{Field, SimilarityLink};
use crate::scoring::{Candidate, ScoringBatch, SimilarityScorer};

const DEDUPLICATION_CONFIG: &str = "Deleteduplicates.xml";
const LINKING_CONFIG: &str = "Comparison.xml";
const LINKFILE: &str = "linkfile.txt";
const STDERR_FILE: &str = "duke.stderr";
const POLL_INTERVAL: Duration = Duration::from_millis(25);
const CSV_COLUMNS: [&str; 7] = [
    "id",
    "Name",
    "Fueltype",
    "Technology",
    "Country",
    "Capacity",
    "Geoposition",
];

/// Runs `no.priv.garshol.duke.Duke` in a scratch directory per batch.
/// `home` holds the Duke jars and the two XML configurations.
#[derive(Debug, Clone)]
pub struct DukeScorer {
    home: PathBuf,
    java: String,
    keep_files: bool,
    timeout: Option<Duration>,
}

impl DukeScorer {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            java: "java".to_string(),
            keep_files: false,
            timeout: None,
        }
    }

    /// Kill the Duke process of a batch that runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Leave the scratch directories on disk for inspection.
    pub fn keep_files(mut self, keep: bool) -> Self {
        self.keep_files = keep;
        self
    }

    fn failed(&self, details: impl Into<String>) -> MatchingError {
        MatchingError::ScorerFailed {
            scorer: self.name().to_string(),
            details: details.into(),
        }
    }

    fn unavailable(&self, reason: impl Into<String>) -> MatchingError {
        MatchingError::ScorerUnavailable {
            scorer: self.name().to_string(),
            reason: reason.into(),
        }
    }

    fn classpath(&self) -> Result<String> {
        let mut jars: Vec<PathBuf> = fs::read_dir(&self.home)
            .map_err(|e| self.unavailable(format!("cannot read {}: {}", self.home.display(), e)))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().map_or(false, |ext| ext == "jar"))
            .collect();
        if jars.is_empty() {
            return Err(self
                .unavailable(format!("no jar files in {}", self.home.display()))
                .into());
        }
        jars.sort();
        let joined = std::env::join_paths(&jars).context("Failed to build CLASSPATH")?;
        Ok(joined.to_string_lossy().into_owned())
    }

    fn run(&self, batch: &ScoringBatch<'_>) -> Result<Vec<SimilarityLink>> {
        let (config, single_match, shift) = match batch {
            ScoringBatch::Deduplicate { .. } => (DEDUPLICATION_CONFIG, false, 0),
            ScoringBatch::Link {
                left, single_match, ..
            } => {
                // Duke needs ids unique across both files
                let shift = left.iter().map(|c| c.index).max().map_or(0, |m| m + 1);
                (LINKING_CONFIG, *single_match, shift)
            }
        };

        let workdir = tempfile::Builder::new()
            .prefix("duke")
            .tempdir()
            .context("Failed to create Duke working directory")?;
        let dir = workdir.path();

        fs::copy(self.home.join(config), dir.join("config.xml"))
            .map_err(|e| self.unavailable(format!("missing {}: {}", config, e)))?;

        match batch {
            ScoringBatch::Deduplicate { records } => {
                write_records(&dir.join("file1.csv"), records, 0)?;
            }
            ScoringBatch::Link { left, right, .. } => {
                write_records(&dir.join("file1.csv"), left, 0)?;
                write_records(&dir.join("file2.csv"), right, shift)?;
            }
        }

        let mut command = Command::new(&self.java);
        command
            .current_dir(dir)
            .env("CLASSPATH", self.classpath()?)
            .arg("-Dfile.encoding=UTF-8")
            .arg("no.priv.garshol.duke.Duke")
            .arg(format!("--linkfile={}", LINKFILE));
        if single_match {
            command.arg("--singlematch");
        }
        command.arg("config.xml");

        let stderr_path = dir.join(STDERR_FILE);
        let stderr_file = File::create(&stderr_path)
            .with_context(|| format!("Failed to create {}", stderr_path.display()))?;
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr_file));

        debug!("🦆 Running Duke with {} in {}", config, dir.display());
        let child = command
            .spawn()
            .map_err(|e| self.unavailable(format!("failed to launch java: {}", e)))?;
        let status = self.wait(child)?;
        let stderr = fs::read_to_string(&stderr_path).unwrap_or_default();
        debug!("Duke stderr: {}", stderr);

        let lowered = stderr.to_lowercase();
        if !status.success() || lowered.contains("error") || lowered.contains("fehler") {
            return Err(self.failed(format!("{}: {}", status, stderr.trim())).into());
        }

        let linkfile = fs::read_to_string(dir.join(LINKFILE))
            .map_err(|e| self.failed(format!("no {} written: {}", LINKFILE, e)))?;
        let links = parse_linkfile(&linkfile, shift, self.name())?;

        if self.keep_files {
            let kept = workdir.into_path();
            info!("📁 Files of the Duke run are kept in {}", kept.display());
        }
        Ok(links)
    }
}

impl DukeScorer {
    /// Wait for the child, killing it once the timeout has passed.
    fn wait(&self, mut child: Child) -> Result<ExitStatus> {
        let Some(limit) = self.timeout else {
            return child.wait().context("Failed to wait for Duke");
        };
        let start = Instant::now();
        loop {
            if let Some(status) = child.try_wait().context("Failed to poll Duke")? {
                return Ok(status);
            }
            if start.elapsed() >= limit {
                warn!("⏱️ Duke exceeded {:?}, killing pid {}", limit, child.id());
                // the child may have exited in between
                let _ = child.kill();
                let _ = child.wait();
                return Err(self.failed(format!("timed out after {:?}", limit)).into());
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl SimilarityScorer for DukeScorer {
    fn name(&self) -> &str {
        "duke"
    }

    fn check_available(&self) -> Result<()> {
        let status = Command::new(&self.java)
            .arg("-version")
            .output()
            .map_err(|e| self.unavailable(format!("java is not installed or not on PATH: {}", e)))?;
        if !status.status.success() {
            return Err(self.unavailable("`java -version` failed").into());
        }
        for config in [DEDUPLICATION_CONFIG, LINKING_CONFIG] {
            if !self.home.join(config).is_file() {
                warn!("⚠️ Duke configuration {} not found in {}", config, self.home.display());
                return Err(self
                    .unavailable(format!("{} missing in {}", config, self.home.display()))
                    .into());
            }
        }
        self.classpath().map(|_| ())
    }

    fn score(&self, batch: &ScoringBatch<'_>) -> Result<Vec<SimilarityLink>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        self.run(batch)
    }
}

fn write_records(path: &Path, records: &[Candidate<'_>], shift: usize) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writer.write_record(CSV_COLUMNS)?;
    for candidate in records {
        let plant = candidate.plant;
        let cell = |field: Field| plant.get(field).map(|v| v.to_cell()).unwrap_or_default();
        writer.write_record([
            (candidate.index + shift).to_string(),
            cell(Field::Name),
            cell(Field::Fueltype),
            cell(Field::Technology),
            cell(Field::Country),
            cell(Field::Capacity),
            plant.geoposition().unwrap_or_default(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Reads `+,left,right,score` lines; other lines are non-matches.
fn parse_linkfile(content: &str, shift: usize, scorer: &str) -> Result<Vec<SimilarityLink>> {
    let malformed = |line: usize, details: String| MatchingError::MalformedScorerOutput {
        scorer: scorer.to_string(),
        line,
        details,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut links = Vec::new();
    for (n, record) in reader.records().enumerate() {
        let line = n + 1;
        let record = record.map_err(|e| malformed(line, e.to_string()))?;
        if record.get(0).map(str::trim) != Some("+") {
            continue;
        }
        if record.len() < 4 {
            return Err(malformed(line, format!("expected 4 columns, got {}", record.len())).into());
        }
        let index = |col: usize| -> Result<usize, MatchingError> {
            record[col]
                .trim()
                .parse::<usize>()
                .map_err(|e| malformed(line, format!("bad id '{}': {}", &record[col], e)))
        };
        let left = index(1)?;
        let right = index(2)?
            .checked_sub(shift)
            .ok_or_else(|| malformed(line, format!("id below offset {}", shift)))?;
        let score = record[3]
            .trim()
            .parse::<f64>()
            .map_err(|e| malformed(line, format!("bad score '{}': {}", &record[3], e)))?;
        links.push(SimilarityLink::new(left, right, score));
    }
    Ok(links)
}
