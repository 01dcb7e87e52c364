// src/bin/aggregate_units.rs
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::info;
use std::path::PathBuf;
use std::time::Instant;

use plant_matching_lib::cleaning::{aggregate_units, clean_technology, AggregationOptions};
use plant_matching_lib::models::Field;
use plant_matching_lib::scoring::{DukeScorer, EmbeddedScorer, SimilarityScorer};
use plant_matching_lib::utils::env::load_env;
use plant_matching_lib::utils::io::{read_dataset, write_dataset};
use plant_matching_lib::utils::progress_bars::logging::log_aggregation_stats;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Scorer {
    Embedded,
    Duke,
}

#[derive(Parser)]
#[command(author, version, about = "Aggregate the units of one power plant dataset into plants", long_about = None)]
struct AggregateArgs {
    /// CSV file with one record per unit
    input: PathBuf,

    /// Where to write the aggregated plants
    output: PathBuf,

    /// Source label of the dataset (defaults to the input file stem)
    #[arg(long)]
    label: Option<String>,

    /// Compare records across countries
    #[arg(long)]
    no_country_wise: bool,

    /// Skip name cleaning before scoring
    #[arg(long)]
    no_clean_names: bool,

    /// Collapse hydro technologies into Run-Of-River / Reservoir / Pumped Storage
    #[arg(long)]
    generalize_hydros: bool,

    #[arg(long, value_enum, default_value_t = Scorer::Embedded)]
    scorer: Scorer,

    /// Directory with the Duke jars and configurations
    #[arg(long, env = "DUKE_HOME")]
    duke_home: Option<PathBuf>,

    /// Keep Duke's scratch directories
    #[arg(long)]
    keep_files: bool,
}

fn main() -> Result<()> {
    load_env();
    env_logger::init();
    let args = AggregateArgs::parse();

    let label = match &args.label {
        Some(label) => label.clone(),
        None => args
            .input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .context("Cannot derive a source label from the input path")?,
    };

    let scorer: Box<dyn SimilarityScorer> = match args.scorer {
        Scorer::Embedded => Box::new(EmbeddedScorer::default()),
        Scorer::Duke => {
            let home = args
                .duke_home
                .clone()
                .context("--scorer duke requires --duke-home or DUKE_HOME")?;
            Box::new(DukeScorer::new(home).keep_files(args.keep_files))
        }
    };
    scorer.check_available()?;

    let start = Instant::now();
    let dataset = read_dataset(&args.input, &label)?;
    info!("📥 Read {} units of '{}' from {}", dataset.len(), label, args.input.display());
    let dataset = clean_technology(&dataset, args.generalize_hydros);

    let options = AggregationOptions {
        country_wise: !args.no_country_wise,
        pre_clean_name: !args.no_clean_names,
        ..Default::default()
    };
    let (plants, stats) = aggregate_units(&dataset, scorer.as_ref(), &options)?;
    log_aggregation_stats(&stats);

    write_dataset(&args.output, &plants, &Field::ALL)?;
    info!(
        "✅ Wrote {} plants to {} in {:.2?}",
        plants.len(),
        args.output.display(),
        start.elapsed()
    );
    Ok(())
}
