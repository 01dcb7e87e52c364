// src/utils/io.rs - CSV input and output of datasets and match results
use anyhow::{Context, Result};
use log::{debug, warn};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use crate::models::{CanonicalPlant, Dataset, Field, FieldKind, FieldValue, MatchedTable, PowerPlant};
use crate::utils::constants::ID_SEPARATOR;

fn parse_cell(field: Field, raw: &str) -> Option<FieldValue> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match field.kind() {
        FieldKind::Text => Some(FieldValue::Text(raw.to_string())),
        FieldKind::Number => raw.parse::<f64>().ok().map(FieldValue::Number),
        FieldKind::IdSet => {
            let ids: BTreeSet<String> = raw
                .split(ID_SEPARATOR)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            Some(FieldValue::Ids(ids))
        }
    }
}

/// Read one source dataset. Columns are matched to canonical fields by
/// header (case-insensitive); other columns are ignored. Unparseable
/// numbers are treated as missing.
pub fn read_dataset(path: &Path, label: &str) -> Result<Dataset> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open dataset {}", path.display()))?;
    let columns: Vec<Option<Field>> = reader
        .headers()
        .with_context(|| format!("Failed to read header of {}", path.display()))?
        .iter()
        .map(Field::from_name)
        .collect();

    let mut records = Vec::new();
    let mut unparsed = 0usize;
    for (row, result) in reader.records().enumerate() {
        let record =
            result.with_context(|| format!("Malformed row {} in {}", row + 1, path.display()))?;
        let mut plant = PowerPlant::new();
        for (cell, column) in record.iter().zip(&columns) {
            let Some(field) = column else { continue };
            let value = parse_cell(*field, cell);
            if value.is_none() && !cell.trim().is_empty() {
                unparsed += 1;
            }
            plant.set(*field, value);
        }
        records.push(plant);
    }
    if unparsed > 0 {
        warn!(
            "⚠️ {} cells of {} could not be parsed and are treated as missing",
            unparsed,
            path.display()
        );
    }
    debug!("Read {} records for '{}' from {}", records.len(), label, path.display());
    Ok(Dataset::new(label, records))
}

/// Write a dataset with the given columns, e.g. after aggregation.
pub fn write_dataset(path: &Path, dataset: &Dataset, columns: &[Field]) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writer.write_record(columns.iter().map(Field::as_str))?;
    for plant in &dataset.records {
        writer.write_record(columns.iter().map(|&f| cell(plant, f)))?;
    }
    writer.flush()?;
    Ok(())
}

fn cell(plant: &PowerPlant, field: Field) -> String {
    plant.get(field).map(FieldValue::to_cell).unwrap_or_default()
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    Ok(())
}

/// Write the canonical table: an integer `id`, the target columns, and
/// `projectID` as a JSON object of source label to id list.
pub fn write_canonical(path: &Path, plants: &[CanonicalPlant], columns: &[Field]) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut header = vec!["id"];
    header.extend(columns.iter().map(Field::as_str));
    writer.write_record(&header)?;

    for canonical in plants {
        let mut row = vec![canonical.id.to_string()];
        for &field in columns {
            if field == Field::ProjectId {
                row.push(serde_json::to_string(&canonical.project_ids)?);
            } else {
                row.push(cell(&canonical.plant, field));
            }
        }
        writer.write_record(&row)?;
    }
    writer.flush()?;
    debug!("Wrote {} canonical plants to {}", plants.len(), path.display());
    Ok(())
}

/// Write the matched table in long form: one line per group and source.
pub fn write_matched_long(path: &Path, table: &MatchedTable) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut header = vec!["group", "source"];
    header.extend(table.target_columns.iter().map(Field::as_str));
    writer.write_record(&header)?;

    for row in &table.rows {
        for label in &table.labels {
            let Some(plant) = row.sources.get(label) else { continue };
            let mut line = vec![row.group_id.to_string(), label.clone()];
            line.extend(table.target_columns.iter().map(|&f| cell(plant, f)));
            writer.write_record(&line)?;
        }
    }
    writer.flush()?;
    Ok(())
}
