// src/cleaning/technology.rs - Technology vocabulary normalization
use crate::models::{Dataset, Field, FieldValue};

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    let lower = haystack.to_lowercase();
    needles.iter().any(|n| lower.contains(n))
}

/// Uppercase letters that follow a non-letter, lowercase the rest.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut previous_is_letter = false;
    for c in s.chars() {
        if previous_is_letter {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        previous_is_letter = c.is_alphabetic();
    }
    out
}

/// Condense a technology description into the fixed vocabulary
/// (OCGT, CCGT, Steam Turbine, hydro kinds, ...). Multiple technologies
/// are kept as a sorted `", "`-separated list. `None` when nothing remains.
pub fn normalize_technology(value: &str, generalize_hydros: bool) -> Option<String> {
    let mut tech = value
        .replace(" and ", ", ")
        .replace(" Power Plant", "")
        .replace("Battery", "");

    if generalize_hydros {
        if contains_any(&tech, &["pump"]) {
            tech = "Pumped Storage".to_string();
        }
        if contains_any(&tech, &["reservoir", "lake"]) {
            tech = "Reservoir".to_string();
        }
        if contains_any(&tech, &["run-of-river", "weir", "water"]) {
            tech = "Run-Of-River".to_string();
        }
        if contains_any(&tech, &["dam"]) {
            tech = "Reservoir".to_string();
        }
    }

    if tech == "Gas turbine" {
        tech = "OCGT".to_string();
    }
    if contains_any(&tech, &["combined cycle", "combustion"]) {
        tech = "CCGT".to_string();
    }
    if contains_any(&tech, &["steam turbine", "critical thermal"]) {
        tech = "Steam Turbine".to_string();
    }
    if contains_any(&tech, &["ocgt", "open cycle"]) {
        tech = "OCGT".to_string();
    }

    let titled = title_case(&tech);
    let mut parts: Vec<&str> = titled
        .split(", ")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    parts.sort_unstable();
    parts.dedup();

    let joined = parts
        .join(", ")
        .replace("Ccgt", "CCGT")
        .replace("Ocgt", "OCGT");
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

/// Apply `normalize_technology` to every record of a dataset.
pub fn clean_technology(dataset: &Dataset, generalize_hydros: bool) -> Dataset {
    let records = dataset
        .records
        .iter()
        .map(|record| {
            let mut record = record.clone();
            let normalized = record
                .text(Field::Technology)
                .and_then(|t| normalize_technology(t, generalize_hydros));
            record.set(Field::Technology, normalized.map(FieldValue::Text));
            record
        })
        .collect();
    Dataset::new(dataset.label.clone(), records)
}
