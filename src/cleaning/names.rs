// src/cleaning/names.rs - Power plant name cleaning
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};

use crate::models::{Dataset, Field, FieldValue, PowerPlant};

/// Words occurring at least this often in one dataset carry no identity.
pub const COMMON_WORD_THRESHOLD: usize = 20;

static PUNCTUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[-/,()\[\]"_+0-9]"#).expect("valid punctuation pattern"));

static PHRASES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(^|\s)tratamiento de purines(\s|$)").expect("valid phrase pattern")
});

static STOP_WORDS: Lazy<HashSet<String>> = Lazy::new(|| {
    [
        "I", "II", "III", "IV", "V", "VI", "VII", "VIII", "IX", "X", "XI",
        "Grupo", "parque", "eolico", "gas", "biomasa", "COGENERACION", "gt", "unnamed",
        "planta", "de", "la", "station", "power", "storage", "plant", "stage", "pumped",
        "project", "dt", "gud", "hkw", "kbr", "Kernkraft", "Kernkraftwerk", "kwg", "krb",
        "ohu", "gkn", "Gemeinschaftskernkraftwerk", "kki", "kkp", "kle", "wkw", "rwe", "bis",
        "nordsee", "ostsee", "dampfturbinenanlage", "ikw", "kw", "kohlekraftwerk",
        "raffineriekraftwerk", "Kraftwerke",
    ]
    .iter()
    .map(|w| w.to_lowercase())
    .collect()
});

fn strip_punctuation(name: &str) -> String {
    PUNCTUATION.replace_all(name, " ").into_owned()
}

/// Lowercased words appearing at least `COMMON_WORD_THRESHOLD` times.
fn common_words<'a>(names: impl Iterator<Item = &'a str>) -> HashSet<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for word in names.flat_map(str::split_whitespace) {
        *counts.entry(word).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .filter(|(_, count)| *count >= COMMON_WORD_THRESHOLD)
        .map(|(word, _)| word.to_lowercase())
        .collect()
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn clean_name(stripped: &str, common: &HashSet<String>) -> String {
    let without_phrases = PHRASES.replace_all(stripped, " ");
    let kept: Vec<&str> = without_phrases
        .split_whitespace()
        .filter(|word| {
            let lower = word.to_lowercase();
            let single_letter =
                word.chars().count() == 1 && word.chars().all(|c| c.is_ascii_alphabetic());
            !single_letter && !STOP_WORDS.contains(&lower) && !common.contains(&lower)
        })
        .collect();
    capitalize(kept.join(" ").replace('"', "").trim())
}

/// Clean the `Name` column of a dataset: punctuation and digits become
/// spaces, frequent and generic words are dropped, the rest is collapsed
/// and capitalized. Records left without a name are removed and the
/// remainder is stably sorted by name.
pub fn clean_powerplant_names(dataset: &Dataset) -> Dataset {
    let stripped: Vec<Option<String>> = dataset
        .records
        .iter()
        .map(|r| r.name().map(strip_punctuation))
        .collect();
    let common = common_words(stripped.iter().flatten().map(String::as_str));

    let mut records: Vec<PowerPlant> = dataset
        .records
        .iter()
        .zip(stripped)
        .filter_map(|(record, name)| {
            let cleaned = clean_name(&name?, &common);
            if cleaned.is_empty() {
                return None;
            }
            let mut record = record.clone();
            record.set(Field::Name, Some(FieldValue::Text(cleaned)));
            Some(record)
        })
        .collect();
    records.sort_by(|a, b| a.name().cmp(&b.name()));

    debug!(
        "Cleaned names of '{}': {} → {} records, {} common words dropped",
        dataset.label,
        dataset.len(),
        records.len(),
        common.len()
    );
    Dataset::new(dataset.label.clone(), records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(names: &[&str]) -> Dataset {
        Dataset::new(
            "TEST",
            names
                .iter()
                .map(|n| PowerPlant::new().with_text(Field::Name, n))
                .collect(),
        )
    }

    #[test]
    fn test_punctuation_digits_and_generic_words_removed() {
        let cleaned = clean_powerplant_names(&named(&["Kraftwerk-Mehrum (Block 3) power station"]));
        assert_eq!(cleaned.records[0].name(), Some("Kraftwerk mehrum block"));
    }

    #[test]
    fn test_roman_numerals_and_single_letters_dropped() {
        let cleaned = clean_powerplant_names(&named(&["Neckarwestheim II", "Isar b"]));
        let names: Vec<_> = cleaned.records.iter().filter_map(|r| r.name()).collect();
        assert_eq!(names, vec!["Isar", "Neckarwestheim"]);
    }

    #[test]
    fn test_empty_names_removed_and_sorted() {
        let mut ds = named(&["Zolling", "II", "Altbach"]);
        ds.records.push(PowerPlant::new().with_number(Field::Capacity, 10.0));
        let cleaned = clean_powerplant_names(&ds);
        let names: Vec<_> = cleaned.records.iter().filter_map(|r| r.name()).collect();
        assert_eq!(names, vec!["Altbach", "Zolling"]);
    }

    #[test]
    fn test_common_words_dropped() {
        let names: Vec<String> = (0..COMMON_WORD_THRESHOLD)
            .map(|i| format!("Windpark {}", ["Nord", "Sued", "Ost", "West"][i % 4]))
            .collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let cleaned = clean_powerplant_names(&named(&refs));
        assert!(cleaned.records.iter().all(|r| !r.name().unwrap().contains("Windpark")));
        assert_eq!(cleaned.len(), COMMON_WORD_THRESHOLD);
    }

    #[test]
    fn test_phrase_removed() {
        let cleaned = clean_powerplant_names(&named(&["Tratamiento de purines Almazan"]));
        assert_eq!(cleaned.records[0].name(), Some("Almazan"));
    }
}
