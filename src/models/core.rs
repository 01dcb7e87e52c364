// src/models/core.rs

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Canonical plant attributes. Declaration order is the canonical
/// target-column order used when materializing and writing tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Field {
    Name,
    Fueltype,
    Technology,
    Set,
    Country,
    Capacity,
    #[serde(rename = "lat")]
    Lat,
    #[serde(rename = "lon")]
    Lon,
    DateIn,
    DateRetrofit,
    DateMothball,
    DateOut,
    Duration,
    Efficiency,
    File,
    #[serde(rename = "projectID")]
    ProjectId,
    #[serde(rename = "EIC")]
    Eic,
}

/// Storage shape of a field's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
    IdSet,
}

impl Field {
    pub const ALL: [Field; 17] = [
        Field::Name,
        Field::Fueltype,
        Field::Technology,
        Field::Set,
        Field::Country,
        Field::Capacity,
        Field::Lat,
        Field::Lon,
        Field::DateIn,
        Field::DateRetrofit,
        Field::DateMothball,
        Field::DateOut,
        Field::Duration,
        Field::Efficiency,
        Field::File,
        Field::ProjectId,
        Field::Eic,
    ];

    /// Column header used in CSV files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Name => "Name",
            Field::Fueltype => "Fueltype",
            Field::Technology => "Technology",
            Field::Set => "Set",
            Field::Country => "Country",
            Field::Capacity => "Capacity",
            Field::Lat => "lat",
            Field::Lon => "lon",
            Field::DateIn => "DateIn",
            Field::DateRetrofit => "DateRetrofit",
            Field::DateMothball => "DateMothball",
            Field::DateOut => "DateOut",
            Field::Duration => "Duration",
            Field::Efficiency => "Efficiency",
            Field::File => "File",
            Field::ProjectId => "projectID",
            Field::Eic => "EIC",
        }
    }

    /// Case-insensitive lookup by column header.
    pub fn from_name(name: &str) -> Option<Field> {
        let trimmed = name.trim();
        Field::ALL
            .iter()
            .copied()
            .find(|f| f.as_str().eq_ignore_ascii_case(trimmed))
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            Field::Name
            | Field::Fueltype
            | Field::Technology
            | Field::Set
            | Field::Country
            | Field::File => FieldKind::Text,
            Field::ProjectId | Field::Eic => FieldKind::IdSet,
            _ => FieldKind::Number,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Ids(BTreeSet<String>),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_ids(&self) -> Option<&BTreeSet<String>> {
        match self {
            FieldValue::Ids(ids) => Some(ids),
            _ => None,
        }
    }

    /// Empty strings, NaN and empty id sets carry no information.
    fn is_blank(&self) -> bool {
        match self {
            FieldValue::Text(s) => s.trim().is_empty(),
            FieldValue::Number(n) => n.is_nan(),
            FieldValue::Ids(ids) => ids.is_empty(),
        }
    }

    /// Render for CSV output. Id sets are joined with `;`.
    pub fn to_cell(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Number(n) => format_number(*n),
            FieldValue::Ids(ids) => ids.iter().cloned().collect::<Vec<_>>().join(";"),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{:.1}", n)
    } else {
        n.to_string()
    }
}

/// One power plant (or generating unit) as reported by one source.
/// Missing attributes are simply absent from the map.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PowerPlant {
    fields: BTreeMap<Field, FieldValue>,
}

impl PowerPlant {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: Field) -> Option<&FieldValue> {
        self.fields.get(&field)
    }

    /// Blank values are stored as missing.
    pub fn set(&mut self, field: Field, value: Option<FieldValue>) {
        match value {
            Some(v) if !v.is_blank() => {
                self.fields.insert(field, v);
            }
            _ => {
                self.fields.remove(&field);
            }
        }
    }

    pub fn with_text(mut self, field: Field, value: &str) -> Self {
        self.set(field, Some(FieldValue::Text(value.to_string())));
        self
    }

    pub fn with_number(mut self, field: Field, value: f64) -> Self {
        self.set(field, Some(FieldValue::Number(value)));
        self
    }

    pub fn with_ids<I, S>(mut self, field: Field, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: BTreeSet<String> = ids.into_iter().map(Into::into).collect();
        self.set(field, Some(FieldValue::Ids(set)));
        self
    }

    pub fn text(&self, field: Field) -> Option<&str> {
        self.get(field).and_then(FieldValue::as_text)
    }

    pub fn number(&self, field: Field) -> Option<f64> {
        self.get(field).and_then(FieldValue::as_number)
    }

    pub fn ids(&self, field: Field) -> Option<&BTreeSet<String>> {
        self.get(field).and_then(FieldValue::as_ids)
    }

    pub fn name(&self) -> Option<&str> {
        self.text(Field::Name)
    }

    pub fn country(&self) -> Option<&str> {
        self.text(Field::Country)
    }

    pub fn capacity(&self) -> Option<f64> {
        self.number(Field::Capacity)
    }

    pub fn project_ids(&self) -> Option<&BTreeSet<String>> {
        self.ids(Field::ProjectId)
    }

    /// `"{lat},{lon}"` when both coordinates are known.
    pub fn geoposition(&self) -> Option<String> {
        match (self.number(Field::Lat), self.number(Field::Lon)) {
            (Some(lat), Some(lon)) => Some(format!("{},{}", lat, lon)),
            _ => None,
        }
    }

    pub fn has(&self, field: Field) -> bool {
        self.fields.contains_key(&field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Field, &FieldValue)> {
        self.fields.iter()
    }

    /// Copy holding only the given columns.
    pub fn restrict_to(&self, columns: &[Field]) -> PowerPlant {
        let fields = self
            .fields
            .iter()
            .filter(|(f, _)| columns.contains(f))
            .map(|(f, v)| (*f, v.clone()))
            .collect();
        PowerPlant { fields }
    }
}

/// A named, ordered collection of plants from one source. Record
/// indices used throughout matching are positions in `records`.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub label: String,
    pub records: Vec<PowerPlant>,
}

impl Dataset {
    pub fn new(label: impl Into<String>, records: Vec<PowerPlant>) -> Self {
        Self {
            label: label.into(),
            records,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record indices grouped by country in first-seen order. Records
    /// without a country form their own partition.
    pub fn partition_by_country(&self) -> Vec<(Option<String>, Vec<usize>)> {
        let mut partitions: Vec<(Option<String>, Vec<usize>)> = Vec::new();
        let mut position: BTreeMap<Option<String>, usize> = BTreeMap::new();
        for (idx, record) in self.records.iter().enumerate() {
            let key = record.country().map(str::to_string);
            match position.get(&key) {
                Some(&p) => partitions[p].1.push(idx),
                None => {
                    position.insert(key.clone(), partitions.len());
                    partitions.push((key, vec![idx]));
                }
            }
        }
        partitions
    }

    /// Indices of records located in `country`.
    pub fn indices_in_country(&self, country: Option<&str>) -> Vec<usize> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.country() == country)
            .map(|(i, _)| i)
            .collect()
    }
}
