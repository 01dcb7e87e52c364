// src/models/aggregation.rs

use std::collections::{BTreeSet, HashMap};

use crate::models::core::{Field, FieldValue, PowerPlant};

/// Per-field aggregation strategy. Bound to fields at compile time via
/// `Field::unit_aggregation` and `Field::reduction_aggregation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    /// Most frequent non-missing value, ties broken by first-seen order.
    Mode,
    Sum,
    Min,
    Max,
    Mean,
    /// Capacity-weighted mean: sum(value * capacity) / aggregated capacity.
    WeightedMean,
    SetUnion,
    /// First non-missing value in the given (priority) order.
    FirstByPriority,
}

impl Field {
    /// Rule used when merging units of one source into a plant.
    pub fn unit_aggregation(&self) -> Aggregation {
        match self {
            Field::Name
            | Field::Fueltype
            | Field::Technology
            | Field::Set
            | Field::Country
            | Field::File => Aggregation::Mode,
            Field::Capacity => Aggregation::Sum,
            Field::Lat | Field::Lon => Aggregation::Mean,
            Field::DateIn | Field::DateMothball => Aggregation::Min,
            Field::DateRetrofit | Field::DateOut => Aggregation::Max,
            Field::ProjectId | Field::Eic => Aggregation::SetUnion,
            Field::Duration | Field::Efficiency => Aggregation::WeightedMean,
        }
    }

    /// Rule used when reducing a match group across sources.
    pub fn reduction_aggregation(&self) -> Aggregation {
        match self {
            Field::DateIn => Aggregation::Min,
            Field::DateRetrofit | Field::DateOut => Aggregation::Max,
            Field::ProjectId | Field::Eic => Aggregation::SetUnion,
            _ => Aggregation::FirstByPriority,
        }
    }
}

impl Aggregation {
    /// Aggregate `field` over `members`, which must already be in the
    /// order that matters for `Mode` ties and `FirstByPriority`.
    pub fn apply(&self, field: Field, members: &[&PowerPlant]) -> Option<FieldValue> {
        match self {
            Aggregation::Mode => mode(field, members),
            Aggregation::Sum => numbers(field, members)
                .reduce(|a, b| a + b)
                .map(FieldValue::Number),
            Aggregation::Min => numbers(field, members)
                .reduce(f64::min)
                .map(FieldValue::Number),
            Aggregation::Max => numbers(field, members)
                .reduce(f64::max)
                .map(FieldValue::Number),
            Aggregation::Mean => {
                let values: Vec<f64> = numbers(field, members).collect();
                if values.is_empty() {
                    None
                } else {
                    Some(FieldValue::Number(values.iter().sum::<f64>() / values.len() as f64))
                }
            }
            Aggregation::WeightedMean => weighted_mean(field, members).map(FieldValue::Number),
            Aggregation::SetUnion => {
                let union: BTreeSet<String> = members
                    .iter()
                    .filter_map(|p| p.get(field))
                    .flat_map(|v| match v {
                        FieldValue::Ids(ids) => ids.iter().cloned().collect::<Vec<_>>(),
                        other => vec![other.to_cell()],
                    })
                    .collect();
                if union.is_empty() {
                    None
                } else {
                    Some(FieldValue::Ids(union))
                }
            }
            Aggregation::FirstByPriority => members.iter().find_map(|p| p.get(field).cloned()),
        }
    }
}

fn numbers<'a>(field: Field, members: &'a [&'a PowerPlant]) -> impl Iterator<Item = f64> + 'a {
    members.iter().filter_map(move |p| p.number(field))
}

fn mode(field: Field, members: &[&PowerPlant]) -> Option<FieldValue> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();
    for text in members.iter().filter_map(|p| p.text(field)) {
        let count = counts.entry(text).or_insert(0);
        if *count == 0 {
            order.push(text);
        }
        *count += 1;
    }
    let mut best: Option<(&str, usize)> = None;
    for text in order {
        let count = counts[text];
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((text, count));
        }
    }
    best.map(|(text, _)| FieldValue::Text(text.to_string()))
}

/// Missing when no member carries both value and capacity, or when the
/// aggregated capacity is zero.
fn weighted_mean(field: Field, members: &[&PowerPlant]) -> Option<f64> {
    let weighted: Vec<f64> = members
        .iter()
        .filter_map(|p| match (p.number(field), p.capacity()) {
            (Some(v), Some(c)) => Some(v * c),
            _ => None,
        })
        .collect();
    if weighted.is_empty() {
        return None;
    }
    let total_capacity: f64 = members.iter().filter_map(|p| p.capacity()).sum();
    if total_capacity == 0.0 {
        return None;
    }
    Some(weighted.iter().sum::<f64>() / total_capacity)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(name: &str, capacity: f64) -> PowerPlant {
        PowerPlant::new()
            .with_text(Field::Name, name)
            .with_number(Field::Capacity, capacity)
    }

    #[test]
    fn test_mode_prefers_first_seen_on_ties() {
        let a = unit("Alpha", 1.0);
        let b = unit("Beta", 1.0);
        let c = unit("Beta", 1.0);
        let d = unit("Alpha", 1.0);
        assert_eq!(
            Aggregation::Mode.apply(Field::Name, &[&b, &a, &d, &c]),
            Some(FieldValue::Text("Beta".into()))
        );
        let e = unit("Gamma", 1.0);
        assert_eq!(
            Aggregation::Mode.apply(Field::Name, &[&e, &a, &d]),
            Some(FieldValue::Text("Alpha".into()))
        );
    }

    #[test]
    fn test_sum_conserves_capacity() {
        let units = [unit("A", 50.0), unit("A", 30.0), unit("A", 20.0)];
        let refs: Vec<&PowerPlant> = units.iter().collect();
        assert_eq!(
            Aggregation::Sum.apply(Field::Capacity, &refs),
            Some(FieldValue::Number(100.0))
        );
    }

    #[test]
    fn test_weighted_mean_and_zero_capacity() {
        let a = unit("A", 100.0).with_number(Field::Efficiency, 0.4);
        let b = unit("A", 300.0).with_number(Field::Efficiency, 0.6);
        let value = Aggregation::WeightedMean
            .apply(Field::Efficiency, &[&a, &b])
            .and_then(|v| v.as_number())
            .unwrap();
        assert!((value - 0.55).abs() < 1e-9);

        let z1 = unit("A", 0.0).with_number(Field::Efficiency, 0.4);
        let z2 = unit("A", 0.0).with_number(Field::Efficiency, 0.6);
        assert_eq!(Aggregation::WeightedMean.apply(Field::Efficiency, &[&z1, &z2]), None);
    }

    #[test]
    fn test_dates_ignore_missing() {
        let a = PowerPlant::new().with_number(Field::DateIn, 2005.0);
        let b = PowerPlant::new().with_number(Field::DateIn, 2001.0);
        let c = PowerPlant::new();
        assert_eq!(
            Aggregation::Min.apply(Field::DateIn, &[&a, &b, &c]),
            Some(FieldValue::Number(2001.0))
        );
        assert_eq!(Aggregation::Max.apply(Field::DateOut, &[&c]), None);
    }

    #[test]
    fn test_first_by_priority_skips_missing() {
        let a = PowerPlant::new();
        let b = PowerPlant::new().with_text(Field::Fueltype, "Hydro");
        let c = PowerPlant::new().with_text(Field::Fueltype, "Wind");
        assert_eq!(
            Aggregation::FirstByPriority.apply(Field::Fueltype, &[&a, &b, &c]),
            Some(FieldValue::Text("Hydro".into()))
        );
    }

    #[test]
    fn test_set_union_collects_ids() {
        let a = PowerPlant::new().with_ids(Field::ProjectId, ["x1"]);
        let b = PowerPlant::new().with_ids(Field::ProjectId, ["x2", "x1"]);
        let ids = Aggregation::SetUnion.apply(Field::ProjectId, &[&a, &b]).unwrap();
        assert_eq!(ids.as_ids().unwrap().len(), 2);
    }
}
