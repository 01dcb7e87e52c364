// src/scoring/embedded.rs - In-process Duke-style record comparison

use anyhow::Result;
use log::debug;
use strsim::jaro_winkler;

use crate::models::{Field, PowerPlant, SimilarityLink};
use crate::scoring::{Candidate, ScoringBatch, SimilarityScorer};

/// Probability bounds of one compared property. A similarity below 0.5
/// maps to `low`, otherwise it rises quadratically towards `high`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PropertyWeight {
    pub low: f64,
    pub high: f64,
}

impl PropertyWeight {
    pub const NEUTRAL: PropertyWeight = PropertyWeight { low: 0.5, high: 0.5 };

    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    fn probability(&self, similarity: f64) -> f64 {
        if similarity < 0.5 {
            self.low
        } else {
            (self.high - 0.5) * similarity * similarity + 0.5
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedScorerConfig {
    pub threshold: f64,
    pub name: PropertyWeight,
    pub fueltype: PropertyWeight,
    pub technology: PropertyWeight,
    pub capacity: PropertyWeight,
    pub geoposition: PropertyWeight,
    /// Distance at which geoposition similarity reaches zero.
    pub max_distance_km: f64,
}

impl EmbeddedScorerConfig {
    /// Weights for linking two different registries.
    pub fn for_linking() -> Self {
        Self {
            threshold: 0.985,
            name: PropertyWeight::new(0.1, 0.95),
            fueltype: PropertyWeight::new(0.05, 0.75),
            technology: PropertyWeight::new(0.3, 0.6),
            capacity: PropertyWeight::new(0.1, 0.75),
            geoposition: PropertyWeight::new(0.1, 0.9),
            max_distance_km: 20.0,
        }
    }

    /// Weights for finding units of one plant within a registry. Unit
    /// capacities differ by nature and carry no evidence.
    pub fn for_deduplication() -> Self {
        Self {
            threshold: 0.98,
            name: PropertyWeight::new(0.1, 0.97),
            fueltype: PropertyWeight::new(0.05, 0.75),
            technology: PropertyWeight::new(0.3, 0.6),
            capacity: PropertyWeight::NEUTRAL,
            geoposition: PropertyWeight::new(0.1, 0.9),
            max_distance_km: 5.0,
        }
    }
}

/// Scorer comparing name, fueltype, technology, country, capacity and
/// geoposition entirely in-process. Country disagreement vetoes a match.
#[derive(Debug, Clone)]
pub struct EmbeddedScorer {
    linking: EmbeddedScorerConfig,
    deduplication: EmbeddedScorerConfig,
}

impl Default for EmbeddedScorer {
    fn default() -> Self {
        Self {
            linking: EmbeddedScorerConfig::for_linking(),
            deduplication: EmbeddedScorerConfig::for_deduplication(),
        }
    }
}

impl EmbeddedScorer {
    pub fn new(linking: EmbeddedScorerConfig, deduplication: EmbeddedScorerConfig) -> Self {
        Self {
            linking,
            deduplication,
        }
    }

    /// Match probability of two plants, `None` when the countries differ.
    pub fn compare(
        &self,
        a: &PowerPlant,
        b: &PowerPlant,
        config: &EmbeddedScorerConfig,
    ) -> Option<f64> {
        if let (Some(ca), Some(cb)) = (a.country(), b.country()) {
            if !ca.eq_ignore_ascii_case(cb) {
                return None;
            }
        }

        let mut probability = 0.5;
        let mut combine = |p: f64| {
            let positive = probability * p;
            let negative = (1.0 - probability) * (1.0 - p);
            probability = positive / (positive + negative);
        };

        if let (Some(na), Some(nb)) = (a.name(), b.name()) {
            let (na, nb) = (normalize_for_comparison(na), normalize_for_comparison(nb));
            if !na.is_empty() && !nb.is_empty() {
                combine(config.name.probability(jaro_winkler(&na, &nb)));
            }
        }
        if let (Some(fa), Some(fb)) = (a.text(Field::Fueltype), b.text(Field::Fueltype)) {
            let same = fa.eq_ignore_ascii_case(fb);
            combine(config.fueltype.probability(if same { 1.0 } else { 0.0 }));
        }
        if let (Some(ta), Some(tb)) = (a.text(Field::Technology), b.text(Field::Technology)) {
            let (ta, tb) = (ta.to_lowercase(), tb.to_lowercase());
            let overlap = ta.contains(&tb) || tb.contains(&ta);
            combine(config.technology.probability(if overlap { 1.0 } else { 0.0 }));
        }
        if let (Some(pa), Some(pb)) = (a.capacity(), b.capacity()) {
            combine(config.capacity.probability(capacity_similarity(pa, pb)));
        }
        if let (Some(lat1), Some(lon1), Some(lat2), Some(lon2)) = (
            a.number(Field::Lat),
            a.number(Field::Lon),
            b.number(Field::Lat),
            b.number(Field::Lon),
        ) {
            let distance_km = calculate_distance(lat1, lon1, lat2, lon2) / 1000.0;
            let similarity = (1.0 - distance_km / config.max_distance_km).max(0.0);
            combine(config.geoposition.probability(similarity));
        }

        Some(probability)
    }

    fn deduplicate(&self, records: &[Candidate<'_>]) -> Vec<SimilarityLink> {
        let config = &self.deduplication;
        let mut links = Vec::new();
        for (i, a) in records.iter().enumerate() {
            for b in &records[i + 1..] {
                if let Some(score) = self.compare(a.plant, b.plant, config) {
                    if score >= config.threshold {
                        links.push(SimilarityLink::new(a.index, b.index, score));
                        links.push(SimilarityLink::new(b.index, a.index, score));
                    }
                }
            }
        }
        links
    }

    fn link(
        &self,
        left: &[Candidate<'_>],
        right: &[Candidate<'_>],
        single_match: bool,
    ) -> Vec<SimilarityLink> {
        let config = &self.linking;
        let mut links = Vec::new();
        for a in left {
            let mut best: Option<SimilarityLink> = None;
            for b in right {
                let score = match self.compare(a.plant, b.plant, config) {
                    Some(s) if s >= config.threshold => s,
                    _ => continue,
                };
                let link = SimilarityLink::new(a.index, b.index, score);
                if !single_match {
                    links.push(link);
                } else if best.map_or(true, |current| score > current.score) {
                    best = Some(link);
                }
            }
            links.extend(best);
        }
        links
    }
}

impl SimilarityScorer for EmbeddedScorer {
    fn name(&self) -> &str {
        "embedded"
    }

    fn score(&self, batch: &ScoringBatch<'_>) -> Result<Vec<SimilarityLink>> {
        let links = match batch {
            ScoringBatch::Deduplicate { records } => self.deduplicate(records),
            ScoringBatch::Link {
                left,
                right,
                single_match,
            } => self.link(left, right, *single_match),
        };
        debug!("Embedded scorer produced {} links", links.len());
        Ok(links)
    }
}

fn capacity_similarity(a: f64, b: f64) -> f64 {
    let larger = a.abs().max(b.abs());
    if larger == 0.0 {
        1.0
    } else {
        1.0 - (a - b).abs() / larger
    }
}

/// Lowercase, keep alphanumerics, collapse whitespace.
pub fn normalize_for_comparison(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Great-circle distance in meters.
fn calculate_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const R: f64 = 6371000.0;
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let (delta_phi, delta_lambda) = ((lat2 - lat1).to_radians(), (lon2 - lon1).to_radians());
    let a = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    2.0 * R * a.sqrt().atan2((1.0 - a).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plant(name: &str, country: &str, fueltype: &str, capacity: f64) -> PowerPlant {
        PowerPlant::new()
            .with_text(Field::Name, name)
            .with_text(Field::Country, country)
            .with_text(Field::Fueltype, fueltype)
            .with_number(Field::Capacity, capacity)
    }

    #[test]
    fn test_country_mismatch_vetoes() {
        let scorer = EmbeddedScorer::default();
        let a = plant("Emsland", "Germany", "Nuclear", 1400.0);
        let b = plant("Emsland", "Netherlands", "Nuclear", 1400.0);
        assert_eq!(scorer.compare(&a, &b, &EmbeddedScorerConfig::for_linking()), None);
    }

    #[test]
    fn test_identical_records_match_and_different_names_do_not() {
        let scorer = EmbeddedScorer::default();
        let config = EmbeddedScorerConfig::for_linking();
        let a = plant("Emsland", "Germany", "Nuclear", 1400.0);
        let b = plant("Emsland", "Germany", "Nuclear", 1400.0);
        let c = plant("Grafenrheinfeld", "Germany", "Nuclear", 1400.0);
        assert!(scorer.compare(&a, &b, &config).unwrap() >= config.threshold);
        assert!(scorer.compare(&a, &c, &config).unwrap() < config.threshold);
    }

    #[test]
    fn test_single_match_keeps_best_partner() {
        let scorer = EmbeddedScorer::default();
        let left = vec![plant("Emsland", "Germany", "Nuclear", 1400.0)];
        let right = vec![
            plant("Emsland", "Germany", "Nuclear", 1000.0),
            plant("Emsland", "Germany", "Nuclear", 1400.0),
        ];
        let batch = ScoringBatch::Link {
            left: left
                .iter()
                .enumerate()
                .map(|(index, plant)| Candidate { label: "A", index, plant })
                .collect(),
            right: right
                .iter()
                .enumerate()
                .map(|(index, plant)| Candidate { label: "B", index, plant })
                .collect(),
            single_match: true,
        };
        let links = scorer.score(&batch).unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!((links[0].left, links[0].right), (0, 1));
    }

    #[test]
    fn test_deduplication_links_are_reciprocal() {
        let scorer = EmbeddedScorer::default();
        let records = vec![
            plant("Niederaussem", "Germany", "Lignite", 300.0),
            plant("Niederaussem", "Germany", "Lignite", 600.0),
        ];
        let batch = ScoringBatch::Deduplicate {
            records: records
                .iter()
                .enumerate()
                .map(|(index, plant)| Candidate { label: "A", index, plant })
                .collect(),
        };
        let links = scorer.score(&batch).unwrap();
        assert_eq!(links.len(), 2);
        assert!(links.iter().any(|l| l.left == 0 && l.right == 1));
        assert!(links.iter().any(|l| l.left == 1 && l.right == 0));
    }

    #[test]
    fn test_normalize_for_comparison() {
        assert_eq!(normalize_for_comparison("  Kraftwerk-Mehrum (Block 3) "), "kraftwerk mehrum block 3");
    }
}
