//! Candidate Scorer
//!
//! **[DME-SCORE-010]** Weighted-feature scoring of catalog candidates against
//! extracted device metadata. Each matching feature contributes additively;
//! the output is a non-negative raw score with no fixed upper bound. The
//! resolution pipeline, not the scorer, applies thresholds and caps. The
//! scorer is stateless and mutates neither input, so it is safe to run across
//! candidates in parallel.

use crate::config::ScoringWeights;
use crate::extractors::parsers;
use crate::models::{CatalogCandidate, DeviceMetadata, MappingAlgorithm, MappingCandidateScore};

pub struct CandidateScorer {
    weights: ScoringWeights,
}

impl CandidateScorer {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    /// Score one candidate against the metadata
    pub fn score(
        &self,
        meta: &DeviceMetadata,
        candidate: &CatalogCandidate,
    ) -> MappingCandidateScore {
        let mut raw_score = 0u32;
        let mut reasons = Vec::new();

        let normalized_description = parsers::normalize_model_name(&candidate.description);

        // Model name: strongest textual signal, best single contribution wins
        if let Some(model) = &meta.normalized_model {
            if !model.is_empty() {
                if *model == normalized_description {
                    raw_score += self.weights.model_exact;
                    reasons.push("model name exact match".to_string());
                } else if normalized_description.contains(model.as_str())
                    || model.contains(&normalized_description)
                {
                    raw_score += self.weights.model_substring;
                    reasons.push("model name substring match".to_string());
                } else {
                    let similarity = strsim::jaro_winkler(model, &normalized_description);
                    if similarity >= self.weights.model_similarity_floor {
                        raw_score += self.weights.model_similar;
                        reasons.push(format!("model name similarity {:.2}", similarity));
                    }
                }
            }
        }

        // Identification code: strongest single structured signal
        if let Some(code) = &meta.identification_code {
            if candidate.has_identification_code(code) {
                raw_score += self.weights.identification_code;
                reasons.push(format!("identification code {} match", code));
            }
        }

        if let (Some(year), Some(candidate_year)) = (meta.release_year, candidate.release_year) {
            if year == candidate_year {
                raw_score += self.weights.release_year;
                reasons.push(format!("release year {} match", year));
            }
        }

        if let (Some(size), Some(candidate_size)) = (meta.screen_size_in, candidate.screen_size_in)
        {
            if (size - candidate_size).abs() < 0.1 {
                raw_score += self.weights.screen_size;
                reasons.push(format!("screen size {}\" match", size));
            }
        }

        if let (Some(chip), Some(candidate_chip)) = (&meta.chip, &candidate.chip) {
            if chip.eq_ignore_ascii_case(candidate_chip) {
                raw_score += self.weights.chip;
                reasons.push(format!("chip {} match", chip));
            }
        }

        if meta.brand == candidate.brand {
            raw_score += self.weights.brand;
            reasons.push("brand match".to_string());
        }

        if let (Some(family), Some(candidate_family)) = (&meta.family, &candidate.family) {
            if family == candidate_family {
                raw_score += self.weights.family;
                reasons.push("device type match".to_string());
            }
        }

        // Specificity bonus: longer catalog descriptions break ties toward
        // the more specific entry
        if self.weights.specificity_divisor > 0 {
            raw_score += candidate.description.len() as u32 / self.weights.specificity_divisor;
        }

        MappingCandidateScore {
            candidate: candidate.clone(),
            raw_score,
            algorithm: MappingAlgorithm::Fuzzy,
            reasons,
        }
    }

    /// Scale a raw score into the 0-100 confidence range, capped
    pub fn confidence_from_raw(&self, raw_score: u32, cap: u8) -> u8 {
        let max = self.weights.max_score().max(1);
        let scaled = (raw_score * 100 / max).min(100) as u8;
        scaled.min(cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Brand;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn meta(model: &str, code: Option<&str>) -> DeviceMetadata {
        DeviceMetadata {
            brand: Brand::Apple,
            family: Some("iphone".to_string()),
            raw_model: model.to_string(),
            normalized_model: Some(parsers::normalize_model_name(model)),
            capacity_gb: Some(256),
            identification_code: code.map(|c| c.to_string()),
            screen_size_in: None,
            release_year: Some(2023),
            chip: None,
            compute_units: None,
            vendor_model_code: None,
            extraction_confidence: 90,
            extraction_issues: Vec::new(),
            extra_fields: HashMap::new(),
        }
    }

    fn candidate(description: &str, codes: &[&str], year: Option<u16>) -> CatalogCandidate {
        CatalogCandidate {
            capacity_id: Uuid::new_v4(),
            model_id: Uuid::new_v4(),
            description: description.to_string(),
            brand: Brand::Apple,
            family: Some("iphone".to_string()),
            capacity_gb: 256,
            release_year: year,
            screen_size_in: None,
            chip: None,
            compute_units: None,
            model_code: None,
            identification_codes: codes.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[test]
    fn test_exact_match_outscores_substring() {
        let scorer = CandidateScorer::new(ScoringWeights::default());
        let m = meta("iPhone 15 Pro", None);

        let exact = scorer.score(&m, &candidate("iPhone 15 Pro", &[], None));
        let substring = scorer.score(&m, &candidate("iPhone 15 Pro Max", &[], None));
        assert!(exact.raw_score > substring.raw_score);
    }

    #[test]
    fn test_code_match_contributes() {
        let scorer = CandidateScorer::new(ScoringWeights::default());
        let m = meta("iPhone 15 Pro", Some("A3102"));

        let with_code = scorer.score(&m, &candidate("iPhone 15 Pro", &["A3102"], None));
        let without = scorer.score(&m, &candidate("iPhone 15 Pro", &[], None));
        assert_eq!(
            with_code.raw_score - without.raw_score,
            ScoringWeights::default().identification_code
        );
        assert!(with_code
            .reasons
            .iter()
            .any(|r| r.contains("identification code")));
    }

    #[test]
    fn test_specificity_bonus_breaks_ties() {
        let scorer = CandidateScorer::new(ScoringWeights::default());
        let m = meta("iPhone 15", None);

        let terse = scorer.score(&m, &candidate("iPhone 15", &[], None));
        let specific = scorer.score(
            &m,
            &candidate("iPhone 15 256GB Midnight (2023) Unlocked A3090", &[], None),
        );
        // Both are substring/exact-adjacent; the longer description gets the bonus
        assert!(specific.raw_score > 0);
        assert!(specific.candidate.description.len() > terse.candidate.description.len());
    }

    #[test]
    fn test_scorer_does_not_mutate_inputs() {
        let scorer = CandidateScorer::new(ScoringWeights::default());
        let m = meta("iPhone 15 Pro", Some("A3102"));
        let c = candidate("iPhone 15 Pro", &["A3102"], Some(2023));

        let before = (m.clone(), c.clone());
        let _ = scorer.score(&m, &c);
        assert_eq!(before.0.normalized_model, m.normalized_model);
        assert_eq!(before.1.description, c.description);
    }

    #[test]
    fn test_confidence_scaling_and_cap() {
        let weights = ScoringWeights::default();
        let max = weights.max_score();
        let scorer = CandidateScorer::new(weights);

        assert_eq!(scorer.confidence_from_raw(0, 75), 0);
        assert_eq!(scorer.confidence_from_raw(max, 75), 75);
        assert_eq!(scorer.confidence_from_raw(max, 100), 100);
        // Raw scores above max still cap at 100 before the cap applies
        assert_eq!(scorer.confidence_from_raw(max * 2, 100), 100);
    }

    #[test]
    fn test_year_mismatch_contributes_nothing() {
        let scorer = CandidateScorer::new(ScoringWeights::default());
        let m = meta("iPhone 15 Pro", None);
        let matching = scorer.score(&m, &candidate("iPhone 15 Pro", &[], Some(2023)));
        let mismatched = scorer.score(&m, &candidate("iPhone 15 Pro", &[], Some(2022)));
        assert_eq!(
            matching.raw_score - mismatched.raw_score,
            ScoringWeights::default().release_year
        );
    }
}
