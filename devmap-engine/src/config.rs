//! Pipeline configuration
//!
//! **[DME-CFG-010]** All thresholds, decay parameters, and scoring weights are
//! explicit configuration passed into the pipeline constructor. No module
//! globals; tests and environments tune behavior without global mutation.

use serde::{Deserialize, Serialize};

/// Additive feature weights used by the candidate scorer
///
/// Contributions are summed per matching feature; the pipeline, not the
/// scorer, applies thresholds and caps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    /// Normalized model exact match (strongest textual signal)
    pub model_exact: u32,
    /// Normalized model substring match (either direction)
    pub model_substring: u32,
    /// Jaro-Winkler similarity above `model_similarity_floor`
    pub model_similar: u32,
    /// Identification code exact match
    pub identification_code: u32,
    pub release_year: u32,
    pub screen_size: u32,
    pub chip: u32,
    pub brand: u32,
    pub family: u32,
    /// Description length divided by this yields the specificity bonus
    /// (tie-breaker favoring more specific catalog entries)
    pub specificity_divisor: u32,
    /// Minimum Jaro-Winkler similarity to award `model_similar`
    pub model_similarity_floor: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            model_exact: 40,
            model_substring: 25,
            model_similar: 15,
            identification_code: 35,
            release_year: 10,
            screen_size: 10,
            chip: 15,
            brand: 5,
            family: 5,
            specificity_divisor: 20,
            model_similarity_floor: 0.90,
        }
    }
}

impl ScoringWeights {
    /// Sum of the single best contribution per feature; used to scale raw
    /// scores into the 0-100 confidence range
    pub fn max_score(&self) -> u32 {
        self.model_exact
            + self.identification_code
            + self.release_year
            + self.screen_size
            + self.chip
            + self.brand
            + self.family
    }
}

/// **[DME-CFG-010]** Engine-wide tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Pipeline halts at the first strategy reaching this confidence
    pub accept_threshold: u8,
    /// Best-effort results at or above this are returned flagged for review
    pub review_threshold: u8,

    /// Cached-confidence decay per 30 days since last confirmation
    pub decay_factor: f64,
    /// Decayed confidence never drops below this floor
    pub decay_floor: u8,

    /// Candidate set bound for the fuzzy strategy
    pub fuzzy_candidate_limit: usize,
    pub fuzzy_confidence_cap: u8,
    pub heuristic_confidence_cap: u8,

    /// Top-two candidates within this many points are ambiguous
    pub ambiguity_delta: u8,

    /// Capacity tolerance for fuzzy matching, by device capacity class
    pub capacity_tolerance_small_gb: u32,
    pub capacity_tolerance_large_gb: u32,
    /// Capacities at or above this use the large tolerance
    pub capacity_class_boundary_gb: u32,

    /// Removed signatures unconfirmed longer than this are invalidated
    pub stale_after_days: i64,

    /// Worker pool size for batch runs (0 = number of CPUs)
    pub concurrency: usize,

    pub weights: ScoringWeights,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            accept_threshold: 70,
            review_threshold: 40,
            decay_factor: 0.95,
            decay_floor: 50,
            fuzzy_candidate_limit: 100,
            fuzzy_confidence_cap: 75,
            heuristic_confidence_cap: 70,
            ambiguity_delta: 5,
            capacity_tolerance_small_gb: 16,
            capacity_tolerance_large_gb: 64,
            capacity_class_boundary_gb: 512,
            stale_after_days: 7,
            concurrency: 0,
            weights: ScoringWeights::default(),
        }
    }
}

impl PipelineConfig {
    /// Merge TOML `[pipeline]` overrides from the shared config file over the
    /// compiled defaults
    pub fn from_toml(table: &toml::value::Table) -> devmap_common::Result<Self> {
        if table.is_empty() {
            return Ok(Self::default());
        }
        let value = toml::Value::Table(table.clone());
        value
            .try_into()
            .map_err(|e| devmap_common::Error::Config(format!("Invalid [pipeline] config: {}", e)))
    }

    /// Effective worker count for batch runs
    pub fn effective_concurrency(&self) -> usize {
        if self.concurrency > 0 {
            self.concurrency
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        }
    }

    /// Capacity tolerance for a device of the given capacity
    pub fn capacity_tolerance(&self, capacity_gb: u32) -> u32 {
        if capacity_gb >= self.capacity_class_boundary_gb {
            self.capacity_tolerance_large_gb
        } else {
            self.capacity_tolerance_small_gb
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_contract() {
        let config = PipelineConfig::default();
        assert_eq!(config.accept_threshold, 70);
        assert_eq!(config.review_threshold, 40);
        assert!((config.decay_factor - 0.95).abs() < 1e-9);
        assert_eq!(config.fuzzy_candidate_limit, 100);
        assert_eq!(config.stale_after_days, 7);
    }

    #[test]
    fn test_capacity_tolerance_classes() {
        let config = PipelineConfig::default();
        assert_eq!(config.capacity_tolerance(256), 16);
        assert_eq!(config.capacity_tolerance(512), 64);
        assert_eq!(config.capacity_tolerance(2048), 64);
    }

    #[test]
    fn test_from_toml_overrides() {
        let table: toml::value::Table = toml::from_str(
            r#"
            accept_threshold = 80
            decay_factor = 0.9
            "#,
        )
        .unwrap();
        let config = PipelineConfig::from_toml(&table).unwrap();
        assert_eq!(config.accept_threshold, 80);
        assert!((config.decay_factor - 0.9).abs() < 1e-9);
        // Untouched fields keep defaults
        assert_eq!(config.review_threshold, 40);
    }

    #[test]
    fn test_from_toml_empty_is_default() {
        let config = PipelineConfig::from_toml(&toml::value::Table::new()).unwrap();
        assert_eq!(config.accept_threshold, 70);
    }
}
