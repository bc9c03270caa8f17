//! Mapping outcomes and cache entries
//!
//! **[DME-RES-010]** Resolution results with full decision context
//! **[DME-CACHE-010]** Signature-keyed cache rows

use crate::models::{CatalogCandidate, DeviceSignature};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Matching algorithm that produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingAlgorithm {
    Cached,
    Exact,
    Fuzzy,
    Heuristic,
    Failed,
}

impl MappingAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            MappingAlgorithm::Cached => "cached",
            MappingAlgorithm::Exact => "exact",
            MappingAlgorithm::Fuzzy => "fuzzy",
            MappingAlgorithm::Heuristic => "heuristic",
            MappingAlgorithm::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cached" => Some(MappingAlgorithm::Cached),
            "exact" => Some(MappingAlgorithm::Exact),
            "fuzzy" => Some(MappingAlgorithm::Fuzzy),
            "heuristic" => Some(MappingAlgorithm::Heuristic),
            "failed" => Some(MappingAlgorithm::Failed),
            _ => None,
        }
    }
}

/// One entry of the pipeline decision path: a strategy attempt, recorded
/// whether or not it succeeded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionStep {
    pub strategy: MappingAlgorithm,
    pub attempted_at: DateTime<Utc>,
    pub success: bool,
    pub confidence: u8,
    pub candidate_count: usize,
}

/// Transient pairing of a candidate with its raw score during resolution
///
/// Exists only while one record is being resolved; `MappingResult` keeps a
/// flattened `CandidateSummary` instead.
#[derive(Debug, Clone)]
pub struct MappingCandidateScore {
    pub candidate: CatalogCandidate,
    /// Non-negative raw score, unbounded before the pipeline caps it
    pub raw_score: u32,
    pub algorithm: MappingAlgorithm,
    pub reasons: Vec<String>,
}

/// Flattened candidate record kept on the final result for auditing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateSummary {
    pub capacity_id: Uuid,
    pub description: String,
    pub raw_score: u32,
    pub confidence: u8,
    pub algorithm: MappingAlgorithm,
    pub reasons: Vec<String>,
}

/// **[DME-RES-010]** Final outcome of resolving one `DeviceMetadata`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingResult {
    /// Chosen catalog capacity id; `None` means resolution failed
    pub capacity_id: Option<Uuid>,

    /// Confidence 0-100 (0 on failure)
    pub confidence: u8,

    pub algorithm: MappingAlgorithm,

    /// Ordered record of every strategy attempted
    pub decision_path: Vec<DecisionStep>,

    /// All candidates considered across strategies
    pub candidates: Vec<CandidateSummary>,

    /// Why discarded candidates were rejected
    pub rejections: Vec<String>,

    /// True when confidence fell below the review threshold or the match
    /// was ambiguous
    pub needs_review: bool,

    /// Two or more top candidates landed within the ambiguity delta
    pub ambiguous: bool,

    /// Source fields carried through for traceability
    pub extra_fields: HashMap<String, serde_json::Value>,
}

impl MappingResult {
    /// Failure result carrying the decision context accumulated so far
    pub fn failed(
        decision_path: Vec<DecisionStep>,
        candidates: Vec<CandidateSummary>,
        rejections: Vec<String>,
    ) -> Self {
        Self {
            capacity_id: None,
            confidence: 0,
            algorithm: MappingAlgorithm::Failed,
            decision_path,
            candidates,
            rejections,
            needs_review: true,
            ambiguous: false,
            extra_fields: HashMap::new(),
        }
    }

    pub fn is_mapped(&self) -> bool {
        self.capacity_id.is_some()
    }
}

/// Human validation verdict recorded against an audit entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationFeedback {
    Correct,
    Incorrect,
    Partial,
    NeedsReview,
}

impl ValidationFeedback {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationFeedback::Correct => "correct",
            ValidationFeedback::Incorrect => "incorrect",
            ValidationFeedback::Partial => "partial",
            ValidationFeedback::NeedsReview => "needs_review",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "correct" => Some(ValidationFeedback::Correct),
            "incorrect" => Some(ValidationFeedback::Incorrect),
            "partial" => Some(ValidationFeedback::Partial),
            "needs_review" => Some(ValidationFeedback::NeedsReview),
            _ => None,
        }
    }
}

/// **[DME-CACHE-010]** Persisted cache row keyed by `DeviceSignature`
///
/// Created on first successful resolution; confirmed on every later hit;
/// invalidated (never deleted) when the record leaves the feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceMapping {
    pub signature: DeviceSignature,
    pub capacity_id: Uuid,

    /// Undecayed confidence from the most recent successful resolution;
    /// decay is applied at read time by the pipeline
    pub confidence: u8,

    pub algorithm: MappingAlgorithm,
    pub confirmation_count: i64,
    pub first_seen_at: DateTime<Utc>,
    pub last_confirmed_at: DateTime<Utc>,
    pub is_active: bool,
    pub needs_review: bool,
    pub invalidation_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_roundtrip() {
        for alg in [
            MappingAlgorithm::Cached,
            MappingAlgorithm::Exact,
            MappingAlgorithm::Fuzzy,
            MappingAlgorithm::Heuristic,
            MappingAlgorithm::Failed,
        ] {
            assert_eq!(MappingAlgorithm::parse(alg.as_str()), Some(alg));
        }
        assert_eq!(MappingAlgorithm::parse("nonsense"), None);
    }

    #[test]
    fn test_feedback_roundtrip() {
        for fb in [
            ValidationFeedback::Correct,
            ValidationFeedback::Incorrect,
            ValidationFeedback::Partial,
            ValidationFeedback::NeedsReview,
        ] {
            assert_eq!(ValidationFeedback::parse(fb.as_str()), Some(fb));
        }
    }

    #[test]
    fn test_failed_result_shape() {
        let result = MappingResult::failed(Vec::new(), Vec::new(), vec!["no candidates".into()]);
        assert!(!result.is_mapped());
        assert_eq!(result.confidence, 0);
        assert!(result.needs_review);
        assert_eq!(result.algorithm, MappingAlgorithm::Failed);
    }
}
