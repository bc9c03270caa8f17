//! Run metrics, batch reports, and health status
//!
//! **[DME-MET-010]** Per-run counters aggregated incrementally as records
//! resolve; never recomputed from scratch mid-run.

use crate::models::MappingAlgorithm;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Confidence histogram bucket boundaries: 0-39, 40-69, 70-89, 90-100
pub const CONFIDENCE_BUCKETS: [&str; 4] = ["0-39", "40-69", "70-89", "90-100"];

/// Index into `CONFIDENCE_BUCKETS` for a confidence value
pub fn confidence_bucket(confidence: u8) -> usize {
    match confidence {
        0..=39 => 0,
        40..=69 => 1,
        70..=89 => 2,
        _ => 3,
    }
}

/// **[DME-MET-010]** Incrementally-aggregated per-run counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunMetrics {
    pub total_processed: usize,
    pub mapped: usize,
    pub cache_hits: usize,
    pub new_mappings: usize,
    pub needs_review: usize,
    pub failed: usize,

    /// Histogram over `CONFIDENCE_BUCKETS` (mapped results only)
    pub by_confidence_bucket: [usize; 4],

    /// Outcomes per algorithm name
    pub by_algorithm: HashMap<String, usize>,

    /// Sum of per-record latencies; average derives from total_processed
    pub total_latency_ms: u64,
}

impl RunMetrics {
    /// Fold one resolution outcome into the counters
    pub fn record(
        &mut self,
        algorithm: MappingAlgorithm,
        confidence: u8,
        mapped: bool,
        needs_review: bool,
        newly_cached: bool,
        latency_ms: u64,
    ) {
        self.total_processed += 1;
        self.total_latency_ms += latency_ms;
        *self
            .by_algorithm
            .entry(algorithm.as_str().to_string())
            .or_insert(0) += 1;

        if mapped {
            self.mapped += 1;
            self.by_confidence_bucket[confidence_bucket(confidence)] += 1;
            if algorithm == MappingAlgorithm::Cached {
                self.cache_hits += 1;
            } else if newly_cached {
                self.new_mappings += 1;
            }
        } else {
            self.failed += 1;
        }
        if needs_review {
            self.needs_review += 1;
        }
    }

    pub fn avg_latency_ms(&self) -> f64 {
        if self.total_processed == 0 {
            0.0
        } else {
            self.total_latency_ms as f64 / self.total_processed as f64
        }
    }
}

/// Summary returned by `resolve_batch`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Records skipped by the incremental change detector
    pub skipped_unchanged: usize,
    pub needs_review_count: usize,
    pub by_confidence_bucket: [usize; 4],
    pub by_algorithm: HashMap<String, usize>,
    pub metrics: RunMetrics,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub cancelled: bool,
}

/// Persisted per-run rollup plus the attempt's progress checkpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    /// Offset of the last committed record; a resumed run starts after it
    pub checkpoint_offset: i64,
    pub metrics: RunMetrics,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Review queue entry for human triage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntrySummary {
    pub entry_id: Uuid,
    pub run_id: Uuid,
    pub signature: String,
    pub model_name: String,
    pub device_family: Option<String>,
    pub capacity_id: Option<Uuid>,
    pub confidence: u8,
    pub algorithm: MappingAlgorithm,
    pub created_at: DateTime<Utc>,
}

/// Overall health banding for the trailing window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthLevel {
    Ok,
    Warning,
    Critical,
}

/// Alert raised when a health threshold is breached
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthAlert {
    pub level: HealthLevel,
    pub message: String,
}

/// Health snapshot over a trailing window of audit entries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub overall: HealthLevel,
    /// Mapped / total over the window (1.0 when the window is empty)
    pub success_rate: f64,
    pub avg_confidence: f64,
    pub needs_review_ratio: f64,
    pub window_total: usize,
    pub alerts: Vec<HealthAlert>,
}
