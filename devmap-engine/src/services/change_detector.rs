//! Incremental change detection
//!
//! **[DME-DELTA-010]** Partitions a feed snapshot against the active cache so
//! a batch run only spends resolution work on records whose signature has not
//! been seen before. Records absent from the feed long enough get their cache
//! rows invalidated, never deleted.

use crate::db::MappingCache;
use crate::error::EngineResult;
use crate::models::{DeviceMetadata, DeviceSignature};
use chrono::{Duration, Utc};
use std::collections::HashSet;

/// Outcome of comparing one feed snapshot against the cache
pub struct ChangeSet {
    /// Records whose signature has no active cache row; these go through the
    /// full pipeline
    pub new_records: Vec<DeviceMetadata>,

    /// Records with an active cache row; a run may skip these entirely or
    /// route them through the cached strategy for confirmation
    pub unchanged: Vec<DeviceMetadata>,

    /// Active cache signatures absent from this snapshot
    pub removed: Vec<DeviceSignature>,

    /// Signatures invalidated this pass for prolonged absence
    pub invalidated: Vec<DeviceSignature>,
}

impl ChangeSet {
    pub fn total_records(&self) -> usize {
        self.new_records.len() + self.unchanged.len()
    }
}

pub struct ChangeDetector {
    cache: MappingCache,
    stale_after_days: i64,
}

impl ChangeDetector {
    pub fn new(cache: MappingCache, stale_after_days: i64) -> Self {
        Self {
            cache,
            stale_after_days,
        }
    }

    /// Partition a snapshot into new / unchanged / removed and invalidate
    /// rows that have been absent past the staleness window
    ///
    /// Duplicate signatures within one snapshot collapse to the first record
    /// carrying them; later duplicates are dropped as unchanged-within-run.
    pub async fn detect(&self, snapshot: Vec<DeviceMetadata>) -> EngineResult<ChangeSet> {
        let active = self.cache.active_signatures().await?;
        let active_set: HashSet<&str> = active.iter().map(|(sig, _)| sig.as_str()).collect();

        let mut seen_this_run: HashSet<String> = HashSet::new();
        let mut new_records = Vec::new();
        let mut unchanged = Vec::new();

        for meta in snapshot {
            let signature = meta.signature();
            if !seen_this_run.insert(signature.0.clone()) {
                continue;
            }
            if active_set.contains(signature.as_str()) {
                unchanged.push(meta);
            } else {
                new_records.push(meta);
            }
        }

        // Active rows with no record in this snapshot
        let cutoff = Utc::now() - Duration::days(self.stale_after_days);
        let mut removed = Vec::new();
        let mut invalidated = Vec::new();
        for (sig, last_confirmed_at) in active {
            if seen_this_run.contains(&sig) {
                continue;
            }
            let signature = DeviceSignature(sig);
            if last_confirmed_at < cutoff {
                self.cache
                    .invalidate(&signature, "absent from feed past staleness window")
                    .await?;
                invalidated.push(signature.clone());
            }
            removed.push(signature);
        }

        tracing::info!(
            new = new_records.len(),
            unchanged = unchanged.len(),
            removed = removed.len(),
            invalidated = invalidated.len(),
            "Change detection complete"
        );

        Ok(ChangeSet {
            new_records,
            unchanged,
            removed,
            invalidated,
        })
    }
}
