//! devmap-engine - Device Mapping Engine
//!
//! **[DME-OV-010]** Reconciles loosely-structured vendor device records
//! against the internal catalog: field extraction, signature caching, a
//! multi-strategy resolution pipeline with confidence scoring, incremental
//! change detection, an append-only audit trail, and health monitoring.
//!
//! The engine owns no ingestion and no outward API; callers hand over parsed
//! records and catalog/knowledge-base readers, and get mapping results and
//! batch reports back.

pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod models;
pub mod services;

pub use crate::error::{EngineError, EngineResult};

use crate::catalog::{CatalogReader, KnowledgeBaseReader};
use crate::config::PipelineConfig;
use crate::db::{AuditLog, MappingCache};
use crate::extractors::ExtractorRegistry;
use crate::models::{
    AuditEntrySummary, BatchReport, DeviceMetadata, HealthStatus, MappingResult, RawRecord,
    ValidationFeedback,
};
use crate::services::{
    BatchOptions, BatchRunner, ChangeDetector, HealthMonitor, ResolutionPipeline, ResolveOptions,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Engine facade wiring extraction, resolution, auditing, and health
pub struct MappingEngine {
    config: PipelineConfig,
    registry: ExtractorRegistry,
    pipeline: Arc<ResolutionPipeline>,
    cache: MappingCache,
    audit: AuditLog,
    cancel: CancellationToken,
}

impl MappingEngine {
    /// Wire the engine over an initialized database pool and collaborator
    /// readers
    pub fn new(
        db: SqlitePool,
        config: PipelineConfig,
        catalog: Arc<dyn CatalogReader>,
        knowledge: Arc<dyn KnowledgeBaseReader>,
    ) -> Self {
        let cache = MappingCache::new(db.clone());
        let audit = AuditLog::new(db);
        let pipeline = Arc::new(ResolutionPipeline::new(
            config.clone(),
            catalog,
            knowledge,
            cache.clone(),
        ));
        Self {
            config,
            registry: ExtractorRegistry::new(),
            pipeline,
            cache,
            audit,
            cancel: CancellationToken::new(),
        }
    }

    /// Extract normalized metadata from one raw record; never fails
    pub fn extract(&self, record: &RawRecord) -> DeviceMetadata {
        self.registry.extract(record)
    }

    /// Extract and resolve one record outside any batch run
    ///
    /// The outcome is audited under a fresh single-record run id, including
    /// fail-closed outcomes: an infrastructure error still leaves an audit
    /// entry carrying the cause before it propagates.
    pub async fn resolve_record(&self, record: &RawRecord) -> EngineResult<MappingResult> {
        let meta = self.extract(record);
        let signature = meta.signature();
        let run_id = Uuid::new_v4();
        let start = std::time::Instant::now();
        let result = match self
            .pipeline
            .resolve(&meta, &ResolveOptions::default())
            .await
        {
            Ok(result) => result,
            Err(e) => {
                let failed = MappingResult::failed(
                    Vec::new(),
                    Vec::new(),
                    vec![format!("resolution error: {}", e)],
                );
                self.audit
                    .record(
                        run_id,
                        &signature,
                        &meta,
                        &failed,
                        start.elapsed().as_millis() as u64,
                    )
                    .await?;
                return Err(e);
            }
        };
        self.audit
            .record(
                run_id,
                &signature,
                &meta,
                &result,
                start.elapsed().as_millis() as u64,
            )
            .await?;
        Ok(result)
    }

    /// Run a full feed snapshot through change detection and the pipeline
    pub async fn resolve_batch(
        &self,
        records: Vec<RawRecord>,
        options: &BatchOptions,
    ) -> EngineResult<BatchReport> {
        let snapshot: Vec<DeviceMetadata> =
            records.iter().map(|r| self.registry.extract(r)).collect();
        let runner = BatchRunner::new(
            Arc::clone(&self.pipeline),
            ChangeDetector::new(self.cache.clone(), self.config.stale_after_days),
            self.audit.clone(),
            self.cancel.child_token(),
        );
        runner.run(snapshot, options).await
    }

    /// Review queue: unreviewed low-confidence or ambiguous outcomes
    pub async fn list_for_review(
        &self,
        limit: usize,
        min_confidence: Option<u8>,
        device_type: Option<&str>,
    ) -> EngineResult<Vec<AuditEntrySummary>> {
        self.audit
            .list_needing_review(limit, min_confidence, device_type)
            .await
    }

    /// Append a human verdict to an audit entry
    pub async fn record_feedback(
        &self,
        entry_id: Uuid,
        feedback: ValidationFeedback,
        notes: Option<&str>,
        reviewer_id: &str,
    ) -> EngineResult<()> {
        self.audit
            .record_feedback(entry_id, feedback, notes, reviewer_id)
            .await
    }

    /// Health snapshot over a trailing window of audit entries
    /// (default 24 hours)
    pub async fn health(&self, window_hours: Option<i64>) -> EngineResult<HealthStatus> {
        let mut monitor = HealthMonitor::new(self.audit.clone());
        if let Some(hours) = window_hours {
            monitor = monitor.with_window_hours(hours);
        }
        monitor.status().await
    }

    /// Token cancelling all in-flight and future batch runs
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }
}
