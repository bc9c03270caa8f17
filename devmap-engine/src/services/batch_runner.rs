//! Batch resolution runner
//!
//! **[DME-BATCH-010]** Drives one feed snapshot through change detection and
//! the resolution pipeline with a bounded worker pool. Progress commits to a
//! persisted checkpoint in work-list order for observability; resume
//! correctness comes from the signature cache, since change detection drops
//! every record the interrupted attempt already mapped. Cancellation is
//! cooperative: in-flight records drain, nothing new dispatches.

use crate::db::AuditLog;
use crate::error::EngineResult;
use crate::models::{BatchReport, DeviceMetadata, MappingAlgorithm, MappingResult, RunMetrics, RunReport};
use crate::services::change_detector::ChangeDetector;
use crate::services::resolution_pipeline::{ResolutionPipeline, ResolveOptions};
use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Checkpoint persistence cadence, in committed records
const CHECKPOINT_EVERY: i64 = 25;

/// Options for one batch run
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Resume an earlier run; `None` starts a fresh run with a new id
    pub resume_run_id: Option<Uuid>,

    /// When false every record is re-resolved even if cached (bypasses the
    /// cached strategy, not change detection)
    pub bypass_cache: bool,
}

pub struct BatchRunner {
    pipeline: Arc<ResolutionPipeline>,
    detector: ChangeDetector,
    audit: AuditLog,
    cancel: CancellationToken,
}

impl BatchRunner {
    pub fn new(
        pipeline: Arc<ResolutionPipeline>,
        detector: ChangeDetector,
        audit: AuditLog,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            pipeline,
            detector,
            audit,
            cancel,
        }
    }

    /// Run one snapshot to completion (or cancellation)
    pub async fn run(
        &self,
        snapshot: Vec<DeviceMetadata>,
        options: &BatchOptions,
    ) -> EngineResult<BatchReport> {
        let run_id = options.resume_run_id.unwrap_or_else(Uuid::new_v4);
        let changes = self.detector.detect(snapshot).await?;
        let skipped_unchanged = changes.unchanged.len();
        let total = changes.total_records();
        let work: Arc<Vec<DeviceMetadata>> = Arc::new(changes.new_records);

        // A resumed run keeps its accumulated metrics and start time. The
        // work list is recomputed from scratch: records the earlier attempt
        // mapped are cached and fell out as unchanged above, so everything
        // left in `work` genuinely still needs resolving. The checkpoint is
        // therefore per-attempt and restarts at -1.
        let (mut metrics, started_at) = match options.resume_run_id {
            Some(id) => {
                let prior = self.audit.get_run_report(id).await?;
                tracing::info!(
                    run_id = %id,
                    prior_processed = prior.metrics.total_processed,
                    "Resuming batch run"
                );
                (prior.metrics, prior.started_at)
            }
            None => (RunMetrics::default(), Utc::now()),
        };
        let mut committed = -1i64;

        self.audit
            .save_run_report(&RunReport {
                run_id,
                checkpoint_offset: committed,
                metrics: metrics.clone(),
                started_at,
                finished_at: None,
            })
            .await?;

        let concurrency = self.pipeline.config().effective_concurrency().max(1);
        tracing::info!(
            run_id = %run_id,
            total,
            to_resolve = work.len(),
            skipped_unchanged,
            concurrency,
            "Batch run started"
        );

        let resolve_options = ResolveOptions {
            use_cache: !options.bypass_cache,
        };
        let mut join_set: JoinSet<(i64, MappingResult, u64)> = JoinSet::new();
        let mut dispatched = 0usize;
        let mut out_of_order: BTreeSet<i64> = BTreeSet::new();
        let mut last_saved_checkpoint = committed;
        let mut cancelled = false;

        loop {
            while !cancelled && join_set.len() < concurrency && dispatched < work.len() {
                if self.cancel.is_cancelled() {
                    cancelled = true;
                    tracing::warn!(run_id = %run_id, "Cancellation requested, draining in-flight work");
                    break;
                }
                let offset = dispatched as i64;
                dispatched += 1;
                join_set.spawn(resolve_one(
                    Arc::clone(&self.pipeline),
                    self.audit.clone(),
                    Arc::clone(&work),
                    run_id,
                    offset,
                    resolve_options.clone(),
                ));
            }

            let Some(joined) = join_set.join_next().await else {
                if cancelled || dispatched >= work.len() {
                    break;
                }
                continue;
            };

            match joined {
                Ok((offset, result, latency_ms)) => {
                    let newly_cached =
                        result.is_mapped() && result.algorithm != MappingAlgorithm::Cached;
                    metrics.record(
                        result.algorithm,
                        result.confidence,
                        result.is_mapped(),
                        result.needs_review,
                        newly_cached,
                        latency_ms,
                    );

                    // Advance the contiguous committed prefix
                    out_of_order.insert(offset);
                    while out_of_order.remove(&(committed + 1)) {
                        committed += 1;
                    }
                    if committed - last_saved_checkpoint >= CHECKPOINT_EVERY {
                        self.audit.update_checkpoint(run_id, committed).await?;
                        last_saved_checkpoint = committed;
                    }
                }
                Err(e) => {
                    tracing::error!(run_id = %run_id, error = %e, "Resolution task panicked");
                    metrics.record(MappingAlgorithm::Failed, 0, false, true, false, 0);
                }
            }

            if self.cancel.is_cancelled() {
                cancelled = true;
            }
        }

        let finished_at = Utc::now();
        self.audit
            .save_run_report(&RunReport {
                run_id,
                checkpoint_offset: committed,
                metrics: metrics.clone(),
                started_at,
                // A cancelled run stays open so it can be resumed
                finished_at: (!cancelled).then_some(finished_at),
            })
            .await?;

        let report = BatchReport {
            run_id,
            total,
            succeeded: metrics.mapped,
            failed: metrics.failed,
            skipped_unchanged,
            needs_review_count: metrics.needs_review,
            by_confidence_bucket: metrics.by_confidence_bucket,
            by_algorithm: metrics.by_algorithm.clone(),
            metrics,
            started_at,
            finished_at,
            cancelled,
        };
        tracing::info!(
            run_id = %run_id,
            succeeded = report.succeeded,
            failed = report.failed,
            skipped_unchanged = report.skipped_unchanged,
            needs_review = report.needs_review_count,
            cancelled = report.cancelled,
            "Batch run finished"
        );
        Ok(report)
    }
}

/// Resolve one record and audit the outcome, whatever it is
///
/// Per-record isolation: a resolution error becomes an audited failure and
/// never aborts the run.
async fn resolve_one(
    pipeline: Arc<ResolutionPipeline>,
    audit: AuditLog,
    work: Arc<Vec<DeviceMetadata>>,
    run_id: Uuid,
    offset: i64,
    options: ResolveOptions,
) -> (i64, MappingResult, u64) {
    let meta = &work[offset as usize];
    let signature = meta.signature();
    let start = Instant::now();

    let result = match pipeline.resolve(meta, &options).await {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!(
                signature = %signature,
                model = %meta.raw_model,
                error = %e,
                "Record failed to resolve"
            );
            MappingResult::failed(
                Vec::new(),
                Vec::new(),
                vec![format!("resolution error: {}", e)],
            )
        }
    };
    let latency_ms = start.elapsed().as_millis() as u64;

    if let Err(e) = audit.record(run_id, &signature, meta, &result, latency_ms).await {
        tracing::error!(signature = %signature, error = %e, "Failed to write audit entry");
    }

    (offset, result, latency_ms)
}
