//! Append-only audit log and run reports
//!
//! **[DME-AUD-010]** One entry per pipeline invocation, success or failure.
//! Entries are never mutated except to append human validation feedback; they
//! are the sole source of truth for later analysis.

use crate::error::{EngineError, EngineResult};
use crate::models::{
    AuditEntrySummary, DeviceMetadata, DeviceSignature, MappingAlgorithm, MappingResult,
    RunMetrics, RunReport, ValidationFeedback,
};
use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

#[derive(Clone)]
pub struct AuditLog {
    db: Pool<Sqlite>,
}

/// Aggregates over a trailing window, consumed by the health monitor
#[derive(Debug, Clone, Default)]
pub struct WindowStats {
    pub total: i64,
    pub mapped: i64,
    pub needs_review: i64,
    pub avg_confidence: f64,
}

/// One grouped aggregate row (per brand or per day)
#[derive(Debug, Clone)]
pub struct RollupRow {
    /// Group key: brand name or YYYY-MM-DD day
    pub key: String,
    pub total: i64,
    pub mapped: i64,
    pub needs_review: i64,
    pub avg_confidence: f64,
}

impl AuditLog {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    /// Append one resolution attempt; returns the new entry id
    pub async fn record(
        &self,
        run_id: Uuid,
        signature: &DeviceSignature,
        metadata: &DeviceMetadata,
        result: &MappingResult,
        duration_ms: u64,
    ) -> EngineResult<Uuid> {
        let entry_id = Uuid::new_v4();
        let result_json = serde_json::to_string(result)
            .map_err(|e| EngineError::Internal(format!("Failed to serialize result: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO mapping_audit_log
                (entry_id, run_id, signature, model_name, brand, device_family, capacity_id,
                 confidence, algorithm, needs_review, result_json, duration_ms, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry_id.to_string())
        .bind(run_id.to_string())
        .bind(signature.as_str())
        .bind(&metadata.raw_model)
        .bind(metadata.brand.as_str())
        .bind(metadata.family.as_deref())
        .bind(result.capacity_id.map(|id| id.to_string()))
        .bind(result.confidence as i64)
        .bind(result.algorithm.as_str())
        .bind(result.needs_review as i64)
        .bind(&result_json)
        .bind(duration_ms as i64)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.db)
        .await?;

        tracing::debug!(
            entry_id = %entry_id,
            run_id = %run_id,
            signature = %signature,
            algorithm = result.algorithm.as_str(),
            confidence = result.confidence,
            "Audit entry recorded"
        );
        Ok(entry_id)
    }

    /// Review queue: unreviewed entries flagged needs_review, newest first
    pub async fn list_needing_review(
        &self,
        limit: usize,
        min_confidence: Option<u8>,
        device_type: Option<&str>,
    ) -> EngineResult<Vec<AuditEntrySummary>> {
        let rows: Vec<(String, String, String, String, Option<String>, Option<String>, i64, String, String)> =
            sqlx::query_as(
                r#"
                SELECT entry_id, run_id, signature, model_name, device_family, capacity_id,
                       confidence, algorithm, created_at
                FROM mapping_audit_log
                WHERE needs_review = 1
                  AND feedback IS NULL
                  AND confidence >= ?
                  AND (? IS NULL OR device_family = ?)
                ORDER BY created_at DESC
                LIMIT ?
                "#,
            )
            .bind(min_confidence.unwrap_or(0) as i64)
            .bind(device_type)
            .bind(device_type)
            .bind(limit as i64)
            .fetch_all(&self.db)
            .await?;

        rows.into_iter().map(row_to_summary).collect()
    }

    /// Append human validation feedback to an existing entry
    ///
    /// The entry itself is never rewritten; only the feedback columns change.
    pub async fn record_feedback(
        &self,
        entry_id: Uuid,
        feedback: ValidationFeedback,
        notes: Option<&str>,
        reviewer_id: &str,
    ) -> EngineResult<()> {
        let updated = sqlx::query(
            r#"
            UPDATE mapping_audit_log
            SET feedback = ?, feedback_notes = ?, reviewer_id = ?, feedback_at = ?
            WHERE entry_id = ?
            "#,
        )
        .bind(feedback.as_str())
        .bind(notes)
        .bind(reviewer_id)
        .bind(Utc::now().to_rfc3339())
        .bind(entry_id.to_string())
        .execute(&self.db)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(EngineError::NotFound(format!(
                "Audit entry {} not found",
                entry_id
            )));
        }

        tracing::info!(
            entry_id = %entry_id,
            feedback = feedback.as_str(),
            reviewer = %reviewer_id,
            "Validation feedback recorded"
        );
        Ok(())
    }

    /// Persist (or refresh) the per-run report row
    pub async fn save_run_report(&self, report: &RunReport) -> EngineResult<()> {
        let metrics_json = serde_json::to_string(&report.metrics)
            .map_err(|e| EngineError::Internal(format!("Failed to serialize metrics: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO run_reports (run_id, checkpoint_offset, metrics_json, started_at, finished_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(run_id) DO UPDATE SET
                checkpoint_offset = excluded.checkpoint_offset,
                metrics_json = excluded.metrics_json,
                finished_at = excluded.finished_at
            "#,
        )
        .bind(report.run_id.to_string())
        .bind(report.checkpoint_offset)
        .bind(&metrics_json)
        .bind(report.started_at.to_rfc3339())
        .bind(report.finished_at.map(|t| t.to_rfc3339()))
        .execute(&self.db)
        .await?;
        Ok(())
    }

    /// Advance the progress checkpoint for a run
    pub async fn update_checkpoint(&self, run_id: Uuid, offset: i64) -> EngineResult<()> {
        sqlx::query("UPDATE run_reports SET checkpoint_offset = ? WHERE run_id = ?")
            .bind(offset)
            .bind(run_id.to_string())
            .execute(&self.db)
            .await?;
        Ok(())
    }

    /// Load the report (and checkpoint) for a run
    pub async fn get_run_report(&self, run_id: Uuid) -> EngineResult<RunReport> {
        let row: Option<(i64, String, String, Option<String>)> = sqlx::query_as(
            "SELECT checkpoint_offset, metrics_json, started_at, finished_at FROM run_reports WHERE run_id = ?",
        )
        .bind(run_id.to_string())
        .fetch_optional(&self.db)
        .await?;

        let (checkpoint_offset, metrics_json, started_at, finished_at) = row
            .ok_or_else(|| EngineError::NotFound(format!("Run {} not found", run_id)))?;

        let metrics: RunMetrics = serde_json::from_str(&metrics_json)
            .map_err(|e| EngineError::Internal(format!("Invalid metrics JSON: {}", e)))?;

        Ok(RunReport {
            run_id,
            checkpoint_offset,
            metrics,
            started_at: parse_timestamp(&started_at)?,
            finished_at: finished_at.as_deref().map(parse_timestamp).transpose()?,
        })
    }

    /// Aggregates over entries created since `since` (health monitoring)
    pub async fn window_stats(&self, since: DateTime<Utc>) -> EngineResult<WindowStats> {
        let row: (i64, i64, i64, Option<f64>) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COALESCE(SUM(CASE WHEN capacity_id IS NOT NULL THEN 1 ELSE 0 END), 0),
                   COALESCE(SUM(needs_review), 0),
                   AVG(CASE WHEN capacity_id IS NOT NULL THEN confidence END)
            FROM mapping_audit_log
            WHERE created_at >= ?
            "#,
        )
        .bind(since.to_rfc3339())
        .fetch_one(&self.db)
        .await?;

        Ok(WindowStats {
            total: row.0,
            mapped: row.1,
            needs_review: row.2,
            avg_confidence: row.3.unwrap_or(0.0),
        })
    }

    /// Per-brand rollup of entries created since `since`
    pub async fn rollup_by_brand(&self, since: DateTime<Utc>) -> EngineResult<Vec<RollupRow>> {
        self.rollup("brand", since).await
    }

    /// Per-day rollup of entries created since `since`, oldest day first
    ///
    /// `created_at` is RFC3339, so the first ten characters are the day.
    pub async fn rollup_by_day(&self, since: DateTime<Utc>) -> EngineResult<Vec<RollupRow>> {
        self.rollup("substr(created_at, 1, 10)", since).await
    }

    async fn rollup(&self, key_expr: &str, since: DateTime<Utc>) -> EngineResult<Vec<RollupRow>> {
        // key_expr is one of two compile-time constants, never caller input
        let rows: Vec<(String, i64, i64, i64, Option<f64>)> = sqlx::query_as(&format!(
            r#"
            SELECT {key} AS grp,
                   COUNT(*),
                   COALESCE(SUM(CASE WHEN capacity_id IS NOT NULL THEN 1 ELSE 0 END), 0),
                   COALESCE(SUM(needs_review), 0),
                   AVG(CASE WHEN capacity_id IS NOT NULL THEN confidence END)
            FROM mapping_audit_log
            WHERE created_at >= ?
            GROUP BY grp
            ORDER BY grp
            "#,
            key = key_expr
        ))
        .bind(since.to_rfc3339())
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(key, total, mapped, needs_review, avg)| RollupRow {
                key,
                total,
                mapped,
                needs_review,
                avg_confidence: avg.unwrap_or(0.0),
            })
            .collect())
    }
}

fn parse_timestamp(s: &str) -> EngineResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| EngineError::Internal(format!("Invalid timestamp in database: {}", e)))
}

fn row_to_summary(
    row: (String, String, String, String, Option<String>, Option<String>, i64, String, String),
) -> EngineResult<AuditEntrySummary> {
    let (entry_id, run_id, signature, model_name, device_family, capacity_id, confidence, algorithm, created_at) =
        row;

    Ok(AuditEntrySummary {
        entry_id: Uuid::parse_str(&entry_id)
            .map_err(|e| EngineError::Internal(format!("Invalid UUID in database: {}", e)))?,
        run_id: Uuid::parse_str(&run_id)
            .map_err(|e| EngineError::Internal(format!("Invalid UUID in database: {}", e)))?,
        signature,
        model_name,
        device_family,
        capacity_id: capacity_id
            .as_deref()
            .map(Uuid::parse_str)
            .transpose()
            .map_err(|e| EngineError::Internal(format!("Invalid UUID in database: {}", e)))?,
        confidence: confidence.clamp(0, 100) as u8,
        algorithm: MappingAlgorithm::parse(&algorithm)
            .ok_or_else(|| EngineError::Internal(format!("Unknown algorithm: {}", algorithm)))?,
        created_at: parse_timestamp(&created_at)?,
    })
}
