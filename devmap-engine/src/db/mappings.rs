//! Mapping cache / signature store
//!
//! **[DME-CACHE-020]** Durable key-value store from `DeviceSignature` to
//! `DeviceMapping`. Upserts are atomic single-row `ON CONFLICT` statements so
//! concurrent resolution of records sharing a signature cannot create
//! duplicate rows. Invalidation flips `is_active`; rows are never deleted.

use crate::error::{EngineError, EngineResult};
use crate::models::{DeviceMapping, DeviceSignature, MappingAlgorithm, MappingResult};
use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

#[derive(Clone)]
pub struct MappingCache {
    db: Pool<Sqlite>,
}

impl MappingCache {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    /// Look up the cache row for a signature (active or not)
    pub async fn find(&self, signature: &DeviceSignature) -> EngineResult<Option<DeviceMapping>> {
        let row: Option<(String, String, i64, String, i64, String, String, i64, i64, Option<String>)> =
            sqlx::query_as(
                r#"
                SELECT signature, capacity_id, confidence, algorithm, confirmation_count,
                       first_seen_at, last_confirmed_at, is_active, needs_review,
                       invalidation_reason
                FROM device_mappings WHERE signature = ?
                "#,
            )
            .bind(signature.as_str())
            .fetch_optional(&self.db)
            .await?;

        row.map(row_to_mapping).transpose()
    }

    /// Bump the confirmation counter and refresh the confirmation timestamp
    ///
    /// The only side effect of a cached resolution.
    pub async fn confirm(&self, signature: &DeviceSignature) -> EngineResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = sqlx::query(
            r#"
            UPDATE device_mappings
            SET confirmation_count = confirmation_count + 1, last_confirmed_at = ?
            WHERE signature = ? AND is_active = 1
            "#,
        )
        .bind(&now)
        .bind(signature.as_str())
        .execute(&self.db)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(EngineError::NotFound(format!(
                "No active mapping for signature {}",
                signature
            )));
        }
        tracing::debug!(signature = %signature, "Cache confirmation recorded");
        Ok(())
    }

    /// Create or update the cache row for a successful resolution
    ///
    /// Idempotent-safe: a repeated identical upsert only refreshes the
    /// timestamp and counter. A transient lock conflict is retried once with
    /// a fresh statement, then surfaced as `CacheConflict`.
    pub async fn upsert(
        &self,
        signature: &DeviceSignature,
        result: &MappingResult,
    ) -> EngineResult<()> {
        let capacity_id = result.capacity_id.ok_or_else(|| {
            EngineError::InvalidInput("Cannot cache a failed resolution".to_string())
        })?;

        match self.try_upsert(signature, result, capacity_id).await {
            Ok(()) => Ok(()),
            Err(e) if is_lock_conflict(&e) => {
                tracing::warn!(
                    signature = %signature,
                    error = %e,
                    "Cache upsert conflict, retrying once"
                );
                self.try_upsert(signature, result, capacity_id)
                    .await
                    .map_err(|e| EngineError::CacheConflict(e.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn try_upsert(
        &self,
        signature: &DeviceSignature,
        result: &MappingResult,
        capacity_id: Uuid,
    ) -> Result<(), sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        let result_json = serde_json::to_string(result).unwrap_or_else(|_| "{}".to_string());

        sqlx::query(
            r#"
            INSERT INTO device_mappings
                (signature, capacity_id, confidence, algorithm, result_json,
                 confirmation_count, first_seen_at, last_confirmed_at,
                 is_active, needs_review, invalidation_reason, invalidated_at)
            VALUES (?, ?, ?, ?, ?, 1, ?, ?, 1, ?, NULL, NULL)
            ON CONFLICT(signature) DO UPDATE SET
                capacity_id = excluded.capacity_id,
                confidence = excluded.confidence,
                algorithm = excluded.algorithm,
                result_json = excluded.result_json,
                confirmation_count = device_mappings.confirmation_count + 1,
                last_confirmed_at = excluded.last_confirmed_at,
                is_active = 1,
                needs_review = excluded.needs_review,
                invalidation_reason = NULL,
                invalidated_at = NULL
            "#,
        )
        .bind(signature.as_str())
        .bind(capacity_id.to_string())
        .bind(result.confidence as i64)
        .bind(result.algorithm.as_str())
        .bind(&result_json)
        .bind(&now)
        .bind(&now)
        .bind(result.needs_review as i64)
        .execute(&self.db)
        .await?;

        tracing::debug!(
            signature = %signature,
            capacity_id = %capacity_id,
            confidence = result.confidence,
            "Cache row upserted"
        );
        Ok(())
    }

    /// Deactivate a cache row, recording why; never deletes
    pub async fn invalidate(&self, signature: &DeviceSignature, reason: &str) -> EngineResult<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            UPDATE device_mappings
            SET is_active = 0, invalidation_reason = ?, invalidated_at = ?
            WHERE signature = ? AND is_active = 1
            "#,
        )
        .bind(reason)
        .bind(&now)
        .bind(signature.as_str())
        .execute(&self.db)
        .await?;

        tracing::info!(signature = %signature, reason = %reason, "Cache row invalidated");
        Ok(())
    }

    /// All active signatures with their last confirmation time
    ///
    /// Input to the incremental change detector.
    pub async fn active_signatures(&self) -> EngineResult<Vec<(String, DateTime<Utc>)>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT signature, last_confirmed_at FROM device_mappings WHERE is_active = 1",
        )
        .fetch_all(&self.db)
        .await?;

        rows.into_iter()
            .map(|(sig, ts)| Ok((sig, parse_timestamp(&ts)?)))
            .collect()
    }
}

fn is_lock_conflict(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = db_err.message().to_lowercase();
            msg.contains("locked") || msg.contains("busy")
        }
        _ => false,
    }
}

fn parse_timestamp(s: &str) -> EngineResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| EngineError::Internal(format!("Invalid timestamp in database: {}", e)))
}

fn row_to_mapping(
    row: (String, String, i64, String, i64, String, String, i64, i64, Option<String>),
) -> EngineResult<DeviceMapping> {
    let (
        signature,
        capacity_id,
        confidence,
        algorithm,
        confirmation_count,
        first_seen_at,
        last_confirmed_at,
        is_active,
        needs_review,
        invalidation_reason,
    ) = row;

    Ok(DeviceMapping {
        signature: DeviceSignature(signature),
        capacity_id: Uuid::parse_str(&capacity_id)
            .map_err(|e| EngineError::Internal(format!("Invalid UUID in database: {}", e)))?,
        confidence: confidence.clamp(0, 100) as u8,
        algorithm: MappingAlgorithm::parse(&algorithm)
            .ok_or_else(|| EngineError::Internal(format!("Unknown algorithm: {}", algorithm)))?,
        confirmation_count,
        first_seen_at: parse_timestamp(&first_seen_at)?,
        last_confirmed_at: parse_timestamp(&last_confirmed_at)?,
        is_active: is_active != 0,
        needs_review: needs_review != 0,
        invalidation_reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::models::MappingAlgorithm;

    fn mapped_result(capacity_id: Uuid, confidence: u8) -> MappingResult {
        MappingResult {
            capacity_id: Some(capacity_id),
            confidence,
            algorithm: MappingAlgorithm::Exact,
            decision_path: Vec::new(),
            candidates: Vec::new(),
            rejections: Vec::new(),
            needs_review: false,
            ambiguous: false,
            extra_fields: Default::default(),
        }
    }

    fn sig(s: &str) -> DeviceSignature {
        DeviceSignature(s.to_string())
    }

    #[tokio::test]
    async fn test_upsert_creates_then_updates() {
        let cache = MappingCache::new(test_pool().await);
        let signature = sig("sig-1");
        let capacity = Uuid::new_v4();

        cache.upsert(&signature, &mapped_result(capacity, 85)).await.unwrap();
        let row = cache.find(&signature).await.unwrap().unwrap();
        assert_eq!(row.capacity_id, capacity);
        assert_eq!(row.confidence, 85);
        assert_eq!(row.confirmation_count, 1);
        assert!(row.is_active);

        // Repeated identical upsert: counter bump and timestamp only
        cache.upsert(&signature, &mapped_result(capacity, 85)).await.unwrap();
        let row = cache.find(&signature).await.unwrap().unwrap();
        assert_eq!(row.confirmation_count, 2);
        assert_eq!(row.capacity_id, capacity);
    }

    #[tokio::test]
    async fn test_confirm_bumps_counter() {
        let cache = MappingCache::new(test_pool().await);
        let signature = sig("sig-2");
        cache
            .upsert(&signature, &mapped_result(Uuid::new_v4(), 80))
            .await
            .unwrap();

        cache.confirm(&signature).await.unwrap();
        let row = cache.find(&signature).await.unwrap().unwrap();
        assert_eq!(row.confirmation_count, 2);
    }

    #[tokio::test]
    async fn test_confirm_missing_signature_errors() {
        let cache = MappingCache::new(test_pool().await);
        let result = cache.confirm(&sig("sig-none")).await;
        assert!(matches!(result, Err(EngineError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_invalidate_never_deletes() {
        let cache = MappingCache::new(test_pool().await);
        let signature = sig("sig-3");
        cache
            .upsert(&signature, &mapped_result(Uuid::new_v4(), 80))
            .await
            .unwrap();

        cache.invalidate(&signature, "absent from feed").await.unwrap();
        let row = cache.find(&signature).await.unwrap().unwrap();
        assert!(!row.is_active);
        assert_eq!(row.invalidation_reason.as_deref(), Some("absent from feed"));

        // Re-upsert reactivates the same row
        cache
            .upsert(&signature, &mapped_result(Uuid::new_v4(), 75))
            .await
            .unwrap();
        let row = cache.find(&signature).await.unwrap().unwrap();
        assert!(row.is_active);
        assert!(row.invalidation_reason.is_none());
    }

    #[tokio::test]
    async fn test_upsert_rejects_failed_result() {
        let cache = MappingCache::new(test_pool().await);
        let failed = MappingResult::failed(Vec::new(), Vec::new(), Vec::new());
        let result = cache.upsert(&sig("sig-4"), &failed).await;
        assert!(matches!(result, Err(EngineError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_active_signatures_excludes_invalidated() {
        let cache = MappingCache::new(test_pool().await);
        cache
            .upsert(&sig("sig-a"), &mapped_result(Uuid::new_v4(), 80))
            .await
            .unwrap();
        cache
            .upsert(&sig("sig-b"), &mapped_result(Uuid::new_v4(), 80))
            .await
            .unwrap();
        cache.invalidate(&sig("sig-b"), "stale").await.unwrap();

        let active = cache.active_signatures().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].0, "sig-a");
    }
}
