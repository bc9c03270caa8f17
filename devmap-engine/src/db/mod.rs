//! Database access for the mapping engine
//!
//! **[DME-DB-010]** Two logical stores: the signature-keyed mapping cache
//! (one active row per signature) and the append-only audit log, plus a
//! per-run report row carrying accumulated metrics and progress.

pub mod audit;
pub mod mappings;

use devmap_common::Result;
use sqlx::SqlitePool;
use std::path::Path;

pub use audit::AuditLog;
pub use mappings::MappingCache;

/// Initialize database connection pool and run migrations
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    let pool = devmap_common::db::open_pool(db_path).await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// Create engine tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS device_mappings (
            signature TEXT PRIMARY KEY,
            capacity_id TEXT NOT NULL,
            confidence INTEGER NOT NULL,
            algorithm TEXT NOT NULL,
            result_json TEXT NOT NULL,
            confirmation_count INTEGER NOT NULL DEFAULT 1,
            first_seen_at TEXT NOT NULL,
            last_confirmed_at TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            needs_review INTEGER NOT NULL DEFAULT 0,
            invalidation_reason TEXT,
            invalidated_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS mapping_audit_log (
            entry_id TEXT PRIMARY KEY,
            run_id TEXT NOT NULL,
            signature TEXT NOT NULL,
            model_name TEXT NOT NULL,
            brand TEXT NOT NULL DEFAULT 'unknown',
            device_family TEXT,
            capacity_id TEXT,
            confidence INTEGER NOT NULL,
            algorithm TEXT NOT NULL,
            needs_review INTEGER NOT NULL DEFAULT 0,
            result_json TEXT NOT NULL,
            duration_ms INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            feedback TEXT,
            feedback_notes TEXT,
            reviewer_id TEXT,
            feedback_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_audit_run_id ON mapping_audit_log (run_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_audit_review ON mapping_audit_log (needs_review, feedback)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS run_reports (
            run_id TEXT PRIMARY KEY,
            checkpoint_offset INTEGER NOT NULL DEFAULT -1,
            metrics_json TEXT NOT NULL,
            started_at TEXT NOT NULL,
            finished_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (device_mappings, mapping_audit_log, run_reports)");

    Ok(())
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    let pool = SqlitePool::connect(":memory:").await.unwrap();
    init_tables(&pool).await.unwrap();
    pool
}
