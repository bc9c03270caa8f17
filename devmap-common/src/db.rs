//! Shared database helpers
//!
//! The engine owns its table migrations; this module only provides pool
//! construction so every binary opens sqlite the same way.

use crate::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;

/// Open (or create) the sqlite database at `db_path` and return a pool
///
/// Uses `mode=rwc` so a missing database file is created on first run.
pub async fn open_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect(&db_url)
        .await?;

    Ok(pool)
}

/// Open an in-memory database pool (test fixtures)
pub async fn open_memory_pool() -> Result<SqlitePool> {
    let pool = SqlitePool::connect(":memory:").await?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_pool_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("sub").join("devmap.db");
        let pool = open_pool(&db_path).await.unwrap();
        sqlx::query("CREATE TABLE t (id INTEGER)")
            .execute(&pool)
            .await
            .unwrap();
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_open_memory_pool() {
        let pool = open_memory_pool().await.unwrap();
        let one: i64 = sqlx::query_scalar("SELECT 1").fetch_one(&pool).await.unwrap();
        assert_eq!(one, 1);
    }
}
