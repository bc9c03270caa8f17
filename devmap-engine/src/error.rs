//! Engine error types
//!
//! Failure taxonomy per the error-handling contract: extraction issues are
//! data, not errors; per-record resolution failures are values on
//! `MappingResult`; this enum covers operational failures at collaborator and
//! store boundaries. Batch runs catch at the loop boundary only, so one bad
//! record never aborts a run.

use thiserror::Error;

/// Result type for engine operations
pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Concurrent cache upsert race; retried once, then surfaced as a
    /// transient per-record failure
    #[error("Cache persistence conflict: {0}")]
    CacheConflict(String),

    /// Catalog or knowledge base unreachable after all strategies were tried
    #[error("Collaborator unavailable: {0}")]
    CollaboratorUnavailable(String),

    /// Database operation error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Invalid caller input (bad feedback value, unknown entry id)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Requested entity not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Shared error from devmap-common
    #[error(transparent)]
    Common(#[from] devmap_common::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
