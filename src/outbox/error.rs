//! Repository Errors
//!
//! Error types for aggregate persistence and outbox operations.

use uuid::Uuid;

/// Errors that can occur while saving or loading aggregates
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// Optimistic concurrency conflict
    #[error("Concurrency conflict for {aggregate_type} {aggregate_id}: expected stored version {expected_version}")]
    ConcurrencyConflict {
        aggregate_type: &'static str,
        aggregate_id: Uuid,
        expected_version: i64,
    },

    /// Aggregate not found for this tenant
    #[error("{aggregate_type} not found: {id}")]
    NotFound { aggregate_type: &'static str, id: Uuid },

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored row could not be turned back into an aggregate
    #[error("Corrupt stored data: {0}")]
    Corrupt(String),
}

impl RepositoryError {
    pub fn not_found(aggregate_type: &'static str, id: Uuid) -> Self {
        RepositoryError::NotFound { aggregate_type, id }
    }

    pub fn corrupt(message: impl Into<String>) -> Self {
        RepositoryError::Corrupt(message.into())
    }

    /// Check if this error is a concurrency conflict
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, RepositoryError::ConcurrencyConflict { .. })
    }

    /// Only a conflict is fixed by reloading and trying again
    pub fn is_retryable(&self) -> bool {
        self.is_concurrency_conflict()
    }
}
