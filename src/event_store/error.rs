//! Event Store Errors

use uuid::Uuid;

use crate::domain::DomainError;

#[derive(Debug, thiserror::Error)]
pub enum EventStoreError {
    /// Optimistic concurrency conflict — caller retries with a fresh sequence.
    #[error("concurrency conflict for {aggregate_type}/{aggregate_id}: expected next sequence {expected}, found {actual}")]
    ConcurrencyConflict {
        aggregate_type: String,
        aggregate_id: Uuid,
        expected: i64,
        actual: i64,
    },

    #[error("validation error: {0}")]
    Validation(#[from] DomainError),

    #[error("approval {0} not found")]
    ApprovalNotFound(Uuid),

    #[error("approval {0} already resolved")]
    ApprovalAlreadyResolved(Uuid),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("maximum retries exceeded for atomic append")]
    MaxRetriesExceeded,
}

impl EventStoreError {
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, EventStoreError::ConcurrencyConflict { .. })
    }

    /// `transient_error` per the error-handling design: storage unavailable,
    /// surfaced to the caller with 503 and retried with backoff above.
    pub fn is_transient(&self) -> bool {
        matches!(self, EventStoreError::Database(_))
    }

    pub fn is_retryable(&self) -> bool {
        self.is_concurrency_conflict() || self.is_transient()
    }
}
