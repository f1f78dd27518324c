//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure, matching the
//! error kinds of the external interface contract: validation, version
//! conflict, transient failure, authorization, and handler failure.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Envelope malformed — 400 to caller; never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// Concurrent append on the same aggregate stream — caller retries with
    /// a fresh sequence.
    #[error("version conflict for {aggregate_type}/{aggregate_id}: expected {expected}, found {found}")]
    VersionConflict {
        aggregate_type: String,
        aggregate_id: Uuid,
        expected: i64,
        found: i64,
    },

    /// Storage or real-time bridge unavailable.
    #[error("transient error: {0}")]
    Transient(String),

    /// Agent attempted to emit outside its mandate.
    #[error("agent {agent_id} is not authorised to emit {event_type}")]
    Authorization { agent_id: String, event_type: String },

    /// Exception inside a subscriber; isolated, logged, and turned into a
    /// `RISK_DETECTED` event rather than failing publish.
    #[error("handler {subscription_id} failed: {reason}")]
    HandlerFailure {
        subscription_id: Uuid,
        reason: String,
    },

    /// Approval already resolved.
    #[error("approval {approval_id} was already resolved")]
    AlreadyResolved { approval_id: Uuid },

    /// Referenced aggregate/entity not found.
    #[error("not found: {0}")]
    NotFound(String),
}

impl DomainError {
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::Authorization { .. } | Self::AlreadyResolved { .. }
        )
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::VersionConflict { .. } | Self::Transient(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_client_errors() {
        let err = DomainError::Validation("bad confidence".into());
        assert!(err.is_client_error());
        assert!(!err.is_retryable());
    }

    #[test]
    fn version_conflict_is_retryable_not_client() {
        let err = DomainError::VersionConflict {
            aggregate_type: "lead".into(),
            aggregate_id: Uuid::nil(),
            expected: 1,
            found: 2,
        };
        assert!(err.is_retryable());
        assert!(!err.is_client_error());
    }
}
