//! Error handling module
//!
//! Centralized HTTP-boundary error type. Every internal error kind maps to
//! exactly one status code and a stable `error_code` string; see §7.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::agents::AgentError;
use crate::bus::BusError;
use crate::domain::DomainError;
use crate::event_store::EventStoreError;
use crate::sop::SopRegistryError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    EventStore(#[from] EventStoreError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    SopRegistry(#[from] SopRegistryError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = match &self {
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()))
            }
            AppError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, "unauthorized", Some(msg.clone()))
            }
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", Some(msg.clone())),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::RateLimitExceeded => {
                (StatusCode::TOO_MANY_REQUESTS, "rate_limit_exceeded", None)
            }

            AppError::Domain(e) => match e {
                DomainError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "validation_error", Some(msg.clone()))
                }
                DomainError::VersionConflict { .. } => {
                    (StatusCode::CONFLICT, "version_conflict", Some(e.to_string()))
                }
                DomainError::Transient(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "transient_error", Some(e.to_string()))
                }
                DomainError::Authorization { .. } => {
                    (StatusCode::FORBIDDEN, "authorization_error", Some(e.to_string()))
                }
                DomainError::HandlerFailure { .. } => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "handler_failure", None)
                }
                DomainError::AlreadyResolved { .. } => {
                    (StatusCode::CONFLICT, "already_resolved", Some(e.to_string()))
                }
                DomainError::NotFound(msg) => {
                    (StatusCode::NOT_FOUND, "not_found", Some(msg.clone()))
                }
            },

            AppError::EventStore(e) => match e {
                EventStoreError::ConcurrencyConflict { .. } => {
                    (StatusCode::CONFLICT, "concurrency_conflict", Some(e.to_string()))
                }
                EventStoreError::Validation(_) => {
                    (StatusCode::BAD_REQUEST, "validation_error", Some(e.to_string()))
                }
                EventStoreError::ApprovalNotFound(_) => {
                    (StatusCode::NOT_FOUND, "approval_not_found", Some(e.to_string()))
                }
                EventStoreError::ApprovalAlreadyResolved(_) => {
                    (StatusCode::CONFLICT, "approval_already_resolved", Some(e.to_string()))
                }
                EventStoreError::Database(err) => {
                    tracing::error!(error = %err, "database error");
                    (StatusCode::SERVICE_UNAVAILABLE, "transient_error", None)
                }
                EventStoreError::Serialization(_) => {
                    (StatusCode::BAD_REQUEST, "serialization_error", Some(e.to_string()))
                }
                EventStoreError::MaxRetriesExceeded => {
                    (StatusCode::SERVICE_UNAVAILABLE, "transient_error", Some(e.to_string()))
                }
            },

            AppError::Bus(e) => {
                tracing::error!(error = %e, "bus error");
                (StatusCode::INTERNAL_SERVER_ERROR, "bus_error", None)
            }
            AppError::Agent(e) => match e {
                AgentError::OutOfMandate { .. } => {
                    (StatusCode::FORBIDDEN, "out_of_mandate", Some(e.to_string()))
                }
                AgentError::Store(_) => {
                    tracing::error!(error = %e, "agent store error");
                    (StatusCode::INTERNAL_SERVER_ERROR, "agent_store_error", None)
                }
                AgentError::Failure(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "agent_failure", Some(e.to_string()))
                }
            },
            AppError::SopRegistry(e) => {
                tracing::error!(error = %e, "sop registry error");
                (StatusCode::INTERNAL_SERVER_ERROR, "sop_registry_error", None)
            }

            AppError::Database(e) => {
                tracing::error!(error = %e, "database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(msg) => {
                tracing::error!(%msg, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
            AppError::Config(e) => {
                tracing::error!(error = %e, "config error");
                (StatusCode::INTERNAL_SERVER_ERROR, "config_error", None)
            }
        };

        let body = ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}
