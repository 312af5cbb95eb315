//! Error handling module
//!
//! Centralized error types and their mapping onto RPC condition codes.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::bureau::BureauError;
use crate::domain::DomainError;
use crate::outbox::RepositoryError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Missing caller context: {0}")]
    Unauthenticated(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // Domain errors
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Bureau(#[from] BureauError),

    // Server errors (5xx)
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl AppError {
    /// A conflict is resolved by reloading and repeating the use case
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Repository(e) if e.is_retryable())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidArgument(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::InvalidArgument(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::InvalidArgument(rejection.body_text())
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

const INTERNAL_MESSAGE: &str = "internal error";
const CONFLICT_MESSAGE: &str = "concurrent modification, retry the request";

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            // 400 Bad Request
            AppError::InvalidArgument(_) => {
                (StatusCode::BAD_REQUEST, "invalid_argument", self.to_string())
            }

            // 401 Unauthorized
            AppError::Unauthenticated(_) => {
                (StatusCode::UNAUTHORIZED, "unauthenticated", self.to_string())
            }

            // 403 Forbidden
            AppError::PermissionDenied(_) => {
                (StatusCode::FORBIDDEN, "permission_denied", self.to_string())
            }

            // 404 Not Found
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", self.to_string()),

            AppError::Domain(domain_err) if domain_err.is_validation() => {
                (StatusCode::BAD_REQUEST, "invalid_argument", domain_err.to_string())
            }
            AppError::Domain(domain_err) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "failed_precondition",
                domain_err.to_string(),
            ),

            AppError::Repository(RepositoryError::NotFound { .. }) => {
                (StatusCode::NOT_FOUND, "not_found", self.to_string())
            }
            AppError::Repository(RepositoryError::ConcurrencyConflict { .. }) => {
                tracing::warn!("Request aborted: {}", self);
                (StatusCode::CONFLICT, "aborted", CONFLICT_MESSAGE.to_string())
            }

            AppError::Bureau(BureauError::Validation(_)) => {
                (StatusCode::BAD_REQUEST, "invalid_argument", self.to_string())
            }

            // 500 Internal Server Error
            AppError::Repository(e) => {
                tracing::error!("Repository error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal", INTERNAL_MESSAGE.to_string())
            }
            AppError::Bureau(e) => {
                tracing::error!("Credit bureau error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal", INTERNAL_MESSAGE.to_string())
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal", INTERNAL_MESSAGE.to_string())
            }
            AppError::Config(e) => {
                tracing::error!("Config error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal", INTERNAL_MESSAGE.to_string())
            }
        };

        let body = ErrorResponse {
            error: message,
            error_code: error_code.to_string(),
            details: None,
        };

        (status, Json(body)).into_response()
    }
}
