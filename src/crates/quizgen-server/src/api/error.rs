//! API errors and their JSON responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use quizgen_core::GraphError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::DatabaseError;

/// Body of every error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// Variant name, e.g. `Forbidden`
    pub error: String,
    pub message: String,
    /// Stable code clients can match on
    pub code: String,
}

impl ApiErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            code: code.into(),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed request body or parameters
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Well-formed request that violates a rule
    #[error("Validation failed: {0}")]
    ValidationError(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Details are logged, never returned
    #[error("Internal server error")]
    InternalError(String),

    #[error("Database error")]
    DatabaseError(#[from] DatabaseError),
}

impl ApiError {
    /// Status, machine-readable code and type name
    fn parts(&self) -> (StatusCode, &'static str, &'static str) {
        match self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", "NotFound"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", "BadRequest"),
            ApiError::ValidationError(_) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "VALIDATION_ERROR",
                "ValidationError",
            ),
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "Unauthorized"),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN", "Forbidden"),
            ApiError::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "InternalError",
            ),
            ApiError::DatabaseError(err) if err.is_not_found() => {
                (StatusCode::NOT_FOUND, "DB_NOT_FOUND", "DatabaseError")
            }
            ApiError::DatabaseError(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "DB_ERROR", "DatabaseError")
            }
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.parts().0
    }

    pub fn code(&self) -> &'static str {
        self.parts().1
    }

    pub fn error_type(&self) -> &'static str {
        self.parts().2
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, error_type) = self.parts();
        match &self {
            ApiError::InternalError(detail) => tracing::error!(%detail, "internal error"),
            ApiError::DatabaseError(err) => tracing::error!(error = %err, "database error"),
            other => tracing::debug!(error = %other, "request rejected"),
        }
        let body = ApiErrorResponse::new(error_type, self.to_string(), code);
        (status, Json(body)).into_response()
    }
}

impl From<GraphError> for ApiError {
    fn from(err: GraphError) -> Self {
        ApiError::InternalError(err.to_string())
    }
}
