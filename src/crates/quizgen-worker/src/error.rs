//! Error types for quiz generation and worker callbacks.

use thiserror::Error;

/// Result type for worker operations.
pub type Result<T> = std::result::Result<T, WorkerError>;

/// Errors that can occur while generating a quiz or reporting it back.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Failed to serialize/deserialize data.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Model API rejected the key.
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    /// Rate limit exceeded.
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Model returned something that is not a quiz.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// General model provider error.
    #[error("Provider error: {0}")]
    ProviderError(String),

    /// The callback endpoint refused the result.
    #[error("Callback rejected with status {status}: {message}")]
    CallbackRejected { status: u16, message: String },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl WorkerError {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::HttpError(_) | WorkerError::RateLimitExceeded(_) => true,
            WorkerError::CallbackRejected { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for WorkerError {
    fn from(err: serde_json::Error) -> Self {
        WorkerError::SerializationError(err.to_string())
    }
}
