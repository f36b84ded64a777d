//! Error types for EvidenceForge services
//!
//! Provides a comprehensive error handling system with:
//! - Distinct error types for different failure modes
//! - HTTP status code mapping
//! - Structured error responses
//! - Error codes for client handling
//!
//! "Insufficient evidence" is deliberately absent here: it is a regular
//! outcome of the sufficiency gate, not a failure.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    MissingField,
    InvalidFormat,

    // Resource errors (4xxx)
    ContextNotFound,

    // Rate limiting (6xxx)
    RateLimited,

    // External service errors (8xxx)
    SearchBackendError,
    SearchTimeout,
    LanguageModelError,
    LanguageModelRateLimited,
    LanguageModelTimeout,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            // Validation (1xxx)
            ErrorCode::ValidationError => 1001,
            ErrorCode::MissingField => 1002,
            ErrorCode::InvalidFormat => 1003,

            // Resources (4xxx)
            ErrorCode::ContextNotFound => 4006,

            // Rate limits (6xxx)
            ErrorCode::RateLimited => 6001,

            // External (8xxx)
            ErrorCode::SearchBackendError => 8010,
            ErrorCode::SearchTimeout => 8011,
            ErrorCode::LanguageModelError => 8020,
            ErrorCode::LanguageModelRateLimited => 8021,
            ErrorCode::LanguageModelTimeout => 8022,

            // Internal (9xxx)
            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Required field missing: {field}")]
    MissingField { field: String },

    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    // Resource errors
    #[error("Request context not found or expired: {id}")]
    ContextNotFound { id: String },

    // Rate limiting
    #[error("Rate limit exceeded: {limit} requests per second")]
    RateLimited { limit: u32 },

    // External service errors
    #[error("Search backend error: {message}")]
    SearchBackend { message: String },

    #[error("Search backend timeout after {timeout_ms}ms")]
    SearchTimeout { timeout_ms: u64 },

    #[error("Language model error: {message}")]
    LanguageModel { message: String },

    #[error("Language model rate limited: {message}")]
    LanguageModelRateLimited { message: String },

    #[error("Language model timeout after {timeout_ms}ms")]
    LanguageModelTimeout { timeout_ms: u64 },

    // Internal errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::MissingField { .. } => ErrorCode::MissingField,
            AppError::InvalidFormat { .. } => ErrorCode::InvalidFormat,
            AppError::ContextNotFound { .. } => ErrorCode::ContextNotFound,
            AppError::RateLimited { .. } => ErrorCode::RateLimited,
            AppError::SearchBackend { .. } => ErrorCode::SearchBackendError,
            AppError::SearchTimeout { .. } => ErrorCode::SearchTimeout,
            AppError::LanguageModel { .. } => ErrorCode::LanguageModelError,
            AppError::LanguageModelRateLimited { .. } => ErrorCode::LanguageModelRateLimited,
            AppError::LanguageModelTimeout { .. } => ErrorCode::LanguageModelTimeout,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. }
            | AppError::MissingField { .. }
            | AppError::InvalidFormat { .. } => StatusCode::BAD_REQUEST,

            // 404 Not Found
            AppError::ContextNotFound { .. } => StatusCode::NOT_FOUND,

            // 429 Too Many Requests
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,

            // 500 Internal Server Error
            AppError::Internal { .. }
            | AppError::Configuration { .. }
            | AppError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,

            // 502 Bad Gateway
            AppError::SearchBackend { .. }
            | AppError::LanguageModel { .. }
            | AppError::LanguageModelRateLimited { .. } => StatusCode::BAD_GATEWAY,

            // 504 Gateway Timeout
            AppError::SearchTimeout { .. } | AppError::LanguageModelTimeout { .. } => {
                StatusCode::GATEWAY_TIMEOUT
            }
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Whether a single retry after backoff is worthwhile
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, AppError::LanguageModelRateLimited { .. })
    }
}

/// Structured error response for API. The request id travels in the
/// `x-request-id` response header.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: ErrorCode,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        // Log based on severity
        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let body = ErrorResponse {
            success: false,
            error: message,
            code,
        };

        (status, Json(body)).into_response()
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::ContextNotFound { id: "test".into() };
        assert_eq!(err.code(), ErrorCode::ContextNotFound);
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.code().as_code(), 4006);
    }

    #[test]
    fn test_validation_error() {
        let err = AppError::Validation {
            message: "Query must not be empty".into(),
            field: Some("query".into()),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(!err.is_server_error());
        assert!(err.is_client_error());
    }

    #[test]
    fn test_upstream_errors() {
        let err = AppError::SearchTimeout { timeout_ms: 10_000 };
        assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert!(err.is_server_error());

        let err = AppError::SearchBackend { message: "connection refused".into() };
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert!(!err.is_rate_limit());

        let err = AppError::LanguageModelRateLimited { message: "429".into() };
        assert!(err.is_rate_limit());
    }

    #[test]
    fn test_error_body_shape() {
        let body = ErrorResponse {
            success: false,
            error: "Request context not found or expired: abc".into(),
            code: ErrorCode::ContextNotFound,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["code"], "CONTEXT_NOT_FOUND");
        assert_eq!(json.as_object().unwrap().len(), 3);
    }

    #[test]
    fn test_server_error() {
        let err = AppError::Internal {
            message: "Something went wrong".into(),
        };
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.is_server_error());
    }
}
