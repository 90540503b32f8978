//! Error types for HybridRAG services
//!
//! Provides a comprehensive error handling system with:
//! - Distinct error types for each failure mode of the answer workflow
//! - HTTP status code mapping
//! - Structured error responses
//! - Error codes for client handling

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
    InvalidFormat,

    // Resource errors (4xxx)
    NotFound,
    TenantNotFound,

    // Conflict errors (5xxx)
    Conflict,

    // Database errors (7xxx)
    DatabaseError,
    ConnectionError,

    // Workflow / external service errors (8xxx)
    UpstreamError,
    RetrievalFailure,
    ExtractionFailure,
    GradingFailure,
    GenerationFailure,
    SummarizationFailure,
    LanguageModelError,
    EmbeddingError,
    Timeout,

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
            ErrorCode::InvalidFormat => 1003,

            // Resources (4xxx)
            ErrorCode::NotFound => 4001,
            ErrorCode::TenantNotFound => 4002,

            // Conflicts (5xxx)
            ErrorCode::Conflict => 5001,

            // Database (7xxx)
            ErrorCode::DatabaseError => 7001,
            ErrorCode::ConnectionError => 7002,

            // Workflow / external (8xxx)
            ErrorCode::UpstreamError => 8001,
            ErrorCode::RetrievalFailure => 8002,
            ErrorCode::ExtractionFailure => 8003,
            ErrorCode::GradingFailure => 8004,
            ErrorCode::GenerationFailure => 8005,
            ErrorCode::SummarizationFailure => 8006,
            ErrorCode::LanguageModelError => 8007,
            ErrorCode::EmbeddingError => 8008,
            ErrorCode::Timeout => 8009,

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

    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    // Resource errors
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound { resource_type: String, id: String },

    #[error("No active tenant found: {name}")]
    TenantNotFound { name: String },

    // Conflict errors
    #[error("Duplicate resource: {message}")]
    Duplicate { message: String },

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    // Workflow failures
    /// Graph or vector store unreachable. Aborts the request.
    #[error("Retrieval failed ({store}): {message}")]
    Retrieval { store: String, message: String },

    /// Entity extraction or question reformation produced nothing usable.
    #[error("Extraction failed: {message}")]
    Extraction { message: String },

    /// A grader reply did not resolve to a binary verdict.
    #[error("Grading failed ({grader}): {message}")]
    Grading { grader: String, message: String },

    #[error("Generation failed: {message}")]
    Generation { message: String },

    /// Running summary could not be refreshed; the previous one is kept.
    #[error("Summarization failed: {message}")]
    Summarization { message: String },

    // External service errors
    #[error("Language model error ({provider}): {message}")]
    LanguageModel { provider: String, message: String },

    #[error("Embedding service error: {message}")]
    EmbeddingError { message: String },

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::InvalidFormat { .. } => ErrorCode::InvalidFormat,
            AppError::NotFound { .. } => ErrorCode::NotFound,
            AppError::TenantNotFound { .. } => ErrorCode::TenantNotFound,
            AppError::Duplicate { .. } => ErrorCode::Conflict,
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::DatabaseConnection { .. } => ErrorCode::ConnectionError,
            AppError::Retrieval { .. } => ErrorCode::RetrievalFailure,
            AppError::Extraction { .. } => ErrorCode::ExtractionFailure,
            AppError::Grading { .. } => ErrorCode::GradingFailure,
            AppError::Generation { .. } => ErrorCode::GenerationFailure,
            AppError::Summarization { .. } => ErrorCode::SummarizationFailure,
            AppError::LanguageModel { .. } => ErrorCode::LanguageModelError,
            AppError::EmbeddingError { .. } => ErrorCode::EmbeddingError,
            AppError::Timeout { .. } => ErrorCode::Timeout,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. } | AppError::InvalidFormat { .. } => {
                StatusCode::BAD_REQUEST
            }

            // 404 Not Found
            AppError::NotFound { .. } | AppError::TenantNotFound { .. } => StatusCode::NOT_FOUND,

            // 409 Conflict
            AppError::Duplicate { .. } => StatusCode::CONFLICT,

            // 500 Internal Server Error
            AppError::Database(_)
            | AppError::DatabaseConnection { .. }
            | AppError::Internal { .. }
            | AppError::Configuration { .. }
            | AppError::Serialization(_)
            | AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,

            // 502 Bad Gateway
            AppError::Extraction { .. }
            | AppError::Grading { .. }
            | AppError::Generation { .. }
            | AppError::Summarization { .. }
            | AppError::LanguageModel { .. }
            | AppError::EmbeddingError { .. }
            | AppError::HttpClient(_) => StatusCode::BAD_GATEWAY,

            // 503 Service Unavailable
            AppError::Retrieval { .. } => StatusCode::SERVICE_UNAVAILABLE,

            // 504 Gateway Timeout
            AppError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
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

    /// Shorthand for a store failure
    pub fn retrieval(store: &str, message: impl Into<String>) -> Self {
        AppError::Retrieval {
            store: store.to_string(),
            message: message.into(),
        }
    }

    /// Shorthand for a grader failure
    pub fn grading(grader: &str, message: impl Into<String>) -> Self {
        AppError::Grading {
            grader: grader.to_string(),
            message: message.into(),
        }
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
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
            error: ErrorDetails {
                code,
                message,
                details: None,
                request_id: None, // Should be filled by middleware
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<neo4rs::Error> for AppError {
    fn from(err: neo4rs::Error) -> Self {
        AppError::retrieval("graph", err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::TenantNotFound { name: "acme".into() };
        assert_eq!(err.code(), ErrorCode::TenantNotFound);
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_validation_error() {
        let err = AppError::Validation {
            message: "Message is empty".into(),
            field: Some("message".into()),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(!err.is_server_error());
        assert!(err.is_client_error());
    }

    #[test]
    fn test_workflow_failures_are_server_errors() {
        let grading = AppError::grading("hallucination", "missing 'score' key");
        assert_eq!(grading.code(), ErrorCode::GradingFailure);
        assert_eq!(grading.status_code(), StatusCode::BAD_GATEWAY);
        assert!(grading.is_server_error());

        let retrieval = AppError::retrieval("vector", "connection refused");
        assert_eq!(retrieval.code(), ErrorCode::RetrievalFailure);
        assert_eq!(retrieval.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_error_codes_grouped_by_category() {
        assert_eq!(ErrorCode::GradingFailure.as_code() / 1000, 8);
        assert_eq!(ErrorCode::TenantNotFound.as_code() / 1000, 4);
    }

    #[test]
    fn test_error_message_names_component() {
        let err = AppError::grading("relevance", "reply was not JSON");
        assert_eq!(err.to_string(), "Grading failed (relevance): reply was not JSON");
    }
}
