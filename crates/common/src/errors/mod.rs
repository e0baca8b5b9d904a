//! Error types for StudyForge services
//!
//! Provides a comprehensive error handling system with:
//! - Distinct error types for different failure modes
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
    MissingField,

    // Authorization errors (3xxx)
    Forbidden,
    MaterialNotAccessible,

    // Resource errors (4xxx)
    NotFound,
    MaterialNotFound,
    ConversationNotFound,

    // Database errors (7xxx)
    DatabaseError,
    ConnectionError,

    // External service errors (8xxx)
    UpstreamError,
    EmbeddingError,
    LlmProviderError,
    LlmJsonParseError,
    LlmSchemaError,
    LlmTruncatedOutput,

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

            // Authz (3xxx)
            ErrorCode::Forbidden => 3001,
            ErrorCode::MaterialNotAccessible => 3002,

            // Resources (4xxx)
            ErrorCode::NotFound => 4001,
            ErrorCode::MaterialNotFound => 4002,
            ErrorCode::ConversationNotFound => 4003,

            // Database (7xxx)
            ErrorCode::DatabaseError => 7001,
            ErrorCode::ConnectionError => 7002,

            // External (8xxx)
            ErrorCode::UpstreamError => 8001,
            ErrorCode::EmbeddingError => 8002,
            ErrorCode::LlmProviderError => 8003,
            ErrorCode::LlmJsonParseError => 8004,
            ErrorCode::LlmSchemaError => 8005,
            ErrorCode::LlmTruncatedOutput => 8006,

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

    // Authorization errors
    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    #[error("Material not accessible: {id}")]
    MaterialNotAccessible { id: String },

    // Resource errors
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound { resource_type: String, id: String },

    #[error("Material not found: {id}")]
    MaterialNotFound { id: String },

    #[error("Conversation not found: {id}")]
    ConversationNotFound { id: String },

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    // External service errors
    #[error("Embedding service error: {message}")]
    EmbeddingError { message: String },

    #[error("LLM provider error: {message}")]
    LlmProvider { message: String },

    #[error("LLM output was not valid JSON: {message}")]
    LlmJsonParse { message: String },

    #[error("LLM output failed schema validation: {message}")]
    LlmSchemaValidation { message: String },

    #[error("LLM output truncated: requested {requested} items, received {received}")]
    LlmTruncated { requested: usize, received: usize },

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
            AppError::MissingField { .. } => ErrorCode::MissingField,
            AppError::Forbidden { .. } => ErrorCode::Forbidden,
            AppError::MaterialNotAccessible { .. } => ErrorCode::MaterialNotAccessible,
            AppError::NotFound { .. } => ErrorCode::NotFound,
            AppError::MaterialNotFound { .. } => ErrorCode::MaterialNotFound,
            AppError::ConversationNotFound { .. } => ErrorCode::ConversationNotFound,
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::DatabaseConnection { .. } => ErrorCode::ConnectionError,
            AppError::EmbeddingError { .. } => ErrorCode::EmbeddingError,
            AppError::LlmProvider { .. } => ErrorCode::LlmProviderError,
            AppError::LlmJsonParse { .. } => ErrorCode::LlmJsonParseError,
            AppError::LlmSchemaValidation { .. } => ErrorCode::LlmSchemaError,
            AppError::LlmTruncated { .. } => ErrorCode::LlmTruncatedOutput,
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
            AppError::Validation { .. } |
            AppError::MissingField { .. } => StatusCode::BAD_REQUEST,

            // 403 Forbidden
            AppError::Forbidden { .. } |
            AppError::MaterialNotAccessible { .. } => StatusCode::FORBIDDEN,

            // 404 Not Found
            AppError::NotFound { .. } |
            AppError::MaterialNotFound { .. } |
            AppError::ConversationNotFound { .. } => StatusCode::NOT_FOUND,

            // 422 Unprocessable Entity: the batched generation under-delivered in a
            // way that indicates a token-limit truncation. Clients should reduce the
            // requested question count rather than retry as-is.
            AppError::LlmTruncated { .. } => StatusCode::UNPROCESSABLE_ENTITY,

            // 500 Internal Server Error
            AppError::Database(_) |
            AppError::DatabaseConnection { .. } |
            AppError::LlmJsonParse { .. } |
            AppError::LlmSchemaValidation { .. } |
            AppError::Internal { .. } |
            AppError::Configuration { .. } |
            AppError::Serialization(_) |
            AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,

            // 502 Bad Gateway
            AppError::EmbeddingError { .. } |
            AppError::LlmProvider { .. } |
            AppError::HttpClient(_) => StatusCode::BAD_GATEWAY,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::MaterialNotFound { id: "test".into() };
        assert_eq!(err.code(), ErrorCode::MaterialNotFound);
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_validation_error() {
        let err = AppError::Validation {
            message: "Empty question".into(),
            field: Some("question".into()),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(!err.is_server_error());
        assert!(err.is_client_error());
    }

    #[test]
    fn test_truncation_is_distinct() {
        let err = AppError::LlmTruncated { requested: 5, received: 2 };
        assert_eq!(err.code(), ErrorCode::LlmTruncatedOutput);
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        // Parse and schema failures map elsewhere so clients can distinguish
        let parse = AppError::LlmJsonParse { message: "bad".into() };
        assert_ne!(parse.code(), err.code());
    }

    #[test]
    fn test_access_error() {
        let err = AppError::MaterialNotAccessible { id: "m1".into() };
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }
}
