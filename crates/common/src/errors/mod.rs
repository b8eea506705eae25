//! Error types for the CourseMate pipeline
//!
//! Provides:
//! - Distinct error types for different failure modes
//! - Machine-readable error codes
//! - Transient/permanent classification used by the retry policy

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
    CourseNotFound,

    // Pipeline errors (6xxx)
    MalformedOutput,
    IndexError,
    AgentNotReady,

    // External service errors (8xxx)
    EmbeddingError,
    EmbeddingTimeout,
    GenerationError,
    GenerationExhausted,
    ClassroomError,
    UpstreamError,

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
            ErrorCode::InvalidFormat => 1002,

            // Resources (4xxx)
            ErrorCode::NotFound => 4001,
            ErrorCode::CourseNotFound => 4002,

            // Pipeline (6xxx)
            ErrorCode::MalformedOutput => 6001,
            ErrorCode::IndexError => 6002,
            ErrorCode::AgentNotReady => 6003,

            // External (8xxx)
            ErrorCode::EmbeddingError => 8001,
            ErrorCode::EmbeddingTimeout => 8002,
            ErrorCode::GenerationError => 8003,
            ErrorCode::GenerationExhausted => 8004,
            ErrorCode::ClassroomError => 8005,
            ErrorCode::UpstreamError => 8006,

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
    Validation { message: String },

    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    // Resource errors
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound { resource_type: String, id: String },

    #[error("Course not found: {name}")]
    CourseNotFound { name: String },

    // Pipeline errors
    #[error("Malformed model output: {message}")]
    MalformedOutput { message: String },

    #[error("Vector index error: {message}")]
    Index { message: String },

    #[error("Agent not ready: current state is {state}")]
    NotReady { state: String },

    // External service errors
    #[error("Embedding service error: {message}")]
    Embedding { message: String },

    #[error("Embedding timeout after {timeout_ms}ms")]
    EmbeddingTimeout { timeout_ms: u64 },

    #[error("Generation provider error: {message}")]
    Generation { message: String, transient: bool },

    #[error("Generation retries exhausted after {attempts} attempts: {message}")]
    GenerationExhausted { attempts: u32, message: String },

    #[error("Classroom provider error: {message}")]
    Classroom { message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },

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
            AppError::CourseNotFound { .. } => ErrorCode::CourseNotFound,
            AppError::MalformedOutput { .. } => ErrorCode::MalformedOutput,
            AppError::Index { .. } => ErrorCode::IndexError,
            AppError::NotReady { .. } => ErrorCode::AgentNotReady,
            AppError::Embedding { .. } => ErrorCode::EmbeddingError,
            AppError::EmbeddingTimeout { .. } => ErrorCode::EmbeddingTimeout,
            AppError::Generation { .. } => ErrorCode::GenerationError,
            AppError::GenerationExhausted { .. } => ErrorCode::GenerationExhausted,
            AppError::Classroom { .. } => ErrorCode::ClassroomError,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Whether a retry may succeed for this error
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Generation { transient, .. } => *transient,
            AppError::Embedding { .. } | AppError::EmbeddingTimeout { .. } => true,
            AppError::HttpClient(err) => err.is_timeout() || err.is_connect(),
            _ => false,
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
