//! Error types for vectorkb.
//!
//! One enum covers the whole knowledge-base taxonomy (input, model, dimension,
//! backend, timeout) plus the ambient configuration and I/O failures.
//! Backend-specific errors (HTTP, SQLite) are converted into these variants
//! where they occur; callers never see raw library error types.

use thiserror::Error;

/// Unified error type for vectorkb.
///
/// All fallible functions return `Result<T, AppError>`.
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed request: bad JSON, missing or invalid field.
    #[error("Invalid input: {0}")]
    Input(String),

    /// The embedding backend failed to initialize or respond.
    #[error("Embedding model unavailable: {0}")]
    ModelUnavailable(String),

    /// A vector's length disagrees with the namespace's established dimension.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Vector store failure: network error, non-2xx response, local storage error.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Operation exceeded the caller-supplied deadline.
    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AppError {
    /// Stable snake_case name of the error kind, used in JSON error responses.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Input(_) => "input_error",
            AppError::ModelUnavailable(_) => "model_unavailable",
            AppError::DimensionMismatch { .. } => "dimension_mismatch",
            AppError::BackendUnavailable(_) => "backend_unavailable",
            AppError::Timeout(_) => "timeout",
            AppError::Config(_) => "config_error",
            AppError::Io(_) => "io_error",
            AppError::Serialization(_) => "serialization_error",
        }
    }

    /// Whether the caller may retry the same request after a backoff.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            AppError::ModelUnavailable(_) | AppError::BackendUnavailable(_) | AppError::Timeout(_)
        )
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_kind_names() {
        assert_eq!(AppError::Input("x".into()).kind(), "input_error");
        assert_eq!(
            AppError::DimensionMismatch {
                expected: 384,
                actual: 768
            }
            .kind(),
            "dimension_mismatch"
        );
        assert_eq!(AppError::Timeout(Duration::from_secs(1)).kind(), "timeout");
    }

    #[test]
    fn test_retry_policy() {
        assert!(AppError::BackendUnavailable("down".into()).is_retriable());
        assert!(AppError::ModelUnavailable("loading".into()).is_retriable());
        assert!(AppError::Timeout(Duration::from_secs(5)).is_retriable());
        assert!(!AppError::Input("bad".into()).is_retriable());
        assert!(!AppError::DimensionMismatch {
            expected: 3,
            actual: 4
        }
        .is_retriable());
    }

    #[test]
    fn test_dimension_mismatch_message() {
        let err = AppError::DimensionMismatch {
            expected: 384,
            actual: 768,
        };
        assert_eq!(err.to_string(), "Dimension mismatch: expected 384, got 768");
    }
}
