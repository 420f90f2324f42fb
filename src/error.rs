//! Error types for todokv
//!
//! Provides a unified error type for the storage engine, the Todo
//! repository and the HTTP layer. The dispatcher is the only place that
//! turns a variant into a status code.

use thiserror::Error;

/// Result type alias using TodoKvError
pub type Result<T> = std::result::Result<T, TodoKvError>;

/// Unified error type for todokv operations
#[derive(Debug, Error)]
pub enum TodoKvError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Log Errors
    // -------------------------------------------------------------------------
    #[error("Log corruption detected: {0}")]
    Corruption(String),

    #[error("Storage file is locked by another handle")]
    Locked,

    // -------------------------------------------------------------------------
    // Engine Errors
    // -------------------------------------------------------------------------
    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    #[error("Invalid bucket name: {0:?}")]
    InvalidBucketName(String),

    #[error("Sequence exhausted for bucket {0}")]
    SequenceExhausted(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Repository Errors
    // -------------------------------------------------------------------------
    #[error("Todo not found: {0}")]
    NotFound(u64),

    #[error("Validation error: {0}")]
    Validation(String),

    // -------------------------------------------------------------------------
    // Protocol Errors
    // -------------------------------------------------------------------------
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Request body too large (max {max} bytes)")]
    BodyTooLarge { max: usize },

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl TodoKvError {
    /// True for failures caused by the request rather than the service
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            TodoKvError::Validation(_)
                | TodoKvError::NotFound(_)
                | TodoKvError::Protocol(_)
                | TodoKvError::BodyTooLarge { .. }
        )
    }
}

impl From<serde_json::Error> for TodoKvError {
    fn from(e: serde_json::Error) -> Self {
        TodoKvError::Serialization(e.to_string())
    }
}

impl From<bincode::Error> for TodoKvError {
    fn from(e: bincode::Error) -> Self {
        TodoKvError::Serialization(e.to_string())
    }
}
