use std::time::Duration;

use thiserror::Error;

use crate::types::DocumentId;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid vector: {0}")]
    InvalidVector(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Index is empty: no document has been committed")]
    IndexEmpty,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Query timed out after {0:?}")]
    Timeout(Duration),

    #[error("Document {0} has no text to index")]
    EmptyDocument(DocumentId),

    #[error("Operation failed: {0}")]
    Operation(String),
}

impl Error {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    pub fn provider(err: impl std::fmt::Display) -> Self {
        Self::Provider(err.to_string())
    }

    pub fn operation(err: impl std::fmt::Display) -> Self {
        Self::Operation(err.to_string())
    }

    /// Errors the caller can fix by changing its input; these are never retried.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfiguration(_)
                | Self::DimensionMismatch { .. }
                | Self::InvalidVector(_)
                | Self::EmptyDocument(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
