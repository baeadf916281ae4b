//! Backend-agnostic storage errors.

use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by record stores regardless of the underlying backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached or answered with an error.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// What failed.
        message: String,
        /// Underlying backend error.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// No record with this identifier.
    #[error("record `{id}` not found")]
    NotFound {
        /// Missing record identifier.
        id: String,
    },
    /// The write clashed with existing data, such as a taken invite code.
    #[error("storage conflict: {message}")]
    Conflict {
        /// What clashed.
        message: String,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// Construct a not-found error for `id`.
    pub fn not_found(id: impl Into<String>) -> Self {
        StorageError::NotFound { id: id.into() }
    }

    /// Whether the record was missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}
