//! Persistence error types

use railbird_core::StoreError;
use thiserror::Error;

/// Result type for persistence operations
pub type Result<T> = std::result::Result<T, PersistenceError>;

/// Persistence layer errors
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<PersistenceError> for StoreError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::Database(e) => StoreError::Backend(e.to_string()),
            PersistenceError::Serialization(e) => StoreError::Serialization(e.to_string()),
            PersistenceError::NotFound(s) => StoreError::NotFound(s),
        }
    }
}
