//! Store error types shared across the workspace

use thiserror::Error;

/// Errors surfaced by storage backends through the store traits.
///
/// Concrete backends map their own error types into these variants so that
/// consumers depend only on the trait seam, never on a database binding.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
