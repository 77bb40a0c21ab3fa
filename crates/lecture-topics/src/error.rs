//! Topic error types.

use thiserror::Error;

/// Errors that can occur during topic operations.
#[derive(Debug, Error)]
pub enum TopicsError {
    /// Module, lecture or topic does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Too few embedded chunks to cluster
    #[error("Not enough chunks for clustering. Found {found}, need at least {required}")]
    InsufficientData { found: usize, required: usize },

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] lecture_storage::StorageError),

    /// Clustering error
    #[error("Clustering error: {0}")]
    Clustering(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
