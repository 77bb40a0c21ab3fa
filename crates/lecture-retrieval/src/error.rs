//! Retrieval error types.

use thiserror::Error;

/// Errors surfaced by the retrieval engine.
///
/// Gateway failures never appear here; they are turned into fallback
/// answers inside the engine.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Topic (or other entity) does not exist in the module
    #[error("Not found: {0}")]
    NotFound(String),

    /// Empty question or out-of-range top_k
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Chunk store failure
    #[error("Storage error: {0}")]
    Storage(#[from] lecture_storage::StorageError),
}
