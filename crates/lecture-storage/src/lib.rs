//! Chunk store for the lecture assistant.
//!
//! Provides RocksDB-backed storage with:
//! - Column family isolation for lectures, chunks, topics and appearances
//! - Module-prefixed keys so every module is one contiguous range
//! - Exact similarity ranking over a module's embedded chunks
//! - Atomic topic replacement and cascading deletes via WriteBatch

pub mod column_families;
pub mod db;
pub mod error;
pub mod keys;

pub use db::{Storage, StorageStats};
pub use error::StorageError;
pub use keys::{AppearanceKey, ChunkKey, LectureKey, TopicKey};
