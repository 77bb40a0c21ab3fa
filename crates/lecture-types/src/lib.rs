//! # lecture-types
//!
//! Shared domain types for the lecture assistant.
//!
//! - Lectures and chunks: the retrievable content units and their embeddings
//! - Topics and appearances: the output of topic detection
//! - Settings: layered configuration for every crate in the workspace
//!
//! ## Usage
//!
//! ```rust
//! use lecture_types::{Chunk, Lecture};
//!
//! let lecture = Lecture::new("comp3001", 1, "Introduction", "week1.pdf");
//! let chunk = Chunk::new(&lecture, "Welcome to the module", 1);
//! assert_eq!(chunk.module_code, "COMP3001");
//! ```

pub mod config;
pub mod error;
pub mod lecture;
pub mod similarity;
pub mod topic;

pub use config::{
    ClusteringMethod, EmbeddingProvider, EmbeddingSettings, GenerationProvider,
    GenerationSettings, RetrievalSettings, Settings, StorageSettings, TopicsSettings,
};
pub use error::LectureError;
pub use lecture::{normalize_module_code, Chunk, Lecture, LectureChunk, ScoredChunk};
pub use topic::{AppearanceDetail, Topic, TopicAppearance, TopicWithAppearances};
