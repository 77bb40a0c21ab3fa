//! Lecture and chunk types.
//!
//! A lecture is one uploaded document for a module in a given teaching week.
//! Its content is split into chunks (typically one per slide), each of which
//! carries its own embedding once computed.
//!
//! `week_number` is the only temporal ordering key. `uploaded_at` and
//! `created_at` are informational.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Normalize a module code for storage and lookup (trimmed, uppercase).
pub fn normalize_module_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// One uploaded lecture document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lecture {
    /// ULID assigned at creation
    pub lecture_id: String,
    /// Module code, always uppercase
    pub module_code: String,
    /// Teaching week (1-based)
    pub week_number: u32,
    pub title: String,
    pub filename: String,
    /// Page count of the source document, when known
    #[serde(default)]
    pub num_pages: Option<u32>,
    pub uploaded_at: DateTime<Utc>,
}

impl Lecture {
    /// Create a new lecture with a fresh ID.
    pub fn new(
        module_code: &str,
        week_number: u32,
        title: impl Into<String>,
        filename: impl Into<String>,
    ) -> Self {
        Self {
            lecture_id: Ulid::new().to_string(),
            module_code: normalize_module_code(module_code),
            week_number,
            title: title.into(),
            filename: filename.into(),
            num_pages: None,
            uploaded_at: Utc::now(),
        }
    }

    /// Set the page count.
    pub fn with_num_pages(mut self, num_pages: u32) -> Self {
        self.num_pages = Some(num_pages);
        self
    }

    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Smallest retrievable unit of lecture content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// ULID assigned at creation
    pub chunk_id: String,
    /// Owning lecture
    pub lecture_id: String,
    /// Module code of the owning lecture (denormalized for key layout)
    pub module_code: String,
    pub content: String,
    /// 1-based slide or page number
    pub slide_number: u32,
    /// Embedding vector; `None` until computed
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
}

impl Chunk {
    /// Create a chunk belonging to `lecture` without an embedding.
    pub fn new(lecture: &Lecture, content: impl Into<String>, slide_number: u32) -> Self {
        Self {
            chunk_id: Ulid::new().to_string(),
            lecture_id: lecture.lecture_id.clone(),
            module_code: lecture.module_code.clone(),
            content: content.into(),
            slide_number,
            embedding: None,
            created_at: Utc::now(),
        }
    }

    /// Attach an embedding.
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn is_embedded(&self) -> bool {
        self.embedding.is_some()
    }

    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// A chunk joined with the metadata of its lecture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LectureChunk {
    pub chunk: Chunk,
    pub lecture_title: String,
    pub week_number: u32,
}

impl LectureChunk {
    /// Embedding of the underlying chunk, if computed.
    pub fn embedding(&self) -> Option<&[f32]> {
        self.chunk.embedding.as_deref()
    }
}

/// A chunk returned from a similarity query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub item: LectureChunk,
    /// Cosine similarity to the query vector
    pub similarity: f32,
}
