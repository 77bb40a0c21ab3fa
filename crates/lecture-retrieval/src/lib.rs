//! # lecture-retrieval
//!
//! Temporal-aware question answering over a module's lecture chunks.
//!
//! A question is embedded, the module's chunks are ranked by cosine
//! similarity (optionally restricted to weeks up to the student's current
//! week) and the top matches are handed to the generation gateway as a
//! cited context block. The same engine produces cross-lecture summaries
//! of detected topics.
//!
//! Gateway failures never escape: each has a fixed fallback answer.

pub mod engine;
pub mod error;
pub mod prompts;
pub mod types;

pub use engine::RetrievalEngine;
pub use error::RetrievalError;
pub use types::{QueryAnswer, QueryRequest, SourceCitation, SummarySource, TopicSummary};
