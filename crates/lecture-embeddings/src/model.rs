//! In-process embedding models.
//!
//! [`EmbeddingModel`] is synchronous; [`LocalEmbedder`](crate::LocalEmbedder)
//! adapts it to the async gateway by running it on blocking threads.

use crate::error::EmbeddingError;

/// A unit-length embedding vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    /// Wrap `values`, scaling them to unit length. Zero vectors stay zero.
    pub fn new(mut values: Vec<f32>) -> Self {
        lecture_types::similarity::normalize(&mut values);
        Self { values }
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.values
    }
}

/// Static facts about a loaded model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub name: String,
    pub dimension: usize,
    /// Tokens per text; longer input is truncated
    pub max_sequence_length: usize,
}

pub trait EmbeddingModel: Send + Sync {
    fn info(&self) -> &ModelInfo;

    /// Embed a batch, one vector per text in input order.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbeddingError>;

    fn embed_texts(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        let texts: Vec<&str> = texts.iter().map(String::as_str).collect();
        self.embed_batch(&texts)
    }
}
