//! The embedding gateway seen by the engines.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::error::EmbeddingError;
use crate::model::EmbeddingModel;

/// Text to fixed-dimension vector, single and batched.
#[async_trait]
pub trait EmbeddingGateway: Send + Sync {
    /// Dimension of every vector this gateway returns.
    fn dimension(&self) -> usize;

    /// Embed one text.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed many texts, preserving order. Either every vector is returned
    /// or the call fails.
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Check a backend response against the expected count and dimension.
pub fn check_vectors(
    vectors: &[Vec<f32>],
    expected_count: usize,
    dimension: usize,
) -> Result<(), EmbeddingError> {
    if vectors.len() != expected_count {
        return Err(EmbeddingError::Parse(format!(
            "expected {} embeddings, got {}",
            expected_count,
            vectors.len()
        )));
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
        return Err(EmbeddingError::DimensionMismatch {
            expected: dimension,
            actual: bad.len(),
        });
    }
    if vectors.iter().flatten().any(|v| !v.is_finite()) {
        return Err(EmbeddingError::Parse(
            "embedding contains a non-finite value".to_string(),
        ));
    }
    Ok(())
}

/// Gateway over an in-process [`EmbeddingModel`].
///
/// Inference runs on tokio's blocking pool, `batch_size` texts at a time.
pub struct LocalEmbedder<M: EmbeddingModel> {
    model: Arc<M>,
    batch_size: usize,
}

impl<M: EmbeddingModel + 'static> LocalEmbedder<M> {
    pub fn new(model: Arc<M>, batch_size: usize) -> Self {
        Self {
            model,
            batch_size: batch_size.max(1),
        }
    }
}

#[async_trait]
impl<M: EmbeddingModel + 'static> EmbeddingGateway for LocalEmbedder<M> {
    fn dimension(&self) -> usize {
        self.model.info().dimension
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_many(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Parse("model returned no embedding".to_string()))
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            let model = Arc::clone(&self.model);
            let batch = batch.to_vec();
            let embeddings = tokio::task::spawn_blocking(move || model.embed_texts(&batch))
                .await
                .map_err(|e| EmbeddingError::TaskFailed(e.to_string()))??;
            vectors.extend(embeddings.into_iter().map(|e| e.into_vec()));
        }

        check_vectors(&vectors, texts.len(), self.dimension())?;
        debug!(count = vectors.len(), "Embedded texts locally");
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Embedding, ModelInfo};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Model that records batch sizes and returns one-hot vectors.
    struct CountingModel {
        info: ModelInfo,
        batches: AtomicUsize,
        largest_batch: AtomicUsize,
        wrong_dimension: bool,
    }

    impl CountingModel {
        fn new(wrong_dimension: bool) -> Self {
            Self {
                info: ModelInfo {
                    name: "counting".to_string(),
                    dimension: 4,
                    max_sequence_length: 16,
                },
                batches: AtomicUsize::new(0),
                largest_batch: AtomicUsize::new(0),
                wrong_dimension,
            }
        }
    }

    impl EmbeddingModel for CountingModel {
        fn info(&self) -> &ModelInfo {
            &self.info
        }

        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbeddingError> {
            self.batches.fetch_add(1, Ordering::SeqCst);
            self.largest_batch.fetch_max(texts.len(), Ordering::SeqCst);
            let dim = if self.wrong_dimension { 3 } else { 4 };
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0; dim];
                    v[t.len() % dim] = 1.0;
                    Embedding::new(v)
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn test_embed_many_splits_into_batches() {
        let model = Arc::new(CountingModel::new(false));
        let gateway = LocalEmbedder::new(Arc::clone(&model), 2);

        let texts: Vec<String> = (0..5).map(|i| "x".repeat(i + 1)).collect();
        let vectors = gateway.embed_many(&texts).await.unwrap();

        assert_eq!(vectors.len(), 5);
        assert_eq!(model.batches.load(Ordering::SeqCst), 3);
        assert_eq!(model.largest_batch.load(Ordering::SeqCst), 2);
        // Order is preserved: text of length 1 maps to index 1
        assert_eq!(vectors[0], vec![0.0, 1.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn test_embed_one() {
        let gateway = LocalEmbedder::new(Arc::new(CountingModel::new(false)), 8);
        let vector = gateway.embed_one("abc").await.unwrap();
        assert_eq!(vector.len(), gateway.dimension());
    }

    #[tokio::test]
    async fn test_empty_input() {
        let model = Arc::new(CountingModel::new(false));
        let gateway = LocalEmbedder::new(Arc::clone(&model), 8);
        assert!(gateway.embed_many(&[]).await.unwrap().is_empty());
        assert_eq!(model.batches.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_non_finite_vectors_rejected() {
        let vectors = vec![vec![1.0, 0.0], vec![f32::NAN, 0.0]];
        assert!(matches!(
            check_vectors(&vectors, 2, 2),
            Err(EmbeddingError::Parse(_))
        ));
        assert!(check_vectors(&[vec![0.6, 0.8]], 1, 2).is_ok());
    }

    #[tokio::test]
    async fn test_wrong_dimension_rejected() {
        let gateway = LocalEmbedder::new(Arc::new(CountingModel::new(true)), 8);
        let result = gateway.embed_many(&["a".to_string()]).await;
        assert!(matches!(
            result,
            Err(EmbeddingError::DimensionMismatch { expected: 4, actual: 3 })
        ));
    }
}
