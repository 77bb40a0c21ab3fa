//! # lecture-embeddings
//!
//! Embedding gateway for the lecture assistant.
//!
//! Turns text into fixed-dimension vectors, one at a time or in batches.
//! Two backends are available, chosen from configuration at start-up:
//! - Local inference via Candle (all-MiniLM-L6-v2, 384 dimensions)
//! - An OpenAI-compatible `/embeddings` endpoint
//!
//! Batched calls are split internally by the configured batch size and
//! either return every vector or fail as a whole.

pub mod cache;
pub mod candle;
pub mod error;
pub mod gateway;
pub mod mock;
pub mod model;
pub mod openai;

use std::sync::Arc;

use lecture_types::{EmbeddingProvider, EmbeddingSettings};
use secrecy::SecretString;
use tracing::info;

pub use crate::candle::CandleEmbedder;
pub use cache::{ModelCache, ModelPaths, DEFAULT_MODEL_REPO, MODEL_FILES};
pub use error::EmbeddingError;
pub use gateway::{EmbeddingGateway, LocalEmbedder};
pub use mock::MockEmbedder;
pub use model::{Embedding, EmbeddingModel, ModelInfo};
pub use openai::{OpenAiEmbedder, OpenAiEmbedderConfig};

/// Build the configured embedding gateway.
///
/// `dimension` is the store's embedding dimension; a backend producing a
/// different size is rejected here rather than at the first insert.
pub fn build_embedding_gateway(
    settings: &EmbeddingSettings,
    dimension: usize,
) -> Result<Arc<dyn EmbeddingGateway>, EmbeddingError> {
    settings.validate().map_err(EmbeddingError::Config)?;

    let gateway: Arc<dyn EmbeddingGateway> = match settings.provider {
        EmbeddingProvider::Local => {
            let cache = ModelCache::for_repo(&settings.model);
            let model = CandleEmbedder::load(&cache)?;
            Arc::new(LocalEmbedder::new(Arc::new(model), settings.batch_size))
        }
        EmbeddingProvider::OpenAi => {
            let api_key = settings
                .api_key
                .clone()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok())
                .ok_or_else(|| {
                    EmbeddingError::Config(
                        "OpenAI embeddings need embedding.api_key or OPENAI_API_KEY".to_string(),
                    )
                })?;
            let config = OpenAiEmbedderConfig {
                base_url: settings.base_url(),
                model: settings.model.clone(),
                api_key: SecretString::from(api_key),
                dimension,
                batch_size: settings.batch_size,
                timeout: std::time::Duration::from_secs(settings.timeout_secs),
                max_retries: 3,
            };
            Arc::new(OpenAiEmbedder::new(config)?)
        }
    };

    if gateway.dimension() != dimension {
        return Err(EmbeddingError::DimensionMismatch {
            expected: dimension,
            actual: gateway.dimension(),
        });
    }

    info!(
        provider = ?settings.provider,
        model = %settings.model,
        dimension,
        "Embedding gateway ready"
    );
    Ok(gateway)
}
