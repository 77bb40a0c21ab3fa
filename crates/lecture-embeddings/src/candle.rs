//! In-process sentence embeddings through Candle.
//!
//! A BERT-family encoder runs on the CPU; token states are mean-pooled over
//! the attention mask and normalized. The vector size comes from the model's
//! `hidden_size` (384 for all-MiniLM-L6-v2).

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use serde::Deserialize;
use tokenizers::{Encoding, Tokenizer};
use tracing::{debug, info};

use crate::cache::{ModelCache, ModelPaths};
use crate::error::EmbeddingError;
use crate::model::{Embedding, EmbeddingModel, ModelInfo};

/// Longest token sequence fed to the encoder; slide text beyond it is cut.
pub const MAX_TOKENS: usize = 256;

/// The parts of `config.json` needed besides the BERT config itself.
#[derive(Debug, Deserialize)]
struct ModelShape {
    hidden_size: usize,
    #[serde(default = "default_positions")]
    max_position_embeddings: usize,
}

fn default_positions() -> usize {
    512
}

pub struct CandleEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    info: ModelInfo,
}

impl CandleEmbedder {
    /// Load a model from the cache, fetching its files if needed.
    pub fn load(cache: &ModelCache) -> Result<Self, EmbeddingError> {
        let paths = cache.ensure()?;
        Self::from_files(cache.model_name(), &paths)
    }

    pub fn from_files(name: &str, paths: &ModelPaths) -> Result<Self, EmbeddingError> {
        let device = Device::Cpu;

        let raw_config = std::fs::read_to_string(&paths.config)?;
        let config: BertConfig = serde_json::from_str(&raw_config)
            .map_err(|e| EmbeddingError::ModelNotFound(format!("invalid {}: {e}", paths.config.display())))?;
        let shape: ModelShape = serde_json::from_str(&raw_config)
            .map_err(|e| EmbeddingError::ModelNotFound(format!("invalid {}: {e}", paths.config.display())))?;

        let tokenizer = Tokenizer::from_file(&paths.tokenizer)
            .map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;

        // SAFETY: the weights file lives in the model cache and is not
        // rewritten while mapped.
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(std::slice::from_ref(&paths.weights), DType::F32, &device)?
        };
        let model = BertModel::load(vb, &config)?;

        let info = ModelInfo {
            name: name.to_string(),
            dimension: shape.hidden_size,
            max_sequence_length: shape.max_position_embeddings.min(MAX_TOKENS),
        };
        info!(model = name, dimension = info.dimension, "Loaded embedding model");

        Ok(Self {
            model,
            tokenizer,
            device,
            info,
        })
    }
}

impl EmbeddingModel for CandleEmbedder {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| EmbeddingError::Tokenizer(e.to_string()))?;
        let batch = TokenBatch::pad(&encodings, self.info.max_sequence_length);
        debug!(texts = texts.len(), tokens = batch.width, "Encoding batch");

        let shape = (batch.rows, batch.width);
        let input_ids = Tensor::from_vec(batch.ids, shape, &self.device)?;
        let attention_mask = Tensor::from_vec(batch.mask, shape, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;

        let hidden = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let pooled: Vec<Vec<f32>> = mean_pool(&hidden, &attention_mask)?.to_vec2()?;

        Ok(pooled.into_iter().map(Embedding::new).collect())
    }
}

/// Token IDs and attention mask for a batch, right-padded to one width.
#[derive(Debug, PartialEq, Eq)]
struct TokenBatch {
    ids: Vec<u32>,
    mask: Vec<u32>,
    rows: usize,
    width: usize,
}

impl TokenBatch {
    fn pad(encodings: &[Encoding], max_tokens: usize) -> Self {
        let rows: Vec<(&[u32], &[u32])> = encodings
            .iter()
            .map(|e| (e.get_ids(), e.get_attention_mask()))
            .collect();
        Self::from_rows(&rows, max_tokens)
    }

    fn from_rows(rows: &[(&[u32], &[u32])], max_tokens: usize) -> Self {
        let width = rows
            .iter()
            .map(|(ids, _)| ids.len())
            .max()
            .unwrap_or(0)
            .min(max_tokens);

        let mut ids = Vec::with_capacity(rows.len() * width);
        let mut mask = Vec::with_capacity(rows.len() * width);
        for (row_ids, row_mask) in rows {
            let len = row_ids.len().min(width);
            ids.extend_from_slice(&row_ids[..len]);
            mask.extend_from_slice(&row_mask[..len]);
            ids.resize(ids.len() + width - len, 0);
            mask.resize(mask.len() + width - len, 0);
        }

        Self {
            ids,
            mask,
            rows: rows.len(),
            width,
        }
    }
}

/// Average token states over real (unmasked) tokens.
fn mean_pool(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor, EmbeddingError> {
    let mask = attention_mask
        .unsqueeze(2)?
        .broadcast_as(hidden.shape())?
        .to_dtype(DType::F32)?;
    let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
    let counts = mask.sum(1)?.clamp(1e-9, f64::MAX)?;
    Ok(summed.broadcast_div(&counts)?)
}
