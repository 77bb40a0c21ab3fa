//! Configuration loading for the lecture assistant.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at ~/.config/lecture-assistant/config.toml.

use config::{Config, Environment, File};
use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::LectureError;

const APP_NAME: &str = "lecture-assistant";

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Path to RocksDB storage directory
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Dimension every stored embedding must have
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,
}

fn default_db_path() -> String {
    ProjectDirs::from("", "", APP_NAME)
        .map(|p| p.data_local_dir().join("db"))
        .unwrap_or_else(|| PathBuf::from("./data"))
        .to_string_lossy()
        .to_string()
}

fn default_embedding_dimension() -> usize {
    384
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            embedding_dimension: default_embedding_dimension(),
        }
    }
}

impl StorageSettings {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.db_path.trim().is_empty() {
            return Err("db_path must not be empty".to_string());
        }
        if self.embedding_dimension == 0 {
            return Err("embedding_dimension must be > 0".to_string());
        }
        Ok(())
    }

    /// Expand ~ in db_path to the actual home directory
    pub fn expanded_db_path(&self) -> PathBuf {
        if let Some(rest) = self.db_path.strip_prefix("~/") {
            if let Some(base) = BaseDirs::new() {
                return base.home_dir().join(rest);
            }
        }
        PathBuf::from(&self.db_path)
    }
}

/// Embedding backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local sentence-transformer model run through Candle
    #[default]
    Local,
    /// OpenAI-compatible embeddings endpoint
    OpenAi,
}

/// Embedding gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    #[serde(default)]
    pub provider: EmbeddingProvider,

    /// Model name (HuggingFace repo for local, model id for OpenAI)
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Maximum texts per backend call
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,

    /// API key (loaded from env var, not stored in config file)
    #[serde(default)]
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    #[serde(default)]
    pub api_base_url: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

fn default_embedding_model() -> String {
    "sentence-transformers/all-MiniLM-L6-v2".to_string()
}

fn default_embedding_batch_size() -> usize {
    32
}

fn default_embedding_timeout() -> u64 {
    30
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            model: default_embedding_model(),
            batch_size: default_embedding_batch_size(),
            api_key: None,
            api_base_url: None,
            timeout_secs: default_embedding_timeout(),
        }
    }
}

impl EmbeddingSettings {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.model.trim().is_empty() {
            return Err("embedding model must not be empty".to_string());
        }
        if self.batch_size == 0 {
            return Err("batch_size must be > 0".to_string());
        }
        if self.timeout_secs == 0 {
            return Err("embedding timeout_secs must be > 0".to_string());
        }
        Ok(())
    }

    /// Base URL for the OpenAI provider.
    pub fn base_url(&self) -> String {
        self.api_base_url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
    }
}

/// Text generation backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationProvider {
    #[default]
    Ollama,
    OpenAi,
    Anthropic,
}

impl fmt::Display for GenerationProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationProvider::Ollama => write!(f, "ollama"),
            GenerationProvider::OpenAi => write!(f, "openai"),
            GenerationProvider::Anthropic => write!(f, "anthropic"),
        }
    }
}

/// Generation gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSettings {
    #[serde(default)]
    pub provider: GenerationProvider,

    /// Model name (e.g., "llama2", "gpt-4o-mini", "claude-3-haiku-20240307")
    #[serde(default = "default_generation_model")]
    pub model: String,

    /// API key (loaded from env var, not stored in config file)
    #[serde(default)]
    pub api_key: Option<String>,

    /// API base URL (defaults depend on provider)
    #[serde(default)]
    pub api_base_url: Option<String>,

    /// Upper bound on one generation call, retries included
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,

    /// Retries for transient HTTP failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Token budget for question answers
    #[serde(default = "default_answer_max_tokens")]
    pub answer_max_tokens: u32,

    /// Token budget for topic summaries
    #[serde(default = "default_summary_max_tokens")]
    pub summary_max_tokens: u32,

    /// Token budget for topic labels
    #[serde(default = "default_label_max_tokens")]
    pub label_max_tokens: u32,
}

fn default_generation_model() -> String {
    "llama2".to_string()
}

fn default_generation_timeout() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}

fn default_temperature() -> f32 {
    0.7
}

fn default_answer_max_tokens() -> u32 {
    500
}

fn default_summary_max_tokens() -> u32 {
    800
}

fn default_label_max_tokens() -> u32 {
    150
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            provider: GenerationProvider::default(),
            model: default_generation_model(),
            api_key: None,
            api_base_url: None,
            timeout_secs: default_generation_timeout(),
            max_retries: default_max_retries(),
            temperature: default_temperature(),
            answer_max_tokens: default_answer_max_tokens(),
            summary_max_tokens: default_summary_max_tokens(),
            label_max_tokens: default_label_max_tokens(),
        }
    }
}

impl GenerationSettings {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.model.trim().is_empty() {
            return Err("generation model must not be empty".to_string());
        }
        if self.timeout_secs == 0 {
            return Err("generation timeout_secs must be > 0".to_string());
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(format!(
                "temperature must be 0.0-2.0, got {}",
                self.temperature
            ));
        }
        Ok(())
    }

    /// Base URL, falling back to the provider's public endpoint.
    pub fn base_url(&self) -> String {
        if let Some(url) = &self.api_base_url {
            return url.clone();
        }
        match self.provider {
            GenerationProvider::Ollama => "http://localhost:11434".to_string(),
            GenerationProvider::OpenAi => "https://api.openai.com/v1".to_string(),
            GenerationProvider::Anthropic => "https://api.anthropic.com/v1".to_string(),
        }
    }
}

/// Retrieval engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalSettings {
    /// top_k used when the caller does not supply one
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    /// Largest accepted top_k
    #[serde(default = "default_max_top_k")]
    pub max_top_k: usize,

    /// Characters of chunk content returned per cited source
    #[serde(default = "default_source_preview_chars")]
    pub source_preview_chars: usize,

    /// Chunks fed into a topic summary
    #[serde(default = "default_summary_chunk_limit")]
    pub summary_chunk_limit: usize,
}

fn default_top_k() -> usize {
    5
}

fn default_max_top_k() -> usize {
    20
}

fn default_source_preview_chars() -> usize {
    200
}

fn default_summary_chunk_limit() -> usize {
    20
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            max_top_k: default_max_top_k(),
            source_preview_chars: default_source_preview_chars(),
            summary_chunk_limit: default_summary_chunk_limit(),
        }
    }
}

impl RetrievalSettings {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_top_k == 0 {
            return Err("max_top_k must be > 0".to_string());
        }
        if self.default_top_k == 0 || self.default_top_k > self.max_top_k {
            return Err(format!(
                "default_top_k must be 1-{}, got {}",
                self.max_top_k, self.default_top_k
            ));
        }
        if self.summary_chunk_limit == 0 {
            return Err("summary_chunk_limit must be > 0".to_string());
        }
        Ok(())
    }
}

/// Clustering strategy used by topic detection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusteringMethod {
    /// Density-based clustering; noise points are discarded
    #[default]
    Hdbscan,
    /// Seeded k-means with k derived from the chunk count
    KMeans,
}

impl fmt::Display for ClusteringMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusteringMethod::Hdbscan => write!(f, "hdbscan"),
            ClusteringMethod::KMeans => write!(f, "kmeans"),
        }
    }
}

impl FromStr for ClusteringMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hdbscan" => Ok(ClusteringMethod::Hdbscan),
            "kmeans" | "k-means" => Ok(ClusteringMethod::KMeans),
            other => Err(format!("unknown clustering method: {other}")),
        }
    }
}

/// Topic detection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicsSettings {
    #[serde(default)]
    pub clustering_method: ClusteringMethod,

    /// Minimum chunks per topic; also the minimum corpus size
    #[serde(default = "default_min_cluster_size")]
    pub min_cluster_size: usize,

    /// HDBSCAN core-distance neighbourhood
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,

    /// Seed for k-means and label sampling
    #[serde(default = "default_seed")]
    pub seed: u64,

    #[serde(default = "default_kmeans_max_iterations")]
    pub kmeans_max_iterations: usize,

    /// k-means restarts; the lowest-inertia run wins
    #[serde(default = "default_kmeans_n_init")]
    pub kmeans_n_init: usize,

    /// Chunks sampled per cluster for labeling
    #[serde(default = "default_label_sample_size")]
    pub label_sample_size: usize,

    /// Characters of each sampled chunk shown to the labeler
    #[serde(default = "default_label_preview_chars")]
    pub label_preview_chars: usize,

    /// Longest accepted topic name
    #[serde(default = "default_max_label_length")]
    pub max_label_length: usize,
}

fn default_min_cluster_size() -> usize {
    3
}

fn default_min_samples() -> usize {
    2
}

fn default_seed() -> u64 {
    42
}

fn default_kmeans_max_iterations() -> usize {
    300
}

fn default_kmeans_n_init() -> usize {
    10
}

fn default_label_sample_size() -> usize {
    5
}

fn default_label_preview_chars() -> usize {
    200
}

fn default_max_label_length() -> usize {
    100
}

impl Default for TopicsSettings {
    fn default() -> Self {
        Self {
            clustering_method: ClusteringMethod::default(),
            min_cluster_size: default_min_cluster_size(),
            min_samples: default_min_samples(),
            seed: default_seed(),
            kmeans_max_iterations: default_kmeans_max_iterations(),
            kmeans_n_init: default_kmeans_n_init(),
            label_sample_size: default_label_sample_size(),
            label_preview_chars: default_label_preview_chars(),
            max_label_length: default_max_label_length(),
        }
    }
}

impl TopicsSettings {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.min_cluster_size < 2 {
            return Err(format!(
                "min_cluster_size must be >= 2, got {}",
                self.min_cluster_size
            ));
        }
        if self.min_samples == 0 {
            return Err("min_samples must be > 0".to_string());
        }
        if self.kmeans_max_iterations == 0 || self.kmeans_n_init == 0 {
            return Err("kmeans_max_iterations and kmeans_n_init must be > 0".to_string());
        }
        if self.label_sample_size == 0 {
            return Err("label_sample_size must be > 0".to_string());
        }
        if self.max_label_length < 10 {
            return Err(format!(
                "max_label_length must be >= 10, got {}",
                self.max_label_length
            ));
        }
        Ok(())
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub embedding: EmbeddingSettings,

    #[serde(default)]
    pub generation: GenerationSettings,

    #[serde(default)]
    pub retrieval: RetrievalSettings,

    #[serde(default)]
    pub topics: TopicsSettings,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            storage: StorageSettings::default(),
            embedding: EmbeddingSettings::default(),
            generation: GenerationSettings::default(),
            retrieval: RetrievalSettings::default(),
            topics: TopicsSettings::default(),
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/lecture-assistant/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (LECTURE_*)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, LectureError> {
        let config_dir = ProjectDirs::from("", "", APP_NAME)
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("log_level", default_log_level())
            .map_err(|e| LectureError::Config(e.to_string()))?
            .set_default("storage.db_path", default_db_path())
            .map_err(|e| LectureError::Config(e.to_string()))?
            .set_default(
                "storage.embedding_dimension",
                default_embedding_dimension() as i64,
            )
            .map_err(|e| LectureError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Format: LECTURE_LOG_LEVEL, LECTURE_STORAGE__DB_PATH,
        // LECTURE_GENERATION__PROVIDER, etc.
        builder = builder.add_source(
            Environment::with_prefix("LECTURE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| LectureError::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| LectureError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), LectureError> {
        self.storage
            .validate()
            .and_then(|_| self.embedding.validate())
            .and_then(|_| self.generation.validate())
            .and_then(|_| self.retrieval.validate())
            .and_then(|_| self.topics.validate())
            .map_err(LectureError::Config)
    }
}
