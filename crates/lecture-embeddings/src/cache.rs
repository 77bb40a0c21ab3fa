//! Local copies of sentence-transformer weights.
//!
//! Files are fetched from the HuggingFace Hub on first use and kept under
//! the user cache directory, one folder per repository. Only files that are
//! missing locally are fetched.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::EmbeddingError;

/// Repository used when the configuration does not name one.
pub const DEFAULT_MODEL_REPO: &str = "sentence-transformers/all-MiniLM-L6-v2";

const CONFIG_FILE: &str = "config.json";
const TOKENIZER_FILE: &str = "tokenizer.json";
const WEIGHTS_FILE: &str = "model.safetensors";

/// Files a model folder must hold before it can be loaded.
pub const MODEL_FILES: [&str; 3] = [CONFIG_FILE, TOKENIZER_FILE, WEIGHTS_FILE];

/// One repository's folder inside the model cache.
#[derive(Debug, Clone)]
pub struct ModelCache {
    root: PathBuf,
    repo_id: String,
}

impl ModelCache {
    pub fn new(root: impl Into<PathBuf>, repo_id: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            repo_id: repo_id.into(),
        }
    }

    /// Cache for `repo_id` under `<user cache>/lecture-assistant/models`.
    pub fn for_repo(repo_id: impl Into<String>) -> Self {
        let root = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from(".cache"))
            .join("lecture-assistant")
            .join("models");
        Self::new(root, repo_id)
    }

    pub fn repo_id(&self) -> &str {
        &self.repo_id
    }

    /// Repository name without its owner.
    pub fn model_name(&self) -> &str {
        self.repo_id
            .rsplit_once('/')
            .map_or(self.repo_id.as_str(), |(_, name)| name)
    }

    pub fn model_dir(&self) -> PathBuf {
        self.root.join(self.repo_id.replace('/', "--"))
    }

    pub fn paths(&self) -> ModelPaths {
        let dir = self.model_dir();
        ModelPaths {
            config: dir.join(CONFIG_FILE),
            tokenizer: dir.join(TOKENIZER_FILE),
            weights: dir.join(WEIGHTS_FILE),
        }
    }

    /// Required files not yet present locally.
    pub fn missing_files(&self) -> Vec<&'static str> {
        let dir = self.model_dir();
        MODEL_FILES
            .into_iter()
            .filter(|file| !dir.join(file).is_file())
            .collect()
    }

    /// Make sure every model file is present, fetching what is missing.
    pub fn ensure(&self) -> Result<ModelPaths, EmbeddingError> {
        let missing = self.missing_files();
        if missing.is_empty() {
            debug!(dir = ?self.model_dir(), "Model files cached");
        } else {
            info!(repo = %self.repo_id, files = ?missing, "Fetching model files");
            self.fetch(&missing)?;
        }
        Ok(self.paths())
    }

    fn fetch(&self, files: &[&str]) -> Result<(), EmbeddingError> {
        let api = hf_hub::api::sync::Api::new().map_err(|e| EmbeddingError::Download(e.to_string()))?;
        let repo = api.model(self.repo_id.clone());
        let dir = self.model_dir();
        std::fs::create_dir_all(&dir)?;

        for file in files {
            let downloaded = repo
                .get(file)
                .map_err(|e| EmbeddingError::Download(format!("{file}: {e}")))?;
            copy_into(&downloaded, &dir.join(file))?;
            debug!(file, "Fetched model file");
        }
        Ok(())
    }
}

/// Resolved locations of one model's files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPaths {
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    pub weights: PathBuf,
}

/// Copy through a temporary name so a half-written file is never picked up
/// as cached.
fn copy_into(source: &Path, dest: &Path) -> Result<(), EmbeddingError> {
    let partial = dest.with_extension("partial");
    std::fs::copy(source, &partial)?;
    std::fs::rename(&partial, dest)?;
    Ok(())
}
