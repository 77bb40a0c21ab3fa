//! # lecture-generation
//!
//! Generation gateway: prompt (plus optional system prompt) in, text out.
//!
//! Backends are selected from configuration at start-up:
//! - Ollama (`/api/generate`)
//! - OpenAI-compatible chat completions
//! - Anthropic messages
//!
//! Failures are typed so callers can tell a timeout from a transport error,
//! an HTTP error from the provider, or an unreadable response. The engines
//! never surface these to their callers; they fall back instead.

mod api;
mod mock;

pub use api::{ApiGenerator, ApiGeneratorConfig};
pub use mock::{MockGenerator, RecordedPrompt};

use async_trait::async_trait;
use lecture_types::{GenerationProvider, GenerationSettings};
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Error type for generation calls.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Timeout waiting for response")]
    Timeout,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Provider returned HTTP {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Failed to parse provider response: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl GenerationError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            GenerationError::Timeout
            | GenerationError::Transport(_)
            | GenerationError::RateLimited => true,
            GenerationError::Provider { status, .. } => *status >= 500,
            GenerationError::Parse(_) | GenerationError::Config(_) => false,
        }
    }
}

/// Sampling options for one generation call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 500,
        }
    }
}

impl GenerationOptions {
    pub fn new(temperature: f32, max_tokens: u32) -> Self {
        Self {
            temperature,
            max_tokens,
        }
    }
}

/// Pluggable text generator.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Short backend name for logs (e.g., "ollama").
    fn name(&self) -> &str;

    /// Generate a completion for `prompt`.
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        options: &GenerationOptions,
    ) -> Result<String, GenerationError>;

    /// Whether the backend is reachable.
    async fn health_check(&self) -> bool;
}

/// Run one generation call bounded by `limit`.
///
/// An elapsed deadline becomes [`GenerationError::Timeout`], so callers
/// handle every failure through one `Result`.
pub async fn generate_with_timeout(
    generator: &dyn TextGenerator,
    prompt: &str,
    system_prompt: Option<&str>,
    options: &GenerationOptions,
    limit: Duration,
) -> Result<String, GenerationError> {
    match tokio::time::timeout(limit, generator.generate(prompt, system_prompt, options)).await {
        Ok(result) => result,
        Err(_) => Err(GenerationError::Timeout),
    }
}

/// Build the configured generator.
pub fn build_generator(
    settings: &GenerationSettings,
) -> Result<Arc<dyn TextGenerator>, GenerationError> {
    settings.validate().map_err(GenerationError::Config)?;

    let api_key = match settings.provider {
        GenerationProvider::Ollama => None,
        GenerationProvider::OpenAi => Some(resolve_api_key(settings, "OPENAI_API_KEY")?),
        GenerationProvider::Anthropic => Some(resolve_api_key(settings, "ANTHROPIC_API_KEY")?),
    };

    let config = ApiGeneratorConfig {
        provider: settings.provider,
        base_url: settings.base_url(),
        model: settings.model.clone(),
        api_key,
        timeout: Duration::from_secs(settings.timeout_secs),
        max_retries: settings.max_retries.max(1),
    };

    info!(
        provider = %settings.provider,
        model = %settings.model,
        "Generation gateway ready"
    );
    Ok(Arc::new(ApiGenerator::new(config)?))
}

fn resolve_api_key(
    settings: &GenerationSettings,
    env_var: &str,
) -> Result<SecretString, GenerationError> {
    settings
        .api_key
        .clone()
        .or_else(|| std::env::var(env_var).ok())
        .map(SecretString::from)
        .ok_or_else(|| {
            GenerationError::Config(format!(
                "{} needs generation.api_key or {}",
                settings.provider, env_var
            ))
        })
}
