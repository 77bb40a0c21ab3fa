//! HTTP generators for Ollama, OpenAI-compatible and Anthropic endpoints.

use async_trait::async_trait;
use backoff::{backoff::Backoff, ExponentialBackoff};
use lecture_types::GenerationProvider;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};

use super::{GenerationError, GenerationOptions, TextGenerator};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Configuration for [`ApiGenerator`].
#[derive(Debug, Clone)]
pub struct ApiGeneratorConfig {
    pub provider: GenerationProvider,

    /// API base URL (e.g., "http://localhost:11434", "https://api.openai.com/v1")
    pub base_url: String,

    /// Model to use (e.g., "llama2", "gpt-4o-mini", "claude-3-haiku-20240307")
    pub model: String,

    /// API key; Ollama runs without one
    pub api_key: Option<SecretString>,

    /// Request timeout
    pub timeout: Duration,

    /// Maximum attempts on transient failure
    pub max_retries: u32,
}

impl ApiGeneratorConfig {
    /// Create config for a local Ollama server.
    pub fn ollama(model: impl Into<String>) -> Self {
        Self {
            provider: GenerationProvider::Ollama,
            base_url: "http://localhost:11434".to_string(),
            model: model.into(),
            api_key: None,
            timeout: Duration::from_secs(60),
            max_retries: 3,
        }
    }

    /// Create config for OpenAI API.
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: GenerationProvider::OpenAi,
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: Some(SecretString::from(api_key.into())),
            ..Self::ollama(model)
        }
    }

    /// Create config for Claude API.
    pub fn anthropic(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: GenerationProvider::Anthropic,
            base_url: "https://api.anthropic.com/v1".to_string(),
            api_key: Some(SecretString::from(api_key.into())),
            ..Self::ollama(model)
        }
    }

    /// Override the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// HTTP generator implementation.
pub struct ApiGenerator {
    client: Client,
    config: ApiGeneratorConfig,
    name: String,
}

impl ApiGenerator {
    /// Create a new API generator.
    pub fn new(config: ApiGeneratorConfig) -> Result<Self, GenerationError> {
        if config.provider != GenerationProvider::Ollama && config.api_key.is_none() {
            return Err(GenerationError::Config(format!(
                "{} requires an API key",
                config.provider
            )));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GenerationError::Config(e.to_string()))?;

        Ok(Self {
            client,
            name: config.provider.to_string(),
            config,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn api_key(&self) -> &str {
        self.config
            .api_key
            .as_ref()
            .map(|k| k.expose_secret())
            .unwrap_or_default()
    }

    /// Attach provider authentication headers.
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.config.provider {
            GenerationProvider::Ollama => request,
            GenerationProvider::OpenAi => {
                request.header("Authorization", format!("Bearer {}", self.api_key()))
            }
            GenerationProvider::Anthropic => request
                .header("x-api-key", self.api_key())
                .header("anthropic-version", ANTHROPIC_VERSION),
        }
    }

    /// Call the API with retry logic.
    async fn call_api(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        options: &GenerationOptions,
    ) -> Result<String, GenerationError> {
        let mut backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(120)),
            ..Default::default()
        };

        let mut attempts = 0;

        loop {
            attempts += 1;
            debug!(attempt = attempts, provider = %self.name, "Calling generation API");

            match self.make_request(prompt, system_prompt, options).await {
                Ok(response) => return Ok(response),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    if attempts >= self.config.max_retries {
                        error!(error = %e, "Max retries exceeded");
                        return Err(e);
                    }

                    match backoff.next_backoff() {
                        Some(duration) => {
                            warn!(
                                error = %e,
                                retry_in_ms = duration.as_millis(),
                                "API call failed, retrying"
                            );
                            tokio::time::sleep(duration).await;
                        }
                        None => {
                            error!(error = %e, "Backoff exhausted");
                            return Err(e);
                        }
                    }
                }
            }
        }
    }

    /// Make a single API request.
    async fn make_request(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        options: &GenerationOptions,
    ) -> Result<String, GenerationError> {
        match self.config.provider {
            GenerationProvider::Ollama => {
                self.make_ollama_request(prompt, system_prompt, options).await
            }
            GenerationProvider::OpenAi => {
                self.make_openai_request(prompt, system_prompt, options).await
            }
            GenerationProvider::Anthropic => {
                self.make_anthropic_request(prompt, system_prompt, options)
                    .await
            }
        }
    }

    /// Send a request and turn non-success statuses into errors.
    async fn send(&self, request: RequestBuilder) -> Result<Response, GenerationError> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                GenerationError::Timeout
            } else {
                GenerationError::Transport(e.to_string())
            }
        })?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(GenerationError::RateLimited);
        }

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Provider { status, body });
        }

        Ok(response)
    }

    /// Make Ollama `/api/generate` request.
    async fn make_ollama_request(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        options: &GenerationOptions,
    ) -> Result<String, GenerationError> {
        #[derive(Serialize)]
        struct OllamaRequest<'a> {
            model: &'a str,
            prompt: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            system: Option<&'a str>,
            stream: bool,
            options: OllamaOptions,
        }

        #[derive(Serialize)]
        struct OllamaOptions {
            temperature: f32,
            num_predict: u32,
        }

        #[derive(Deserialize)]
        struct OllamaResponse {
            response: String,
        }

        let request = OllamaRequest {
            model: &self.config.model,
            prompt,
            system: system_prompt,
            stream: false,
            options: OllamaOptions {
                temperature: options.temperature,
                num_predict: options.max_tokens,
            },
        };

        let response = self
            .send(self.client.post(self.url("/api/generate")).json(&request))
            .await?;

        let body: OllamaResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Parse(e.to_string()))?;
        Ok(body.response)
    }

    /// Make OpenAI-compatible API request.
    async fn make_openai_request(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        options: &GenerationOptions,
    ) -> Result<String, GenerationError> {
        #[derive(Serialize)]
        struct OpenAIRequest<'a> {
            model: &'a str,
            messages: Vec<OpenAIMessage<'a>>,
            temperature: f32,
            max_tokens: u32,
        }

        #[derive(Serialize)]
        struct OpenAIMessage<'a> {
            role: &'static str,
            content: &'a str,
        }

        #[derive(Deserialize)]
        struct OpenAIResponse {
            choices: Vec<OpenAIChoice>,
        }

        #[derive(Deserialize)]
        struct OpenAIChoice {
            message: OpenAIMessageResponse,
        }

        #[derive(Deserialize)]
        struct OpenAIMessageResponse {
            content: String,
        }

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system_prompt {
            messages.push(OpenAIMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(OpenAIMessage {
            role: "user",
            content: prompt,
        });

        let request = OpenAIRequest {
            model: &self.config.model,
            messages,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };

        let response = self
            .send(
                self.authorize(self.client.post(self.url("/chat/completions")))
                    .json(&request),
            )
            .await?;

        let response_body: OpenAIResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Parse(e.to_string()))?;

        response_body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| GenerationError::Parse("No choices in response".to_string()))
    }

    /// Make Anthropic API request.
    async fn make_anthropic_request(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        options: &GenerationOptions,
    ) -> Result<String, GenerationError> {
        #[derive(Serialize)]
        struct AnthropicRequest<'a> {
            model: &'a str,
            max_tokens: u32,
            temperature: f32,
            #[serde(skip_serializing_if = "Option::is_none")]
            system: Option<&'a str>,
            messages: Vec<AnthropicMessage<'a>>,
        }

        #[derive(Serialize)]
        struct AnthropicMessage<'a> {
            role: &'static str,
            content: &'a str,
        }

        #[derive(Deserialize)]
        struct AnthropicResponse {
            content: Vec<AnthropicContent>,
        }

        #[derive(Deserialize)]
        struct AnthropicContent {
            #[serde(default)]
            text: String,
        }

        let request = AnthropicRequest {
            model: &self.config.model,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            system: system_prompt,
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .send(
                self.authorize(self.client.post(self.url("/messages")))
                    .json(&request),
            )
            .await?;

        let response_body: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Parse(e.to_string()))?;

        response_body
            .content
            .into_iter()
            .next()
            .map(|c| c.text)
            .ok_or_else(|| GenerationError::Parse("No content in response".to_string()))
    }
}

#[async_trait]
impl TextGenerator for ApiGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        options: &GenerationOptions,
    ) -> Result<String, GenerationError> {
        self.call_api(prompt, system_prompt, options).await
    }

    async fn health_check(&self) -> bool {
        let path = match self.config.provider {
            GenerationProvider::Ollama => "/api/tags",
            GenerationProvider::OpenAi | GenerationProvider::Anthropic => "/models",
        };
        let request = self.authorize(self.client.get(self.url(path)));
        match self.send(request).await {
            Ok(_) => true,
            Err(e) => {
                warn!(provider = %self.name, error = %e, "Health check failed");
                false
            }
        }
    }
}
