//! Scripted generator for tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{GenerationError, GenerationOptions, TextGenerator};

enum Behavior {
    Respond(String),
    Fail,
    Hang,
}

/// A prompt seen by [`MockGenerator`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedPrompt {
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub options: GenerationOptions,
}

/// Generator with fixed behavior that records every call.
pub struct MockGenerator {
    behavior: Behavior,
    calls: AtomicUsize,
    prompts: Mutex<Vec<RecordedPrompt>>,
}

impl MockGenerator {
    fn with_behavior(behavior: Behavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with `text`.
    pub fn with_response(text: impl Into<String>) -> Self {
        Self::with_behavior(Behavior::Respond(text.into()))
    }

    /// Always fail with a provider error.
    pub fn failing() -> Self {
        Self::with_behavior(Behavior::Fail)
    }

    /// Never answer within any sensible deadline.
    pub fn hanging() -> Self {
        Self::with_behavior(Behavior::Hang)
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts received so far, oldest first.
    pub fn prompts(&self) -> Vec<RecordedPrompt> {
        match self.prompts.lock() {
            Ok(prompts) => prompts.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn record(&self, prompt: &str, system_prompt: Option<&str>, options: &GenerationOptions) {
        let entry = RecordedPrompt {
            prompt: prompt.to_string(),
            system_prompt: system_prompt.map(str::to_string),
            options: *options,
        };
        match self.prompts.lock() {
            Ok(mut prompts) => prompts.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        options: &GenerationOptions,
    ) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.record(prompt, system_prompt, options);

        match &self.behavior {
            Behavior::Respond(text) => Ok(text.clone()),
            Behavior::Fail => Err(GenerationError::Provider {
                status: 500,
                body: "mock failure".to_string(),
            }),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(GenerationError::Timeout)
            }
        }
    }

    async fn health_check(&self) -> bool {
        !matches!(self.behavior, Behavior::Fail)
    }
}
