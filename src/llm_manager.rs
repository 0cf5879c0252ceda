use async_trait::async_trait;
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::config::ProviderConfig;
use crate::error::{ClientError, preview};
use crate::providers::openai::OpenAIProvider;

/// What a completion request is for. Lets offline providers answer with
/// the right shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    Analysis,
    TaskGeneration,
}

/// A single, non-streaming chat completion.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub purpose: Purpose,
    pub model: String,
    pub system: Option<String>,
    pub user: String,
    pub temperature: f32,
    /// Ask the provider to constrain output to a JSON object.
    pub json_response: bool,
}

/// Trait representing an LLM provider.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Name of the provider.
    fn name(&self) -> &str;

    /// Send a request and return the raw message content.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ClientError>;

    /// Model name reported back to the user for a request made with `model`.
    fn label_model(&self, model: &str) -> String {
        model.to_string()
    }
}

/// Provider used when no API key is configured. Answers with clearly
/// labelled canned payloads so the session can be exercised offline.
pub struct PlaceholderProvider;

#[async_trait]
impl LLMProvider for PlaceholderProvider {
    fn name(&self) -> &str {
        "placeholder"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, ClientError> {
        let payload = match request.purpose {
            Purpose::Analysis => serde_json::json!({
                "reasoning": "Mock reasoning trace: no API key provided. Running in sandbox/evaluation mode.",
                "codeOutput": "#!/bin/bash\necho 'Simulated LLM output with intentional flaw'\n# Missing proper error handling\nexit 1\n",
                "failurePoint": "Mock failure: missing provider credentials",
                "status": "BREAKTHROUGH",
            }),
            Purpose::TaskGeneration => serde_json::json!({
                "title": "Mock Task: Signal Handling in Nested Shells",
                "description": "Placeholder task synthesized without provider credentials.",
                "difficulty": "HARD",
                "language": "Bash/Docker",
                "prompt": "Write a bash script that traps SIGTERM in a subshell spawned by a container entrypoint and forwards it to every grandchild process.",
            }),
        };
        Ok(payload.to_string())
    }

    fn label_model(&self, model: &str) -> String {
        format!("mock-{}", model)
    }
}

/// Provider used when no API key is configured and placeholders are off.
pub struct UnconfiguredProvider {
    api_key_env: String,
}

#[async_trait]
impl LLMProvider for UnconfiguredProvider {
    fn name(&self) -> &str {
        "unconfigured"
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<String, ClientError> {
        Err(ClientError::MissingApiKey(self.api_key_env.clone()))
    }
}

/// Owns the active provider and routes requests to it.
pub struct LLMManager {
    provider: Arc<dyn LLMProvider>,
}

impl LLMManager {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self { provider }
    }

    /// Pick a provider from configuration and the environment.
    pub fn from_config(config: &ProviderConfig) -> Self {
        let provider: Arc<dyn LLMProvider> = match config.api_key() {
            Some(api_key) => Arc::new(OpenAIProvider::new(api_key, config.base_url.clone())),
            None if config.mock_without_key => {
                info!(
                    "{} not set; answering with placeholder payloads",
                    config.api_key_env
                );
                Arc::new(PlaceholderProvider)
            }
            None => Arc::new(UnconfiguredProvider {
                api_key_env: config.api_key_env.clone(),
            }),
        };
        info!("Using LLM provider: {}", provider.name());
        Self::new(provider)
    }

    /// Get the active provider.
    pub fn provider(&self) -> &dyn LLMProvider {
        self.provider.as_ref()
    }

    pub async fn send(&self, request: &CompletionRequest) -> Result<String, ClientError> {
        debug!(
            "Sending {:?} request to {} (model {})",
            request.purpose,
            self.provider.name(),
            request.model
        );
        let result = self.provider.complete(request).await;
        if let Err(e) = &result {
            warn!("{} request failed: {}", self.provider.name(), e);
        }
        result
    }
}

/// Parse a model or service reply that should be a single JSON object.
///
/// Empty bodies, HTML pages and other non-object text are rejected before
/// deserializing.
pub fn parse_json_reply<T: DeserializeOwned>(body: &str) -> Result<T, ClientError> {
    let trimmed = strip_code_fence(body.trim());
    if trimmed.is_empty() {
        return Err(ClientError::EmptyBody);
    }
    if trimmed.starts_with('<') {
        return Err(ClientError::Html);
    }
    if !trimmed.starts_with('{') {
        return Err(ClientError::NotJson(preview(trimmed)));
    }
    serde_json::from_str(trimmed).map_err(|e| ClientError::Malformed(e.to_string()))
}

fn strip_code_fence(body: &str) -> &str {
    let Some(inner) = body.strip_prefix("```") else {
        return body;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}
