use async_trait::async_trait;
use log::{debug, error};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::analyzer::{Analyzer, LLMAnalysis};
use crate::config::ProviderConfig;
use crate::error::ClientError;
use crate::generator::Generator;
use crate::llm_manager::{LLMManager, parse_json_reply};
use crate::tasks::TaskDraft;

/// What a session calls for analysis and task generation.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn analyze(&self, task_prompt: &str, model: &str) -> Result<LLMAnalysis, ClientError>;

    async fn generate(&self, topic: &str) -> Result<TaskDraft, ClientError>;

    /// `KEY=value` lines describing where requests go. Never includes secrets.
    fn environment(&self) -> Vec<String>;
}

/// Response wrapper shared by `/analyze` and `/generate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiEnvelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub task_prompt: Option<String>,
    #[serde(default)]
    pub model_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub topic: Option<String>,
}

/// Calls the LLM provider in-process.
pub struct DirectBackend {
    analyzer: Analyzer,
    generator: Generator,
    environment: Vec<String>,
}

impl DirectBackend {
    pub fn new(llm: Arc<LLMManager>, config: &ProviderConfig) -> Self {
        let key_state = match (config.api_key().is_some(), config.mock_without_key) {
            (true, _) => "Configured",
            (false, true) => "Not configured (placeholder responses)",
            (false, false) => "Not configured",
        };
        Self {
            analyzer: Analyzer::new(llm.clone(), config.analysis_temperature),
            generator: Generator::new(
                llm,
                config.generation_model.clone(),
                config.generation_temperature,
            ),
            environment: vec![
                format!("MODEL_ENDPOINT={} (via {})", config.analysis_model, config.base_url),
                format!("{}={}", config.api_key_env, key_state),
            ],
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Self {
        Self::new(Arc::new(LLMManager::from_config(config)), config)
    }
}

#[async_trait]
impl Backend for DirectBackend {
    async fn analyze(&self, task_prompt: &str, model: &str) -> Result<LLMAnalysis, ClientError> {
        self.analyzer.analyze(task_prompt, model).await
    }

    async fn generate(&self, topic: &str) -> Result<TaskDraft, ClientError> {
        self.generator.generate(topic).await
    }

    fn environment(&self) -> Vec<String> {
        self.environment.clone()
    }
}

/// Talks to a running Terminus service over HTTP.
pub struct HttpBackend {
    base_url: String,
    client: Client,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {}", url);

        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            error!("{} returned {}: {}", url, status, text);
            // Prefer the service's own message when it sent an envelope.
            return Err(match serde_json::from_str::<ApiEnvelope<serde_json::Value>>(&text) {
                Ok(ApiEnvelope {
                    error: Some(message),
                    ..
                }) => ClientError::Remote(message),
                _ => ClientError::from_status(status.as_u16(), &text),
            });
        }

        let envelope: ApiEnvelope<T> = parse_json_reply(&text)?;
        match envelope {
            ApiEnvelope {
                success: true,
                data: Some(data),
                ..
            } => Ok(data),
            ApiEnvelope { success: true, .. } => Err(ClientError::EmptyBody),
            ApiEnvelope { error, .. } => Err(ClientError::Remote(
                error.unwrap_or_else(|| "Unknown API error".to_string()),
            )),
        }
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn analyze(&self, task_prompt: &str, model: &str) -> Result<LLMAnalysis, ClientError> {
        let request = AnalyzeRequest {
            task_prompt: Some(task_prompt.to_string()),
            model_name: Some(model.to_string()),
        };
        self.post("/analyze", &request).await
    }

    async fn generate(&self, topic: &str) -> Result<TaskDraft, ClientError> {
        let request = GenerateRequest {
            topic: Some(topic.to_string()),
        };
        self.post("/generate", &request).await
    }

    fn environment(&self) -> Vec<String> {
        vec![format!("MODEL_ENDPOINT=terminus service at {}", self.base_url)]
    }
}
