use async_trait::async_trait;
use log::{debug, error, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::ClientError;
use crate::llm_manager::{CompletionRequest, LLMProvider};

/// OpenAI-compatible chat-completions provider. Works against any gateway
/// speaking the same protocol (Portkey, OpenRouter, local proxies).
pub struct OpenAIProvider {
    api_key: String,
    base_url: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

impl OpenAIProvider {
    pub fn new(api_key: String, base_url: String) -> Self {
        // No request timeout: a call settles when the endpoint answers.
        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    fn build_request(request: &CompletionRequest) -> ChatRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: Some(system.clone()),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: Some(request.user.clone()),
        });

        ChatRequest {
            model: request.model.clone(),
            messages,
            temperature: request.temperature,
            response_format: request.json_response.then(|| ResponseFormat {
                format_type: "json_object".to_string(),
            }),
        }
    }
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "OpenAI"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, ClientError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&Self::build_request(request))
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;
        if !status.is_success() {
            error!("OpenAI API error {}: {}", status, response_text);
            return Err(ClientError::from_status(status.as_u16(), &response_text));
        }
        debug!("Raw OpenAI response: {}", response_text);

        if response_text.trim_start().starts_with('<') {
            return Err(ClientError::Html);
        }
        let chat: ChatResponse = serde_json::from_str(&response_text)
            .map_err(|e| ClientError::Malformed(format!("Failed to parse OpenAI response: {}", e)))?;

        let choice = chat.choices.into_iter().next().ok_or(ClientError::EmptyBody)?;
        if let Some(reason) = choice.finish_reason.as_deref() {
            if reason != "stop" {
                warn!("OpenAI response stopped with reason: {}", reason);
            }
        }

        match choice.message.content {
            Some(content) if !content.trim().is_empty() => Ok(content.trim().to_string()),
            _ => Err(ClientError::EmptyBody),
        }
    }
}
