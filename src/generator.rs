use log::info;
use std::sync::Arc;

use crate::error::ClientError;
use crate::llm_manager::{CompletionRequest, LLMManager, Purpose, parse_json_reply};
use crate::tasks::TaskDraft;

/// Synthesizes new adversarial tasks for a topic.
pub struct Generator {
    llm: Arc<LLMManager>,
    model: String,
    temperature: f32,
}

impl Generator {
    pub fn new(llm: Arc<LLMManager>, model: String, temperature: f32) -> Self {
        Self {
            llm,
            model,
            temperature,
        }
    }

    pub async fn generate(&self, topic: &str) -> Result<TaskDraft, ClientError> {
        let request = CompletionRequest {
            purpose: Purpose::TaskGeneration,
            model: self.model.clone(),
            system: None,
            user: build_generation_prompt(topic),
            temperature: self.temperature,
            json_response: true,
        };

        let content = self.llm.send(&request).await?;
        let draft: TaskDraft = parse_json_reply(&content)?;
        if draft.title.trim().is_empty() || draft.prompt.trim().is_empty() {
            return Err(ClientError::Malformed(
                "generated task has an empty title or prompt".to_string(),
            ));
        }

        info!("Generated task \"{}\" for topic {}", draft.title, topic);
        Ok(draft)
    }
}

pub fn build_generation_prompt(topic: &str) -> String {
    format!(
        r#"Generate a highly adversarial terminal-based coding task about "{topic}" that is likely to cause reasoning failures in LLMs.

Focus on: recursive Docker, Python metaclasses, obscure bash, signal handling, race conditions.

Return ONLY valid JSON:
{{
  "title": "Short dramatic title",
  "description": "Detailed description",
  "difficulty": "HARD" or "EXTREME",
  "language": "Python" or "Bash/Docker" or "CLI",
  "prompt": "The exact prompt to feed an LLM"
}}"#
    )
}
