use log::info;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::ClientError;
use crate::llm_manager::{CompletionRequest, LLMManager, Purpose, parse_json_reply};

/// Verdict of an analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalysisStatus {
    /// The target model fails the task.
    #[serde(rename = "BREAKTHROUGH", alias = "breakthrough", alias = "Breakthrough")]
    Breakthrough,
    /// The target model solves the task.
    #[serde(rename = "SUCCESS", alias = "success", alias = "Success")]
    Success,
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisStatus::Breakthrough => write!(f, "BREAKTHROUGH"),
            AnalysisStatus::Success => write!(f, "SUCCESS"),
        }
    }
}

/// Structured result of asking a model to attempt a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LLMAnalysis {
    /// Filled in by the client, not by the model.
    #[serde(default)]
    pub model: String,
    pub reasoning: String,
    pub code_output: String,
    pub failure_point: String,
    pub status: AnalysisStatus,
}

/// Asks a target model to simulate attempting an adversarial task.
pub struct Analyzer {
    llm: Arc<LLMManager>,
    temperature: f32,
}

impl Analyzer {
    pub fn new(llm: Arc<LLMManager>, temperature: f32) -> Self {
        Self { llm, temperature }
    }

    pub async fn analyze(&self, task_prompt: &str, model: &str) -> Result<LLMAnalysis, ClientError> {
        let request = CompletionRequest {
            purpose: Purpose::Analysis,
            model: model.to_string(),
            system: Some(build_analysis_prompt(task_prompt, model)),
            user: "Perform the analysis now.".to_string(),
            temperature: self.temperature,
            json_response: true,
        };

        let content = self.llm.send(&request).await?;
        let mut analysis: LLMAnalysis = parse_json_reply(&content)?;
        analysis.model = self.llm.provider().label_model(model);

        info!("Analysis on {} finished: {}", analysis.model, analysis.status);
        Ok(analysis)
    }
}

pub fn build_analysis_prompt(task_prompt: &str, model: &str) -> String {
    format!(
        r#"You are Terminus Agent, an elite red-team evaluator testing the limits of frontier LLMs.

Analyze this adversarial coding task and simulate how the target model ({model}) would respond.

Task Prompt:
"""{task_prompt}"""

Respond ONLY with valid JSON using this exact structure:
{{
  "reasoning": "Detailed step-by-step reasoning trace of the LLM",
  "codeOutput": "The code the LLM would likely generate (include realistic bugs/mistakes)",
  "failurePoint": "Precise description of where the model fails or hallucinates",
  "status": "BREAKTHROUGH" if the task breaks the model, "SUCCESS" if solved perfectly
}}"#
    )
}
