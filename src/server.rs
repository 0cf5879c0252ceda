//! HTTP service exposing the analysis and task-generation contracts.
//!
//! ```text
//! POST /analyze   { taskPrompt, modelName? } -> { success, data | error }
//! POST /generate  { topic }                  -> { success, data | error }
//! GET  /health
//! ```

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use log::{error, info};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::analyzer::LLMAnalysis;
use crate::backend::{AnalyzeRequest, ApiEnvelope, Backend, DirectBackend, GenerateRequest};
use crate::config::Config;
use crate::llm_manager::parse_json_reply;
use crate::tasks::TaskDraft;

pub struct ServerState {
    pub backend: Arc<dyn Backend>,
    pub default_model: String,
}

type ApiResponse<T> = (StatusCode, Json<ApiEnvelope<T>>);

fn failure<T>(status: StatusCode, message: impl Into<String>) -> ApiResponse<T> {
    (status, Json(ApiEnvelope::err(message)))
}

pub async fn health_check() -> &'static str {
    "OK"
}

/// POST /analyze
pub async fn analyze(
    State(state): State<Arc<ServerState>>,
    body: String,
) -> ApiResponse<LLMAnalysis> {
    let request: AnalyzeRequest = match parse_json_reply(&body) {
        Ok(request) => request,
        Err(e) => return failure(StatusCode::BAD_REQUEST, e.to_string()),
    };
    let Some(task_prompt) = request.task_prompt.filter(|p| !p.trim().is_empty()) else {
        return failure(StatusCode::BAD_REQUEST, "taskPrompt is required");
    };
    let model = request
        .model_name
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| state.default_model.clone());

    match state.backend.analyze(&task_prompt, &model).await {
        Ok(analysis) => (StatusCode::OK, Json(ApiEnvelope::ok(analysis))),
        Err(e) => {
            error!("Analyze failed: {}", e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// POST /generate
pub async fn generate(
    State(state): State<Arc<ServerState>>,
    body: String,
) -> ApiResponse<TaskDraft> {
    let request: GenerateRequest = match parse_json_reply(&body) {
        Ok(request) => request,
        Err(e) => return failure(StatusCode::BAD_REQUEST, e.to_string()),
    };
    let Some(topic) = request.topic.filter(|t| !t.trim().is_empty()) else {
        return failure(StatusCode::BAD_REQUEST, "topic is required");
    };

    match state.backend.generate(&topic).await {
        Ok(draft) => (StatusCode::OK, Json(ApiEnvelope::ok(draft))),
        Err(e) => {
            error!("Generate failed: {}", e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/analyze", post(analyze))
        .route("/generate", post(generate))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

pub async fn run_server(config: &Config) -> Result<()> {
    let state = Arc::new(ServerState {
        backend: Arc::new(DirectBackend::from_config(&config.provider)),
        default_model: config.provider.analysis_model.clone(),
    });

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Terminus service listening on {}", addr);
    info!("  POST /analyze   - Simulate a model attempting a task");
    info!("  POST /generate  - Synthesize a new adversarial task");
    info!("  GET  /health    - Health check");

    axum::serve(listener, router(state))
        .await
        .context("Server error")?;
    Ok(())
}
