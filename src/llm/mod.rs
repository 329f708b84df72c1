//! Pluggable LLM backends: the only place outbound credentials are consumed.

mod gemini;
mod ollama;

pub use gemini::GeminiClient;
pub use ollama::OllamaClient;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::PlannerConfig;
use crate::error::{Result, StewardError};

/// Text-in/text-out generation. `generate_json` must return a strict JSON
/// document; `model` falls back to the provider default when empty.
#[async_trait]
pub trait LlmClient: Send + Sync {
    fn default_model(&self) -> &str;

    fn allowed_model_or_default(&self, model: &str) -> String;

    async fn generate(
        &self,
        cancel: &CancellationToken,
        prompt: &str,
        model: &str,
    ) -> Result<String>;

    async fn generate_json(
        &self,
        cancel: &CancellationToken,
        prompt: &str,
        model: &str,
        schema: Option<&Value>,
    ) -> Result<String>;
}

pub fn build_client(config: &PlannerConfig) -> Result<Arc<dyn LlmClient>> {
    match config.backend.trim().to_lowercase().as_str() {
        "" | "gemini" => Ok(Arc::new(GeminiClient::new(&config.model)?)),
        "ollama" => Ok(Arc::new(OllamaClient::new(
            &config.model,
            &config.ollama_host,
        ))),
        other => Err(StewardError::Config(format!(
            "unsupported LLM backend: {other}"
        ))),
    }
}
