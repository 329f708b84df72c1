//! Local model server backend.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use super::LlmClient;
use crate::error::{Result, StewardError};

const OLLAMA_DEFAULT: &str = "phi4:latest";
const DEFAULT_HOST: &str = "http://localhost:11434";

pub struct OllamaClient {
    http: reqwest::Client,
    host: String,
    model: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

impl OllamaClient {
    pub fn new(model: &str, host: &str) -> Self {
        let host = if !host.trim().is_empty() {
            host.trim().to_string()
        } else {
            std::env::var("OLLAMA_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string())
        };
        Self {
            http: reqwest::Client::new(),
            host: host.trim_end_matches('/').to_string(),
            model: if model.trim().is_empty() {
                OLLAMA_DEFAULT.to_string()
            } else {
                model.to_string()
            },
        }
    }

    async fn call(&self, cancel: &CancellationToken, body: Value) -> Result<String> {
        let url = format!("{}/api/generate", self.host);
        let request = self.http.post(&url).json(&body).send();

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(StewardError::Cancelled),
            sent = request => sent.map_err(|e| StewardError::Llm(format!("ollama request: {e}")))?,
        };

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(StewardError::Llm(format!(
                "ollama returned {status}: {detail}"
            )));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| StewardError::Llm(format!("ollama response parse: {e}")))?;
        Ok(parsed.response)
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    fn default_model(&self) -> &str {
        OLLAMA_DEFAULT
    }

    fn allowed_model_or_default(&self, model: &str) -> String {
        let trimmed = model.trim();
        if trimmed.is_empty() {
            self.model.clone()
        } else {
            trimmed.to_string()
        }
    }

    async fn generate(
        &self,
        cancel: &CancellationToken,
        prompt: &str,
        model: &str,
    ) -> Result<String> {
        self.call(
            cancel,
            json!({
                "model": self.allowed_model_or_default(model),
                "prompt": prompt,
                "stream": false,
            }),
        )
        .await
    }

    async fn generate_json(
        &self,
        cancel: &CancellationToken,
        prompt: &str,
        model: &str,
        schema: Option<&Value>,
    ) -> Result<String> {
        let format = match schema {
            Some(schema) => schema.clone(),
            None => Value::String("json".into()),
        };
        self.call(
            cancel,
            json!({
                "model": self.allowed_model_or_default(model),
                "prompt": format!("{prompt}\n\nReturn ONLY strict JSON. No extra text."),
                "format": format,
                "stream": false,
            }),
        )
        .await
    }
}
