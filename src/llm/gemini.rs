//! Hosted JSON-capable model over the Gemini REST API.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use super::LlmClient;
use crate::error::{Result, StewardError};

const GEMINI_DEFAULT: &str = "gemini-2.0-flash";
const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

impl GeminiClient {
    pub fn new(model: &str) -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| StewardError::Config("GEMINI_API_KEY is not set".into()))?;
        Ok(Self {
            http: reqwest::Client::new(),
            api_key,
            model: if model.trim().is_empty() {
                GEMINI_DEFAULT.to_string()
            } else {
                model.to_string()
            },
        })
    }

    async fn call(
        &self,
        cancel: &CancellationToken,
        prompt: &str,
        model: &str,
        generation_config: Option<Value>,
    ) -> Result<String> {
        let model = self.allowed_model_or_default(model);
        let url = format!("{API_BASE}/{model}:generateContent");

        let mut body = json!({
            "contents": [{"parts": [{"text": prompt}]}],
        });
        if let Some(config) = generation_config {
            body["generationConfig"] = config;
        }

        let request = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(StewardError::Cancelled),
            sent = request => sent.map_err(|e| StewardError::Llm(format!("gemini request: {e}")))?,
        };

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(StewardError::Llm(format!(
                "gemini returned {status}: {detail}"
            )));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| StewardError::Llm(format!("gemini response parse: {e}")))?;
        parsed
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| StewardError::Llm("gemini: empty response".into()))
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    fn default_model(&self) -> &str {
        GEMINI_DEFAULT
    }

    /// Only gemini-family models are accepted; anything else falls back.
    fn allowed_model_or_default(&self, model: &str) -> String {
        let trimmed = model.trim();
        if trimmed.is_empty() {
            return self.model.clone();
        }
        if !trimmed.to_lowercase().starts_with("gemini-") {
            return GEMINI_DEFAULT.to_string();
        }
        trimmed.to_string()
    }

    async fn generate(
        &self,
        cancel: &CancellationToken,
        prompt: &str,
        model: &str,
    ) -> Result<String> {
        self.call(cancel, prompt, model, None).await
    }

    async fn generate_json(
        &self,
        cancel: &CancellationToken,
        prompt: &str,
        model: &str,
        schema: Option<&Value>,
    ) -> Result<String> {
        let mut config = json!({"responseMimeType": "application/json"});
        if let Some(schema) = schema {
            config["responseJsonSchema"] = schema.clone();
        }
        self.call(cancel, prompt, model, Some(config)).await
    }
}
