//! Text generation through the active LLM client.

use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, StewardError};
use crate::llm::LlmClient;
use crate::payload::{ActionOutput, Payload, opt_str, require_str};

pub async fn handle(
    llm: &dyn LlmClient,
    cancel: &CancellationToken,
    operation: &str,
    payload: &Payload,
) -> Result<ActionOutput> {
    match operation {
        "generate_content" => {
            let prompt = require_str(payload, "prompt")?;
            let model = opt_str(payload, "model").unwrap_or_default();
            let generated = llm.generate(cancel, prompt, model).await?;
            Ok(json!({"generated_text": generated})
                .as_object()
                .cloned()
                .unwrap_or_default())
        }
        other => Err(StewardError::Other(format!(
            "unknown llm operation: {other}"
        ))),
    }
}
