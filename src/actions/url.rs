//! URL list normalization against an optional base.

use serde_json::json;
use url::Url;

use crate::error::{Result, StewardError};
use crate::payload::{ActionOutput, Payload, opt_str, require_str};

pub fn handle(operation: &str, payload: &Payload) -> Result<ActionOutput> {
    match operation {
        "normalize" => normalize(payload),
        other => Err(StewardError::Other(format!(
            "unknown url operation: {other}"
        ))),
    }
}

fn normalize(payload: &Payload) -> Result<ActionOutput> {
    let urls_json = require_str(payload, "urls_json")?;
    let base = opt_str(payload, "base_url").unwrap_or_default();

    let urls: Vec<String> = serde_json::from_str(urls_json)
        .map_err(|e| StewardError::Other(format!("urls_json must be array of strings: {e}")))?;

    let normalized: Vec<String> = urls
        .iter()
        .map(|raw| normalize_one(base, raw))
        .collect();

    Ok(json!({"urls_json": serde_json::to_string(&normalized)?})
        .as_object()
        .cloned()
        .unwrap_or_default())
}

/// Absolute URLs pass through re-serialized; relative ones resolve against
/// the base; anything unparsable is returned untouched.
pub(crate) fn normalize_one(base: &str, raw: &str) -> String {
    if raw.is_empty() {
        return raw.to_string();
    }
    if let Ok(absolute) = Url::parse(raw) {
        return absolute.to_string();
    }
    if base.is_empty() {
        return raw.to_string();
    }
    match Url::parse(base).and_then(|b| b.join(raw)) {
        Ok(resolved) => resolved.to_string(),
        Err(_) => raw.to_string(),
    }
}
