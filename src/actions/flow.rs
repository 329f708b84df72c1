//! `flow.foreach`: applies a single-action template to each element of a
//! list with bounded concurrency and continue-on-error batch semantics.

use std::sync::{Arc, LazyLock};

use regex::{Captures, Regex};
use serde_json::{Value, json};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::HandlerRegistry;
use crate::error::{Result, StewardError};
use crate::payload::{ActionOutput, Payload, value_to_string};

const DEFAULT_ID_PREFIX: &str = "task_";

static ITEM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*item(?:\.([A-Za-z0-9_\.]+))?\s*\}\}").expect("item placeholder regex")
});

pub async fn handle(
    handlers: &HandlerRegistry,
    cancel: &CancellationToken,
    operation: &str,
    payload: &Payload,
) -> Result<ActionOutput> {
    match operation {
        "foreach" => foreach(handlers, cancel, payload).await,
        other => Err(StewardError::Other(format!(
            "unknown flow operation: {other}"
        ))),
    }
}

async fn foreach(
    handlers: &HandlerRegistry,
    cancel: &CancellationToken,
    payload: &Payload,
) -> Result<ActionOutput> {
    let items = coerce_items(payload.get("items_json"))
        .map_err(|e| StewardError::ForeachShape(format!("invalid items_json: {e}")))?;
    if items.is_empty() {
        return Ok(batch_output("[]", "[]"));
    }

    let template = payload
        .get("template")
        .and_then(Value::as_object)
        .ok_or_else(|| StewardError::ForeachShape("payload.template must be an object".into()))?;
    let inner_action = template
        .get("action")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .ok_or_else(|| StewardError::ForeachShape("template.action is required".into()))?
        .to_string();
    let inner_payload = template
        .get("payload")
        .and_then(Value::as_object)
        .ok_or_else(|| StewardError::ForeachShape("template.payload must be an object".into()))?
        .clone();
    let id_prefix = template
        .get("id_prefix")
        .and_then(Value::as_str)
        .filter(|p| !p.is_empty())
        .unwrap_or(DEFAULT_ID_PREFIX)
        .to_string();

    if inner_action.starts_with("flow.") {
        return Err(StewardError::ForeachShape(
            "nesting flow actions is not supported".into(),
        ));
    }

    // Per-item timeout comes from the template action's registry default.
    let per_item_timeout = handlers.registry().action_timeout(&inner_action);
    let batch_token = cancel.child_token();
    let semaphore = Arc::new(Semaphore::new(handlers.foreach_concurrency()));

    let mut slots: Vec<Option<ActionOutput>> = vec![None; items.len()];
    let mut failures: Vec<(Value, String)> = Vec::new();

    let tasks = items.iter().enumerate().map(|(index, item)| {
        let item_id = format!("{id_prefix}{:04}", index + 1);
        let resolved = substitute_item(&Value::Object(inner_payload.clone()), item);
        let token = batch_token.clone();
        let semaphore = Arc::clone(&semaphore);
        let inner_action = inner_action.as_str();
        async move {
            let _permit = match semaphore.acquire().await {
                Ok(permit) => permit,
                Err(_) => return (index, None),
            };
            if token.is_cancelled() {
                return (index, None);
            }

            let Value::Object(item_payload) = resolved else {
                return (
                    index,
                    Some(Err("template.payload not object after substitution".to_string())),
                );
            };

            debug!(item_id = %item_id, action = %inner_action, "Dispatching foreach item");

            let outcome = tokio::select! {
                _ = token.cancelled() => None,
                run = tokio::time::timeout(
                    per_item_timeout,
                    handlers.dispatch_leaf(&token, inner_action, item_payload),
                ) => Some(match run {
                    Ok(Ok(output)) => Ok(output.unwrap_or_default()),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(_) => Err(format!(
                        "item timed out after {} ms",
                        per_item_timeout.as_millis()
                    )),
                }),
            };
            (index, outcome)
        }
    });

    let results = futures::future::join_all(tasks).await;
    for (index, outcome) in results {
        match outcome {
            Some(Ok(output)) => slots[index] = Some(output),
            Some(Err(message)) => failures.push((items[index].clone(), message)),
            // Cancelled before running: neither a result nor a failure.
            None => {}
        }
    }

    let ok: Vec<&ActionOutput> = slots.iter().flatten().collect();
    let errs: Vec<Value> = failures
        .iter()
        .map(|(item, error)| json!({"item": item, "error": error}))
        .collect();

    Ok(batch_output(
        &serde_json::to_string(&ok)?,
        &serde_json::to_string(&errs)?,
    ))
}

/// Accepts a JSON-array string or a native array; empty/absent yields no work.
fn coerce_items(value: Option<&Value>) -> std::result::Result<Vec<Value>, String> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(s)) => {
            if s.trim().is_empty() {
                return Ok(Vec::new());
            }
            serde_json::from_str::<Vec<Value>>(s).map_err(|e| e.to_string())
        }
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(other) => Err(format!(
            "expected items_json to be JSON array string or array, got {other}"
        )),
    }
}

/// Replaces `{{item}}` and `{{item.<dotted.path>}}` in every string leaf.
fn substitute_item(value: &Value, item: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute_item(v, item)))
                .collect(),
        ),
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| substitute_item(v, item)).collect())
        }
        Value::String(s) => Value::String(substitute_item_str(s, item)),
        other => other.clone(),
    }
}

fn substitute_item_str(input: &str, item: &Value) -> String {
    ITEM_RE
        .replace_all(input, |caps: &Captures<'_>| {
            match caps.get(1).map(|m| m.as_str().trim()).filter(|p| !p.is_empty()) {
                None => value_to_string(item),
                Some(path) => lookup_path(item, path)
                    .map(|v| value_to_string(&v))
                    .unwrap_or_default(),
            }
        })
        .into_owned()
}

/// Dotted paths traverse object fields and numeric array indices.
fn lookup_path(root: &Value, path: &str) -> Option<Value> {
    let mut current = root;
    for part in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => {
                let index: usize = part.parse().ok()?;
                items.get(index)?
            }
            _ => return None,
        };
    }
    Some(current.clone())
}

fn batch_output(results_json: &str, errors_json: &str) -> ActionOutput {
    json!({"results_json": results_json, "errors_json": errors_json})
        .as_object()
        .cloned()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_substitute_whole_item() {
        let item = json!("https://example.com");
        assert_eq!(
            substitute_item_str("fetch {{item}} now", &item),
            "fetch https://example.com now"
        );
        assert_eq!(substitute_item_str("{{ item }}", &item), "https://example.com");
    }

    #[test]
    fn test_substitute_dotted_paths() {
        let item = json!({"profile": {"name": "Ada", "links": ["https://a", "https://b"]}});
        assert_eq!(
            substitute_item_str("{{item.profile.name}}", &item),
            "Ada"
        );
        assert_eq!(
            substitute_item_str("{{item.profile.links.1}}", &item),
            "https://b"
        );
        assert_eq!(substitute_item_str("{{item.missing.path}}", &item), "");
    }

    #[test]
    fn test_substitute_recurses_into_template() {
        let item = json!({"path": "tmp/a.html"});
        let template = json!({
            "path": "{{item.path}}",
            "nested": {"note": "from {{item.path}}"},
            "count": 2
        });
        let resolved = substitute_item(&template, &item);
        assert_eq!(
            resolved,
            json!({
                "path": "tmp/a.html",
                "nested": {"note": "from tmp/a.html"},
                "count": 2
            })
        );
    }

    #[test]
    fn test_coerce_items_shapes() {
        assert!(coerce_items(None).unwrap().is_empty());
        assert!(coerce_items(Some(&json!(""))).unwrap().is_empty());
        assert_eq!(coerce_items(Some(&json!(r#"["a","b"]"#))).unwrap().len(), 2);
        assert_eq!(coerce_items(Some(&json!(["a", "b", "c"]))).unwrap().len(), 3);
        assert!(coerce_items(Some(&json!(42))).is_err());
        assert!(coerce_items(Some(&json!("not json"))).is_err());
    }
}
