//! Helpers over JSON-string arrays: pluck a field, dedupe, concatenate.

use std::collections::HashSet;

use serde_json::{Value, json};

use crate::error::{Result, StewardError};
use crate::payload::{ActionOutput, Payload, require_str, value_to_string};

pub fn handle(operation: &str, payload: &Payload) -> Result<ActionOutput> {
    match operation {
        "pluck" => pluck(payload),
        "unique" => unique(payload),
        "concat" => concat(payload),
        other => Err(StewardError::Other(format!(
            "unknown list operation: {other}"
        ))),
    }
}

fn pluck(payload: &Payload) -> Result<ActionOutput> {
    let list_json = require_str(payload, "list_json")?;
    let field = require_str(payload, "field")?;

    let items: Vec<serde_json::Map<String, Value>> = serde_json::from_str(list_json)
        .map_err(|e| StewardError::Other(format!("list_json must be array of objects: {e}")))?;

    let values: Vec<String> = items
        .iter()
        .filter_map(|obj| obj.get(field).map(value_to_string))
        .collect();

    Ok(output(json!({"values_json": encode(&values)?})))
}

fn unique(payload: &Payload) -> Result<ActionOutput> {
    let list_json = require_str(payload, "list_json")?;
    let items: Vec<Value> = serde_json::from_str(list_json)
        .map_err(|e| StewardError::Other(format!("list_json must be array: {e}")))?;

    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(items.len());
    for item in &items {
        let s = value_to_string(item);
        if seen.insert(s.clone()) {
            out.push(s);
        }
    }

    Ok(output(json!({"list_json": encode(&out)?})))
}

fn concat(payload: &Payload) -> Result<ActionOutput> {
    let a = require_str(payload, "a_json")?;
    let b = require_str(payload, "b_json")?;

    let mut left: Vec<Value> = serde_json::from_str(a)
        .map_err(|e| StewardError::Other(format!("a_json invalid array: {e}")))?;
    let mut right: Vec<Value> = serde_json::from_str(b)
        .map_err(|e| StewardError::Other(format!("b_json invalid array: {e}")))?;
    left.append(&mut right);

    Ok(output(json!({"list_json": serde_json::to_string(&left)?})))
}

fn encode(values: &[String]) -> Result<String> {
    Ok(serde_json::to_string(values)?)
}

fn output(value: Value) -> ActionOutput {
    value.as_object().cloned().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn payload(value: serde_json::Value) -> Payload {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_pluck_extracts_field_values() {
        let out = handle(
            "pluck",
            &payload(json!({
                "list_json": r#"[{"url":"https://a","text":"A"},{"url":"https://b"},{"text":"no url"}]"#,
                "field": "url"
            })),
        )
        .unwrap();
        assert_eq!(
            out.get("values_json").unwrap(),
            r#"["https://a","https://b"]"#
        );
    }

    #[test]
    fn test_unique_preserves_first_occurrence_order() {
        let out = handle(
            "unique",
            &payload(json!({"list_json": r#"["b","a","b","c","a"]"#})),
        )
        .unwrap();
        assert_eq!(out.get("list_json").unwrap(), r#"["b","a","c"]"#);
    }

    #[test]
    fn test_concat_joins_arrays() {
        let out = handle(
            "concat",
            &payload(json!({"a_json": r#"["x"]"#, "b_json": r#"["y","z"]"#})),
        )
        .unwrap();
        assert_eq!(out.get("list_json").unwrap(), r#"["x","y","z"]"#);
    }

    #[test]
    fn test_invalid_input_rejected() {
        assert!(handle("pluck", &payload(json!({"list_json": "not json", "field": "f"}))).is_err());
        assert!(handle("rotate", &payload(json!({}))).is_err());
    }
}
