//! Typed accessors over heterogeneous JSON action payloads.

use serde_json::Value;

use crate::error::{Result, StewardError};

/// An action payload: a mapping from string keys to arbitrary JSON values.
pub type Payload = serde_json::Map<String, Value>;

/// The output mapping an action handler may return.
pub type ActionOutput = serde_json::Map<String, Value>;

pub fn require_str<'a>(payload: &'a Payload, key: &str) -> Result<&'a str> {
    let value = payload
        .get(key)
        .ok_or_else(|| StewardError::Other(format!("payload is missing required key: '{key}'")))?;
    value.as_str().ok_or_else(|| {
        StewardError::Other(format!(
            "payload key '{key}' has an invalid type (expected string)"
        ))
    })
}

pub fn opt_str<'a>(payload: &'a Payload, key: &str) -> Option<&'a str> {
    payload.get(key).and_then(Value::as_str)
}

/// Accepts numbers and numeric strings, the shapes JSON payloads arrive in.
pub fn require_i64(payload: &Payload, key: &str) -> Result<i64> {
    let value = payload
        .get(key)
        .ok_or_else(|| StewardError::Other(format!("payload is missing required key: '{key}'")))?;
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| StewardError::Other(format!("payload key '{key}' is not an integer"))),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|e| StewardError::Other(format!("payload key '{key}' invalid int: {e}"))),
        other => Err(StewardError::Other(format!(
            "payload key '{key}' has unsupported type {}",
            type_name(other)
        ))),
    }
}

pub fn opt_i64(payload: &Payload, key: &str) -> Option<i64> {
    require_i64(payload, key).ok()
}

/// Renders a JSON value the way placeholder substitution does: strings
/// verbatim, everything else as compact JSON.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn payload(value: Value) -> Payload {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_require_str() {
        let p = payload(json!({"path": "out.txt", "count": 3}));
        assert_eq!(require_str(&p, "path").unwrap(), "out.txt");
        assert!(require_str(&p, "count").is_err());
        assert!(require_str(&p, "missing").is_err());
    }

    #[test]
    fn test_require_i64_accepts_numbers_and_strings() {
        let p = payload(json!({"a": 42, "b": "17", "c": " 5 ", "d": 2.0, "e": true}));
        assert_eq!(require_i64(&p, "a").unwrap(), 42);
        assert_eq!(require_i64(&p, "b").unwrap(), 17);
        assert_eq!(require_i64(&p, "c").unwrap(), 5);
        assert_eq!(require_i64(&p, "d").unwrap(), 2);
        assert!(require_i64(&p, "e").is_err());
    }

    #[test]
    fn test_value_to_string() {
        assert_eq!(value_to_string(&json!("plain")), "plain");
        assert_eq!(value_to_string(&json!(12)), "12");
        assert_eq!(value_to_string(&json!(true)), "true");
        assert_eq!(value_to_string(&json!(["a", "b"])), r#"["a","b"]"#);
    }
}
