//! Rewrites `@results.<action_id>.<output_key>` references in payloads
//! against a snapshot of the shared result store.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use parking_lot::Mutex;
use regex::{Captures, Regex};
use serde_json::Value;

use crate::payload::{ActionOutput, Payload, value_to_string};

/// Outputs of completed actions, keyed by action id. Shared across every
/// plan of a mission so follow-up plans can reference earlier outputs.
pub type ResultStore = HashMap<String, ActionOutput>;

pub type SharedResults = Arc<Mutex<ResultStore>>;

pub fn new_shared_results() -> SharedResults {
    Arc::new(Mutex::new(ResultStore::new()))
}

static RESULTS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@results\.(\w+)\.(\w+)").expect("results regex"));

/// Substitutes every reference occurrence inside the string leaves of
/// `payload`. Numbers, booleans and other non-string leaves pass through
/// untouched; unresolved references become the empty string. Pure with
/// respect to the snapshot: no locks are taken here.
pub fn resolve_payload(payload: &Payload, snapshot: &ResultStore) -> Payload {
    payload
        .iter()
        .map(|(key, value)| (key.clone(), resolve_value(value, snapshot)))
        .collect()
}

fn resolve_value(value: &Value, snapshot: &ResultStore) -> Value {
    match value {
        Value::String(s) => Value::String(resolve_str(s, snapshot)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| resolve_value(item, snapshot))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_value(v, snapshot)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn resolve_str(input: &str, snapshot: &ResultStore) -> String {
    RESULTS_RE
        .replace_all(input, |caps: &Captures<'_>| {
            snapshot
                .get(&caps[1])
                .and_then(|output| output.get(&caps[2]))
                .map(value_to_string)
                .unwrap_or_default()
        })
        .into_owned()
}
