//! Typed catalog of permitted operations, loaded once at startup.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::info;

use super::Action;
use crate::error::{Result, StewardError};

/// Fallback when a definition carries no timeout of its own.
pub const DEFAULT_ACTION_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PayloadSchema {
    pub required: Vec<String>,
}

/// Advisory only: used when rendering the planning prompt, not enforced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSchema {
    pub keys: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub payload_schema: PayloadSchema,
    #[serde(default)]
    pub output_schema: OutputSchema,
    #[serde(default)]
    pub default_timeout_ms: u64,
}

pub struct ActionRegistry {
    actions: Vec<ActionDefinition>,
    by_name: HashMap<String, usize>,
}

#[derive(Deserialize)]
struct CatalogFile {
    actions: Vec<ActionDefinition>,
}

impl ActionRegistry {
    pub fn from_definitions(actions: Vec<ActionDefinition>) -> Self {
        let by_name = actions
            .iter()
            .enumerate()
            .map(|(i, def)| (def.name.clone(), i))
            .collect();
        Self { actions, by_name }
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).await.map_err(|e| {
            StewardError::Config(format!(
                "could not read action catalog {}: {e}",
                path.display()
            ))
        })?;
        let catalog: CatalogFile = serde_json::from_str(&raw).map_err(|e| {
            StewardError::Config(format!(
                "could not parse action catalog {}: {e}",
                path.display()
            ))
        })?;

        info!(
            catalog = %path.display(),
            action_count = catalog.actions.len(),
            "Action registry loaded"
        );

        Ok(Self::from_definitions(catalog.actions))
    }

    pub fn get_definition(&self, name: &str) -> Option<&ActionDefinition> {
        self.by_name.get(name).map(|&i| &self.actions[i])
    }

    /// Per-action default timeout, falling back to 30 s.
    pub fn action_timeout(&self, name: &str) -> Duration {
        let ms = self
            .get_definition(name)
            .map(|def| def.default_timeout_ms)
            .filter(|&ms| ms > 0)
            .unwrap_or(DEFAULT_ACTION_TIMEOUT_MS);
        Duration::from_millis(ms)
    }

    /// Checks one action against its catalog entry: the name must be known,
    /// every required payload key present, and `flow.foreach` payloads must
    /// carry a well-formed template.
    pub fn validate_action(&self, action: &Action) -> Result<()> {
        let def = self
            .get_definition(&action.action)
            .ok_or_else(|| StewardError::UnknownAction(action.action.clone()))?;

        for key in &def.payload_schema.required {
            if !action.payload.contains_key(key) {
                return Err(StewardError::MissingPayloadKey {
                    action: action.action.clone(),
                    key: key.clone(),
                });
            }
        }

        if action.action == "flow.foreach" {
            let template = action
                .payload
                .get("template")
                .and_then(|v| v.as_object())
                .ok_or_else(|| {
                    StewardError::ForeachShape("payload.template must be an object".into())
                })?;
            if !template.get("action").is_some_and(|v| v.is_string()) {
                return Err(StewardError::ForeachShape(
                    "template.action (string) is required".into(),
                ));
            }
            if !template.get("payload").is_some_and(|v| v.is_object()) {
                return Err(StewardError::ForeachShape(
                    "template.payload (object) is required".into(),
                ));
            }
        }

        Ok(())
    }

    /// Renders the catalog as a text block for the planning prompt.
    pub fn prompt_section(&self) -> String {
        let mut out = String::new();
        for def in &self.actions {
            let required = def.payload_schema.required.join(", ");
            let _ = write!(
                out,
                "- `{}`: {} Payload requires keys: `[{required}]`.",
                def.name, def.description
            );
            if !def.output_schema.keys.is_empty() {
                let _ = writeln!(
                    out,
                    " Returns output with keys: `[{}]`.",
                    def.output_schema.keys.join(", ")
                );
            } else {
                out.push('\n');
            }
        }
        out
    }
}
