//! Shared fixtures: an in-memory action catalog and a scripted LLM double.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use steward::config::StewardConfig;
use steward::error::{Result, StewardError};
use steward::llm::LlmClient;
use steward::plan::{ActionDefinition, ActionRegistry, OutputSchema, PayloadSchema};
use steward::planner::Planner;
use steward::{HandlerRegistry, PlanExecutor, Supervisor, SupervisorChannels};

/// Returns canned JSON documents in order and records every prompt it saw.
pub struct ScriptedLlm {
    responses: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn new(responses: &[&str]) -> Self {
        Self {
            responses: Mutex::new(responses.iter().map(|r| r.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    fn default_model(&self) -> &str {
        "scripted"
    }

    fn allowed_model_or_default(&self, _model: &str) -> String {
        "scripted".into()
    }

    async fn generate(
        &self,
        _cancel: &CancellationToken,
        prompt: &str,
        _model: &str,
    ) -> Result<String> {
        self.prompts.lock().push(prompt.to_string());
        Ok("generated text".into())
    }

    async fn generate_json(
        &self,
        _cancel: &CancellationToken,
        prompt: &str,
        _model: &str,
        _schema: Option<&Value>,
    ) -> Result<String> {
        self.prompts.lock().push(prompt.to_string());
        self.responses
            .lock()
            .pop_front()
            .ok_or_else(|| StewardError::Llm("scripted responses exhausted".into()))
    }
}

fn definition(name: &str, required: &[&str], timeout_ms: u64) -> ActionDefinition {
    ActionDefinition {
        name: name.into(),
        description: format!("{name} (test catalog)"),
        payload_schema: PayloadSchema {
            required: required.iter().map(|k| k.to_string()).collect(),
        },
        output_schema: OutputSchema::default(),
        default_timeout_ms: timeout_ms,
    }
}

/// In-memory catalog covering the handlers the tests drive. `test.sleep`
/// carries a short default timeout so timeout behavior is quick to observe.
pub fn test_registry() -> Arc<ActionRegistry> {
    Arc::new(ActionRegistry::from_definitions(vec![
        definition("test.sleep", &["duration_ms"], 0),
        definition("test.fail", &[], 0),
        definition("test.sleep_with_return", &["duration_ms"], 0),
        definition("system.write_file", &["path", "content"], 0),
        definition("system.write_file_atomic", &["path", "content"], 0),
        definition("system.read_file", &["path"], 0),
        definition("flow.foreach", &["items_json", "template"], 120_000),
        definition("intent.unknown", &[], 0),
    ]))
}

/// Same catalog, but `test.sleep` times out after `sleep_timeout_ms`.
pub fn test_registry_with_sleep_timeout(sleep_timeout_ms: u64) -> Arc<ActionRegistry> {
    Arc::new(ActionRegistry::from_definitions(vec![
        definition("test.sleep", &["duration_ms"], sleep_timeout_ms),
        definition("test.fail", &[], 0),
        definition("test.sleep_with_return", &["duration_ms"], 0),
        definition("system.write_file", &["path", "content"], 0),
        definition("system.read_file", &["path"], 0),
        definition("flow.foreach", &["items_json", "template"], 120_000),
    ]))
}

pub fn test_handlers(registry: Arc<ActionRegistry>) -> Arc<HandlerRegistry> {
    let llm = Arc::new(ScriptedLlm::new(&[]));
    Arc::new(HandlerRegistry::new(registry, llm, 8))
}

pub fn test_executor(registry: Arc<ActionRegistry>) -> PlanExecutor {
    let handlers = test_handlers(Arc::clone(&registry));
    PlanExecutor::new(registry, handlers, 16)
}

/// Fast-running supervisor config rooted in a temp scratch directory.
pub fn test_config(scratch_root: &std::path::Path) -> StewardConfig {
    let mut config = StewardConfig::default();
    config.supervisor.retry_delay_ms = 10;
    config.supervisor.approval_timeout_secs = 2;
    config.paths.scratch_root = scratch_root.to_path_buf();
    config
}

pub fn build_supervisor(
    config: StewardConfig,
    llm: Arc<ScriptedLlm>,
) -> (Supervisor, SupervisorChannels) {
    let registry = test_registry();
    let handlers = Arc::new(HandlerRegistry::new(
        Arc::clone(&registry),
        Arc::clone(&llm) as Arc<dyn LlmClient>,
        config.foreach.concurrency,
    ));
    let executor = PlanExecutor::new(
        Arc::clone(&registry),
        handlers,
        config.executor.stage_concurrency,
    );
    let planner = Arc::new(Planner::new(registry, llm, &config.planner));
    Supervisor::new(config, executor, planner)
}
