use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{Result, StewardError};

pub const CONFIG_FILE: &str = "steward.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StewardConfig {
    pub executor: ExecutorConfig,
    pub foreach: ForeachConfig,
    pub supervisor: SupervisorConfig,
    pub planner: PlannerConfig,
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Ceiling on concurrently running actions within one stage.
    pub stage_concurrency: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            stage_concurrency: 16,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForeachConfig {
    /// Ceiling on concurrently running items within one foreach batch.
    pub concurrency: usize,
}

impl Default for ForeachConfig {
    fn default() -> Self {
        Self { concurrency: 8 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub approval_timeout_secs: u64,
    pub queue_capacity: usize,
    /// Evidence buffer cap in bytes; the newest tail is retained.
    pub evidence_cap_bytes: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 1_000,
            approval_timeout_secs: 60,
            queue_capacity: 100,
            evidence_cap_bytes: 8_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// LLM backend: "gemini" or "ollama".
    pub backend: String,
    /// Model name; empty selects the provider default.
    pub model: String,
    pub ollama_host: String,
    /// Budget for one intent-analysis or plan-generation call.
    pub generation_timeout_secs: u64,
    /// Conversation turns carried as LLM context.
    pub history_window: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            backend: "gemini".into(),
            model: String::new(),
            ollama_host: String::new(),
            generation_timeout_secs: 20,
            history_window: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub catalog: PathBuf,
    pub scratch_root: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            catalog: PathBuf::from("actions.json"),
            scratch_root: PathBuf::from("tmp/scratch"),
        }
    }
}

impl StewardConfig {
    /// Loads `steward.toml` from `dir` if present, else defaults.
    pub async fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        let config = if path.exists() {
            let content = fs::read_to_string(&path).await?;
            toml::from_str(&content).map_err(|e| StewardError::Config(e.to_string()))?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.executor.stage_concurrency == 0 {
            errors.push("executor.stage_concurrency must be greater than 0");
        }
        if self.foreach.concurrency == 0 {
            errors.push("foreach.concurrency must be greater than 0");
        }
        if self.supervisor.max_retries == 0 {
            errors.push("supervisor.max_retries must be greater than 0");
        }
        if self.supervisor.queue_capacity == 0 {
            errors.push("supervisor.queue_capacity must be greater than 0");
        }
        if self.supervisor.evidence_cap_bytes == 0 {
            errors.push("supervisor.evidence_cap_bytes must be greater than 0");
        }
        if self.planner.generation_timeout_secs == 0 {
            errors.push("planner.generation_timeout_secs must be greater than 0");
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(StewardError::Config(errors.join("; ")))
        }
    }
}
