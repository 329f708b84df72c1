//! Per-action, per-stage and per-mission execution timings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionMetrics {
    pub id: String,
    pub action: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_ms: i64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

impl ActionMetrics {
    pub fn record(
        id: impl Into<String>,
        action: impl Into<String>,
        start: DateTime<Utc>,
        err: Option<String>,
    ) -> Self {
        let end = Utc::now();
        Self {
            id: id.into(),
            action: action.into(),
            start,
            end,
            duration_ms: (end - start).num_milliseconds(),
            success: err.is_none(),
            err,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageMetrics {
    pub stage: u32,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_ms: i64,
    pub actions: Vec<ActionMetrics>,
}

impl StageMetrics {
    pub fn begin(stage: u32) -> Self {
        let now = Utc::now();
        Self {
            stage,
            start: now,
            end: now,
            duration_ms: 0,
            actions: Vec::new(),
        }
    }

    pub fn finalize(&mut self) {
        self.end = Utc::now();
        self.duration_ms = (self.end - self.start).num_milliseconds();
    }
}

/// Stage metrics are concatenated across every plan of the mission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionMetrics {
    pub mission_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_ms: i64,
    pub succeeded: bool,
    pub stages: Vec<StageMetrics>,
}

impl MissionMetrics {
    pub fn finalize(
        mission_id: impl Into<String>,
        start: DateTime<Utc>,
        succeeded: bool,
        stages: Vec<StageMetrics>,
    ) -> Self {
        let end = Utc::now();
        Self {
            mission_id: mission_id.into(),
            start,
            end,
            duration_ms: (end - start).num_milliseconds(),
            succeeded,
            stages,
        }
    }
}
