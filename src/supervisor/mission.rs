use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::executor::{SharedResults, new_shared_results};
use crate::metrics::MissionMetrics;
use crate::plan::{ConversationTurn, ExecutionPlan};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MissionState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl MissionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for MissionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Running => write!(f, "RUNNING"),
            Self::Succeeded => write!(f, "SUCCEEDED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// One user goal and its entire multi-plan execution lifetime. The result
/// store is shared across every plan of the mission so follow-up plans can
/// reference earlier outputs.
pub struct Mission {
    pub id: String,
    pub original_goal: String,
    pub state: MissionState,
    pub current_attempt: u32,
    pub max_retries: u32,
    pub history: Vec<ConversationTurn>,
    pub plan: ExecutionPlan,
    pub require_confirm: bool,
    pub scratch_dir: PathBuf,
    pub evidence: EvidenceBuffer,
    pub results: SharedResults,
    /// Highest stage number executed so far; follow-up plans are shifted
    /// past it so numbering is monotonic across the mission.
    pub last_stage: u32,
}

impl Mission {
    pub fn new(
        goal: impl Into<String>,
        plan: ExecutionPlan,
        history: Vec<ConversationTurn>,
        require_confirm: bool,
        scratch_root: &std::path::Path,
        max_retries: u32,
        evidence_cap: usize,
    ) -> Self {
        let id = short_id();
        Self {
            scratch_dir: scratch_root.join(&id),
            id,
            original_goal: goal.into(),
            state: MissionState::Pending,
            current_attempt: 0,
            max_retries,
            history,
            plan,
            require_confirm,
            evidence: EvidenceBuffer::new(evidence_cap),
            results: new_shared_results(),
            last_stage: 0,
        }
    }
}

fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Exactly one of these is published per mission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionResult {
    pub mission_id: String,
    pub original_goal: String,
    pub final_plan: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MissionMetrics>,
}

impl MissionResult {
    pub fn state(&self) -> MissionState {
        match &self.error {
            None => MissionState::Succeeded,
            Some(e) => {
                let lower = e.to_lowercase();
                if lower.contains("cancel") || lower.contains("rejected") || lower.contains("approval") {
                    MissionState::Cancelled
                } else {
                    MissionState::Failed
                }
            }
        }
    }
}

/// A re-plan proposal awaiting approval.
#[derive(Debug, Clone)]
pub struct PlanPreview {
    pub mission_id: String,
    pub plan_json: String,
}

/// The y/n response for one proposal, matched by mission id.
#[derive(Debug, Clone)]
pub struct PlanApproval {
    pub mission_id: String,
    pub approved: bool,
}

/// Bounded accumulation buffer for handoff evidence. Appends join with a
/// separator; on overflow the oldest prefix is dropped so the newest tail
/// is retained.
#[derive(Debug, Clone)]
pub struct EvidenceBuffer {
    content: String,
    cap: usize,
}

const EVIDENCE_SEPARATOR: &str = "\n\n---\n";

impl EvidenceBuffer {
    pub fn new(cap: usize) -> Self {
        Self {
            content: String::new(),
            cap,
        }
    }

    pub fn append(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if !self.content.is_empty() {
            self.content.push_str(EVIDENCE_SEPARATOR);
        }
        self.content.push_str(text);

        if self.content.len() > self.cap {
            let mut cut = self.content.len() - self.cap;
            while cut < self.content.len() && !self.content.is_char_boundary(cut) {
                cut += 1;
            }
            self.content.drain(..cut);
        }
    }

    pub fn as_str(&self) -> &str {
        &self.content
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}
