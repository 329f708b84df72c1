mod loader;
mod registry;
mod risky;
mod validate;

pub use loader::{load_plans_from_file, select_by_names};
pub use registry::{ActionDefinition, ActionRegistry, OutputSchema, PayloadSchema};
pub use risky::is_plan_risky;
pub use validate::{first_duplicate_result_id, validate_plan};

use serde::{Deserialize, Serialize};

use crate::payload::Payload;

/// One named operation with a payload; the unit dispatched to a handler.
/// `id` is the key by which later actions reference this one's output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    pub action: String,
    #[serde(default)]
    pub payload: Payload,
}

/// Actions of one stage may run concurrently; order is display-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionStage {
    pub stage: u32,
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanMeta {
    pub plan_type: String,
    pub replan: bool,
    pub handoff_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    #[serde(default)]
    pub meta: PlanMeta,
    pub plan: Vec<ExecutionStage>,
}

impl ExecutionPlan {
    /// Iterate every action of every stage in plan order.
    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.plan.iter().flat_map(|stage| stage.actions.iter())
    }

    pub fn max_stage(&self) -> u32 {
        self.plan.iter().map(|s| s.stage).max().unwrap_or(0)
    }

    /// Shift every stage number so the plan continues a mission's numbering.
    /// Display and diagnostics consume the numbers; execution follows slice order.
    pub fn renumbered(&self, offset: u32) -> ExecutionPlan {
        let mut shifted = self.clone();
        for stage in &mut shifted.plan {
            stage.stage += offset;
        }
        shifted
    }
}

#[derive(Debug, Clone)]
pub struct NamedPlan {
    pub name: String,
    pub plan: ExecutionPlan,
}

/// One goal/plan exchange carried as LLM context; bounded to the last
/// few turns by the conversation history window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub user_goal: String,
    pub assistant_plan: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_error: Option<String>,
}

/// Flags produced by the intent analyzer for one line of user input.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GoalIntent {
    /// True if the user asked to see/review/approve before execution.
    pub requires_confirmation: bool,
    /// True if the user wants to execute plans from a local JSON file.
    pub run_manual_plans: bool,
    pub manual_plans_path: String,
    /// Plan names to run, in order. Empty means run all.
    pub manual_plan_names: Vec<String>,
    /// True if the user asked to stop/abort/kill/cancel a mission.
    pub cancel: bool,
    pub target_mission_id: String,
    /// True for "previous", "last" or "most recent" mission.
    pub target_is_previous: bool,
    /// Path of a plan file to use as the first plan of a re-planning mission.
    pub seed_plan_path: String,
}
