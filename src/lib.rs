pub mod actions;
pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod llm;
pub mod metrics;
pub mod payload;
pub mod plan;
pub mod planner;
pub mod supervisor;

pub use actions::HandlerRegistry;
pub use config::StewardConfig;
pub use error::{Result, StewardError};
pub use executor::{PlanExecutor, ResultStore, SharedResults, new_shared_results};
pub use llm::LlmClient;
pub use metrics::{ActionMetrics, MissionMetrics, StageMetrics};
pub use plan::{
    Action, ActionDefinition, ActionRegistry, ConversationTurn, ExecutionPlan, ExecutionStage,
    GoalIntent, NamedPlan, PlanMeta, is_plan_risky, load_plans_from_file, select_by_names,
    validate_plan,
};
pub use planner::Planner;
pub use supervisor::{
    Mission, MissionResult, MissionState, PlanApproval, PlanPreview, Supervisor,
    SupervisorChannels,
};
