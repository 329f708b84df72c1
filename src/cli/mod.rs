//! Command-line definitions and the interactive goal loop.

mod display;

pub use display::{format_mission_metrics, format_plan, format_plans_catalog};

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use console::style;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::StewardConfig;
use crate::error::Result;
use crate::plan::{
    ActionRegistry, ConversationTurn, ExecutionPlan, NamedPlan, is_plan_risky,
    load_plans_from_file, select_by_names, validate_plan,
};
use crate::planner::Planner;
use crate::supervisor::{MissionResult, PlanApproval, PlanPreview, Supervisor, SupervisorChannels};

/// An assistant that understands your text input and performs actions
/// autonomously in the background.
#[derive(Debug, Parser)]
#[command(name = "steward", version, about)]
pub struct Cli {
    /// LLM backend: gemini | ollama
    #[arg(long, default_value = "gemini")]
    pub llm: String,

    /// Model name, e.g. gemini-2.0-flash or phi4:latest
    #[arg(long)]
    pub model_name: Option<String>,

    /// Ollama host URL
    #[arg(long)]
    pub ollama_host: Option<String>,

    /// Path to the action catalog
    #[arg(long)]
    pub actions: Option<PathBuf>,

    /// Append log output to this file instead of stdout
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    #[arg(short, long)]
    pub verbose: bool,
}

struct Session {
    supervisor: Supervisor,
    planner: Arc<Planner>,
    registry: Arc<ActionRegistry>,
    approvals: mpsc::Sender<PlanApproval>,
    history: Arc<Mutex<Vec<ConversationTurn>>>,
    /// Mission id of a re-plan preview waiting for a y/n answer.
    pending_approval: Arc<Mutex<Option<String>>>,
    history_window: usize,
}

pub async fn run_interactive(
    supervisor: Supervisor,
    channels: SupervisorChannels,
    planner: Arc<Planner>,
    registry: Arc<ActionRegistry>,
    config: &StewardConfig,
) -> Result<()> {
    let history = Arc::new(Mutex::new(Vec::new()));
    let pending_approval = Arc::new(Mutex::new(None));

    let SupervisorChannels {
        results,
        previews,
        approvals,
    } = channels;

    let session = Session {
        supervisor,
        planner,
        registry,
        approvals,
        history: Arc::clone(&history),
        pending_approval: Arc::clone(&pending_approval),
        history_window: config.planner.history_window,
    };

    let results_task = tokio::spawn(consume_results(
        results,
        Arc::clone(&history),
        config.planner.history_window,
    ));
    let previews_task = tokio::spawn(consume_previews(previews, pending_approval));

    println!("Hello! How can I help you today? (type 'exit' or press Ctrl+C to quit)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt().await;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim().to_string();
        if input.eq_ignore_ascii_case("exit") {
            println!("Goodbye!");
            break;
        }
        if input.is_empty() {
            continue;
        }

        // A pending re-plan preview captures this input as its y/n answer.
        let awaiting = session.pending_approval.lock().take();
        if let Some(mission_id) = awaiting {
            session.answer_approval(&mission_id, &input).await;
            continue;
        }

        session.handle_goal(&input, &mut lines).await;
    }

    results_task.abort();
    previews_task.abort();
    Ok(())
}

async fn prompt() {
    let mut stdout = tokio::io::stdout();
    let _ = stdout.write_all(b"> ").await;
    let _ = stdout.flush().await;
}

async fn consume_results(
    mut results: mpsc::Receiver<MissionResult>,
    history: Arc<Mutex<Vec<ConversationTurn>>>,
    window: usize,
) {
    while let Some(result) = results.recv().await {
        push_turn(
            &history,
            ConversationTurn {
                user_goal: result.original_goal.clone(),
                assistant_plan: result.final_plan.clone(),
                execution_error: result.error.clone(),
            },
            window,
        );

        let state = result.state();
        println!("\n[Mission {} {state}]", result.mission_id);
        if let Some(metrics) = &result.metrics {
            println!("{}", format_mission_metrics(metrics));
        }
        prompt().await;
    }
}

async fn consume_previews(
    mut previews: mpsc::Receiver<PlanPreview>,
    pending_approval: Arc<Mutex<Option<String>>>,
) {
    while let Some(preview) = previews.recv().await {
        match serde_json::from_str::<ExecutionPlan>(&preview.plan_json) {
            Ok(plan) => println!("\n[Re-plan proposed]\n{}", format_plan(&plan)),
            Err(_) => println!("\n[Re-plan proposed]\n{}", preview.plan_json),
        }
        println!("Execute this plan? [y/n]");
        *pending_approval.lock() = Some(preview.mission_id);
        prompt().await;
    }
}

fn push_turn(history: &Mutex<Vec<ConversationTurn>>, turn: ConversationTurn, window: usize) {
    let mut turns = history.lock();
    turns.push(turn);
    while turns.len() > window {
        turns.remove(0);
    }
}

impl Session {
    async fn answer_approval(&self, mission_id: &str, input: &str) {
        let answer = input.trim().to_lowercase();
        let approved = answer == "y" || answer == "yes";
        if self
            .approvals
            .send(PlanApproval {
                mission_id: mission_id.to_string(),
                approved,
            })
            .await
            .is_err()
        {
            warn!("approval channel closed");
            return;
        }
        if approved {
            println!("[Re-plan approved]");
        } else {
            println!("[Re-plan rejected]");
        }
    }

    async fn handle_goal(&self, input: &str, lines: &mut Lines<BufReader<Stdin>>) {
        let token = CancellationToken::new();
        let intent = match self.planner.analyze_intent(&token, input).await {
            Ok(intent) => intent,
            Err(e) => {
                println!("[Intent analysis FAILED] {e}");
                return;
            }
        };

        if intent.cancel {
            self.handle_cancel(&intent.target_mission_id);
            return;
        }

        if !intent.seed_plan_path.trim().is_empty() {
            self.handle_seed(input, intent.seed_plan_path.trim(), intent.requires_confirmation)
                .await;
            return;
        }

        if intent.run_manual_plans && !intent.manual_plans_path.trim().is_empty() {
            self.handle_manual(
                intent.manual_plans_path.trim(),
                &intent.manual_plan_names,
                intent.requires_confirmation,
                lines,
            )
            .await;
            return;
        }

        self.handle_generate(input, intent.requires_confirmation, lines)
            .await;
    }

    fn handle_cancel(&self, target: &str) {
        let target = target.trim();
        if !target.is_empty() {
            match self.supervisor.cancel_mission(target) {
                Ok(()) => println!("[Cancel] Requested cancellation for mission {target}"),
                Err(e) => println!("[Cancel] {e}"),
            }
        } else {
            match self.supervisor.cancel_most_recent() {
                Ok(id) => println!("[Cancel] Requested cancellation for the current mission ({id})"),
                Err(e) => println!("[Cancel] {e}"),
            }
        }
    }

    async fn handle_seed(&self, goal: &str, path: &str, requires_confirmation: bool) {
        let plans = match load_plans_from_file(std::path::Path::new(path)).await {
            Ok(plans) => plans,
            Err(e) => {
                println!("[Seed] {e}");
                return;
            }
        };
        if plans.len() > 1 {
            println!("[Seed] Found more than one plan in {path}, using the first one");
        }
        let Some(first) = plans.into_iter().next() else {
            println!("[Seed] No missions found in {path}");
            return;
        };

        let mut seed = first.plan;
        if let Err(e) = validate_plan(&self.registry, &seed) {
            println!("[Seed] Invalid seed plan: {e}");
            return;
        }
        ensure_seed_plan_defaults(&mut seed);

        let needs_confirm = requires_confirmation || is_plan_risky(&seed);
        let history = self.history.lock().clone();
        match self
            .supervisor
            .submit_mission(goal, seed.clone(), history, needs_confirm)
            .await
        {
            Ok(mission_id) => {
                println!("[Seed] Submitted mission {mission_id} using {path} as initial plan");
                if let Ok(plan_json) = serde_json::to_string(&seed) {
                    push_turn(
                        &self.history,
                        ConversationTurn {
                            user_goal: goal.to_string(),
                            assistant_plan: plan_json,
                            execution_error: None,
                        },
                        self.history_window,
                    );
                }
            }
            Err(e) => println!("[Seed] {e}"),
        }
    }

    async fn handle_manual(
        &self,
        path: &str,
        names: &[String],
        requires_confirmation: bool,
        lines: &mut Lines<BufReader<Stdin>>,
    ) {
        let mut plans = match load_plans_from_file(std::path::Path::new(path)).await {
            Ok(plans) => plans,
            Err(e) => {
                println!("[Manual] {e}");
                return;
            }
        };
        if plans.is_empty() {
            println!("[Manual] No missions found in file");
            return;
        }

        if !names.is_empty() {
            let (selected, missing) = select_by_names(&plans, names);
            if !missing.is_empty() {
                println!("[Manual] Missing missions: {missing:?}");
            }
            plans = selected;
        }

        if requires_confirmation {
            println!("{}", format_plans_catalog(path, &plans));
            println!("About to run {} mission(s) from {path}.", plans.len());
            if !ask_yes_no("Proceed? [y/n] > ", lines).await {
                println!("[Manual] Cancelled.");
                return;
            }
        }

        let valid: Vec<NamedPlan> = plans
            .into_iter()
            .filter(|named| match validate_plan(&self.registry, &named.plan) {
                Ok(()) => true,
                Err(e) => {
                    println!("[Manual] Invalid mission {:?}: {e}", named.name);
                    false
                }
            })
            .collect();
        if valid.is_empty() {
            println!("[Manual] No valid missions to run.");
            return;
        }

        for named in valid {
            let needs_confirm = requires_confirmation || is_plan_risky(&named.plan);
            let history = self.history.lock().clone();
            match self
                .supervisor
                .submit_mission(&named.name, named.plan, history, needs_confirm)
                .await
            {
                Ok(mission_id) => {
                    println!("[Manual] Submitted mission {mission_id} ({})", named.name)
                }
                Err(e) => println!("[Manual] {e}"),
            }
        }
    }

    async fn handle_generate(
        &self,
        goal: &str,
        requires_confirmation: bool,
        lines: &mut Lines<BufReader<Stdin>>,
    ) {
        println!("{}", style("Generating plan for the above query...").dim());

        let token = CancellationToken::new();
        let history = self.history.lock().clone();
        let plan = match self.planner.generate_plan(&token, &history, goal).await {
            Ok(plan) => plan,
            Err(e) => {
                println!("[Plan generation FAILED] {e}");
                return;
            }
        };

        let needs_confirm = requires_confirmation || is_plan_risky(&plan);
        if needs_confirm {
            println!("{}", format_plan(&plan));
            if !ask_yes_no("Do you want to execute this plan? [y/n] > ", lines).await {
                println!("[Plan REJECTED]");
                return;
            }
        }

        match self
            .supervisor
            .submit_mission(goal, plan.clone(), history, needs_confirm)
            .await
        {
            Ok(mission_id) => {
                println!("[Plan ACCEPTED] Mission {mission_id} started");
                if let Ok(plan_json) = serde_json::to_string(&plan) {
                    push_turn(
                        &self.history,
                        ConversationTurn {
                            user_goal: goal.to_string(),
                            assistant_plan: plan_json,
                            execution_error: None,
                        },
                        self.history_window,
                    );
                }
            }
            Err(e) => println!("[Plan submission FAILED] {e}"),
        }
    }
}

async fn ask_yes_no(question: &str, lines: &mut Lines<BufReader<Stdin>>) -> bool {
    let mut stdout = tokio::io::stdout();
    let _ = stdout.write_all(question.as_bytes()).await;
    let _ = stdout.flush().await;
    match lines.next_line().await {
        Ok(Some(answer)) => {
            let answer = answer.trim().to_lowercase();
            answer == "y" || answer == "yes"
        }
        _ => false,
    }
}

/// Makes a file-loaded plan behave as the first plan of a re-planning
/// mission: replan is forced on, and a missing handoff path is inferred
/// from the last `tmp/` write in the plan.
pub fn ensure_seed_plan_defaults(plan: &mut ExecutionPlan) {
    if !plan.meta.replan {
        plan.meta.replan = true;
    }
    if plan.meta.handoff_path.trim().is_empty()
        && let Some(inferred) = infer_handoff_from_writes(plan)
    {
        plan.meta.handoff_path = inferred;
    }
}

/// Walks actions in stage order and picks the last `tmp/` path written by
/// `system.write_file` or `system.write_file_atomic`.
fn infer_handoff_from_writes(plan: &ExecutionPlan) -> Option<String> {
    let mut handoff = None;
    for action in plan.actions() {
        if action.action == "system.write_file" || action.action == "system.write_file_atomic" {
            if let Some(path) = action.payload.get("path").and_then(|v| v.as_str()) {
                let trimmed = path.trim();
                if trimmed.starts_with("tmp/") {
                    handoff = Some(trimmed.to_string());
                }
            }
        }
    }
    handoff
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::plan::{Action, ExecutionStage, PlanMeta};

    fn write_action(id: &str, path: &str) -> Action {
        Action {
            id: id.into(),
            action: "system.write_file_atomic".into(),
            payload: json!({"path": path, "content": "x"})
                .as_object()
                .cloned()
                .unwrap(),
        }
    }

    #[test]
    fn test_seed_defaults_force_replan_and_infer_handoff() {
        let mut plan = ExecutionPlan {
            meta: PlanMeta::default(),
            plan: vec![
                ExecutionStage {
                    stage: 1,
                    actions: vec![write_action("w1", "tmp/first.json")],
                },
                ExecutionStage {
                    stage: 2,
                    actions: vec![write_action("w2", "tmp/evidence.json")],
                },
            ],
        };
        ensure_seed_plan_defaults(&mut plan);
        assert!(plan.meta.replan);
        // The last tmp/ write wins
        assert_eq!(plan.meta.handoff_path, "tmp/evidence.json");
    }

    #[test]
    fn test_seed_defaults_keep_explicit_handoff() {
        let mut plan = ExecutionPlan {
            meta: PlanMeta {
                plan_type: String::new(),
                replan: false,
                handoff_path: "tmp/chosen.json".into(),
            },
            plan: vec![ExecutionStage {
                stage: 1,
                actions: vec![write_action("w1", "tmp/other.json")],
            }],
        };
        ensure_seed_plan_defaults(&mut plan);
        assert_eq!(plan.meta.handoff_path, "tmp/chosen.json");
    }

    #[test]
    fn test_infer_handoff_ignores_non_tmp_writes() {
        let plan = ExecutionPlan {
            meta: PlanMeta::default(),
            plan: vec![ExecutionStage {
                stage: 1,
                actions: vec![write_action("w1", "final/report.json")],
            }],
        };
        assert_eq!(infer_handoff_from_writes(&plan), None);
    }
}
