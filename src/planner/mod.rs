//! Turns user goals into validated execution plans through the LLM client.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::PlannerConfig;
use crate::error::{Result, StewardError};
use crate::llm::LlmClient;
use crate::plan::{ActionRegistry, ConversationTurn, ExecutionPlan, GoalIntent, validate_plan};

pub struct Planner {
    registry: Arc<ActionRegistry>,
    llm: Arc<dyn LlmClient>,
    model: String,
    budget: Duration,
}

impl Planner {
    pub fn new(
        registry: Arc<ActionRegistry>,
        llm: Arc<dyn LlmClient>,
        config: &PlannerConfig,
    ) -> Self {
        Self {
            registry,
            llm,
            model: config.model.clone(),
            budget: Duration::from_secs(config.generation_timeout_secs),
        }
    }

    /// Asks the model for a plan and validates it against the registry,
    /// including the cross-stage reference invariant. One call, 20 s budget,
    /// no automatic retry; failures surface to the caller.
    pub async fn generate_plan(
        &self,
        cancel: &CancellationToken,
        history: &[ConversationTurn],
        goal: &str,
    ) -> Result<ExecutionPlan> {
        let prompt = self.build_plan_prompt(history, goal);
        let raw = self.generate_json_budgeted(cancel, &prompt).await?;

        let plan: ExecutionPlan = serde_json::from_str(&raw).map_err(|e| {
            StewardError::Generation(format!("error parsing generated plan JSON: {e}\nRaw: {raw}"))
        })?;

        if let Err(e) = validate_plan(&self.registry, &plan) {
            warn!(error = %e, "Generated plan failed validation");
            return Err(StewardError::Generation(format!(
                "generated plan invalid: {e}"
            )));
        }

        debug!(stages = plan.plan.len(), "Plan generated");
        Ok(plan)
    }

    pub async fn analyze_intent(
        &self,
        cancel: &CancellationToken,
        goal: &str,
    ) -> Result<GoalIntent> {
        let prompt = build_intent_prompt(goal);
        let raw = self
            .generate_json_budgeted(cancel, &prompt)
            .await
            .map_err(|e| StewardError::Intent(e.to_string()))?;

        let mut intent: GoalIntent = serde_json::from_str(&raw).map_err(|e| {
            StewardError::Intent(format!("error parsing intent JSON: {e}\nRaw: {raw}"))
        })?;

        // Drop fields the flags do not justify.
        if !intent.run_manual_plans {
            intent.manual_plans_path.clear();
            intent.manual_plan_names.clear();
        }
        if !intent.cancel {
            intent.target_mission_id.clear();
            intent.target_is_previous = false;
        }
        Ok(intent)
    }

    async fn generate_json_budgeted(
        &self,
        cancel: &CancellationToken,
        prompt: &str,
    ) -> Result<String> {
        match tokio::time::timeout(
            self.budget,
            self.llm.generate_json(cancel, prompt, &self.model, None),
        )
        .await
        {
            Ok(result) => result.map_err(|e| StewardError::Generation(e.to_string())),
            Err(_) => Err(StewardError::Generation(format!(
                "LLM call exceeded {} s budget",
                self.budget.as_secs()
            ))),
        }
    }

    fn build_plan_prompt(&self, history: &[ConversationTurn], goal: &str) -> String {
        let mut prompt = String::from(PLAN_PROMPT_HEADER);
        prompt.push_str(&self.registry.prompt_section());
        prompt.push('\n');

        if !history.is_empty() {
            prompt.push_str("CONVERSATION HISTORY (context):\n");
            for turn in history {
                let _ = writeln!(prompt, "User Goal: {:?}", turn.user_goal);
                let _ = writeln!(prompt, "Previous Assistant Plan: {}", turn.assistant_plan);
                if let Some(error) = turn.execution_error.as_deref().filter(|e| !e.is_empty()) {
                    let _ = writeln!(prompt, "Previous Execution Error: {error}");
                }
            }
            prompt.push('\n');
        }

        prompt.push_str("Generate the plan now for this goal:\n");
        let _ = writeln!(prompt, "User Goal: {goal:?}");
        prompt.push_str("Assistant: ");
        prompt
    }
}

/// The follow-up goal handed to the planner after a plan with
/// `meta.replan = true` completes.
pub fn follow_up_goal(original_goal: &str, last_stage: u32, evidence: &str) -> String {
    let mut goal = format!("{original_goal}\n\nPREV_LAST_STAGE: {last_stage}");
    if !evidence.is_empty() {
        let _ = write!(goal, "\n\nEVIDENCE:\n{evidence}");
    }
    goal
}

const PLAN_PROMPT_HEADER: &str = r#"You are an expert AI workflow planner. Convert the user's goal into a STRICT JSON execution plan.
Respond ONLY with JSON. No extra text.

OUTPUT SHAPE (not a schema; just the shape):
{
  "meta": {
    "plan_type": "<string>",            // e.g., "exploration", "extraction", "refinement"
    "replan": <bool>,                   // true if a follow-up plan is required
    "handoff_path": "<tmp/... or empty>"
  },
  "plan": [
    { "stage": <int>, "actions": [
      { "id": "<slug>", "action": "<category.operation>", "payload": { ... } }
    ] }
  ]
}

GLOBAL PRINCIPLES
- Stages run SEQUENTIALLY; actions within a stage run IN PARALLEL.
- Actions in the SAME stage must NOT reference "@results.<id>.<key>" of other actions (no dependencies within a stage). If A needs B's output, put A in a LATER stage.
- Later stages may reference earlier outputs with "@results.<action_id>.<key>", given that the outputs are from the actions from previous stages.
- ALWAYS start at stage = 1. The runtime will renumber to continue after previous stages.
- Do NOT invent URLs. Discover links from fetched HTML only.
- Persist temporary artifacts under "tmp/". Final deliverables can be top-level files.
- Write JSON only to ".json"; raw HTML only to ".html"; free text only to ".txt".

EVIDENCE / RE-PLANNING PROTOCOL
- If page structure is unknown, first produce an EXPLORATION plan:
  Stage 1: fetch the seed URL (web.request).
  Stage 2: persist concise evidence JSON to "tmp/<name>.json" with concrete keys that help the next plan, e.g.:
    {
      "seed_url": "<url>",
      "pagination_urls_hint": ["..."],          // if detected (may be empty)
      "profile_link_patterns": ["..."],         // e.g., CSS hints or substrings
      "notes": "minimal, actionable hints only"
    }
  You MAY also persist "tmp/seed.html" if helpful (system.write_file_atomic).
  Set meta.replan = true and meta.handoff_path = the evidence JSON path.
- Follow-up plans MUST reuse the previously fetched HTML or the evidence where possible
  (via @results.<id>.content or by parsing evidence), and should avoid redundant fetches.
- The runtime will renumber stages; do not try to continue numbering yourself.

ACTION USAGE RULES
- NETWORK I/O:
  - Single URL -> "web.request".
  - Many URLs -> "flow.foreach" with template.action="web.request".
- HTML PARSING:
  - Use "html.links" to extract all <a> links (returns an array of {text,url}). Always provide "base_url" so relative hrefs resolve.
  - "html.select_all" returns an array of OUTER HTML STRINGS (NOT objects). Do NOT pipe that into list.pluck.
    If you need hrefs/URLs, prefer "html.links" + list.pluck(field="url").
- LIST DISCIPLINE:
  - If you have an array of OBJECTS and need a field -> "list.pluck(field=...)" first to get an array of STRINGS.
  - Operations like "url.normalize", "list.unique", "list.concat", and "flow.foreach.items_json" expect arrays of STRINGS.
  - Never mix arrays of objects and arrays of strings.
- URL RESOLUTION: Provide "base_url" for "html.links" and "url.normalize".
- FILES: All temp/evidence under "tmp/"; final outputs with correct extension.

FLOW.FOREACH CONTRACT (STRICT)
Use EXACTLY this shape for foreach:
{
  "action": "flow.foreach",
  "payload": {
    "items_json": "<JSON array string>",
    "template": {
      "action": "<category.operation>",      // e.g., "web.request"
      "payload": { ... }                     // use {{item}} or {{item.field}} placeholders
    }
  }
}
Do NOT put "action" at the top-level payload; it MUST be inside template.

IDS
- Action IDs must be short, unique, lowercase. Never reuse a prior action ID; refer to old outputs via @results.

FINAL OUTPUTS
- Persist final deliverables with "system.write_file_atomic" using correct extension.
- Keep JSON outputs compact (no unnecessary prose).

AVAILABLE ACTIONS & PAYLOADS:
"#;

fn build_intent_prompt(goal: &str) -> String {
    let mut prompt = String::from(
        "You are an expert user intent analyzer. Respond ONLY with this JSON (no extra text):\n\
         {\"requires_confirmation\": <bool>, \"run_manual_plans\": <bool>, \"manual_plans_path\": \"<string or empty>\", \
         \"manual_plan_names\": [<zero or more strings in order>], \"cancel\": <bool>, \"target_mission_id\": \"<string or empty>\", \
         \"target_is_previous\": <bool>, \"seed_plan_path\": \"<string or empty>\"}\n\n",
    );

    prompt.push_str("Rules:\n");
    prompt.push_str("- requires_confirmation: true ONLY if the user asks to see/review/confirm/approve/preview before execution OR uses verbs like 'show', 'list', 'preview'.\n");
    prompt.push_str("- run_manual_plans: true if the user asks to execute (or show/preview) plans/missions from a local .json file.\n");
    prompt.push_str("- manual_plans_path: extract the local .json path verbatim (quoted or unquoted). If none, use empty string.\n");
    prompt.push_str("- manual_plan_names: if the user names specific missions, return them in order; otherwise an empty array. If empty and run_manual_plans is true, default behavior is to run ALL missions in the file.\n");
    prompt.push_str("- cancel: true if the user asks to stop/abort/kill/cancel a mission or plan (treat plan == mission).\n");
    prompt.push_str("- target_mission_id: if the user mentions a specific mission/plan ID, put it here (otherwise empty).\n");
    prompt.push_str("- target_is_previous: true if the user says 'previous', 'last', or 'most recent' mission/plan (otherwise false).\n");
    prompt.push_str("- seed_plan_path: if the user asks to START from / CONTINUE from / SEED with a plan file, put that .json path here (otherwise empty).\n");
    prompt.push_str("- Only consider local files ending with .json. Ignore URLs.\n\n");

    prompt.push_str("Examples:\n");
    prompt.push_str("User: \"show me the plans from tests/test_plans.json\"\n");
    prompt.push_str("Assistant: {\"requires_confirmation\": true, \"run_manual_plans\": true, \"manual_plans_path\": \"tests/test_plans.json\", \"manual_plan_names\": []}\n\n");
    prompt.push_str("User: \"execute the plans 'Create file', 'Import Data' in test.json\"\n");
    prompt.push_str("Assistant: {\"requires_confirmation\": false, \"run_manual_plans\": true, \"manual_plans_path\": \"test.json\", \"manual_plan_names\": [\"Create file\", \"Import Data\"]}\n\n");

    prompt.push_str("User Goal: \"");
    prompt.push_str(goal);
    prompt.push_str("\"\nAssistant JSON response: ");
    prompt
}
