//! Structural and dataflow validation over whole plans.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::{ActionRegistry, ExecutionPlan};
use crate::error::{Result, StewardError};

/// Matches the action id of every `@results.<id>.` reference.
static RESULTS_REF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@results\.([A-Za-z0-9_\-]+)\.").expect("results ref regex"));

/// Validates every action against the registry, enforces unique action ids,
/// and checks the cross-stage dataflow invariant: each `@results.<id>.<key>`
/// must refer to an action of a strictly earlier stage. Static only; no
/// values are substituted here.
pub fn validate_plan(registry: &ActionRegistry, plan: &ExecutionPlan) -> Result<()> {
    let mut ids = HashSet::new();
    for action in plan.actions() {
        registry.validate_action(action)?;
        if !action.id.is_empty() && !ids.insert(action.id.as_str()) {
            return Err(StewardError::Validation(format!(
                "action id '{}' is used more than once in the plan",
                action.id
            )));
        }
    }
    validate_stage_dependencies(plan)
}

fn validate_stage_dependencies(plan: &ExecutionPlan) -> Result<()> {
    // Ids completed in prior stages
    let mut seen: HashSet<&str> = HashSet::new();

    for (index, stage) in plan.plan.iter().enumerate() {
        for action in &stage.actions {
            for value in action.payload.values() {
                check_refs_available(value, &seen, index, &action.id)?;
            }
        }
        for action in &stage.actions {
            if !action.id.is_empty() {
                seen.insert(action.id.as_str());
            }
        }
    }
    Ok(())
}

fn check_refs_available(
    value: &Value,
    seen: &HashSet<&str>,
    stage_index: usize,
    action_id: &str,
) -> Result<()> {
    match value {
        Value::Object(map) => {
            for v in map.values() {
                check_refs_available(v, seen, stage_index, action_id)?;
            }
        }
        Value::Array(items) => {
            for v in items {
                check_refs_available(v, seen, stage_index, action_id)?;
            }
        }
        Value::String(s) => {
            for captures in RESULTS_REF_RE.captures_iter(s) {
                let ref_id = &captures[1];
                if !seen.contains(ref_id) {
                    return Err(StewardError::Validation(format!(
                        "stage {} action '{}' references @results.{}, which is not available \
                         yet (same or later stage). Move this action to a later stage",
                        stage_index + 1,
                        action_id,
                        ref_id
                    )));
                }
            }
        }
        _ => {}
    }
    Ok(())
}

/// Returns the first action id of `plan` that already holds an output in a
/// mission's result store. Follow-up plans must reference prior outputs via
/// `@results.<old_id>.<key>`, never redefine an id.
pub fn first_duplicate_result_id(
    plan: &ExecutionPlan,
    existing_ids: &HashSet<String>,
) -> Option<String> {
    plan.actions()
        .map(|action| &action.id)
        .find(|id| existing_ids.contains(*id))
        .cloned()
}
