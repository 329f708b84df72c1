//! Loads one or many named plans from a JSON file.
//!
//! Three on-disk shapes are accepted and normalized to `Vec<NamedPlan>`:
//!
//! 1. `{ "plans": [ ... ] }` where each entry is `{name?, plan: [stages]}`
//!    or a bare `[stages]` array.
//! 2. A top-level JSON array with the same element rules.
//! 3. A single plan: `{ "plan": [stages] }` or a bare `[stages]`.
//!
//! Unnamed entries are auto-named `"manual:<file_basename>#<index>"`.

use std::path::Path;

use serde_json::Value;
use tokio::fs;

use super::{ExecutionPlan, ExecutionStage, NamedPlan, PlanMeta};
use crate::error::{Result, StewardError};

pub async fn load_plans_from_file(path: &Path) -> Result<Vec<NamedPlan>> {
    let raw = fs::read_to_string(path)
        .await
        .map_err(|_| StewardError::Validation(format!("plans file not found: {}", path.display())))?;
    let base = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let doc: Value = serde_json::from_str(&raw)
        .map_err(|e| StewardError::Validation(format!("invalid JSON in {}: {e}", path.display())))?;

    // Shape 1: object with a "plans" array
    if let Some(entries) = doc.get("plans").and_then(Value::as_array)
        && !entries.is_empty()
    {
        return parse_plan_list(entries, &base);
    }

    // Shape 2: bare array of plan entries. A top-level array of stages is a
    // single plan, so only treat the array as a plan list when its entries
    // are not stage objects.
    if let Some(entries) = doc.as_array()
        && !entries.is_empty()
        && parse_stages(&doc).is_none()
    {
        return parse_plan_list(entries, &base);
    }

    // Shape 3: a single plan document
    if let Some(plan) = parse_one_plan(&doc) {
        return Ok(vec![NamedPlan {
            name: format!("manual:{base}"),
            plan,
        }]);
    }

    Err(StewardError::Validation(format!(
        "unrecognized plans format in {}",
        path.display()
    )))
}

fn parse_plan_list(entries: &[Value], base: &str) -> Result<Vec<NamedPlan>> {
    let mut out = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let Some(plan) = parse_one_plan(entry) else {
            return Err(StewardError::Validation(format!(
                "could not parse plan #{}",
                index + 1
            )));
        };
        let name = entry
            .get("name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("manual:{base}#{}", index + 1));
        out.push(NamedPlan { name, plan });
    }
    Ok(out)
}

/// Accepts `{meta?, plan: [stages]}` or a bare `[stages]` array.
fn parse_one_plan(value: &Value) -> Option<ExecutionPlan> {
    if let Some(stages) = value.get("plan").and_then(parse_stages) {
        let meta = value
            .get("meta")
            .and_then(|m| serde_json::from_value::<PlanMeta>(m.clone()).ok())
            .unwrap_or_default();
        return Some(ExecutionPlan { meta, plan: stages });
    }
    parse_stages(value).map(|stages| ExecutionPlan {
        meta: PlanMeta::default(),
        plan: stages,
    })
}

fn parse_stages(value: &Value) -> Option<Vec<ExecutionStage>> {
    let stages: Vec<ExecutionStage> = serde_json::from_value(value.clone()).ok()?;
    if stages.is_empty() { None } else { Some(stages) }
}

/// Filters plans by the given names, order-preserving and case-insensitive.
/// Empty `names` selects everything. Returns the selection plus any
/// requested names that matched nothing.
pub fn select_by_names(plans: &[NamedPlan], names: &[String]) -> (Vec<NamedPlan>, Vec<String>) {
    if names.is_empty() {
        return (plans.to_vec(), Vec::new());
    }

    let mut selected = Vec::new();
    let mut missing = Vec::new();

    for want in names {
        let trimmed = want.trim();
        if trimmed.is_empty() {
            continue;
        }
        match plans
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(trimmed))
        {
            Some(found) => selected.push(found.clone()),
            None => missing.push(want.clone()),
        }
    }

    (selected, missing)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str) -> NamedPlan {
        NamedPlan {
            name: name.into(),
            plan: ExecutionPlan {
                meta: PlanMeta::default(),
                plan: vec![ExecutionStage {
                    stage: 1,
                    actions: Vec::new(),
                }],
            },
        }
    }

    #[test]
    fn test_select_empty_names_returns_all() {
        let plans = vec![named("alpha"), named("beta")];
        let (selected, missing) = select_by_names(&plans, &[]);
        assert_eq!(selected.len(), 2);
        assert!(missing.is_empty());
    }

    #[test]
    fn test_select_preserves_request_order_case_insensitive() {
        let plans = vec![named("alpha"), named("beta"), named("gamma")];
        let (selected, missing) =
            select_by_names(&plans, &["GAMMA".into(), "alpha".into(), "delta".into()]);
        let names: Vec<_> = selected.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["gamma", "alpha"]);
        assert_eq!(missing, vec!["delta".to_string()]);
    }
}
