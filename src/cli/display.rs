//! Terminal formatting for plans, catalogs and metrics.

use std::fmt::Write as _;

use serde_json::Value;

use crate::metrics::MissionMetrics;
use crate::payload::value_to_string;
use crate::plan::{ExecutionPlan, NamedPlan, is_plan_risky};

const MAX_PAYLOAD_VALUE_LENGTH: usize = 100;

pub fn format_plan(plan: &ExecutionPlan) -> String {
    let mut out = String::from("Proposed execution plan:\n");
    out.push_str("--------------------------------------------------\n");

    for stage in &plan.plan {
        let _ = writeln!(out, "Stage {}:", stage.stage);
        for action in &stage.actions {
            let _ = writeln!(out, "  - Action: {} (ID: {})", action.action, action.id);
            if !action.payload.is_empty() {
                out.push_str("    Payload:\n");
                for (key, value) in &action.payload {
                    let _ = writeln!(out, "      {key}: {}", format_value_for_display(value));
                }
            }
        }
    }
    out.push_str("--------------------------------------------------");
    out
}

fn format_value_for_display(value: &Value) -> String {
    let rendered = value_to_string(value).replace('\n', "\\n");
    if rendered.chars().count() > MAX_PAYLOAD_VALUE_LENGTH {
        let truncated: String = rendered.chars().take(MAX_PAYLOAD_VALUE_LENGTH).collect();
        format!("{truncated}...")
    } else {
        rendered
    }
}

pub fn format_mission_metrics(metrics: &MissionMetrics) -> String {
    let mut out = String::from("Execution metrics:\n");
    let _ = writeln!(
        out,
        "- Total: {} ms  (success={})",
        metrics.duration_ms, metrics.succeeded
    );
    for stage in &metrics.stages {
        let _ = writeln!(out, "  Stage {}: {} ms", stage.stage, stage.duration_ms);
        for action in &stage.actions {
            let status = if action.success { "ok" } else { "err" };
            let _ = writeln!(
                out,
                "    - {:<12} {:<22} {:>5} ms  [{status}]",
                action.id,
                format!("({})", action.action),
                action.duration_ms
            );
        }
    }
    out
}

pub fn format_plans_catalog(file: &str, plans: &[NamedPlan]) -> String {
    let mut out = format!("Found {} mission(s) in {file}:\n", plans.len());
    for (index, named) in plans.iter().enumerate() {
        let stages = named.plan.plan.len();
        let actions: usize = named.plan.plan.iter().map(|s| s.actions.len()).sum();
        let _ = writeln!(
            out,
            "  {:>2}. {}  (stages={stages}, actions={actions}, risky={})",
            index + 1,
            named.name,
            is_plan_risky(&named.plan)
        );
    }
    out
}
