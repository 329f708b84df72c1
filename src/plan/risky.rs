use super::ExecutionPlan;

/// Actions that always require human confirmation before execution.
const RISKY_ACTIONS: &[&str] = &[
    "system.execute_shell",
    "system.delete_folder",
    "system.shutdown",
];

/// A plan is risky iff any of its actions is in the risky set. Risky plans
/// force confirmation regardless of what the intent analyzer decided.
pub fn is_plan_risky(plan: &ExecutionPlan) -> bool {
    plan.actions()
        .any(|action| RISKY_ACTIONS.contains(&action.action.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{Action, ExecutionStage, PlanMeta};

    fn plan_with(actions: Vec<&str>) -> ExecutionPlan {
        ExecutionPlan {
            meta: PlanMeta::default(),
            plan: vec![ExecutionStage {
                stage: 1,
                actions: actions
                    .into_iter()
                    .map(|name| Action {
                        id: String::new(),
                        action: name.into(),
                        payload: Default::default(),
                    })
                    .collect(),
            }],
        }
    }

    #[test]
    fn test_delete_folder_is_risky() {
        assert!(is_plan_risky(&plan_with(vec!["system.delete_folder"])));
    }

    #[test]
    fn test_shell_among_safe_actions_is_risky() {
        assert!(is_plan_risky(&plan_with(vec![
            "system.create_file",
            "system.execute_shell",
        ])));
    }

    #[test]
    fn test_safe_plan_is_not_risky() {
        assert!(!is_plan_risky(&plan_with(vec![
            "system.create_file",
            "llm.generate_content",
            "web.request",
        ])));
    }

    #[test]
    fn test_empty_plan_is_not_risky() {
        let empty = ExecutionPlan {
            meta: PlanMeta::default(),
            plan: Vec::new(),
        };
        assert!(!is_plan_risky(&empty));
    }
}
