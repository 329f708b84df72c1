//! The multi-plan mission loop: retries, stage renumbering, evidence
//! handoff, re-plan generation and approval.

use std::collections::HashSet;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::mission::{Mission, MissionResult, MissionState, PlanApproval, PlanPreview};
use super::SupervisorInner;
use crate::error::{Result, StewardError};
use crate::metrics::{MissionMetrics, StageMetrics};
use crate::plan::{ConversationTurn, first_duplicate_result_id, is_plan_risky};
use crate::planner::follow_up_goal;

enum ApprovalOutcome {
    Approved,
    Rejected,
    TimedOut,
    Cancelled,
}

impl SupervisorInner {
    /// Drives one mission to a terminal state and publishes exactly one
    /// MissionResult.
    pub(super) async fn run_mission(&self, mission: &mut Mission, cancel: &CancellationToken) {
        let mission_start = Utc::now();
        let mut all_stages: Vec<StageMetrics> = Vec::new();

        let outcome = self
            .run_plans(mission, cancel, &mut all_stages)
            .await;

        mission.state = match &outcome {
            Ok(()) => MissionState::Succeeded,
            Err(e) if e.is_cancellation() => MissionState::Cancelled,
            Err(_) => MissionState::Failed,
        };

        let metrics = MissionMetrics::finalize(
            mission.id.clone(),
            mission_start,
            outcome.is_ok(),
            all_stages,
        );

        match &outcome {
            Ok(()) => info!(mission_id = %mission.id, "Mission SUCCEEDED"),
            Err(e) => info!(mission_id = %mission.id, state = %mission.state, error = %e, "Mission finished"),
        }

        let result = MissionResult {
            mission_id: mission.id.clone(),
            original_goal: mission.original_goal.clone(),
            final_plan: serde_json::to_string(&mission.plan).unwrap_or_default(),
            error: outcome.err().map(|e| e.to_string()),
            metrics: Some(metrics),
        };
        if self.result_tx.send(result).await.is_err() {
            warn!(mission_id = %mission.id, "Result channel closed, dropping mission result");
        }
    }

    async fn run_plans(
        &self,
        mission: &mut Mission,
        cancel: &CancellationToken,
        all_stages: &mut Vec<StageMetrics>,
    ) -> Result<()> {
        loop {
            self.run_current_plan(mission, cancel, all_stages).await?;

            if !mission.plan.meta.replan {
                return Ok(());
            }

            self.collect_evidence(mission).await;

            let goal = follow_up_goal(
                &mission.original_goal,
                mission.last_stage,
                mission.evidence.as_str(),
            );
            info!(
                mission_id = %mission.id,
                last_stage = mission.last_stage,
                "Requesting follow-up plan"
            );

            let new_plan = self
                .planner
                .generate_plan(cancel, &mission.history, &goal)
                .await?;

            // Follow-up plans must reference prior outputs via @results,
            // never redefine an id that already holds results.
            let existing: HashSet<String> = mission.results.lock().keys().cloned().collect();
            if let Some(duplicate) = first_duplicate_result_id(&new_plan, &existing) {
                return Err(StewardError::ReplanDuplicateId(duplicate));
            }

            if mission.require_confirm || is_plan_risky(&new_plan) {
                let plan_json = serde_json::to_string(&new_plan)?;
                match self.await_approval(mission, plan_json, cancel).await? {
                    ApprovalOutcome::Approved => {
                        info!(mission_id = %mission.id, "Re-plan approved");
                    }
                    ApprovalOutcome::Rejected => return Err(StewardError::ApprovalRejected),
                    ApprovalOutcome::TimedOut => return Err(StewardError::ApprovalTimeout),
                    ApprovalOutcome::Cancelled => return Err(StewardError::Cancelled),
                }
            }

            mission.history.push(ConversationTurn {
                user_goal: goal,
                assistant_plan: serde_json::to_string(&new_plan).unwrap_or_default(),
                execution_error: None,
            });
            mission.plan = new_plan;
        }
    }

    /// Retry loop for the mission's current plan. Stage numbers are shifted
    /// by `last_stage` so numbering is monotonic across the whole mission.
    async fn run_current_plan(
        &self,
        mission: &mut Mission,
        cancel: &CancellationToken,
        all_stages: &mut Vec<StageMetrics>,
    ) -> Result<()> {
        mission.current_attempt = 0;
        let mut last_err: Option<StewardError> = None;

        while mission.current_attempt < mission.max_retries {
            mission.current_attempt += 1;
            info!(
                mission_id = %mission.id,
                attempt = mission.current_attempt,
                max_retries = mission.max_retries,
                "Executing plan"
            );

            let plan_for_exec = mission.plan.renumbered(mission.last_stage);
            let (stages, result) = self
                .executor
                .execute_plan(&plan_for_exec, &mission.results, cancel)
                .await;
            all_stages.extend(stages);

            match result {
                Ok(()) => {
                    mission.last_stage = plan_for_exec.max_stage();
                    return Ok(());
                }
                Err(e) if e.is_cancellation() => return Err(e),
                Err(e) => {
                    warn!(
                        mission_id = %mission.id,
                        attempt = mission.current_attempt,
                        error = %e,
                        "Plan attempt failed"
                    );
                    mission.history.push(ConversationTurn {
                        user_goal: mission.original_goal.clone(),
                        assistant_plan: serde_json::to_string(&mission.plan).unwrap_or_default(),
                        execution_error: Some(e.to_string()),
                    });
                    last_err = Some(e);

                    if mission.current_attempt < mission.max_retries {
                        let delay = Duration::from_millis(self.config.supervisor.retry_delay_ms);
                        tokio::select! {
                            _ = cancel.cancelled() => return Err(StewardError::Cancelled),
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| StewardError::Other("plan failed with no error".into())))
    }

    /// Reads the handoff artifact (if any), persists a timestamped copy into
    /// the scratch directory and appends its contents to the evidence
    /// buffer. Missing or unreadable handoff files are not fatal.
    async fn collect_evidence(&self, mission: &mut Mission) {
        let handoff = mission.plan.meta.handoff_path.trim().to_string();
        if handoff.is_empty() {
            return;
        }

        let content = match tokio::fs::read_to_string(&handoff).await {
            Ok(content) => content,
            Err(e) => {
                warn!(
                    mission_id = %mission.id,
                    handoff_path = %handoff,
                    error = %e,
                    "Could not read handoff evidence"
                );
                return;
            }
        };

        let base = std::path::Path::new(&handoff)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "evidence".to_string());
        let copy = mission
            .scratch_dir
            .join(format!("{}_{base}", Utc::now().format("%Y%m%dT%H%M%S%.3f")));
        if let Err(e) = tokio::fs::write(&copy, &content).await {
            warn!(
                mission_id = %mission.id,
                copy = %copy.display(),
                error = %e,
                "Could not persist evidence copy"
            );
        }

        mission.evidence.append(&content);
        info!(
            mission_id = %mission.id,
            handoff_path = %handoff,
            evidence_len = mission.evidence.as_str().len(),
            "Evidence collected"
        );
    }

    /// Publishes a preview and waits for the matching approval. Responses
    /// for other missions are ignored; the wait is bounded and raced
    /// against mission cancellation.
    async fn await_approval(
        &self,
        mission: &Mission,
        plan_json: String,
        cancel: &CancellationToken,
    ) -> Result<ApprovalOutcome> {
        self.preview_tx
            .send(PlanPreview {
                mission_id: mission.id.clone(),
                plan_json,
            })
            .await
            .map_err(|_| StewardError::Other("preview channel closed".into()))?;

        info!(mission_id = %mission.id, "Awaiting re-plan approval");

        let budget = Duration::from_secs(self.config.supervisor.approval_timeout_secs);
        let deadline = tokio::time::Instant::now() + budget;
        let mut rx = self.approval_rx.lock().await;

        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Ok(ApprovalOutcome::TimedOut);
            }

            tokio::select! {
                _ = cancel.cancelled() => return Ok(ApprovalOutcome::Cancelled),
                received = tokio::time::timeout(remaining, rx.recv()) => match received {
                    Err(_) => return Ok(ApprovalOutcome::TimedOut),
                    Ok(None) => return Ok(ApprovalOutcome::TimedOut),
                    Ok(Some(PlanApproval { mission_id, approved })) => {
                        if mission_id != mission.id {
                            continue;
                        }
                        return Ok(if approved {
                            ApprovalOutcome::Approved
                        } else {
                            ApprovalOutcome::Rejected
                        });
                    }
                },
            }
        }
    }
}
