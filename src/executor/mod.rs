//! Two-level plan scheduler: stages run sequentially, actions within a
//! stage run in bounded parallel.

mod resolve;

pub use resolve::{ResultStore, SharedResults, new_shared_results, resolve_payload};

use std::sync::Arc;

use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::actions::HandlerRegistry;
use crate::error::{Result, StewardError};
use crate::metrics::{ActionMetrics, StageMetrics};
use crate::plan::{Action, ActionRegistry, ExecutionPlan};

pub struct PlanExecutor {
    registry: Arc<ActionRegistry>,
    handlers: Arc<HandlerRegistry>,
    stage_concurrency: usize,
}

impl PlanExecutor {
    pub fn new(
        registry: Arc<ActionRegistry>,
        handlers: Arc<HandlerRegistry>,
        stage_concurrency: usize,
    ) -> Self {
        Self {
            registry,
            handlers,
            stage_concurrency: stage_concurrency.max(1),
        }
    }

    /// Runs every stage of `plan` in order against the caller-owned result
    /// store. Stage metrics are returned even when execution fails partway,
    /// so the caller can fold them into mission metrics.
    ///
    /// Within a stage the first action error cancels the stage scope, the
    /// remaining siblings are drained (their metrics kept, their errors
    /// discarded), and the first error is returned.
    pub async fn execute_plan(
        &self,
        plan: &ExecutionPlan,
        results: &SharedResults,
        cancel: &CancellationToken,
    ) -> (Vec<StageMetrics>, Result<()>) {
        let mut stages = Vec::with_capacity(plan.plan.len());

        for stage in &plan.plan {
            if cancel.is_cancelled() {
                return (stages, Err(StewardError::Cancelled));
            }

            let mut stage_metrics = StageMetrics::begin(stage.stage);
            let outcome = self
                .execute_stage(&stage.actions, results, cancel, &mut stage_metrics)
                .await;
            stage_metrics.finalize();

            debug!(
                stage = stage.stage,
                duration_ms = stage_metrics.duration_ms,
                action_count = stage_metrics.actions.len(),
                success = outcome.is_ok(),
                "Stage finished"
            );

            stages.push(stage_metrics);
            if let Err(e) = outcome {
                return (stages, Err(e));
            }
        }

        (stages, Ok(()))
    }

    async fn execute_stage(
        &self,
        actions: &[Action],
        results: &SharedResults,
        cancel: &CancellationToken,
        stage_metrics: &mut StageMetrics,
    ) -> Result<()> {
        let stage_token = cancel.child_token();
        let semaphore = Arc::new(Semaphore::new(self.stage_concurrency));

        let mut pending: FuturesUnordered<_> = actions
            .iter()
            .map(|action| {
                let action = action.clone();
                let registry = Arc::clone(&self.registry);
                let handlers = Arc::clone(&self.handlers);
                let results = Arc::clone(results);
                let token = stage_token.child_token();
                let semaphore = Arc::clone(&semaphore);

                let identity = (action.id.clone(), action.action.clone());
                let handle = tokio::spawn(async move {
                    run_action(action, registry, handlers, results, token, semaphore).await
                });

                async move {
                    match handle.await {
                        Ok(outcome) => outcome,
                        Err(join_err) => {
                            let (id, name) = identity;
                            let err = StewardError::PanicRecovered {
                                action: name.clone(),
                                detail: panic_detail(join_err),
                            };
                            let metrics =
                                ActionMetrics::record(id, name, Utc::now(), Some(err.to_string()));
                            (metrics, Err(err))
                        }
                    }
                }
            })
            .collect();

        let mut first_err: Option<StewardError> = None;

        while let Some((metrics, outcome)) = pending.next().await {
            if let Err(e) = outcome {
                if first_err.is_none() {
                    warn!(
                        action_id = %metrics.id,
                        action = %metrics.action,
                        error = %e,
                        "Action failed, cancelling stage siblings"
                    );
                    stage_token.cancel();
                    first_err = Some(e);
                }
                // Sibling errors after the first are discarded; their
                // metrics are still collected below.
            }
            stage_metrics.actions.push(metrics);
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

async fn run_action(
    action: Action,
    registry: Arc<ActionRegistry>,
    handlers: Arc<HandlerRegistry>,
    results: SharedResults,
    token: CancellationToken,
    semaphore: Arc<Semaphore>,
) -> (ActionMetrics, Result<()>) {
    let started = Utc::now();

    let _permit = match semaphore.acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            let err = StewardError::Other("stage semaphore closed".into());
            return (
                ActionMetrics::record(action.id, action.action, started, Some(err.to_string())),
                Err(err),
            );
        }
    };

    // Snapshot under the lock, release, then substitute references.
    let snapshot = { results.lock().clone() };
    let resolved = resolve_payload(&action.payload, &snapshot);
    let timeout = registry.action_timeout(&action.action);

    let started = Utc::now();
    let outcome = tokio::select! {
        _ = token.cancelled() => Err(StewardError::Cancelled),
        dispatched = tokio::time::timeout(timeout, handlers.dispatch(&token, &action.action, resolved)) => {
            match dispatched {
                Ok(Ok(output)) => {
                    if let Some(output) = output {
                        results.lock().insert(action.id.clone(), output);
                    }
                    Ok(())
                }
                Ok(Err(StewardError::Cancelled)) => Err(StewardError::Cancelled),
                Ok(Err(cause)) => Err(StewardError::ActionFailure {
                    action: action.action.clone(),
                    id: action.id.clone(),
                    cause: cause.to_string(),
                }),
                Err(_) => Err(StewardError::ActionTimeout {
                    action: action.action.clone(),
                    id: action.id.clone(),
                    timeout_ms: timeout.as_millis() as u64,
                }),
            }
        }
    };

    let err_text = outcome.as_ref().err().map(ToString::to_string);
    (
        ActionMetrics::record(action.id, action.action, started, err_text),
        outcome,
    )
}

fn panic_detail(join_err: tokio::task::JoinError) -> String {
    if join_err.is_panic() {
        let payload = join_err.into_panic();
        if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        }
    } else {
        join_err.to_string()
    }
}
