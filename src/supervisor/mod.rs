//! Long-lived mission controller: owns the mission queue, the cancel
//! registry for the currently running mission, and the outbound result /
//! preview / approval channels.

mod mission;
mod runner;

pub use mission::{
    EvidenceBuffer, Mission, MissionResult, MissionState, PlanApproval, PlanPreview,
};

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::StewardConfig;
use crate::error::{Result, StewardError};
use crate::executor::PlanExecutor;
use crate::plan::{ConversationTurn, ExecutionPlan};
use crate::planner::Planner;

struct RunningMission {
    id: String,
    cancel: CancellationToken,
}

pub(crate) struct SupervisorInner {
    pub(crate) config: StewardConfig,
    pub(crate) executor: PlanExecutor,
    pub(crate) planner: Arc<Planner>,
    current: Mutex<Option<RunningMission>>,
    pub(crate) result_tx: mpsc::Sender<MissionResult>,
    pub(crate) preview_tx: mpsc::Sender<PlanPreview>,
    pub(crate) approval_rx: tokio::sync::Mutex<mpsc::Receiver<PlanApproval>>,
}

/// The receiving half of the supervisor's control surface, consumed by the
/// interactive loop.
pub struct SupervisorChannels {
    pub results: mpsc::Receiver<MissionResult>,
    pub previews: mpsc::Receiver<PlanPreview>,
    pub approvals: mpsc::Sender<PlanApproval>,
}

pub struct Supervisor {
    inner: Arc<SupervisorInner>,
    queue_tx: mpsc::Sender<Mission>,
    queue_rx: Mutex<Option<mpsc::Receiver<Mission>>>,
}

impl Supervisor {
    pub fn new(
        config: StewardConfig,
        executor: PlanExecutor,
        planner: Arc<Planner>,
    ) -> (Self, SupervisorChannels) {
        let capacity = config.supervisor.queue_capacity;
        let (queue_tx, queue_rx) = mpsc::channel(capacity);
        let (result_tx, result_rx) = mpsc::channel(capacity);
        let (preview_tx, preview_rx) = mpsc::channel(capacity);
        let (approval_tx, approval_rx) = mpsc::channel(capacity);

        let supervisor = Self {
            inner: Arc::new(SupervisorInner {
                config,
                executor,
                planner,
                current: Mutex::new(None),
                result_tx,
                preview_tx,
                approval_rx: tokio::sync::Mutex::new(approval_rx),
            }),
            queue_tx,
            queue_rx: Mutex::new(Some(queue_rx)),
        };
        let channels = SupervisorChannels {
            results: result_rx,
            previews: preview_rx,
            approvals: approval_tx,
        };
        (supervisor, channels)
    }

    /// Spawns the single mission-runner worker. Missions execute one at a
    /// time; further submissions wait in the bounded queue.
    pub fn start(&self) -> tokio::task::JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        let mut queue_rx = self
            .queue_rx
            .lock()
            .take()
            .expect("supervisor already started");

        tokio::spawn(async move {
            while let Some(mut mission) = queue_rx.recv().await {
                let cancel = CancellationToken::new();
                {
                    let mut current = inner.current.lock();
                    *current = Some(RunningMission {
                        id: mission.id.clone(),
                        cancel: cancel.clone(),
                    });
                }

                mission.state = MissionState::Running;
                info!(
                    mission_id = %mission.id,
                    goal = %mission.original_goal,
                    "Starting mission"
                );

                inner.run_mission(&mut mission, &cancel).await;

                inner.current.lock().take();
            }
        })
    }

    /// Creates a mission for `plan`, prepares its scratch directory and
    /// enqueues it. Returns the new mission id.
    pub async fn submit_mission(
        &self,
        goal: &str,
        plan: ExecutionPlan,
        history: Vec<ConversationTurn>,
        require_confirm: bool,
    ) -> Result<String> {
        let mission = Mission::new(
            goal,
            plan,
            history,
            require_confirm,
            &self.inner.config.paths.scratch_root,
            self.inner.config.supervisor.max_retries,
            self.inner.config.supervisor.evidence_cap_bytes,
        );
        let id = mission.id.clone();

        tokio::fs::create_dir_all(&mission.scratch_dir).await?;

        self.queue_tx
            .send(mission)
            .await
            .map_err(|_| StewardError::Other("mission queue closed".into()))?;

        info!(mission_id = %id, goal = %goal, "Mission submitted");
        Ok(id)
    }

    /// Cancels the running mission if its id matches. Idempotent once the
    /// mission is cancelled; fails when nothing is running or the id does
    /// not match.
    pub fn cancel_mission(&self, mission_id: &str) -> Result<()> {
        let current = self.inner.current.lock();
        match current.as_ref() {
            None => Err(StewardError::NoRunningMission),
            Some(running) if running.id != mission_id => {
                Err(StewardError::MissionNotRunning(mission_id.to_string()))
            }
            Some(running) => {
                running.cancel.cancel();
                info!(mission_id = %mission_id, "Cancellation requested");
                Ok(())
            }
        }
    }

    /// Cancels whichever mission is currently running and returns its id.
    pub fn cancel_most_recent(&self) -> Result<String> {
        let current = self.inner.current.lock();
        match current.as_ref() {
            None => Err(StewardError::NoRunningMission),
            Some(running) => {
                running.cancel.cancel();
                info!(mission_id = %running.id, "Cancellation requested");
                Ok(running.id.clone())
            }
        }
    }
}
