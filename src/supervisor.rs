use crate::camera::CameraSource;
use crate::command::{CommandPlan, RelaySettings};
use crate::events::{EventSender, WorkerEvent};
use crate::worker::{StreamWorker, WorkerReport};
use std::time::Duration;
use tokio::task::JoinHandle as TokioJoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// Launches one relay per camera and supervises them until they all stop.
#[derive(Clone)]
pub struct Supervisor {
    settings: RelaySettings,
    grace: Duration,
    shutdown: CancellationToken,
    events: EventSender,
}

enum Slot {
    Failed(WorkerReport),
    Running(String, TokioJoinHandle<WorkerReport>),
}

impl Supervisor {
    pub fn new(settings: RelaySettings, grace: Duration, events: EventSender) -> Self {
        Self {
            settings,
            grace,
            shutdown: CancellationToken::new(),
            events,
        }
    }

    /// Cancelling this token stops every running worker.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn plan(&self, source: &CameraSource) -> CommandPlan {
        CommandPlan::for_camera(source, &self.settings)
    }

    /// Run every camera until all relays exit or shutdown is requested.
    ///
    /// Reports come back in the same order as `sources`.
    pub async fn run_all(&self, sources: &[CameraSource]) -> Vec<WorkerReport> {
        let plans = sources.iter().map(|source| self.plan(source)).collect();
        self.run_plans(plans).await
    }

    pub async fn run_plans(&self, plans: Vec<CommandPlan>) -> Vec<WorkerReport> {
        let mut launched = Vec::with_capacity(plans.len());
        for plan in plans {
            let camera = plan.camera.clone();
            if self.shutdown.is_cancelled() {
                debug!(camera, "Shutdown requested before launch");
                launched.push(Err(WorkerReport::failed(
                    camera,
                    "interrupted before launch".to_string(),
                )));
                continue;
            }

            info!(camera, "Starting stream");
            match StreamWorker::launch(plan, self.events.clone()) {
                Ok(worker) => {
                    debug!(camera, pid = ?worker.pid(), state = ?worker.state(), "Relay launched");
                    launched.push(Ok(worker));
                }
                Err(error) => {
                    _ = self.events.unbounded_send(WorkerEvent::Failed {
                        camera: camera.clone(),
                        error: error.to_string(),
                    });
                    launched.push(Err(WorkerReport::failed(camera, error.to_string())));
                }
            }
        }

        // supervision only starts once every launch has been attempted
        let slots = launched
            .into_iter()
            .map(|worker| match worker {
                Ok(worker) => {
                    let camera = worker.camera().to_string();
                    let task = tokio::spawn(worker.supervise(self.shutdown.clone(), self.grace));
                    Slot::Running(camera, task)
                }
                Err(report) => Slot::Failed(report),
            })
            .collect::<Vec<_>>();

        let mut reports = Vec::with_capacity(slots.len());
        for slot in slots {
            let report = match slot {
                Slot::Failed(report) => report,
                Slot::Running(camera, task) => match task.await {
                    Ok(report) => report,
                    Err(join_error) => {
                        error!(camera, ?join_error, "Worker task failed");
                        WorkerReport::failed(camera, format!("worker task failed: {join_error}"))
                    }
                },
            };
            reports.push(report);
        }

        reports
    }
}
