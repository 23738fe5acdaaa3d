//! Worker events and the single task that turns them into log lines.
//!
//! Workers never log relay output directly. They send [`WorkerEvent`]s over
//! one channel and [`spawn_event_logger`] emits exactly one tracing event per
//! message, so lines from different cameras never interleave.

use futures::StreamExt;
use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender};
use std::fmt;
use std::time::Duration;
use tokio::task::JoinHandle as TokioJoinHandle;
use tracing::{debug, error, info, warn};

pub type EventSender = UnboundedSender<WorkerEvent>;
pub type EventReceiver = UnboundedReceiver<WorkerEvent>;

/// Severity of one line of relay output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputLevel {
    Error,
    Warning,
    Progress,
    Other,
}

impl OutputLevel {
    pub fn classify(line: &str) -> Self {
        let lower = line.to_lowercase();
        if lower.contains("error") {
            OutputLevel::Error
        } else if lower.contains("warning") {
            OutputLevel::Warning
        } else if line.contains("speed") && line.contains("bitrate") {
            OutputLevel::Progress
        } else {
            OutputLevel::Other
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkerEvent {
    Started {
        camera: String,
        pid: Option<u32>,
        command: String,
    },
    Output {
        camera: String,
        level: OutputLevel,
        line: String,
    },
    Failed {
        camera: String,
        error: String,
    },
    Terminating {
        camera: String,
        grace: Duration,
    },
    Killed {
        camera: String,
    },
    Exited {
        camera: String,
        code: Option<i32>,
        uptime: Duration,
        interrupted: bool,
    },
}

impl WorkerEvent {
    pub fn camera(&self) -> &str {
        match self {
            WorkerEvent::Started { camera, .. }
            | WorkerEvent::Output { camera, .. }
            | WorkerEvent::Failed { camera, .. }
            | WorkerEvent::Terminating { camera, .. }
            | WorkerEvent::Killed { camera }
            | WorkerEvent::Exited { camera, .. } => camera,
        }
    }

    /// Emit this event through tracing.
    pub fn log(&self) {
        let camera = self.camera();
        match self {
            WorkerEvent::Started { pid, command, .. } => {
                info!(camera, ?pid, command, "{self}");
            }
            WorkerEvent::Output { level, line, .. } => match level {
                OutputLevel::Error => error!(camera, "relay: {line}"),
                OutputLevel::Warning => warn!(camera, "relay: {line}"),
                OutputLevel::Progress => info!(camera, "status: {line}"),
                OutputLevel::Other => debug!(camera, "relay: {line}"),
            },
            WorkerEvent::Failed { error, .. } => {
                error!(camera, error, "{self}");
            }
            WorkerEvent::Terminating { grace, .. } => {
                info!(camera, ?grace, "{self}");
            }
            WorkerEvent::Killed { .. } => {
                warn!(camera, "{self}");
            }
            WorkerEvent::Exited {
                code,
                uptime,
                interrupted,
                ..
            } => {
                if *interrupted || *code == Some(0) {
                    info!(camera, ?code, ?uptime, interrupted, "{self}");
                } else {
                    warn!(camera, ?code, ?uptime, "{self}");
                }
            }
        }
    }
}

impl fmt::Display for WorkerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerEvent::Started { camera, pid, .. } => match pid {
                Some(pid) => write!(f, "{camera} started with PID {pid}"),
                None => write!(f, "{camera} started"),
            },
            WorkerEvent::Output { camera, line, .. } => write!(f, "{camera}: {line}"),
            WorkerEvent::Failed { camera, error } => {
                write!(f, "{camera} failed: {error}")
            }
            WorkerEvent::Terminating { camera, .. } => write!(f, "Terminating stream for {camera}"),
            WorkerEvent::Killed { camera } => {
                write!(f, "{camera} did not stop within the grace period, killed")
            }
            WorkerEvent::Exited { camera, code, .. } => match code {
                Some(code) => write!(f, "{camera} exited with code {code}"),
                None => write!(f, "{camera} was terminated by a signal"),
            },
        }
    }
}

/// Consume events until every sender is gone.
pub fn spawn_event_logger(mut rx: EventReceiver) -> TokioJoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.next().await {
            event.log();
        }
        debug!("Event logger finished");
    })
}
