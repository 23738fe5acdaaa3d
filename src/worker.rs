use crate::command::CommandPlan;
use crate::error::LaunchError;
use crate::events::{EventSender, OutputLevel, WorkerEvent};
use crate::redact::Redactor;
use futures::StreamExt;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::process::{Child, ChildStderr, Command};
use tokio::task::JoinHandle as TokioJoinHandle;
use tokio_util::codec::{AnyDelimiterCodec, FramedRead};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Longest relay output line forwarded before it is treated as garbage.
const MAX_LINE: usize = 16 * 1024;
/// How long to wait for buffered relay output after the process exited.
const OUTPUT_FLUSH: Duration = Duration::from_millis(500);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkerState {
    /// Spawned but not supervised yet.
    Starting,
    Running,
    /// `None` when the process was ended by a signal.
    Exited(Option<i32>),
    Failed(String),
}

impl WorkerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerState::Exited(_) | WorkerState::Failed(_))
    }
}

/// Final outcome of one worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerReport {
    pub camera: String,
    pub state: WorkerState,
    pub uptime: Duration,
    /// The process was stopped because of a shutdown request.
    pub interrupted: bool,
}

impl WorkerReport {
    pub fn failed(camera: String, error: String) -> Self {
        Self {
            camera,
            state: WorkerState::Failed(error),
            uptime: Duration::ZERO,
            interrupted: false,
        }
    }
}

/// One camera bound to the relay process it started.
pub struct StreamWorker {
    camera: String,
    child: Child,
    pid: Option<u32>,
    started_at: Instant,
    state: WorkerState,
    events: EventSender,
    output: Option<TokioJoinHandle<()>>,
}

impl StreamWorker {
    /// Spawn the relay process described by `plan`. Returns as soon as the
    /// process exists; its stderr is forwarded to `events` line by line.
    pub fn launch(plan: CommandPlan, events: EventSender) -> Result<Self, LaunchError> {
        let Some((program, args)) = plan.argv.split_first() else {
            return Err(LaunchError::EmptyCommand(plan.camera));
        };

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Keep terminal signals away from the relay; the supervisor forwards them.
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|source| LaunchError::Spawn {
            camera: plan.camera.clone(),
            program: program.clone(),
            source,
        })?;

        let pid = child.id();
        let output = child.stderr.take().map(|stderr| {
            forward_output(
                plan.camera.clone(),
                plan.redactor.clone(),
                stderr,
                events.clone(),
            )
        });

        _ = events.unbounded_send(WorkerEvent::Started {
            camera: plan.camera.clone(),
            pid,
            command: plan.redacted.join(" "),
        });

        Ok(Self {
            camera: plan.camera,
            child,
            pid,
            started_at: Instant::now(),
            state: WorkerState::Starting,
            events,
            output,
        })
    }

    pub fn camera(&self) -> &str {
        &self.camera
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn state(&self) -> &WorkerState {
        &self.state
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Wait for the relay to exit, or stop it once `shutdown` fires.
    ///
    /// A stopped relay gets a termination request and `grace` to exit before
    /// it is killed. The process is never restarted.
    pub async fn supervise(mut self, shutdown: CancellationToken, grace: Duration) -> WorkerReport {
        self.state = WorkerState::Running;
        let (status, interrupted) = tokio::select! {
            status = self.child.wait() => (status, false),
            _ = shutdown.cancelled() => (self.terminate(grace).await, true),
        };

        self.state = match status {
            Ok(status) => WorkerState::Exited(status.code()),
            Err(error) => WorkerState::Failed(format!("failed to wait for relay: {error}")),
        };
        let uptime = self.uptime();

        if let Some(mut output) = self.output.take()
            && tokio::time::timeout(OUTPUT_FLUSH, &mut output).await.is_err()
        {
            debug!(camera = %self.camera, "Relay output still open after exit");
            output.abort();
        }

        match &self.state {
            WorkerState::Exited(code) => {
                _ = self.events.unbounded_send(WorkerEvent::Exited {
                    camera: self.camera.clone(),
                    code: *code,
                    uptime,
                    interrupted,
                });
            }
            WorkerState::Failed(error) => {
                _ = self.events.unbounded_send(WorkerEvent::Failed {
                    camera: self.camera.clone(),
                    error: error.clone(),
                });
            }
            WorkerState::Starting | WorkerState::Running => {}
        }

        WorkerReport {
            camera: self.camera,
            state: self.state,
            uptime,
            interrupted,
        }
    }

    async fn terminate(&mut self, grace: Duration) -> std::io::Result<ExitStatus> {
        _ = self.events.unbounded_send(WorkerEvent::Terminating {
            camera: self.camera.clone(),
            grace,
        });
        self.request_stop();

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => status,
            Err(_) => {
                _ = self.events.unbounded_send(WorkerEvent::Killed {
                    camera: self.camera.clone(),
                });
                self.kill_group();
                self.child.kill().await?;
                self.child.wait().await
            }
        }
    }

    /// SIGTERM to the relay's whole process group, so Streamlink's player
    /// and any other helper it spawned stop along with it.
    #[cfg(unix)]
    fn request_stop(&mut self) {
        self.signal_group(nix::sys::signal::Signal::SIGTERM);
    }

    #[cfg(not(unix))]
    fn request_stop(&mut self) {
        if let Err(error) = self.child.start_kill() {
            warn!(camera = %self.camera, %error, "Failed to stop relay");
        }
    }

    /// The leader is still unreaped here, so its group id cannot have been reused.
    #[cfg(unix)]
    fn kill_group(&mut self) {
        self.signal_group(nix::sys::signal::Signal::SIGKILL);
    }

    #[cfg(not(unix))]
    fn kill_group(&mut self) {}

    #[cfg(unix)]
    fn signal_group(&self, signal: nix::sys::signal::Signal) {
        use nix::errno::Errno;
        use nix::sys::signal::killpg;
        use nix::unistd::Pid;

        let Some(pid) = self.pid else {
            return;
        };
        match killpg(Pid::from_raw(pid as i32), signal) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(error) => {
                warn!(camera = %self.camera, pid, %signal, %error, "Failed to signal relay process group");
            }
        }
    }
}

/// Forward relay stderr as events. FFmpeg ends progress lines with `\r`,
/// so both `\r` and `\n` split lines.
fn forward_output(
    camera: String,
    redactor: Redactor,
    stderr: ChildStderr,
    events: EventSender,
) -> TokioJoinHandle<()> {
    tokio::spawn(async move {
        let codec = AnyDelimiterCodec::new_with_max_length(b"\r\n".to_vec(), Vec::new(), MAX_LINE);
        let mut lines = FramedRead::new(stderr, codec);

        while let Some(line) = lines.next().await {
            let line = match line {
                Ok(line) => line,
                Err(error) => {
                    warn!(camera = %camera, %error, "Unreadable relay output, discarding the rest");
                    // keep draining so the relay never blocks on a full pipe
                    let mut stderr = lines.into_inner();
                    _ = tokio::io::copy(&mut stderr, &mut tokio::io::sink()).await;
                    break;
                }
            };

            let line = String::from_utf8_lossy(&line);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            _ = events.unbounded_send(WorkerEvent::Output {
                camera: camera.clone(),
                level: OutputLevel::classify(line),
                line: redactor.apply(line),
            });
        }
    })
}
