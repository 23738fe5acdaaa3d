pub mod camera;
pub mod command;
pub mod config;
pub mod deps;
pub mod error;
pub mod events;
pub mod redact;
pub mod signals;
pub mod supervisor;
pub mod worker;

use futures::channel::mpsc::unbounded;
use tracing::{info, warn};

//
// Re-export
//
pub use camera::{CameraEntry, CameraSource, Quality, QualityProfile, Relay, Resolution};
pub use command::{CommandPlan, Layout, RelaySettings, build_command};
pub use config::{Config, Mode};
pub use error::{ConfigError, DependencyError, LaunchError};
pub use events::{OutputLevel, WorkerEvent, spawn_event_logger};
pub use supervisor::Supervisor;
pub use worker::{StreamWorker, WorkerReport, WorkerState};

/// Resolve the commands to run for the configured cameras.
pub fn plan(config: &Config, cameras: &[CameraSource]) -> Result<Vec<CommandPlan>, ConfigError> {
    let settings = config.relay_settings();
    match config.mode {
        Mode::Multi => Ok(cameras
            .iter()
            .map(|camera| CommandPlan::for_camera(camera, &settings))
            .collect()),
        Mode::Combined => {
            let key = config
                .destination_key
                .as_deref()
                .ok_or(ConfigError::MissingDestination)?;
            let names = cameras
                .iter()
                .map(|camera| camera.name.as_str())
                .collect::<Vec<_>>()
                .join(" + ");
            Ok(vec![CommandPlan::combined(
                format!("Combined ({names})"),
                cameras,
                config.layout,
                config.switch_interval,
                &config.combined_quality()?,
                key,
                &settings,
            )])
        }
    }
}

pub async fn run(config: Config) -> anyhow::Result<()> {
    let cameras = config.load_cameras()?;
    let plans = plan(&config, &cameras)?;

    if config.print_plan {
        println!("{}", serde_json::to_string_pretty(&plans)?);
        return Ok(());
    }

    let settings = config.relay_settings();
    if config.skip_dependency_check {
        info!("Skipping dependency check");
    } else {
        let streamlink = cameras.iter().any(|camera| camera.relay.is_streamlink());
        deps::check_dependencies(&settings, streamlink, config.mode == Mode::Combined).await?;
    }

    info!(
        mode = %config.mode,
        cameras = cameras.len(),
        streams = plans.len(),
        "Starting camera streams, press Ctrl+C to stop"
    );
    if config.mode == Mode::Combined {
        info!(layout = %config.layout, switch_interval = config.switch_interval, "Combined stream");
    }

    let (tx, rx) = unbounded();
    let logger = spawn_event_logger(rx);

    let supervisor = Supervisor::new(settings, config.grace(), tx);
    let signals = signals::spawn_signal_listener(supervisor.shutdown_token());

    let reports = supervisor.run_plans(plans).await;

    // workers are done; closing the last sender lets the logger drain and stop
    drop(supervisor);
    _ = logger.await;
    signals.abort();

    let failed = reports
        .iter()
        .filter(|report| matches!(report.state, WorkerState::Failed(_)))
        .count();
    if failed > 0 {
        warn!(failed, total = reports.len(), "Some streams failed");
    }
    info!(total = reports.len(), "All streams stopped");

    Ok(())
}
