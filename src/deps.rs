use crate::command::RelaySettings;
use crate::error::DependencyError;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Filters the combined layouts rely on.
const COMPOSITING_FILTERS: [&str; 3] = ["hstack", "xstack", "overlay"];

/// Run `program arg` and return its stdout.
async fn probe(program: &str, arg: &str) -> Result<String, DependencyError> {
    let output = Command::new(program)
        .arg(arg)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|error| {
            debug!(program, %error, "Probe failed to start");
            DependencyError::Missing(program.to_string())
        })?;

    if !output.status.success() {
        return Err(DependencyError::Broken {
            program: program.to_string(),
            status: output.status.to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Make sure the relay binaries can be executed before any camera starts.
pub async fn check_dependencies(
    settings: &RelaySettings,
    streamlink: bool,
    compositing: bool,
) -> Result<(), DependencyError> {
    let version = probe(&settings.ffmpeg, "-version").await?;
    info!(
        version = version.lines().next().unwrap_or_default(),
        "FFmpeg found"
    );

    if streamlink {
        let version = probe(&settings.streamlink, "--version").await?;
        info!(version = version.trim(), "Streamlink found");
    }

    if compositing {
        let filters = probe(&settings.ffmpeg, "-filters").await?;
        let missing = missing_filters(&filters);
        if !missing.is_empty() {
            warn!(
                ?missing,
                "FFmpeg might not have all required filters, combined layouts may fail"
            );
        }
    }

    Ok(())
}

fn missing_filters(listing: &str) -> Vec<&'static str> {
    COMPOSITING_FILTERS
        .into_iter()
        .filter(|name| {
            !listing
                .lines()
                .any(|line| line.split_whitespace().nth(1) == Some(*name))
        })
        .collect()
}
