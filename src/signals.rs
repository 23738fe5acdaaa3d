use tokio::signal;
use tokio::task::JoinHandle as TokioJoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Cancel `token` on the first SIGINT or SIGTERM.
///
/// The listener also exits quietly if the token is cancelled elsewhere.
pub fn spawn_signal_listener(token: CancellationToken) -> TokioJoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            received = wait_for_signal() => {
                info!(signal = received, "Stopping all streams");
                token.cancel();
            }
            _ = token.cancelled() => {
                debug!("Signal listener finished");
            }
        }
    })
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal as unix_signal};

    match unix_signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = ctrl_c() => "SIGINT",
                _ = sigterm.recv() => "SIGTERM",
            }
        }
        Err(error) => {
            error!(%error, "Failed to install SIGTERM handler");
            ctrl_c().await;
            "SIGINT"
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    ctrl_c().await;
    "Ctrl+C"
}

async fn ctrl_c() {
    if let Err(error) = signal::ctrl_c().await {
        error!(%error, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
}
