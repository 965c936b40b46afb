//! Signal handling for graceful shutdown

use futures::stream::StreamExt;
use signal_hook_tokio::Signals;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Wait for SIGTERM or SIGINT, then cancel `shutdown` so every background
/// task winds down. Falls back to Ctrl-C if the signal stream can't be set up.
pub async fn shutdown_signal(shutdown: CancellationToken) {
    match Signals::new([signal_hook::consts::SIGTERM, signal_hook::consts::SIGINT]) {
        Ok(mut signals) => {
            if let Some(signal) = signals.next().await {
                info!("Received signal: {}", signal);
            }
        }
        Err(e) => {
            error!("Failed to create signal handler, listening for Ctrl-C only: {}", e);
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
                return;
            }
            info!("Received Ctrl-C");
        }
    }
    shutdown.cancel();
}
