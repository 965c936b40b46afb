//! Reacts to timer changes made by other execution contexts

use std::sync::Weak;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{services::TimerChanges, state::TimerEngine};

/// Forward changes of the persisted timer record from other contexts to the
/// engine until the engine shuts down or the store goes away
pub async fn cross_context_sync_task(
    engine: Weak<TimerEngine>,
    mut changes: TimerChanges,
    shutdown: CancellationToken,
) {
    debug!("Starting cross-context sync task");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,

            change = changes.recv() => {
                let Some(removed) = change else {
                    debug!("Store offers no change notifications, sync task exiting");
                    break;
                };
                let Some(engine) = engine.upgrade() else {
                    break;
                };
                engine.handle_external_change(removed);
            }
        }
    }

    info!("Cross-context sync task stopped");
}
