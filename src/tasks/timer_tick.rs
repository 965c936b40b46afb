//! Per-second tick of a running timer

use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use tokio::{
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::state::TimerEngine;

/// Period between ticks
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// A scheduled tick task. Cancelling both trips the token and aborts the
/// task, so no tick can run afterwards.
#[derive(Debug)]
pub struct TickHandle {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl TickHandle {
    pub fn cancel(self) {
        self.cancel.cancel();
        self.handle.abort();
    }
}

/// Spawn the tick loop for `engine`. The task only holds a weak reference,
/// so a dropped engine ends it.
pub fn spawn_timer_tick(engine: &Arc<TimerEngine>, cancel: CancellationToken) -> TickHandle {
    let handle = tokio::spawn(timer_tick_task(Arc::downgrade(engine), cancel.clone()));
    TickHandle { cancel, handle }
}

async fn timer_tick_task(engine: Weak<TimerEngine>, cancel: CancellationToken) {
    debug!("Timer tick started");

    let mut interval = interval(TICK_PERIOD);
    // Throttled or suspended ticks are not replayed, elapsed time is derived anyway
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            _ = interval.tick() => {
                let Some(engine) = engine.upgrade() else {
                    break;
                };
                if !engine.tick() {
                    break;
                }
            }
        }
    }

    debug!("Timer tick ended");
}
