//! Stops the timer when its project disappears from the registry

use std::{collections::BTreeSet, sync::Arc};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::state::TimerEngine;

/// Re-check the timed project on every registry membership change
pub async fn project_guard_task(
    engine: Arc<TimerEngine>,
    mut projects: watch::Receiver<BTreeSet<String>>,
    shutdown: CancellationToken,
) {
    info!("Starting project guard task");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,

            changed = projects.changed() => {
                if changed.is_err() {
                    debug!("Project registry dropped, guard exiting");
                    break;
                }
                let current = projects.borrow_and_update().clone();
                engine.ensure_project_exists(&current);
            }
        }
    }

    info!("Project guard task stopped");
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use anyhow::Result;

    use super::*;
    use crate::{
        services::{MemoryStore, TimerStore},
        state::{ProjectRegistry, DEFAULT_MAX_DURATION},
        utils::test_clock::TestClock,
    };

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn deleting_the_timed_project_stops_the_timer() -> Result<()> {
        let clock = TestClock::new();
        let store = MemoryStore::new();
        let timer_store = TimerStore::new(Arc::new(store));
        let engine = TimerEngine::launch(
            timer_store.clone(),
            Arc::new(clock),
            DEFAULT_MAX_DURATION,
        );
        let registry = ProjectRegistry::new(["alpha", "beta"]);
        let shutdown = CancellationToken::new();
        tokio::spawn(project_guard_task(
            Arc::clone(&engine),
            registry.subscribe(),
            shutdown.clone(),
        ));

        engine.start("alpha", None, None);
        tokio::time::advance(Duration::from_secs(600)).await;

        registry.remove("beta");
        settle().await;
        assert!(engine.is_running());

        registry.remove("alpha");
        settle().await;

        assert!(!engine.is_running());
        assert!(!engine.is_ticking());
        let session = engine.stopped_session().unwrap();
        assert_eq!(session.project_id, "alpha");
        assert_eq!(session.elapsed_seconds, 600);
        assert_eq!(timer_store.read()?, None);

        shutdown.cancel();
        Ok(())
    }
}
