//! Polls the file store for writes made by other processes

use std::{sync::Arc, time::Duration};

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::services::FileStore;

/// Scan `store` every `period` and publish what other processes changed
pub async fn store_watcher_task(store: Arc<FileStore>, period: Duration, shutdown: CancellationToken) {
    info!(
        "Watching {} for external changes every {}ms",
        store.dir().display(),
        period.as_millis()
    );

    let mut interval = interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,

            _ = interval.tick() => {
                if let Err(e) = store.scan_external_changes() {
                    warn!("Failed to scan store for external changes: {:#}", e);
                }
            }
        }
    }

    info!("Store watcher task stopped");
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use tempfile::tempdir;

    use super::*;
    use crate::{
        services::{KeyValueStore, TimerStore, TIMER_KEY},
        state::{TimerEngine, DEFAULT_MAX_DURATION},
        utils::test_clock::TestClock,
    };

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn removal_by_another_process_resets_the_engine() -> Result<()> {
        let dir = tempdir()?;
        let ours = Arc::new(FileStore::open(dir.path())?);
        let theirs = FileStore::open(dir.path())?;
        let shutdown = CancellationToken::new();

        let engine = TimerEngine::launch(
            TimerStore::new(ours.clone()),
            Arc::new(TestClock::new()),
            DEFAULT_MAX_DURATION,
        );
        tokio::spawn(store_watcher_task(
            Arc::clone(&ours),
            Duration::from_secs(1),
            shutdown.clone(),
        ));

        engine.start("acme", None, None);
        settle().await;
        assert!(theirs.get(TIMER_KEY)?.is_some());

        theirs.remove(TIMER_KEY)?;
        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;

        assert!(!engine.is_running());
        assert_eq!(engine.stopped_session(), None);

        shutdown.cancel();
        Ok(())
    }
}
