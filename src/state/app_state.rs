//! Main application state management

use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{ProjectRegistry, StartOutcome, StoppedSession, TimerEngine};
use crate::{
    services::{KeyValueStore, PointEntry, PointLog, TimerStore},
    tasks::project_guard_task,
    utils::Clock,
};

/// Owner of the timer engine and its collaborators, shared with the HTTP handlers
pub struct AppState {
    /// The single timer of this context
    pub engine: Arc<TimerEngine>,
    /// Known projects; removing the timed one stops the timer
    pub projects: Arc<ProjectRegistry>,
    /// Where consumed sessions end up
    pub point_log: PointLog,
    pub clock: Arc<dyn Clock>,
    /// Server metadata
    pub start_time: Instant,
    pub port: u16,
    pub host: String,
    /// Last action tracking
    pub last_action: Arc<Mutex<Option<String>>>,
    pub last_action_time: Arc<Mutex<Option<DateTime<Utc>>>>,
    /// Cancels the background tasks owned by this state
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Launch the engine on `backend` and start guarding the timed project
    pub fn launch(
        backend: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        max_duration: Duration,
        projects: Vec<String>,
        port: u16,
        host: String,
    ) -> Arc<Self> {
        let engine = TimerEngine::launch(
            TimerStore::new(Arc::clone(&backend)),
            Arc::clone(&clock),
            max_duration,
        );
        let projects = Arc::new(ProjectRegistry::new(projects));
        let shutdown = CancellationToken::new();

        tokio::spawn(project_guard_task(
            Arc::clone(&engine),
            projects.subscribe(),
            shutdown.child_token(),
        ));

        Arc::new(Self {
            engine,
            projects,
            point_log: PointLog::new(backend),
            clock,
            start_time: Instant::now(),
            port,
            host,
            last_action: Arc::new(Mutex::new(None)),
            last_action_time: Arc::new(Mutex::new(None)),
            shutdown,
        })
    }

    /// Remember `action` as the most recent one
    pub fn record_action(&self, action: &str) {
        if let Ok(mut last_action) = self.last_action.lock() {
            *last_action = Some(action.to_string());
        }
        if let Ok(mut last_time) = self.last_action_time.lock() {
            *last_time = Some(self.clock.now());
        }
    }

    /// Start the timer for a known project
    pub fn start_timer(
        &self,
        project_id: &str,
        task_id: Option<String>,
        task_description: Option<String>,
    ) -> StartOutcome {
        let outcome = self.engine.start(project_id, task_id, task_description);
        if outcome == StartOutcome::Started {
            self.record_action("start");
        }
        outcome
    }

    /// Stop the timer, returning the finished session
    pub fn stop_timer(&self) -> Option<StoppedSession> {
        let session = self.engine.stop();
        self.record_action("stop");
        session
    }

    /// Log the pending session as a point entry. The session is taken before
    /// logging, so concurrent requests log it at most once; a failed log puts
    /// it back. `Ok(None)` when nothing is pending.
    pub fn log_stopped_session(
        &self,
        points: Option<f64>,
        hours: Option<f64>,
    ) -> Result<Option<PointEntry>, String> {
        let Some(session) = self.engine.take_stopped_session() else {
            return Ok(None);
        };

        match self
            .point_log
            .log_session(&session, points, hours, self.clock.now())
        {
            Ok(entry) => {
                self.record_action("log");
                Ok(Some(entry))
            }
            Err(e) => {
                self.engine.restore_stopped_session(session);
                Err(format!("Failed to log session: {:#}", e))
            }
        }
    }

    /// Calculate server uptime as a formatted string
    pub fn get_uptime(&self) -> String {
        format_duration(self.start_time.elapsed().as_secs())
    }

    /// Get last action information
    pub fn get_last_action(&self) -> (Option<String>, Option<DateTime<Utc>>) {
        let last_action = self.last_action.lock().ok().and_then(|a| a.clone());
        let last_action_time = self.last_action_time.lock().ok().and_then(|t| *t);
        (last_action, last_action_time)
    }

    /// Stop background tasks. A running timer stays persisted for the next start.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.engine.shutdown();
        info!("Application state shut down");
    }
}

/// `1h 2m 3s` style rendering of a second count
pub fn format_duration(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Barrier},
        time::Duration,
    };

    use anyhow::{bail, Result};

    use super::*;
    use crate::{
        services::{point_log::POINT_ENTRIES_KEY, ChangeSubscription, MemoryStore},
        state::DEFAULT_MAX_DURATION,
        utils::test_clock::TestClock,
    };

    /// Memory store whose point entry writes always fail
    struct ReadOnlyPoints(MemoryStore);

    impl KeyValueStore for ReadOnlyPoints {
        fn get(&self, key: &str) -> Result<Option<String>> {
            self.0.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<()> {
            if key == POINT_ENTRIES_KEY {
                bail!("disk full");
            }
            self.0.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<()> {
            self.0.remove(key)
        }

        fn subscribe(&self) -> ChangeSubscription {
            self.0.subscribe()
        }
    }

    fn launch() -> Arc<AppState> {
        launch_on(Arc::new(MemoryStore::new()))
    }

    fn launch_on(backend: Arc<dyn KeyValueStore>) -> Arc<AppState> {
        AppState::launch(
            backend,
            Arc::new(TestClock::new()),
            DEFAULT_MAX_DURATION,
            vec!["acme".to_string()],
            0,
            "127.0.0.1".to_string(),
        )
    }

    #[test]
    fn durations_render_compactly() {
        assert_eq!(format_duration(3661), "1h 1m 1s");
        assert_eq!(format_duration(61), "1m 1s");
        assert_eq!(format_duration(9), "9s");
    }

    #[tokio::test(start_paused = true)]
    async fn logging_consumes_the_pending_session() {
        let state = launch();
        state.start_timer("acme", None, Some("Standup notes".to_string()));
        tokio::time::advance(Duration::from_secs(1800)).await;
        state.stop_timer();

        let entry = state.log_stopped_session(None, None).unwrap().unwrap();
        assert_eq!(entry.hours, 0.5);
        assert_eq!(entry.description.as_deref(), Some("Standup notes"));
        assert_eq!(state.engine.stopped_session(), None);
        assert_eq!(state.log_stopped_session(None, None), Ok(None));
        assert_eq!(state.get_last_action().0.as_deref(), Some("log"));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_leaves_the_timer_persisted() {
        let state = launch();
        state.start_timer("acme", None, None);
        state.shutdown();

        assert!(!state.engine.is_ticking());
        assert!(state.engine.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_log_requests_log_the_session_once() {
        let state = launch();
        state.start_timer("acme", None, None);
        tokio::time::advance(Duration::from_secs(3600)).await;
        state.stop_timer();

        let barrier = Barrier::new(4);
        let logged = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        state.log_stopped_session(None, None)
                    })
                })
                .collect();
            handles
                .into_iter()
                .filter_map(|handle| handle.join().unwrap().unwrap())
                .count()
        });

        assert_eq!(logged, 1);
        assert_eq!(state.point_log.entries().unwrap().len(), 1);
        assert_eq!(state.engine.stopped_session(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_log_keeps_the_session_pending() {
        let state = launch_on(Arc::new(ReadOnlyPoints(MemoryStore::new())));
        state.start_timer("acme", None, None);
        tokio::time::advance(Duration::from_secs(600)).await;
        let session = state.stop_timer();

        assert!(state.log_stopped_session(None, None).is_err());
        assert_eq!(state.engine.stopped_session(), session);
        assert_eq!(state.start_timer("acme", None, None), StartOutcome::SessionPending);
    }
}
