//! The timer engine: a single global session timer persisted to the store
//!
//! Elapsed time is always derived from the persisted `startedAt`, so a
//! reload, a throttled tick or a suspended machine never skews the result.
//! The engine never surfaces errors: unreadable or unwritable storage
//! degrades to an idle timer and is logged.

use std::{
    collections::BTreeSet,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{StoppedSession, TimerSnapshot, TimerState};
use crate::{
    services::TimerStore,
    tasks::{cross_context_sync_task, spawn_timer_tick, TickHandle},
    utils::Clock,
};

/// Sessions are stopped automatically once they reach this length
pub const DEFAULT_MAX_DURATION: Duration = Duration::from_secs(12 * 60 * 60);

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    Manual,
    MaxDuration,
    ResumedExpired,
    ProjectRemoved,
}

/// Transitions published to engine subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    Started(TimerState),
    Stopped {
        reason: StopReason,
        session: StoppedSession,
    },
    /// Another context stopped the timer
    Reset,
}

/// Result of a start request. None of these are errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
    /// A stopped session has not been consumed yet
    SessionPending,
    StoreUnavailable,
}

#[derive(Debug, Default)]
struct Inner {
    current: Option<TimerState>,
    stopped: Option<StoppedSession>,
    tick: Option<TickHandle>,
}

pub struct TimerEngine {
    store: TimerStore,
    clock: Arc<dyn Clock>,
    max_duration: Duration,
    inner: Mutex<Inner>,
    snapshot_tx: watch::Sender<TimerSnapshot>,
    event_tx: broadcast::Sender<TimerEvent>,
    /// Parent of every task the engine spawns
    shutdown: CancellationToken,
}

impl TimerEngine {
    /// Build an engine on `store`, resume any persisted session and start
    /// listening for changes made by other contexts. Must be called inside a
    /// tokio runtime.
    pub fn launch(store: TimerStore, clock: Arc<dyn Clock>, max_duration: Duration) -> Arc<Self> {
        let (snapshot_tx, _) = watch::channel(TimerSnapshot::idle());
        let (event_tx, _) = broadcast::channel(16);
        let changes = store.subscribe();

        let engine = Arc::new(Self {
            store,
            clock,
            max_duration,
            inner: Mutex::new(Inner::default()),
            snapshot_tx,
            event_tx,
            shutdown: CancellationToken::new(),
        });

        engine.resume();

        tokio::spawn(cross_context_sync_task(
            Arc::downgrade(&engine),
            changes,
            engine.shutdown.child_token(),
        ));

        engine
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn max_seconds(&self) -> u64 {
        self.max_duration.as_secs()
    }

    fn read_persisted(&self) -> Option<TimerState> {
        match self.store.read() {
            Ok(state) => state.filter(|s| s.is_running),
            Err(e) => {
                warn!("Unreadable timer record treated as no timer: {:#}", e);
                None
            }
        }
    }

    fn publish_idle(&self) {
        self.snapshot_tx.send_if_modified(|snapshot| {
            if snapshot.is_running {
                *snapshot = TimerSnapshot::idle();
                true
            } else {
                false
            }
        });
    }

    fn emit(&self, event: TimerEvent) {
        // Nobody listening is fine
        let _ = self.event_tx.send(event);
    }

    fn resume(self: &Arc<Self>) {
        let Some(state) = self.read_persisted() else {
            debug!("No running timer to resume");
            return;
        };

        let elapsed = state.elapsed_seconds(self.clock.now());
        if elapsed >= self.max_seconds() {
            info!(
                "Persisted timer for project {} expired while closed ({}s), stopping",
                state.project_id, elapsed
            );
            self.stop_with(StopReason::ResumedExpired);
            return;
        }

        info!(
            "Resuming timer for project {} at {}s",
            state.project_id, elapsed
        );
        let mut inner = self.lock();
        self.snapshot_tx
            .send_replace(TimerSnapshot::running(&state, self.clock.now()));
        inner.current = Some(state);
        inner.tick = Some(spawn_timer_tick(self, self.shutdown.child_token()));
    }

    /// Start timing `project_id`. A running timer, here or in another context,
    /// turns this into a no-op.
    pub fn start(
        self: &Arc<Self>,
        project_id: impl Into<String>,
        task_id: Option<String>,
        task_description: Option<String>,
    ) -> StartOutcome {
        let project_id = project_id.into();
        if self.enforce_ceiling().is_some() {
            return StartOutcome::SessionPending;
        }

        let now = self.clock.now();
        let mut inner = self.lock();

        if let Some(current) = &inner.current {
            debug!(
                "Start for {} ignored, already timing {}",
                project_id, current.project_id
            );
            return StartOutcome::AlreadyRunning;
        }

        if inner.stopped.is_some() {
            info!("Start for {} refused, a stopped session is pending", project_id);
            return StartOutcome::SessionPending;
        }

        if let Some(existing) = self.read_persisted() {
            if existing.elapsed_seconds(now) >= self.max_seconds() {
                drop(inner);
                self.stop_with(StopReason::MaxDuration);
                return StartOutcome::SessionPending;
            }
            info!(
                "Start for {} ignored, project {} is being timed in another context",
                project_id, existing.project_id
            );
            return StartOutcome::AlreadyRunning;
        }

        let state = TimerState::new(project_id, task_id, task_description, now);
        if let Err(e) = self.store.write(Some(&state)) {
            warn!("Failed to persist timer, staying idle: {:#}", e);
            return StartOutcome::StoreUnavailable;
        }

        info!("Timer started for project {}", state.project_id);
        self.snapshot_tx
            .send_replace(TimerSnapshot::running(&state, now));
        inner.current = Some(state.clone());
        inner.tick = Some(spawn_timer_tick(self, self.shutdown.child_token()));
        drop(inner);

        self.emit(TimerEvent::Started(state));
        StartOutcome::Started
    }

    /// Stop the timer and hand the finished session to the consumer
    pub fn stop(&self) -> Option<StoppedSession> {
        self.enforce_ceiling()
            .or_else(|| self.stop_with(StopReason::Manual))
    }

    /// Force-stop a running session that has reached the maximum duration.
    /// Every public operation runs this first, so an expired session is never
    /// observed as running even if no tick fired since the ceiling was crossed.
    fn enforce_ceiling(&self) -> Option<StoppedSession> {
        let now = self.clock.now();
        let expired = self
            .lock()
            .current
            .as_ref()
            .is_some_and(|state| state.elapsed_seconds(now) >= self.max_seconds());
        if !expired {
            return None;
        }
        info!("Maximum session duration reached, stopping timer");
        self.stop_with(StopReason::MaxDuration)
    }

    /// Finalize whatever the store holds (not the in-memory copy), delete it
    /// and cancel the tick. Safe from any state.
    pub(crate) fn stop_with(&self, reason: StopReason) -> Option<StoppedSession> {
        let now = self.clock.now();
        let mut inner = self.lock();
        let persisted = self.read_persisted();
        let tick = inner.tick.take();
        inner.current = None;

        let session = persisted.map(|state| {
            if let Err(e) = self.store.write(None) {
                warn!("Failed to delete timer record: {:#}", e);
            }
            let session = StoppedSession::finalize(state, now, self.max_seconds());
            inner.stopped = Some(session.clone());
            session
        });
        self.publish_idle();
        drop(inner);

        if let Some(tick) = tick {
            tick.cancel();
        }

        match &session {
            Some(session) => {
                info!(
                    "Timer stopped for project {} after {}s ({:?})",
                    session.project_id, session.elapsed_seconds, reason
                );
                self.emit(TimerEvent::Stopped {
                    reason,
                    session: session.clone(),
                });
            }
            None => debug!("Stop requested with no persisted timer"),
        }
        session
    }

    /// Called once per tick. Refreshes the snapshot and enforces the ceiling.
    /// Returns false when the tick loop should end.
    pub(crate) fn tick(&self) -> bool {
        if self.enforce_ceiling().is_some() {
            return false;
        }

        let now = self.clock.now();
        let inner = self.lock();
        let Some(state) = &inner.current else {
            return false;
        };

        self.snapshot_tx
            .send_replace(TimerSnapshot::running(state, now));
        true
    }

    /// React to another context writing the timer record. Only removals
    /// matter: another context's stop is authoritative.
    pub(crate) fn handle_external_change(&self, removed: bool) {
        if !removed {
            debug!("Timer record written by another context, ignoring");
            return;
        }

        let mut inner = self.lock();
        let tick = inner.tick.take();
        let previous = inner.current.take();
        self.publish_idle();
        drop(inner);

        if let Some(tick) = tick {
            tick.cancel();
        }
        if let Some(previous) = previous {
            info!(
                "Timer for project {} stopped in another context, resetting",
                previous.project_id
            );
            self.emit(TimerEvent::Reset);
        }
    }

    /// Force a stop when the timed project is no longer in `projects`
    pub fn ensure_project_exists(&self, projects: &BTreeSet<String>) -> Option<StoppedSession> {
        self.enforce_ceiling();
        let project_id = self.lock().current.as_ref().map(|s| s.project_id.clone())?;
        if projects.contains(&project_id) {
            return None;
        }
        warn!("Project {} no longer exists, stopping its timer", project_id);
        self.stop_with(StopReason::ProjectRemoved)
    }

    /// The finished session waiting for the consumer, if any
    pub fn stopped_session(&self) -> Option<StoppedSession> {
        self.lock().stopped.clone()
    }

    /// Remove the pending session and hand it to the caller. Only one caller
    /// gets a given session.
    pub fn take_stopped_session(&self) -> Option<StoppedSession> {
        self.lock().stopped.take()
    }

    /// Put back a session taken with [`TimerEngine::take_stopped_session`]
    /// that could not be consumed. A newer pending session wins.
    pub fn restore_stopped_session(&self, session: StoppedSession) {
        let mut inner = self.lock();
        if inner.stopped.is_none() {
            inner.stopped = Some(session);
        } else {
            warn!(
                "Dropping unconsumed session for project {}, a newer one is pending",
                session.project_id
            );
        }
    }

    /// Discard the pending session. Idempotent.
    pub fn clear_stopped_session(&self) {
        if self.lock().stopped.take().is_some() {
            debug!("Stopped session cleared");
        }
    }

    /// Current view of the timer, computed at this instant
    pub fn snapshot(&self) -> TimerSnapshot {
        self.enforce_ceiling();
        match &self.lock().current {
            Some(state) => TimerSnapshot::running(state, self.clock.now()),
            None => TimerSnapshot::idle(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.enforce_ceiling();
        self.lock().current.is_some()
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.snapshot().elapsed_seconds
    }

    /// Whether a tick task is currently scheduled
    pub fn is_ticking(&self) -> bool {
        self.lock().tick.is_some()
    }

    pub fn max_duration(&self) -> Duration {
        self.max_duration
    }

    /// Snapshot refreshed on every tick and transition
    pub fn subscribe_snapshot(&self) -> watch::Receiver<TimerSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<TimerEvent> {
        self.event_tx.subscribe()
    }

    /// Cancel the tick and the cross-context listener. The persisted record is
    /// kept so the next launch resumes it.
    pub fn shutdown(&self) {
        let tick = self.lock().tick.take();
        if let Some(tick) = tick {
            tick.cancel();
        }
        self.shutdown.cancel();
        info!("Timer engine shut down");
    }
}

impl Drop for TimerEngine {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
