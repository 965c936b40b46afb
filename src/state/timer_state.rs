//! Timer records: the persisted state, the stopped session and the observer snapshot

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted record of the running timer. Exists only while a session runs;
/// ending a session deletes it instead of flipping `is_running`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_description: Option<String>,
    pub started_at: DateTime<Utc>,
    pub is_running: bool,
}

impl TimerState {
    /// Create a running timer state starting at `started_at`
    pub fn new(
        project_id: String,
        task_id: Option<String>,
        task_description: Option<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            project_id,
            task_id,
            task_description,
            started_at,
            is_running: true,
        }
    }

    /// Whole seconds elapsed since `started_at`, never negative
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> u64 {
        elapsed_seconds(self.started_at, now)
    }
}

/// `floor((now - started_at) / 1s)`, clamped at zero for clocks running behind
pub fn elapsed_seconds(started_at: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let millis = (now - started_at).num_milliseconds();
    if millis <= 0 {
        0
    } else {
        (millis / 1000) as u64
    }
}

/// A finished session waiting to be picked up by the session consumer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoppedSession {
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_description: Option<String>,
    pub started_at: DateTime<Utc>,
    pub elapsed_seconds: u64,
}

impl StoppedSession {
    /// Finalize `state` at `now`, clamping the duration to `max_seconds`
    pub fn finalize(state: TimerState, now: DateTime<Utc>, max_seconds: u64) -> Self {
        let elapsed_seconds = state.elapsed_seconds(now).min(max_seconds);
        Self {
            project_id: state.project_id,
            task_id: state.task_id,
            task_description: state.task_description,
            started_at: state.started_at,
            elapsed_seconds,
        }
    }
}

/// What observers see of the timer at a given moment
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    pub is_running: bool,
    pub project_id: Option<String>,
    pub task_id: Option<String>,
    pub task_description: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub elapsed_seconds: u64,
}

impl TimerSnapshot {
    /// Snapshot of an idle timer
    pub fn idle() -> Self {
        Self::default()
    }

    /// Snapshot of a running timer at `now`
    pub fn running(state: &TimerState, now: DateTime<Utc>) -> Self {
        Self {
            is_running: true,
            project_id: Some(state.project_id.clone()),
            task_id: state.task_id.clone(),
            task_description: state.task_description.clone(),
            started_at: Some(state.started_at),
            elapsed_seconds: state.elapsed_seconds(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;

    #[test]
    fn elapsed_is_floored_to_whole_seconds() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        assert_eq!(elapsed_seconds(start, start + Duration::milliseconds(1999)), 1);
        assert_eq!(elapsed_seconds(start, start + Duration::seconds(3661)), 3661);
    }

    #[test]
    fn elapsed_is_zero_when_start_is_in_the_future() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        assert_eq!(elapsed_seconds(start, start - Duration::seconds(30)), 0);
    }

    #[test]
    fn finalize_clamps_to_ceiling() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        let state = TimerState::new("p".into(), Some("t".into()), None, start);
        let session = StoppedSession::finalize(state, start + Duration::hours(13), 12 * 3600);
        assert_eq!(session.elapsed_seconds, 12 * 3600);
        assert_eq!(session.task_id.as_deref(), Some("t"));
    }

    #[test]
    fn persisted_record_uses_camel_case() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        let state = TimerState::new("proj-1".into(), None, Some("Write docs".into()), start);
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["projectId"], "proj-1");
        assert_eq!(json["taskDescription"], "Write docs");
        assert_eq!(json["isRunning"], true);
        assert!(json.get("taskId").is_none());

        let parsed: TimerState = serde_json::from_str(
            r#"{"projectId":"p","startedAt":"2024-01-01T08:00:00.000Z","isRunning":true}"#,
        )
        .unwrap();
        assert_eq!(parsed.started_at, start);
        assert_eq!(parsed.task_id, None);
    }
}
