//! API request and response structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::{StartOutcome, StoppedSession, TimerSnapshot};

/// Body of POST /timer/start
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub project_id: String,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub task_description: Option<String>,
}

/// Body of POST /timer/stopped/log
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogSessionRequest {
    #[serde(default)]
    pub points: Option<f64>,
    #[serde(default)]
    pub hours: Option<f64>,
}

impl LogSessionRequest {
    /// Overrides must be finite and not negative
    pub fn is_valid(&self) -> bool {
        [self.points, self.hours]
            .into_iter()
            .flatten()
            .all(|value| value.is_finite() && value >= 0.0)
    }
}

/// Response for timer transitions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerResponse {
    pub status: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub timer: TimerSnapshot,
    pub stopped_session: Option<StoppedSession>,
}

impl TimerResponse {
    /// Create a new timer response
    pub fn new(
        status: &str,
        message: String,
        timer: TimerSnapshot,
        stopped_session: Option<StoppedSession>,
    ) -> Self {
        Self {
            status: status.to_string(),
            message,
            timestamp: Utc::now(),
            timer,
            stopped_session,
        }
    }

    /// Response for a start request
    pub fn started(outcome: StartOutcome, timer: TimerSnapshot) -> Self {
        let message = match outcome {
            StartOutcome::Started => "Timer started",
            StartOutcome::AlreadyRunning => "A timer is already running",
            StartOutcome::SessionPending => "A stopped session must be logged or discarded first",
            StartOutcome::StoreUnavailable => "Timer storage is unavailable",
        };
        let status = if outcome == StartOutcome::Started { "running" } else { "unchanged" };
        Self::new(status, message.to_string(), timer, None)
    }

    /// Response for a stop request
    pub fn stopped(timer: TimerSnapshot, session: Option<StoppedSession>) -> Self {
        let message = match &session {
            Some(s) => format!("Timer stopped after {}s", s.elapsed_seconds),
            None => "No timer was running".to_string(),
        };
        Self::new("idle", message, timer, session)
    }
}

/// Full status of the timer and the server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub timer: TimerSnapshot,
    pub stopped_session: Option<StoppedSession>,
    pub max_duration_seconds: u64,
    pub uptime: String,
    pub port: u16,
    pub host: String,
    pub last_action: Option<String>,
    pub last_action_time: Option<DateTime<Utc>>,
}

/// Registry membership
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectsResponse {
    pub projects: Vec<String>,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

impl HealthResponse {
    /// Create a new health response
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
