//! Session consumer: turns stopped sessions into logged point entries

use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::store::KeyValueStore;
use crate::state::StoppedSession;

/// Key holding the JSON array of logged entries
pub const POINT_ENTRIES_KEY: &str = "pointEntries";

/// One unit of logged work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointEntry {
    pub id: u64,
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub points: f64,
    pub hours: f64,
    pub elapsed_seconds: u64,
    pub logged_at: DateTime<Utc>,
}

/// Append-only log of point entries kept in the key/value store
pub struct PointLog {
    store: Arc<dyn KeyValueStore>,
    /// Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl PointLog {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// All logged entries. A corrupt list reads as empty.
    pub fn entries(&self) -> Result<Vec<PointEntry>> {
        let Some(raw) = self.store.get(POINT_ENTRIES_KEY)? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str(&raw) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                warn!("Ignoring corrupt point entries: {}", e);
                Ok(Vec::new())
            }
        }
    }

    /// Entries to append to. A corrupt list is copied to a backup key first so
    /// the next write cannot destroy it.
    fn entries_for_append(&self, logged_at: DateTime<Utc>) -> Result<Vec<PointEntry>> {
        let Some(raw) = self.store.get(POINT_ENTRIES_KEY)? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str(&raw) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                let backup = corrupt_backup_key(logged_at);
                self.store
                    .set(&backup, &raw)
                    .with_context(|| format!("Failed to back up corrupt point entries to {}", backup))?;
                warn!("Corrupt point entries ({}) moved to {}, starting a new list", e, backup);
                Ok(Vec::new())
            }
        }
    }

    /// Log `session`. Hours default to the elapsed time rounded to two
    /// decimals; points default to the hours.
    pub fn log_session(
        &self,
        session: &StoppedSession,
        points: Option<f64>,
        hours: Option<f64>,
        logged_at: DateTime<Utc>,
    ) -> Result<PointEntry> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| anyhow!("Failed to lock point log: {}", e))?;

        let mut entries = self.entries_for_append(logged_at)?;
        let hours = hours.unwrap_or_else(|| session_hours(session.elapsed_seconds));
        let entry = PointEntry {
            id: entries.iter().map(|e| e.id).max().map_or(1, |id| id + 1),
            project_id: session.project_id.clone(),
            task_id: session.task_id.clone(),
            description: session.task_description.clone(),
            points: points.unwrap_or(hours),
            hours,
            elapsed_seconds: session.elapsed_seconds,
            logged_at,
        };
        entries.push(entry.clone());
        self.store
            .set(POINT_ENTRIES_KEY, &serde_json::to_string(&entries)?)?;

        info!(
            "Logged {} points ({}h) for project {}",
            entry.points, entry.hours, entry.project_id
        );
        Ok(entry)
    }
}

/// Key a corrupt entry list is preserved under before it is replaced
pub fn corrupt_backup_key(at: DateTime<Utc>) -> String {
    format!("{}-corrupt-{}", POINT_ENTRIES_KEY, at.timestamp_millis())
}

/// Elapsed seconds as hours, rounded to two decimals
pub fn session_hours(elapsed_seconds: u64) -> f64 {
    (elapsed_seconds as f64 / 36.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::services::MemoryStore;

    fn session(elapsed_seconds: u64) -> StoppedSession {
        StoppedSession {
            project_id: "acme".into(),
            task_id: Some("t-1".into()),
            task_description: Some("Review".into()),
            started_at: Utc.with_ymd_and_hms(2024, 3, 11, 9, 0, 0).unwrap(),
            elapsed_seconds,
        }
    }

    #[test]
    fn hours_are_rounded_to_two_decimals() {
        assert_eq!(session_hours(3600), 1.0);
        assert_eq!(session_hours(5400), 1.5);
        assert_eq!(session_hours(1000), 0.28);
        assert_eq!(session_hours(0), 0.0);
    }

    #[test]
    fn logging_defaults_points_to_hours_and_assigns_ids() -> Result<()> {
        let log = PointLog::new(Arc::new(MemoryStore::new()));
        let now = Utc.with_ymd_and_hms(2024, 3, 11, 11, 0, 0).unwrap();

        let first = log.log_session(&session(5400), None, None, now)?;
        assert_eq!(first.id, 1);
        assert_eq!(first.hours, 1.5);
        assert_eq!(first.points, 1.5);
        assert_eq!(first.description.as_deref(), Some("Review"));

        let second = log.log_session(&session(60), Some(3.0), Some(0.5), now)?;
        assert_eq!(second.id, 2);
        assert_eq!(second.points, 3.0);
        assert_eq!(second.hours, 0.5);

        assert_eq!(log.entries()?.len(), 2);
        Ok(())
    }

    #[test]
    fn corrupt_entries_read_as_empty() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        store.set(POINT_ENTRIES_KEY, "[{broken")?;
        let log = PointLog::new(store);

        assert!(log.entries()?.is_empty());
        Ok(())
    }

    #[test]
    fn logging_over_a_corrupt_list_keeps_a_backup() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        store.set(POINT_ENTRIES_KEY, "[{broken")?;
        let log = PointLog::new(store.clone());
        let now = Utc.with_ymd_and_hms(2024, 3, 11, 11, 0, 0).unwrap();

        let entry = log.log_session(&session(3600), None, None, now)?;

        assert_eq!(entry.id, 1);
        assert_eq!(log.entries()?, vec![entry]);
        assert_eq!(
            store.get(&corrupt_backup_key(now))?.as_deref(),
            Some("[{broken")
        );
        Ok(())
    }

    #[test]
    fn corrupt_backup_keys_are_valid_file_names() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = crate::services::FileStore::open(dir.path())?;
        let key = corrupt_backup_key(Utc.with_ymd_and_hms(2024, 3, 11, 11, 0, 0).unwrap());

        store.set(&key, "[{broken")?;
        assert_eq!(store.get(&key)?.as_deref(), Some("[{broken"));
        Ok(())
    }
}
