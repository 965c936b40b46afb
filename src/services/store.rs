//! Key/value persistence contract and the typed timer view on top of it

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::warn;

use crate::state::TimerState;

/// Key holding the running timer record
pub const TIMER_KEY: &str = "activeTimer";

/// Identifies the execution context that performed a write
pub type ContextId = u64;

/// Origin used for writes discovered on disk rather than made through a handle
pub const EXTERNAL_CONTEXT: ContextId = 0;

static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);

/// Allocate a fresh context id
pub fn next_context_id() -> ContextId {
    NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed)
}

/// A write observed on the store. `value` is `None` when the key was removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageChange {
    pub key: String,
    pub value: Option<String>,
    pub origin: ContextId,
}

/// Change notifications for writes made by other contexts
#[derive(Debug)]
pub struct ChangeSubscription {
    rx: broadcast::Receiver<StorageChange>,
    context: ContextId,
}

impl ChangeSubscription {
    pub fn new(rx: broadcast::Receiver<StorageChange>, context: ContextId) -> Self {
        Self { rx, context }
    }

    /// Subscription for stores without multi-context semantics. Ends immediately.
    pub fn never() -> Self {
        let (_, rx) = broadcast::channel(1);
        Self::new(rx, EXTERNAL_CONTEXT)
    }

    /// Next change made elsewhere, or `None` once the store is gone
    pub async fn recv(&mut self) -> Option<StorageChange> {
        loop {
            match self.rx.recv().await {
                Ok(change) if change.origin == self.context => continue,
                Ok(change) => return Some(change),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Store change subscription lagged, skipped {} notifications", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Durable string key/value storage shared between execution contexts
#[cfg_attr(test, mockall::automock)]
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;

    /// Notifications for writes performed by *other* contexts
    fn subscribe(&self) -> ChangeSubscription;
}

/// Typed access to the timer record stored under [`TIMER_KEY`]
#[derive(Clone)]
pub struct TimerStore {
    backend: Arc<dyn KeyValueStore>,
}

impl TimerStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// Read the persisted timer, if any
    pub fn read(&self) -> Result<Option<TimerState>> {
        match self.backend.get(TIMER_KEY)? {
            Some(raw) => {
                let state = serde_json::from_str(&raw)
                    .with_context(|| format!("Corrupt timer record: {}", raw))?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    /// Persist `state`, or delete the record when `None`
    pub fn write(&self, state: Option<&TimerState>) -> Result<()> {
        match state {
            Some(state) => {
                let raw = serde_json::to_string(state)?;
                self.backend.set(TIMER_KEY, &raw)
            }
            None => self.backend.remove(TIMER_KEY),
        }
    }

    /// Timer record changes made by other contexts
    pub fn subscribe(&self) -> TimerChanges {
        TimerChanges {
            inner: self.backend.subscribe(),
        }
    }
}

/// Stream of timer record changes from other contexts
#[derive(Debug)]
pub struct TimerChanges {
    inner: ChangeSubscription,
}

impl TimerChanges {
    /// `Some(true)` when another context removed the record, `Some(false)`
    /// when it wrote one, `None` once the store is gone
    pub async fn recv(&mut self) -> Option<bool> {
        loop {
            let change = self.inner.recv().await?;
            if change.key == TIMER_KEY {
                return Some(change.value.is_none());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::{anyhow, Result};
    use chrono::{TimeZone, Utc};

    use super::*;

    #[test]
    fn corrupt_record_is_an_error() {
        let mut backend = MockKeyValueStore::new();
        backend
            .expect_get()
            .returning(|_| Ok(Some("{not json".to_string())));
        let store = TimerStore::new(Arc::new(backend));

        assert!(store.read().is_err());
    }

    #[test]
    fn write_none_removes_the_key() -> Result<()> {
        let mut backend = MockKeyValueStore::new();
        backend
            .expect_remove()
            .withf(|key| key.to_string() == TIMER_KEY)
            .times(1)
            .returning(|_| Ok(()));
        let store = TimerStore::new(Arc::new(backend));

        store.write(None)?;
        Ok(())
    }

    #[test]
    fn write_errors_propagate() {
        let mut backend = MockKeyValueStore::new();
        backend
            .expect_set()
            .returning(|_, _| Err(anyhow!("quota exceeded")));
        let store = TimerStore::new(Arc::new(backend));
        let state = TimerState::new(
            "p".into(),
            None,
            None,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        );

        assert!(store.write(Some(&state)).is_err());
    }

    #[tokio::test]
    async fn own_writes_are_filtered_out() {
        let (tx, rx) = broadcast::channel(8);
        let mut subscription = ChangeSubscription::new(rx, 7);

        tx.send(StorageChange { key: TIMER_KEY.into(), value: None, origin: 7 }).unwrap();
        tx.send(StorageChange { key: TIMER_KEY.into(), value: Some("x".into()), origin: 8 }).unwrap();

        let change = subscription.recv().await.unwrap();
        assert_eq!(change.origin, 8);
    }

    #[tokio::test]
    async fn never_subscription_ends() {
        let mut subscription = ChangeSubscription::never();
        assert!(subscription.recv().await.is_none());
    }
}
