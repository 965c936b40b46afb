//! In-process key/value store whose handles behave like separate browser tabs

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use anyhow::{anyhow, Result};
use tokio::sync::broadcast;
use tracing::debug;

use super::store::{next_context_id, ChangeSubscription, ContextId, KeyValueStore, StorageChange};

#[derive(Debug)]
struct Shared {
    values: Mutex<HashMap<String, String>>,
    change_tx: broadcast::Sender<StorageChange>,
}

/// Handle onto shared in-memory storage. Every handle created with
/// [`MemoryStore::context`] is its own execution context: it is not notified
/// about its own writes, only about writes made through other handles.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
    context: ContextId,
}

impl MemoryStore {
    /// Create empty storage and the first context on it
    pub fn new() -> Self {
        let (change_tx, _) = broadcast::channel(64);
        Self {
            shared: Arc::new(Shared {
                values: Mutex::new(HashMap::new()),
                change_tx,
            }),
            context: next_context_id(),
        }
    }

    /// Another context sharing the same storage
    pub fn context(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            context: next_context_id(),
        }
    }

    pub fn context_id(&self) -> ContextId {
        self.context
    }

    fn publish(&self, key: &str, value: Option<String>) {
        // No receivers is the common case outside of tests
        let _ = self.shared.change_tx.send(StorageChange {
            key: key.to_string(),
            value,
            origin: self.context,
        });
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self
            .shared
            .values
            .lock()
            .map_err(|e| anyhow!("Failed to lock memory store: {}", e))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        {
            let mut values = self
                .shared
                .values
                .lock()
                .map_err(|e| anyhow!("Failed to lock memory store: {}", e))?;
            values.insert(key.to_string(), value.to_string());
        }
        self.publish(key, Some(value.to_string()));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let existed = {
            let mut values = self
                .shared
                .values
                .lock()
                .map_err(|e| anyhow!("Failed to lock memory store: {}", e))?;
            values.remove(key).is_some()
        };
        if existed {
            self.publish(key, None);
        } else {
            debug!("Remove of missing key {} ignored", key);
        }
        Ok(())
    }

    fn subscribe(&self) -> ChangeSubscription {
        ChangeSubscription::new(self.shared.change_tx.subscribe(), self.context)
    }
}
