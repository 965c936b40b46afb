//! Directory-backed key/value store shared between processes

use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use anyhow::{anyhow, bail, Context, Result};
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::store::{
    next_context_id, ChangeSubscription, ContextId, KeyValueStore, StorageChange, EXTERNAL_CONTEXT,
};

const VALUE_EXTENSION: &str = "json";

/// Stores each key as `<dir>/<key>.json`, replacing files atomically.
///
/// Other processes writing the same directory are picked up by
/// [`FileStore::scan_external_changes`], which the store watcher task runs
/// periodically. Writes made through this handle are never reported back to it.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    context: ContextId,
    /// Last value this process wrote or observed per key. Held across every
    /// file operation of this handle so a scan never sees a half-applied write.
    last_seen: Mutex<HashMap<String, String>>,
    change_tx: broadcast::Sender<StorageChange>,
}

impl FileStore {
    /// Open (creating if needed) the store in `dir`
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        match fs::create_dir_all(&dir) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to create {}", dir.display()))
            }
        }

        let (change_tx, _) = broadcast::channel(64);
        let store = Self {
            last_seen: Mutex::new(read_all(&dir)?),
            dir,
            context: next_context_id(),
            change_tx,
        };
        info!("Opened file store at {}", store.dir.display());
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{}.{}", key, VALUE_EXTENSION)))
    }

    fn last_seen(&self) -> Result<MutexGuard<'_, HashMap<String, String>>> {
        self.last_seen
            .lock()
            .map_err(|e| anyhow!("Failed to lock file store state: {}", e))
    }

    /// Compare the directory with what this process last saw and publish every
    /// difference as a change made by another context. Returns the number of
    /// changes published.
    pub fn scan_external_changes(&self) -> Result<usize> {
        let mut last_seen = self.last_seen()?;
        let on_disk = read_all(&self.dir)?;

        let mut changes = Vec::new();
        for (key, value) in &on_disk {
            if last_seen.get(key) != Some(value) {
                changes.push((key.clone(), Some(value.clone())));
            }
        }
        for key in last_seen.keys() {
            if !on_disk.contains_key(key) {
                changes.push((key.clone(), None));
            }
        }
        *last_seen = on_disk;
        drop(last_seen);

        let count = changes.len();
        for (key, value) in changes {
            debug!("External change detected for key {} (removed={})", key, value.is_none());
            let _ = self.change_tx.send(StorageChange {
                key,
                value,
                origin: EXTERNAL_CONTEXT,
            });
        }
        Ok(count)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension("tmp");
        let mut last_seen = self.last_seen()?;
        fs::write(&tmp, value).with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        last_seen.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        let mut last_seen = self.last_seen()?;
        match fs::remove_file(&path) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to remove {}", path.display()))
            }
        }
        last_seen.remove(key);
        Ok(())
    }

    fn subscribe(&self) -> ChangeSubscription {
        ChangeSubscription::new(self.change_tx.subscribe(), self.context)
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty()
        || !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        bail!("Invalid store key: {:?}", key);
    }
    Ok(())
}

fn read_all(dir: &Path) -> Result<HashMap<String, String>> {
    let mut values = HashMap::new();
    let entries =
        fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(VALUE_EXTENSION) {
            continue;
        }
        let Some(key) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        match fs::read_to_string(&path) {
            Ok(value) => {
                values.insert(key.to_string(), value);
            }
            // Removed between listing and reading
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()))
            }
        }
    }
    Ok(values)
}
