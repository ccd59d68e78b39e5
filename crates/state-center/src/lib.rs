//! Storage collaborators: a "last write wins" key-value store and the
//! resumable action state kept on top of it.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{to_writer_pretty, Value};
use thiserror::Error;
use tracing::{debug, warn};

mod action_state;

pub use action_state::{ActionState, ActionStateStore};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("stored value for '{key}' is malformed: {reason}")]
    Malformed { key: String, reason: String },
    #[error("value encode failed: {0}")]
    Encode(String),
}

/// Reads return the last write, or `None` when nothing was written.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
    fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
    fn keys(&self) -> Result<Vec<String>, StoreError>;
}

/// Deserialize the value under `key` into `T`.
pub fn load_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match store.get(key)? {
        None => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|err| StoreError::Malformed {
                key: key.to_string(),
                reason: err.to_string(),
            }),
    }
}

pub fn save_json<T: Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let value = serde_json::to_value(value).map_err(|err| StoreError::Encode(err.to_string()))?;
    store.set(key, value)
}

#[derive(Default)]
pub struct InMemoryKvStore {
    values: DashMap<String, Value>,
}

impl InMemoryKvStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl KeyValueStore for InMemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.values.get(key).map(|entry| entry.value().clone()))
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.values.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut keys: Vec<String> = self.values.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        Ok(keys)
    }
}

/// Whole-map JSON file, rewritten after every mutation.
///
/// The file is written to a sibling temp file and renamed into place so a
/// crash mid-write leaves the previous contents intact.
pub struct JsonFileKvStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, Value>>,
}

impl JsonFileKvStore {
    /// Open (or lazily create) the store at `path`. A missing or malformed
    /// file yields an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Arc<Self>, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let values = read_map(&path);
        debug!(path = %path.display(), entries = values.len(), "opened json kv store");
        Ok(Arc::new(Self {
            path,
            values: Mutex::new(values),
        }))
    }

    fn flush(&self, values: &BTreeMap<String, Value>) -> Result<(), StoreError> {
        let tmp = self.path.with_extension("json.tmp");
        {
            let file = File::create(&tmp)?;
            let mut writer = BufWriter::new(file);
            to_writer_pretty(&mut writer, values)
                .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
            writer.flush()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn read_map(path: &Path) -> BTreeMap<String, Value> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return BTreeMap::new(),
        Err(err) => {
            warn!(path = %path.display(), ?err, "kv store unreadable; starting empty");
            return BTreeMap::new();
        }
    };
    match serde_json::from_reader(BufReader::new(file)) {
        Ok(values) => values,
        Err(err) => {
            warn!(path = %path.display(), %err, "kv store malformed; starting empty");
            BTreeMap::new()
        }
    }
}

impl KeyValueStore for JsonFileKvStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut guard = self.values.lock();
        guard.insert(key.to_string(), value);
        self.flush(&guard)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut guard = self.values.lock();
        if guard.remove(key).is_some() {
            self.flush(&guard)?;
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.values.lock().keys().cloned().collect())
    }
}
