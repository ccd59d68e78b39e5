//! Persisted queue state.

use std::sync::Arc;

use scavbot_state_center::{load_json, save_json, KeyValueStore};
use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;
use crate::model::Task;

pub const DEFAULT_SNAPSHOT_KEY: &str = "scheduler_state";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerSnapshot {
    #[serde(default)]
    pub exclusive_queue: Vec<Task>,
    #[serde(default)]
    pub parallel_queue: Vec<Task>,
    #[serde(default)]
    pub task_id_counter: u64,
}

/// Last write wins; `restore` yields the last persisted snapshot, if any.
pub trait SnapshotStore: Send + Sync {
    fn persist(&self, snapshot: &SchedulerSnapshot) -> Result<(), SchedulerError>;
    fn restore(&self) -> Result<Option<SchedulerSnapshot>, SchedulerError>;
}

/// Snapshot kept as one JSON value in a [`KeyValueStore`].
#[derive(Clone)]
pub struct KvSnapshotStore {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl KvSnapshotStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_key(store, DEFAULT_SNAPSHOT_KEY)
    }

    pub fn with_key(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }
}

impl SnapshotStore for KvSnapshotStore {
    fn persist(&self, snapshot: &SchedulerSnapshot) -> Result<(), SchedulerError> {
        save_json(self.store.as_ref(), &self.key, snapshot)?;
        Ok(())
    }

    fn restore(&self) -> Result<Option<SchedulerSnapshot>, SchedulerError> {
        Ok(load_json(self.store.as_ref(), &self.key)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scavbot_state_center::InMemoryKvStore;
    use serde_json::json;

    #[test]
    fn snapshot_uses_camel_case_layout() {
        let kv = InMemoryKvStore::new();
        let store = KvSnapshotStore::new(kv.clone());
        store
            .persist(&SchedulerSnapshot {
                task_id_counter: 7,
                ..SchedulerSnapshot::default()
            })
            .unwrap();

        let raw = kv.get(DEFAULT_SNAPSHOT_KEY).unwrap().unwrap();
        assert_eq!(
            raw,
            json!({ "exclusiveQueue": [], "parallelQueue": [], "taskIdCounter": 7 })
        );
    }

    #[test]
    fn malformed_snapshot_is_an_error_not_a_panic() {
        let kv = InMemoryKvStore::new();
        kv.set(DEFAULT_SNAPSHOT_KEY, json!({ "exclusiveQueue": "nope" }))
            .unwrap();
        assert!(KvSnapshotStore::new(kv).restore().is_err());
    }
}
