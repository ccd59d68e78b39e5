//! Background handling of unsolicited inbound messages.
//!
//! `ui_action` drives the scheduler (pause, resume, schedule and remove
//! tasks); `db_init`/`db_sync` mirror the content side's local database
//! into the key-value store under the `db:` prefix.

use std::sync::Arc;

use scavbot_core_types::{FullDomain, Message, MessageBody, SyncPayload, TaskId, UiActionPayload};
use scavbot_scheduler::{Clock, Scheduler, SystemClock};
use scavbot_state_center::{KeyValueStore, StoreError};
use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::tasks::TaskSpec;

pub const DB_PREFIX: &str = "db:";

/// What the router did with one message.
#[derive(Clone, Debug, PartialEq)]
pub enum Routed {
    Paused,
    Resumed,
    Scheduled(TaskId),
    Removed(bool),
    Stored(usize),
    Ignored,
}

pub struct InboundRouter {
    full_domain: FullDomain,
    scheduler: Scheduler,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
}

impl InboundRouter {
    pub fn new(full_domain: FullDomain, scheduler: Scheduler, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            full_domain,
            scheduler,
            store,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn route(&self, message: &Message) -> Routed {
        if message.full_domain != self.full_domain {
            debug!(addressed = %message.full_domain, "inbound message for another world ignored");
            return Routed::Ignored;
        }
        match &message.body {
            MessageBody::UiAction(ui) => self.ui_action(ui),
            MessageBody::DbInit(sync) => self.store_entries(sync, true),
            MessageBody::DbSync(sync) => self.store_entries(sync, false),
            MessageBody::Command(_)
            | MessageBody::Status(_)
            | MessageBody::Event(_)
            | MessageBody::Error(_)
            | MessageBody::Ack(_)
            | MessageBody::ContentScriptReady(_) => Routed::Ignored,
        }
    }

    fn ui_action(&self, ui: &UiActionPayload) -> Routed {
        match ui.action.as_str() {
            "pause" => {
                self.scheduler.pause();
                Routed::Paused
            }
            "resume" => {
                self.scheduler.resume();
                Routed::Resumed
            }
            "remove_task" => match ui.parameters.get("taskId").and_then(Value::as_str) {
                Some(id) => Routed::Removed(self.scheduler.remove_by_id(&TaskId(id.to_string()))),
                None => {
                    warn!("remove_task without taskId");
                    Routed::Ignored
                }
            },
            "schedule_task" => {
                let spec: TaskSpec = match serde_json::from_value(ui.parameters.clone()) {
                    Ok(spec) => spec,
                    Err(err) => {
                        warn!(%err, "schedule_task with invalid parameters");
                        return Routed::Ignored;
                    }
                };
                let request = match spec.into_request(self.clock.now()) {
                    Ok(request) => request,
                    Err(err) => {
                        warn!(%err, "schedule_task with unusable timing");
                        return Routed::Ignored;
                    }
                };
                match self.scheduler.schedule_task(request) {
                    Ok(id) => Routed::Scheduled(id),
                    Err(err) => {
                        warn!(%err, "schedule_task rejected");
                        Routed::Ignored
                    }
                }
            }
            other => {
                warn!(action = other, "unknown ui action");
                Routed::Ignored
            }
        }
    }

    /// `replace` drops every existing `db:` key first (`db_init`). A null
    /// value in a sync deletes the key.
    fn store_entries(&self, sync: &SyncPayload, replace: bool) -> Routed {
        match self.write_entries(sync, replace) {
            Ok(written) => {
                info!(written, replace, "Local database mirrored");
                Routed::Stored(written)
            }
            Err(err) => {
                warn!(%err, "local database mirror failed");
                Routed::Ignored
            }
        }
    }

    fn write_entries(&self, sync: &SyncPayload, replace: bool) -> Result<usize, StoreError> {
        if replace {
            for key in self.store.keys()? {
                if key.starts_with(DB_PREFIX) {
                    self.store.remove(&key)?;
                }
            }
        }
        let mut written = 0;
        for (key, value) in &sync.entries {
            let key = format!("{DB_PREFIX}{key}");
            if value.is_null() {
                self.store.remove(&key)?;
            } else {
                self.store.set(&key, value.clone())?;
                written += 1;
            }
        }
        Ok(written)
    }

    /// Route every message from `feed` until the feed closes.
    pub fn spawn(self, mut feed: broadcast::Receiver<Message>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match feed.recv().await {
                    Ok(message) => {
                        self.route(&message);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "inbound router lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("inbound feed closed");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scavbot_core_types::ActionId;
    use scavbot_scheduler::{KvSnapshotStore, TaskHandlerRegistry};
    use scavbot_state_center::InMemoryKvStore;
    use serde_json::json;
    use std::collections::BTreeMap;

    const DOMAIN: &str = "pl201.plemiona.pl";

    fn router() -> (InboundRouter, Scheduler, Arc<InMemoryKvStore>) {
        let kv = InMemoryKvStore::new();
        let scheduler = Scheduler::new(
            Arc::new(TaskHandlerRegistry::new()),
            Arc::new(KvSnapshotStore::new(kv.clone())),
        );
        let router = InboundRouter::new(FullDomain::new(DOMAIN), scheduler.clone(), kv.clone());
        (router, scheduler, kv)
    }

    fn ui(domain: &str, action: &str, parameters: Value) -> Message {
        Message::new(
            FullDomain::new(domain),
            ActionId::new(),
            MessageBody::UiAction(UiActionPayload {
                action: action.into(),
                parameters,
            }),
        )
    }

    fn sync(init: bool, entries: Value) -> Message {
        let entries: BTreeMap<String, Value> = serde_json::from_value(entries).unwrap();
        let payload = SyncPayload { entries };
        let body = if init {
            MessageBody::DbInit(payload)
        } else {
            MessageBody::DbSync(payload)
        };
        Message::new(FullDomain::new(DOMAIN), ActionId::new(), body)
    }

    #[test]
    fn ui_actions_drive_the_scheduler() {
        let (router, scheduler, _kv) = router();

        assert_eq!(router.route(&ui(DOMAIN, "pause", Value::Null)), Routed::Paused);
        assert!(scheduler.is_paused());
        assert_eq!(router.route(&ui(DOMAIN, "resume", Value::Null)), Routed::Resumed);
        assert!(!scheduler.is_paused());

        let Routed::Scheduled(id) = router.route(&ui(
            DOMAIN,
            "schedule_task",
            json!({ "payload": { "action": "click", "parameters": {} }, "exclusive": true }),
        )) else {
            panic!("task not scheduled");
        };
        assert_eq!(scheduler.tasks().len(), 1);

        let removed = router.route(&ui(DOMAIN, "remove_task", json!({ "taskId": id.0 })));
        assert_eq!(removed, Routed::Removed(true));
        assert!(scheduler.tasks().is_empty());
    }

    #[test]
    fn out_of_range_timing_is_ignored_and_routing_continues() {
        let (router, scheduler, kv) = router();

        let delayed = router.route(&ui(
            DOMAIN,
            "schedule_task",
            json!({ "payload": { "action": "click" }, "delayMs": 10_000_000_000_000_000u64 }),
        ));
        assert_eq!(delayed, Routed::Ignored);
        let recurring = router.route(&ui(
            DOMAIN,
            "schedule_task",
            json!({ "payload": { "action": "click" }, "intervalMs": 10_000_000_000_000_000u64 }),
        ));
        assert_eq!(recurring, Routed::Ignored);
        assert!(scheduler.tasks().is_empty());

        assert_eq!(router.route(&ui(DOMAIN, "pause", Value::Null)), Routed::Paused);
        assert_eq!(router.route(&sync(false, json!({ "player": "x" }))), Routed::Stored(1));
        assert_eq!(kv.get("db:player").unwrap(), Some(json!("x")));
    }

    #[test]
    fn other_worlds_are_ignored() {
        let (router, scheduler, _kv) = router();
        assert_eq!(router.route(&ui("pl202.plemiona.pl", "pause", Value::Null)), Routed::Ignored);
        assert!(!scheduler.is_paused());
    }

    #[test]
    fn db_init_replaces_and_db_sync_merges() {
        let (router, _scheduler, kv) = router();
        kv.set("action_state:abc", json!({ "action": "click" })).unwrap();

        router.route(&sync(true, json!({ "villages": [1, 2], "player": "x" })));
        router.route(&sync(false, json!({ "player": null, "troops": { "spear": 10 } })));
        assert_eq!(kv.get("db:villages").unwrap(), Some(json!([1, 2])));
        assert_eq!(kv.get("db:player").unwrap(), None);
        assert_eq!(kv.get("db:troops").unwrap(), Some(json!({ "spear": 10 })));

        assert_eq!(router.route(&sync(true, json!({ "fresh": true }))), Routed::Stored(1));
        assert_eq!(kv.get("db:villages").unwrap(), None);
        assert!(kv.get("action_state:abc").unwrap().is_some());
    }
}
