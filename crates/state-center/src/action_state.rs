use std::sync::Arc;

use chrono::{DateTime, Utc};
use scavbot_core_types::{ActionId, FullDomain};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::{load_json, save_json, KeyValueStore, StoreError};

const STATE_PREFIX: &str = "action_state:";
const CURRENT_PREFIX: &str = "action_state:current:";

/// A command the content context accepted but has not finished yet.
///
/// Content-script instances live for a single page load; this record is
/// what lets the next instance recognise it is continuing `action_id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionState {
    pub action_id: ActionId,
    pub full_domain: FullDomain,
    pub action: String,
    #[serde(default)]
    pub parameters: Value,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub resume_count: u32,
}

impl ActionState {
    pub fn new(
        action_id: ActionId,
        full_domain: FullDomain,
        action: impl Into<String>,
        parameters: Value,
    ) -> Self {
        Self {
            action_id,
            full_domain,
            action: action.into(),
            parameters,
            started_at: Utc::now(),
            resume_count: 0,
        }
    }
}

/// Persisted per-action state keyed by `actionId`, plus a per-domain
/// pointer to the action currently in flight.
#[derive(Clone)]
pub struct ActionStateStore {
    store: Arc<dyn KeyValueStore>,
}

impl ActionStateStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn state_key(action_id: &ActionId) -> String {
        format!("{STATE_PREFIX}{action_id}")
    }

    fn current_key(domain: &FullDomain) -> String {
        format!("{CURRENT_PREFIX}{domain}")
    }

    /// Record `state` and make it the domain's in-flight action.
    pub fn begin(&self, state: &ActionState) -> Result<(), StoreError> {
        save_json(self.store.as_ref(), &Self::state_key(&state.action_id), state)?;
        save_json(
            self.store.as_ref(),
            &Self::current_key(&state.full_domain),
            &state.action_id,
        )?;
        debug!(action_id = %state.action_id, action = %state.action, "action state recorded");
        Ok(())
    }

    pub fn get(&self, action_id: &ActionId) -> Result<Option<ActionState>, StoreError> {
        load_json(self.store.as_ref(), &Self::state_key(action_id))
    }

    /// The unfinished action for `domain`, if any.
    pub fn pending_for(&self, domain: &FullDomain) -> Result<Option<ActionState>, StoreError> {
        let current: Option<ActionId> = load_json(self.store.as_ref(), &Self::current_key(domain))?;
        match current {
            Some(action_id) => self.get(&action_id),
            None => Ok(None),
        }
    }

    /// Bump the resume counter; returns the updated state.
    pub fn mark_resumed(&self, action_id: &ActionId) -> Result<Option<ActionState>, StoreError> {
        let Some(mut state) = self.get(action_id)? else {
            return Ok(None);
        };
        state.resume_count += 1;
        save_json(self.store.as_ref(), &Self::state_key(action_id), &state)?;
        Ok(Some(state))
    }

    /// Forget `action_id`; clears the domain pointer only if it still
    /// points at this action.
    pub fn complete(&self, domain: &FullDomain, action_id: &ActionId) -> Result<(), StoreError> {
        self.store.remove(&Self::state_key(action_id))?;
        let current: Option<ActionId> = load_json(self.store.as_ref(), &Self::current_key(domain))?;
        if current.as_ref() == Some(action_id) {
            self.store.remove(&Self::current_key(domain))?;
        }
        debug!(action_id = %action_id, "action state cleared");
        Ok(())
    }
}
