//! Per-invocation context handed to every action handler.

use std::sync::Arc;

use async_trait::async_trait;
use scavbot_core_types::{ActionId, FullDomain, Message};
use serde_json::Value;
use tracing::warn;

use crate::errors::ActionError;
use crate::page::Page;

/// Channel back to the requesting context for unsolicited messages
/// (out-of-band events, late status updates).
#[async_trait]
pub trait Outbox: Send + Sync {
    async fn post(&self, message: Message) -> Result<(), ActionError>;
}

/// Outbox that drops everything; for contexts with no listener.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopOutbox;

#[async_trait]
impl Outbox for NoopOutbox {
    async fn post(&self, _message: Message) -> Result<(), ActionError> {
        Ok(())
    }
}

/// Created fresh for each command delivery; never persisted. The
/// `is_current_action_restored` flag is derived from persisted action
/// state by whoever builds the context.
#[derive(Clone)]
pub struct ActionContext {
    pub action_id: ActionId,
    pub full_domain: FullDomain,
    pub is_current_action_restored: bool,
    pub page: Arc<dyn Page>,
    pub outbox: Arc<dyn Outbox>,
}

impl ActionContext {
    pub fn new(
        action_id: ActionId,
        full_domain: FullDomain,
        page: Arc<dyn Page>,
        outbox: Arc<dyn Outbox>,
    ) -> Self {
        Self {
            action_id,
            full_domain,
            is_current_action_restored: false,
            page,
            outbox,
        }
    }

    pub fn restored(mut self, restored: bool) -> Self {
        self.is_current_action_restored = restored;
        self
    }

    /// Post an `event` message correlated with the current action. Delivery
    /// failures are logged, never raised.
    pub async fn emit_event(&self, name: &str, data: Value) {
        let message = Message::event(
            self.full_domain.clone(),
            self.action_id.clone(),
            name,
            data,
        );
        if let Err(err) = self.outbox.post(message).await {
            warn!(action_id = %self.action_id, event = name, %err, "event delivery failed");
        }
    }
}
