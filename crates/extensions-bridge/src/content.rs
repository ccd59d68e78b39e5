//! Content-context runtime: one instance per page load.
//!
//! Before running a command the runtime records it in the
//! [`ActionStateStore`]. If the page navigates away mid-command, the next
//! instance finds that record on boot, re-runs the action with the
//! restored flag set, and posts the terminal status the requester is
//! still waiting for.

use std::sync::Arc;

use action_primitives::{ActionContext, ActionExecutor, Outbox, Page};
use async_trait::async_trait;
use scavbot_core_types::{
    error_response, ActionId, AckPayload, FullDomain, Message, MessageBody, ReadyPayload,
    StatusPayload,
};
use scavbot_state_center::{ActionState, ActionStateStore};
use tracing::{debug, info, warn};

use crate::transport::CommandEndpoint;

/// Reloads an action may survive before it is abandoned.
pub const MAX_RESUMES: u32 = 3;

/// What a booting runtime did with a leftover action.
#[derive(Clone, Debug, PartialEq)]
pub struct ResumedAction {
    pub action_id: ActionId,
    pub payload: StatusPayload,
}

pub struct ContentRuntime {
    full_domain: FullDomain,
    executor: Arc<ActionExecutor>,
    page: Arc<dyn Page>,
    outbox: Arc<dyn Outbox>,
    states: ActionStateStore,
}

impl ContentRuntime {
    pub fn new(
        full_domain: FullDomain,
        executor: Arc<ActionExecutor>,
        page: Arc<dyn Page>,
        outbox: Arc<dyn Outbox>,
        states: ActionStateStore,
    ) -> Arc<Self> {
        Arc::new(Self {
            full_domain,
            executor,
            page,
            outbox,
            states,
        })
    }

    pub fn full_domain(&self) -> &FullDomain {
        &self.full_domain
    }

    /// Page-load entry point: finish any action the previous instance left
    /// behind, then announce `contentScriptReady`.
    pub async fn boot(&self) -> Option<ResumedAction> {
        let resumed = self.resume_pending().await;
        let ready = Message::new(
            self.full_domain.clone(),
            ActionId::new(),
            MessageBody::ContentScriptReady(ReadyPayload {
                url: self.page.current_url(),
                restored_action: resumed.as_ref().map(|r| r.action_id.clone()),
            }),
        );
        if let Err(err) = self.outbox.post(ready).await {
            warn!(full_domain = %self.full_domain, %err, "ready announcement failed");
        }
        info!(
            full_domain = %self.full_domain,
            url = %self.page.current_url(),
            restored = resumed.is_some(),
            "Content runtime booted"
        );
        resumed
    }

    async fn resume_pending(&self) -> Option<ResumedAction> {
        let pending = match self.states.pending_for(&self.full_domain) {
            Ok(pending) => pending?,
            Err(err) => {
                warn!(full_domain = %self.full_domain, %err, "action state unreadable; nothing resumed");
                return None;
            }
        };
        let action_id = pending.action_id.clone();

        let payload = if pending.resume_count >= MAX_RESUMES {
            warn!(
                action_id = %action_id,
                resumes = pending.resume_count,
                "resume limit reached; abandoning action"
            );
            error_response(format!(
                "{} abandoned after {} reloads",
                pending.action, pending.resume_count
            ))
        } else {
            let state = match self.states.mark_resumed(&action_id) {
                Ok(Some(state)) => state,
                Ok(None) => pending,
                Err(err) => {
                    warn!(action_id = %action_id, %err, "resume counter not persisted");
                    pending
                }
            };
            info!(action_id = %action_id, action = %state.action, "Restoring action after reload");
            self.run(&state, true).await
        };

        self.settle(&action_id, &payload);
        let status = Message::status(self.full_domain.clone(), action_id.clone(), payload.clone());
        if let Err(err) = self.outbox.post(status).await {
            warn!(action_id = %action_id, %err, "resumed status not delivered");
        }
        Some(ResumedAction { action_id, payload })
    }

    async fn run(&self, state: &ActionState, restored: bool) -> StatusPayload {
        let ctx = ActionContext::new(
            state.action_id.clone(),
            self.full_domain.clone(),
            self.page.clone(),
            self.outbox.clone(),
        )
        .restored(restored);
        self.executor
            .execute(&ctx, &state.action, state.parameters.clone())
            .await
    }

    /// Drop the persisted record once the action reached a terminal status.
    fn settle(&self, action_id: &ActionId, payload: &StatusPayload) {
        if !payload.is_terminal() {
            debug!(action_id = %action_id, "action still in progress; state kept");
            return;
        }
        if let Err(err) = self.states.complete(&self.full_domain, action_id) {
            warn!(action_id = %action_id, %err, "action state not cleared");
        }
    }
}

#[async_trait]
impl CommandEndpoint for ContentRuntime {
    async fn handle(&self, message: Message) -> Message {
        if message.full_domain != self.full_domain {
            warn!(
                action_id = %message.action_id,
                addressed = %message.full_domain,
                full_domain = %self.full_domain,
                "message for another world"
            );
            return Message::status(
                self.full_domain.clone(),
                message.action_id,
                error_response(format!("not addressed to {}", self.full_domain)),
            );
        }

        let kind = message.message_type();
        let MessageBody::Command(command) = message.body else {
            return Message::new(
                self.full_domain.clone(),
                message.action_id,
                MessageBody::Ack(AckPayload {
                    acknowledged: Some(kind),
                }),
            );
        };

        let state = ActionState::new(
            message.action_id.clone(),
            self.full_domain.clone(),
            command.action,
            command.parameters,
        );
        if let Err(err) = self.states.begin(&state) {
            warn!(action_id = %state.action_id, %err, "action state not recorded; reload will not resume it");
        }

        info!(action_id = %state.action_id, action = %state.action, "Executing command");
        let payload = self.run(&state, false).await;
        self.settle(&state.action_id, &payload);

        let mut reply = Message::status(self.full_domain.clone(), state.action_id, payload);
        reply.correlation_id = message.correlation_id;
        reply
    }
}
