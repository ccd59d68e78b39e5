//! Background-side command requester.
//!
//! `send_command` resolves with the terminal status for the command's
//! `actionId`. An `in-progress` reply only means the content script is
//! about to be torn down (navigation); the terminal status then arrives
//! later on the inbound feed from the next content-script instance.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use action_primitives::{
    Action, ClickAction, ClickResponse, FillInputAction, FillInputResponse, NavigateResponse,
    NavigateToPageAction, PageStatusAction, PageStatusResponse,
};
use scavbot_core_types::{
    error_response, interrupted_response, ActionId, FullDomain, GenericStatusPayload, Message,
    MessageBody, MessageType, ReadyPayload, StatusPayload,
};
use scavbot_event_bus::{next_matching, BusError};
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::BridgeError;
use crate::transport::Transport;

pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Messenger {
    full_domain: FullDomain,
    transport: Arc<dyn Transport>,
    command_timeout: Duration,
    cancel: CancellationToken,
}

impl Messenger {
    pub fn new(full_domain: FullDomain, transport: Arc<dyn Transport>) -> Self {
        Self {
            full_domain,
            transport,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn full_domain(&self) -> &FullDomain {
        &self.full_domain
    }

    /// Send `action` and wait for its terminal status.
    ///
    /// An `error` message correlated to the command resolves as an `error`
    /// status. Timeouts and disposal are reported as errors.
    pub async fn send_command(
        &self,
        action: &str,
        parameters: Value,
    ) -> Result<StatusPayload, BridgeError> {
        if self.cancel.is_cancelled() {
            return Err(BridgeError::Disposed);
        }
        let message = Message::command(self.full_domain.clone(), action, parameters);
        let action_id = message.action_id.clone();
        let deadline = Instant::now() + self.command_timeout;
        // Subscribe before sending so a resumed instance's status is never missed.
        let mut inbound = self.transport.subscribe();

        info!(action_id = %action_id, action, full_domain = %self.full_domain, "Sending command");
        let reply = tokio::select! {
            _ = self.cancel.cancelled() => return Err(BridgeError::Disposed),
            reply = tokio::time::timeout_at(deadline, self.transport.send(message)) => {
                reply.map_err(|_| BridgeError::Timeout(self.command_timeout))??
            }
        };

        if let Some(payload) = self.terminal_reply(&action_id, reply)? {
            debug!(action_id = %action_id, status = ?payload.status, "command answered directly");
            return Ok(payload);
        }

        info!(action_id = %action_id, action, "Command in progress; awaiting resumed status");
        let remaining = deadline.saturating_duration_since(Instant::now());
        let domain = self.full_domain.clone();
        let id = action_id.clone();
        let resumed = self
            .guarded(next_matching(&mut inbound, remaining, move |msg: &Message| {
                msg.full_domain == domain
                    && msg.action_id == id
                    && (msg.is_terminal_status_for(&id) || matches!(msg.body, MessageBody::Error(_)))
            }))
            .await
            .map_err(|err| match err {
                BridgeError::Timeout(_) => BridgeError::Timeout(self.command_timeout),
                other => other,
            })?;

        self.terminal_reply(&action_id, resumed)?
            .ok_or_else(|| BridgeError::UnexpectedResponse("non-terminal status".into()))
    }

    /// `Some(payload)` for a terminal answer, `None` for `in-progress`.
    fn terminal_reply(
        &self,
        action_id: &ActionId,
        reply: Message,
    ) -> Result<Option<StatusPayload>, BridgeError> {
        if &reply.action_id != action_id {
            return Err(BridgeError::UnexpectedResponse(format!(
                "reply for {} while waiting on {}",
                reply.action_id, action_id
            )));
        }
        let kind = reply.message_type();
        match reply.body {
            MessageBody::Status(payload) if payload.is_terminal() => Ok(Some(payload)),
            MessageBody::Status(_) => Ok(None),
            MessageBody::Error(err) => Ok(Some(error_response(err.message))),
            _ => Err(BridgeError::UnexpectedResponse(format!(
                "{kind} reply to a command"
            ))),
        }
    }

    /// Wait for the next inbound message of `message_type` for this domain
    /// (and `action_id`, when given) accepted by `predicate`.
    pub async fn wait_for<F>(
        &self,
        message_type: MessageType,
        mut predicate: F,
        timeout: Duration,
        action_id: Option<&ActionId>,
    ) -> Result<Message, BridgeError>
    where
        F: FnMut(&Message) -> bool + Send,
    {
        if self.cancel.is_cancelled() {
            return Err(BridgeError::Disposed);
        }
        let mut inbound = self.transport.subscribe();
        let domain = &self.full_domain;
        self.guarded(next_matching(&mut inbound, timeout, |msg: &Message| {
            msg.full_domain == *domain
                && msg.message_type() == message_type
                && action_id.map_or(true, |id| &msg.action_id == id)
                && predicate(msg)
        }))
        .await
    }

    /// Wait for a content script of this domain to announce itself.
    pub async fn wait_for_ready(&self, timeout: Duration) -> Result<ReadyPayload, BridgeError> {
        let message = self
            .wait_for(MessageType::ContentScriptReady, |_| true, timeout, None)
            .await?;
        match message.body {
            MessageBody::ContentScriptReady(ready) => Ok(ready),
            _ => Err(BridgeError::UnexpectedResponse("ready message without payload".into())),
        }
    }

    /// Cancel every pending wait; later calls fail with [`BridgeError::Disposed`].
    pub fn dispose(&self) {
        if !self.cancel.is_cancelled() {
            info!(full_domain = %self.full_domain, "Messenger disposed");
        }
        self.cancel.cancel();
    }

    pub fn is_disposed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    async fn guarded<T, Fut>(&self, wait: Fut) -> Result<T, BridgeError>
    where
        Fut: Future<Output = Result<T, BusError>>,
    {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(BridgeError::Disposed),
            result = wait => result.map_err(BridgeError::from),
        }
    }

    /// Typed wrapper over [`Messenger::send_command`]. Never fails:
    /// transport problems come back as `interrupted`.
    pub async fn execute_action<A: Action>(&self, action: &A) -> GenericStatusPayload<A::Response> {
        let parameters = match serde_json::to_value(action) {
            Ok(parameters) => parameters,
            Err(err) => return error_response(format!("parameter encode failed: {err}")),
        };
        match self.send_command(A::NAME, parameters).await {
            Ok(payload) => payload
                .decode::<A::Response>()
                .unwrap_or_else(|err| error_response(err.to_string())),
            Err(err) => {
                warn!(action = A::NAME, full_domain = %self.full_domain, %err, "command interrupted");
                interrupted_response(err.to_string())
            }
        }
    }

    pub async fn execute_click_action(
        &self,
        action: ClickAction,
    ) -> GenericStatusPayload<ClickResponse> {
        self.execute_action(&action).await
    }

    pub async fn execute_fill_input_action(
        &self,
        action: FillInputAction,
    ) -> GenericStatusPayload<FillInputResponse> {
        self.execute_action(&action).await
    }

    pub async fn execute_navigate_action(
        &self,
        action: NavigateToPageAction,
    ) -> GenericStatusPayload<NavigateResponse> {
        self.execute_action(&action).await
    }

    pub async fn execute_page_status_action(
        &self,
        action: PageStatusAction,
    ) -> GenericStatusPayload<PageStatusResponse> {
        self.execute_action(&action).await
    }
}
