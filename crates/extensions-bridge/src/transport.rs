//! Low-level delivery between the background and content contexts.

use std::sync::Arc;

use action_primitives::{ActionError, Outbox};
use async_trait::async_trait;
use parking_lot::RwLock;
use scavbot_core_types::Message;
use scavbot_event_bus::{BusError, EventBus, InMemoryBus};
use tokio::sync::broadcast;
use tracing::debug;

use crate::errors::BridgeError;

/// One-shot request/response plus an independent inbound feed.
///
/// Responses carry the request's `actionId`. Delivery is attempted once;
/// nothing here retries.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, message: Message) -> Result<Message, BridgeError>;
    fn subscribe(&self) -> broadcast::Receiver<Message>;
}

/// Receiving side of [`Transport::send`]: the content context.
#[async_trait]
pub trait CommandEndpoint: Send + Sync {
    async fn handle(&self, message: Message) -> Message;
}

/// In-process transport: requests go straight to the attached endpoint,
/// unsolicited messages travel over a shared bus.
///
/// Attaching a new endpoint models a page load replacing the content
/// script; the previous instance simply stops receiving.
pub struct LoopbackTransport {
    endpoint: RwLock<Option<Arc<dyn CommandEndpoint>>>,
    inbound: Arc<InMemoryBus<Message>>,
}

impl LoopbackTransport {
    pub fn new(inbound: Arc<InMemoryBus<Message>>) -> Arc<Self> {
        Arc::new(Self {
            endpoint: RwLock::new(None),
            inbound,
        })
    }

    /// Install `endpoint`, returning the one it replaced.
    pub fn attach(&self, endpoint: Arc<dyn CommandEndpoint>) -> Option<Arc<dyn CommandEndpoint>> {
        self.endpoint.write().replace(endpoint)
    }

    pub fn detach(&self) -> Option<Arc<dyn CommandEndpoint>> {
        self.endpoint.write().take()
    }

    pub fn is_attached(&self) -> bool {
        self.endpoint.read().is_some()
    }

    /// Outbox the content side uses for unsolicited messages.
    pub fn outbox(&self) -> Arc<BusOutbox> {
        Arc::new(BusOutbox::new(self.inbound.clone()))
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&self, message: Message) -> Result<Message, BridgeError> {
        let endpoint = self.endpoint.read().clone();
        let endpoint = endpoint.ok_or(BridgeError::NoEndpoint)?;
        Ok(endpoint.handle(message).await)
    }

    fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.inbound.subscribe()
    }
}

/// [`Outbox`] publishing onto the inbound bus.
pub struct BusOutbox {
    bus: Arc<InMemoryBus<Message>>,
}

impl BusOutbox {
    pub fn new(bus: Arc<InMemoryBus<Message>>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl Outbox for BusOutbox {
    async fn post(&self, message: Message) -> Result<(), ActionError> {
        let kind = message.message_type();
        match self.bus.publish(message).await {
            Ok(()) => Ok(()),
            Err(BusError::NoSubscribers) => {
                debug!(message_type = %kind, "no listener for posted message");
                Ok(())
            }
            Err(err) => Err(ActionError::Outbox(err.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scavbot_core_types::{done_response, ActionId, FullDomain};
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl CommandEndpoint for Echo {
        async fn handle(&self, message: Message) -> Message {
            Message::status(
                message.full_domain,
                message.action_id,
                done_response(json!({ "echo": true })),
            )
        }
    }

    #[tokio::test]
    async fn send_without_endpoint_fails() {
        let transport = LoopbackTransport::new(InMemoryBus::new(8));
        let err = transport
            .send(Message::command(FullDomain::new("w1"), "click", json!({})))
            .await
            .unwrap_err();
        assert_eq!(err, BridgeError::NoEndpoint);
    }

    #[tokio::test]
    async fn response_keeps_the_action_id() {
        let transport = LoopbackTransport::new(InMemoryBus::new(8));
        assert!(transport.attach(Arc::new(Echo)).is_none());

        let command = Message::command(FullDomain::new("w1"), "click", json!({}));
        let id = command.action_id.clone();
        let response = transport.send(command).await.unwrap();
        assert_eq!(response.action_id, id);
        assert!(response.is_terminal_status_for(&id));
    }

    #[tokio::test]
    async fn outbox_posts_reach_subscribers() {
        let transport = LoopbackTransport::new(InMemoryBus::new(8));
        let mut rx = transport.subscribe();
        let outbox = transport.outbox();

        outbox
            .post(Message::event(FullDomain::new("w1"), ActionId::new(), "popup", json!({})))
            .await
            .unwrap();
        let got = rx.recv().await.unwrap();
        assert_eq!(got.message_type().as_str(), "event");
    }
}
