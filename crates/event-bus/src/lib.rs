use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

/// Trait implemented by payload types that can be carried on the bus.
pub trait Event: Clone + Send + Sync + std::fmt::Debug + 'static {}

impl<T> Event for T where T: Clone + Send + Sync + std::fmt::Debug + 'static {}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("no subscriber is listening")]
    NoSubscribers,
    #[error("bus closed")]
    Closed,
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

#[async_trait]
pub trait EventBus<E>: Send + Sync
where
    E: Event,
{
    async fn publish(&self, event: E) -> Result<(), BusError>;
    fn subscribe(&self) -> broadcast::Receiver<E>;
}

/// Simple in-memory bus; every subscriber sees every event published after
/// it subscribed.
pub struct InMemoryBus<E>
where
    E: Event,
{
    sender: broadcast::Sender<E>,
}

impl<E> InMemoryBus<E>
where
    E: Event,
{
    pub fn new(capacity: usize) -> Arc<Self> {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Arc::new(Self { sender })
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[async_trait]
impl<E> EventBus<E> for InMemoryBus<E>
where
    E: Event,
{
    async fn publish(&self, event: E) -> Result<(), BusError> {
        self.sender
            .send(event)
            .map(|_| ())
            .map_err(|_| BusError::NoSubscribers)
    }

    fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }
}

/// Wait on `rx` for the first event accepted by `predicate`.
///
/// Lagged receivers skip the dropped events and keep waiting.
pub async fn next_matching<E, F>(
    rx: &mut broadcast::Receiver<E>,
    timeout: Duration,
    mut predicate: F,
) -> Result<E, BusError>
where
    E: Event,
    F: FnMut(&E) -> bool,
{
    let wait = async {
        loop {
            match rx.recv().await {
                Ok(event) if predicate(&event) => return Ok(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "bus subscriber lagged; events dropped");
                }
                Err(RecvError::Closed) => return Err(BusError::Closed),
            }
        }
    };
    tokio::time::timeout(timeout, wait)
        .await
        .map_err(|_| BusError::Timeout(timeout))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_without_subscribers_reports_it() {
        let bus = InMemoryBus::<u32>::new(4);
        assert_eq!(bus.publish(1).await, Err(BusError::NoSubscribers));
    }

    #[tokio::test]
    async fn next_matching_skips_unrelated_events() {
        let bus = InMemoryBus::<u32>::new(8);
        let mut rx = bus.subscribe();
        bus.publish(1).await.unwrap();
        bus.publish(7).await.unwrap();
        bus.publish(9).await.unwrap();

        let got = next_matching(&mut rx, Duration::from_secs(1), |v| *v > 5)
            .await
            .unwrap();
        assert_eq!(got, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn next_matching_times_out() {
        let bus = InMemoryBus::<u32>::new(8);
        let mut rx = bus.subscribe();
        let err = next_matching(&mut rx, Duration::from_millis(50), |_| true)
            .await
            .unwrap_err();
        assert_eq!(err, BusError::Timeout(Duration::from_millis(50)));
    }
}
