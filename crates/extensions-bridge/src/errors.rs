use std::time::Duration;

use scavbot_event_bus::BusError;
use thiserror::Error;

/// Errors surfaced by the messenger and its transports.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BridgeError {
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("messenger disposed")]
    Disposed,
    #[error("channel closed")]
    ChannelClosed,
    #[error("no content endpoint attached")]
    NoEndpoint,
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<BusError> for BridgeError {
    fn from(err: BusError) -> Self {
        match err {
            BusError::Timeout(after) => BridgeError::Timeout(after),
            BusError::Closed => BridgeError::ChannelClosed,
            BusError::NoSubscribers => BridgeError::Internal(err.to_string()),
        }
    }
}
