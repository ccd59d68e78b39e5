//! Shared primitives for the scavbot workspace.
//!
//! Holds the identifiers every other crate passes around and the
//! cross-context message protocol spoken between the background and the
//! content (page) context.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod protocol;
pub mod status;

pub use protocol::{
    AckPayload, CommandPayload, ErrorPayload, EventPayload, Message, MessageBody, MessageType,
    ReadyPayload, SyncPayload, UiActionPayload,
};
pub use status::{
    done_response, error_response, in_progress_response, interrupted_response,
    GenericStatusPayload, Status, StatusPayload,
};

/// Shared error type for protocol encoding and decoding.
#[derive(Debug, Error, Clone)]
pub enum CoreError {
    #[error("{message}")]
    Message { message: String },
    #[error("payload decode failed: {0}")]
    Decode(String),
}

impl CoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Correlates a command with its status messages.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(pub String);

impl ActionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ActionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Scheduler task identifier, `"<creation-millis>-<sequence>"`.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn from_parts(created_at_ms: i64, sequence: u64) -> Self {
        Self(format!("{created_at_ms}-{sequence}"))
    }

    /// Sequence component, if the id follows the `millis-seq` layout.
    pub fn sequence(&self) -> Option<u64> {
        self.0.rsplit_once('-').and_then(|(_, seq)| seq.parse().ok())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Game-world host (e.g. `pl201.plemiona.pl`) scoping every message, so
/// sessions of different worlds open in separate tabs never cross-deliver.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FullDomain(pub String);

impl FullDomain {
    pub fn new(domain: impl Into<String>) -> Self {
        Self(domain.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FullDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
