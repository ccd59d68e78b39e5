//! Status payloads carried by `status` messages and returned by every
//! action handler.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::CoreError;

/// Lifecycle of a command as reported by the executing context.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    /// Accepted but not finished in this page load (e.g. navigation started).
    InProgress,
    Done,
    Error,
    /// The transport gave up (timeout, disposed messenger, closed channel).
    Interrupted,
}

impl Status {
    /// Whether a command with this status is finished for the requester.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Status::InProgress)
    }
}

/// `{status, details?, statusMessage?}` with typed details.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenericStatusPayload<R> {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<R>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
}

/// Untyped form used on the wire.
pub type StatusPayload = GenericStatusPayload<Value>;

impl<R> GenericStatusPayload<R> {
    pub fn new(status: Status) -> Self {
        Self {
            status,
            details: None,
            status_message: None,
        }
    }

    pub fn with_details(mut self, details: R) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.status_message = Some(message.into());
        self
    }

    pub fn is_done(&self) -> bool {
        self.status == Status::Done
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

impl<R: Serialize> GenericStatusPayload<R> {
    /// Erase the details type. Details that fail to serialize turn the
    /// payload into an `error`.
    pub fn into_untyped(self) -> StatusPayload {
        let details = match self.details.map(serde_json::to_value).transpose() {
            Ok(details) => details,
            Err(err) => {
                return error_response(format!("response encode failed: {err}"));
            }
        };
        GenericStatusPayload {
            status: self.status,
            details,
            status_message: self.status_message,
        }
    }
}

impl StatusPayload {
    /// Decode the details into the handler's response type.
    pub fn decode<R: DeserializeOwned>(self) -> Result<GenericStatusPayload<R>, CoreError> {
        let details = match self.details {
            None | Some(Value::Null) => None,
            Some(value) => Some(serde_json::from_value(value)?),
        };
        Ok(GenericStatusPayload {
            status: self.status,
            details,
            status_message: self.status_message,
        })
    }
}

/// Terminal success carrying the handler result.
pub fn done_response<R>(details: R) -> GenericStatusPayload<R> {
    GenericStatusPayload::new(Status::Done).with_details(details)
}

/// Non-terminal acknowledgement; the real outcome follows later.
pub fn in_progress_response<R>() -> GenericStatusPayload<R> {
    GenericStatusPayload::new(Status::InProgress)
}

pub fn error_response<R>(message: impl Into<String>) -> GenericStatusPayload<R> {
    GenericStatusPayload::new(Status::Error).with_message(message)
}

pub fn interrupted_response<R>(message: impl Into<String>) -> GenericStatusPayload<R> {
    GenericStatusPayload::new(Status::Interrupted).with_message(message)
}
