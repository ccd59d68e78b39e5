//! Cross-context message envelope.
//!
//! A closed tagged union discriminated by `type`. New message kinds are
//! added by extending [`MessageBody`]; handling sites match exhaustively.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::status::StatusPayload;
use crate::{ActionId, FullDomain};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub action_id: ActionId,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub full_domain: FullDomain,
    #[serde(flatten)]
    pub body: MessageBody,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum MessageBody {
    #[serde(rename = "command")]
    Command(CommandPayload),
    #[serde(rename = "status")]
    Status(StatusPayload),
    #[serde(rename = "event")]
    Event(EventPayload),
    #[serde(rename = "error")]
    Error(ErrorPayload),
    #[serde(rename = "ack")]
    Ack(AckPayload),
    #[serde(rename = "contentScriptReady")]
    ContentScriptReady(ReadyPayload),
    #[serde(rename = "db_init")]
    DbInit(SyncPayload),
    #[serde(rename = "db_sync")]
    DbSync(SyncPayload),
    #[serde(rename = "ui_action")]
    UiAction(UiActionPayload),
}

/// Payload-free discriminant of [`MessageBody`], used to subscribe by type.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    #[serde(rename = "command")]
    Command,
    #[serde(rename = "status")]
    Status,
    #[serde(rename = "event")]
    Event,
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "ack")]
    Ack,
    #[serde(rename = "contentScriptReady")]
    ContentScriptReady,
    #[serde(rename = "db_init")]
    DbInit,
    #[serde(rename = "db_sync")]
    DbSync,
    #[serde(rename = "ui_action")]
    UiAction,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Command => "command",
            MessageType::Status => "status",
            MessageType::Event => "event",
            MessageType::Error => "error",
            MessageType::Ack => "ack",
            MessageType::ContentScriptReady => "contentScriptReady",
            MessageType::DbInit => "db_init",
            MessageType::DbSync => "db_sync",
            MessageType::UiAction => "ui_action",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommandPayload {
    pub action: String,
    #[serde(default)]
    pub parameters: Value,
}

/// Out-of-band notification, e.g. a popup that appeared on the page.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    pub name: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged: Option<MessageType>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyPayload {
    pub url: String,
    /// Set when the booting content script resumed an unfinished command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restored_action: Option<ActionId>,
}

/// Key/value entries exchanged by `db_init` and `db_sync`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncPayload {
    #[serde(default)]
    pub entries: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UiActionPayload {
    pub action: String,
    #[serde(default)]
    pub parameters: Value,
}

impl Message {
    pub fn new(full_domain: FullDomain, action_id: ActionId, body: MessageBody) -> Self {
        Self {
            action_id,
            timestamp: Utc::now(),
            correlation_id: None,
            full_domain,
            body,
        }
    }

    /// A fresh command with a newly minted action id.
    pub fn command(full_domain: FullDomain, action: impl Into<String>, parameters: Value) -> Self {
        Self::new(
            full_domain,
            ActionId::new(),
            MessageBody::Command(CommandPayload {
                action: action.into(),
                parameters,
            }),
        )
    }

    pub fn status(full_domain: FullDomain, action_id: ActionId, payload: StatusPayload) -> Self {
        Self::new(full_domain, action_id, MessageBody::Status(payload))
    }

    pub fn event(
        full_domain: FullDomain,
        action_id: ActionId,
        name: impl Into<String>,
        data: Value,
    ) -> Self {
        Self::new(
            full_domain,
            action_id,
            MessageBody::Event(EventPayload {
                name: name.into(),
                data,
            }),
        )
    }

    pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn message_type(&self) -> MessageType {
        match &self.body {
            MessageBody::Command(_) => MessageType::Command,
            MessageBody::Status(_) => MessageType::Status,
            MessageBody::Event(_) => MessageType::Event,
            MessageBody::Error(_) => MessageType::Error,
            MessageBody::Ack(_) => MessageType::Ack,
            MessageBody::ContentScriptReady(_) => MessageType::ContentScriptReady,
            MessageBody::DbInit(_) => MessageType::DbInit,
            MessageBody::DbSync(_) => MessageType::DbSync,
            MessageBody::UiAction(_) => MessageType::UiAction,
        }
    }

    pub fn as_status(&self) -> Option<&StatusPayload> {
        match &self.body {
            MessageBody::Status(payload) => Some(payload),
            _ => None,
        }
    }

    /// `done`/`error`/`interrupted` status for `action_id`.
    pub fn is_terminal_status_for(&self, action_id: &ActionId) -> bool {
        &self.action_id == action_id
            && self
                .as_status()
                .map(|payload| payload.is_terminal())
                .unwrap_or(false)
    }
}
