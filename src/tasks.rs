//! Task kinds the background knows how to run.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use extensions_bridge::Messenger;
use scavbot_core_types::Status;
use scavbot_scheduler::{
    offset_by_millis, Lane, ScheduleRequest, Task, TaskAction, TaskError, TaskHandler,
    TaskHandlerRegistry,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::errors::AppError;

/// Task kind that forwards an action to the content context.
pub const COMMAND_TASK_KIND: &str = "command";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommandTaskPayload {
    pub action: String,
    #[serde(default)]
    pub parameters: Value,
}

/// Sends its payload through the messenger; anything but a `done`
/// terminal status is a failed run.
pub struct CommandTaskHandler {
    messenger: Arc<Messenger>,
}

impl CommandTaskHandler {
    pub fn new(messenger: Arc<Messenger>) -> Self {
        Self { messenger }
    }
}

#[async_trait]
impl TaskHandler for CommandTaskHandler {
    async fn run(&self, task: &Task) -> Result<(), TaskError> {
        let payload: CommandTaskPayload = serde_json::from_value(task.action.payload.clone())
            .map_err(|err| TaskError::InvalidPayload(err.to_string()))?;
        let status = self
            .messenger
            .send_command(&payload.action, payload.parameters)
            .await
            .map_err(|err| TaskError::failed(err.to_string()))?;

        match status.status {
            Status::Done => {
                info!(task_id = %task.id, action = %payload.action, "Command task done");
                Ok(())
            }
            other => {
                let message = status.status_message.unwrap_or_default();
                warn!(task_id = %task.id, action = %payload.action, status = ?other, %message, "Command task not done");
                Err(TaskError::failed(format!("{}: {other:?} {message}", payload.action)))
            }
        }
    }
}

pub fn register_default_tasks(registry: &TaskHandlerRegistry, messenger: Arc<Messenger>) {
    registry.register(COMMAND_TASK_KIND, Arc::new(CommandTaskHandler::new(messenger)));
}

/// Task description accepted from the CLI and from `ui_action` messages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSpec {
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub exclusive: bool,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub delay_ms: Option<u64>,
    #[serde(default)]
    pub interval_ms: Option<u64>,
}

fn default_kind() -> String {
    COMMAND_TASK_KIND.to_string()
}

impl TaskSpec {
    pub fn command(action: impl Into<String>, parameters: Value) -> Self {
        Self {
            kind: default_kind(),
            payload: serde_json::json!({ "action": action.into(), "parameters": parameters }),
            exclusive: false,
            priority: 0,
            delay_ms: None,
            interval_ms: None,
        }
    }

    pub fn into_request(self, now: DateTime<Utc>) -> Result<ScheduleRequest, AppError> {
        let lane = if self.exclusive {
            Lane::Exclusive
        } else {
            Lane::Parallel
        };
        let mut request = ScheduleRequest::new(TaskAction::new(self.kind, self.payload), lane)
            .with_priority(self.priority);
        if let Some(delay_ms) = self.delay_ms {
            let run_at = offset_by_millis(now, delay_ms).ok_or(AppError::InvalidDelay(delay_ms))?;
            request = request.run_at(run_at);
        }
        if let Some(interval_ms) = self.interval_ms {
            request = request.every(Duration::from_millis(interval_ms));
        }
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_payload_defaults_to_a_parallel_command() {
        let spec: TaskSpec = serde_json::from_value(json!({
            "payload": { "action": "click", "parameters": { "selectors": ["#a"] } },
            "intervalMs": 60000
        }))
        .unwrap();
        assert_eq!(spec.kind, COMMAND_TASK_KIND);

        let now = Utc::now();
        let request = spec.into_request(now).unwrap();
        assert_eq!(request.lane, Lane::Parallel);
        assert_eq!(request.interval, Some(Duration::from_secs(60)));
        assert!(request.run_at.is_none());
    }

    #[test]
    fn delay_moves_the_first_run() {
        let now = Utc::now();
        let mut spec = TaskSpec::command("navigateToPage", json!({ "url": "https://x.test/" }));
        spec.exclusive = true;
        spec.delay_ms = Some(5000);
        let request = spec.into_request(now).unwrap();
        assert_eq!(request.lane, Lane::Exclusive);
        assert_eq!(request.run_at, Some(now + chrono::Duration::seconds(5)));
    }

    #[test]
    fn delay_outside_time_range_is_an_error() {
        let now = Utc::now();
        for delay_ms in [10_000_000_000_000_000, u64::MAX] {
            let mut spec = TaskSpec::command("click", json!({ "selectors": ["#a"] }));
            spec.delay_ms = Some(delay_ms);
            let err = spec.into_request(now).unwrap_err();
            assert!(matches!(err, AppError::InvalidDelay(ms) if ms == delay_ms));
        }
    }
}
