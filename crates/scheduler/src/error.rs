use scavbot_state_center::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("interval must be at least 1ms and keep the next run within the representable time range")]
    InvalidInterval,
    #[error("snapshot store error: {0}")]
    Store(#[from] StoreError),
}

/// Why a task run counts as failed. Never escapes the run loop.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("no handler for task kind `{0}`")]
    UnknownKind(String),
    #[error("invalid task payload: {0}")]
    InvalidPayload(String),
    #[error("task failed: {0}")]
    Failed(String),
    #[error("task panicked: {0}")]
    Panicked(String),
}

impl TaskError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}
