use std::path::PathBuf;

use scavbot_scheduler::SchedulerError;
use scavbot_state_center::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("environment variable {key} has invalid value '{value}'")]
    InvalidEnv { key: String, value: String },
    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("storage unavailable: {0}")]
    Storage(#[from] StoreError),
    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
    #[error("delay of {0}ms puts the first run outside the representable time range")]
    InvalidDelay(u64),
    #[error("no storage_dir configured; persisted tasks need one")]
    NoStorage,
}
