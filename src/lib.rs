//! scavbot library
//!
//! Exposes modules for integration testing

pub mod app_context;
pub mod cli;
pub mod config;
pub mod errors;
pub mod inbound;
pub mod tasks;

// Re-export commonly used types for external use
pub use app_context::AppContext;
pub use config::Config;
pub use errors::AppError;
pub use tasks::{CommandTaskHandler, TaskSpec, COMMAND_TASK_KIND};
