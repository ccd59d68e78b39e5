pub mod app;
pub mod commands;
pub mod dispatch;
pub mod env;
pub mod run;
pub mod runtime;
pub mod tasks;

pub use app::run;
