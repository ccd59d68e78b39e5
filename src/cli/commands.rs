use clap::Subcommand;

use super::run::RunArgs;
use super::tasks::{ListArgs, RemoveArgs, ScheduleArgs};

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Run the scheduler against a simulated game tab
    Run(RunArgs),

    /// Add a task to the persisted queues
    Schedule(ScheduleArgs),

    /// Show the persisted queues
    List(ListArgs),

    /// Remove a persisted task by id
    Remove(RemoveArgs),
}
