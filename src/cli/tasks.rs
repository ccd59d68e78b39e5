use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, ValueEnum};
use scavbot_core_types::TaskId;
use scavbot_scheduler::{Scheduler, TaskHandlerRegistry};
use serde_json::Value;

use crate::app_context::{open_scheduler, open_store};
use crate::config::Config;
use crate::errors::AppError;
use crate::tasks::{TaskSpec, COMMAND_TASK_KIND};

#[derive(Clone, Debug, ValueEnum)]
pub enum ListFormat {
    Text,
    Json,
}

#[derive(Args, Clone, Debug)]
pub struct ScheduleArgs {
    /// Action name for `command` tasks, e.g. `click`
    pub action: String,

    /// Action parameters as JSON
    #[arg(long, default_value = "{}")]
    pub parameters: String,

    /// Task kind
    #[arg(long, default_value = COMMAND_TASK_KIND)]
    pub kind: String,

    /// Run in the exclusive lane
    #[arg(long)]
    pub exclusive: bool,

    #[arg(long, default_value_t = 0)]
    pub priority: i32,

    /// Delay before the first run
    #[arg(long)]
    pub delay_ms: Option<u64>,

    /// Repeat every N milliseconds
    #[arg(long)]
    pub interval_ms: Option<u64>,
}

#[derive(Args, Clone, Debug)]
pub struct ListArgs {
    #[arg(long, value_enum, default_value_t = ListFormat::Text)]
    pub format: ListFormat,
}

#[derive(Args, Clone, Debug)]
pub struct RemoveArgs {
    pub task_id: String,
}

fn persisted_scheduler(config: &Config) -> Result<Scheduler> {
    if config.storage_dir.is_none() {
        return Err(AppError::NoStorage.into());
    }
    let store = open_store(config)?;
    Ok(open_scheduler(config, store, Arc::new(TaskHandlerRegistry::new())))
}

pub fn cmd_schedule(args: ScheduleArgs, config: &Config) -> Result<()> {
    let parameters: Value =
        serde_json::from_str(&args.parameters).context("--parameters is not valid JSON")?;
    let mut spec = TaskSpec::command(args.action, parameters.clone());
    if args.kind != COMMAND_TASK_KIND {
        // Other kinds take the parameters as their raw payload.
        spec.kind = args.kind;
        spec.payload = parameters;
    }
    spec.exclusive = args.exclusive;
    spec.priority = args.priority;
    spec.delay_ms = args.delay_ms;
    spec.interval_ms = args.interval_ms;

    let request = spec.into_request(Utc::now())?;
    let scheduler = persisted_scheduler(config)?;
    let id = scheduler.schedule_task(request).map_err(AppError::from)?;
    println!("{id}");
    Ok(())
}

pub fn cmd_list(args: ListArgs, config: &Config) -> Result<()> {
    let scheduler = persisted_scheduler(config)?;
    let tasks = scheduler.tasks();
    match args.format {
        ListFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&tasks)?);
        }
        ListFormat::Text => {
            if tasks.is_empty() {
                println!("No scheduled tasks");
            }
            for entry in tasks {
                let task = entry.task;
                let interval = task
                    .interval_ms
                    .map(|ms| format!("every {ms}ms"))
                    .unwrap_or_else(|| "once".to_string());
                println!(
                    "{:<24} {:<9} prio={:<3} next={} {} kind={} payload={}",
                    task.id,
                    entry.lane.to_string(),
                    task.priority,
                    task.next_run.to_rfc3339(),
                    interval,
                    task.action.kind,
                    task.action.payload
                );
            }
        }
    }
    Ok(())
}

pub fn cmd_remove(args: RemoveArgs, config: &Config) -> Result<()> {
    let scheduler = persisted_scheduler(config)?;
    if scheduler.remove_by_id(&TaskId(args.task_id.clone())) {
        println!("Task {} removed", args.task_id);
    } else {
        println!("Task {} not found", args.task_id);
    }
    Ok(())
}
