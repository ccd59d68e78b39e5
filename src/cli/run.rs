use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use crate::app_context::AppContext;
use crate::config::Config;

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Stop after this many seconds (default: run until Ctrl-C)
    #[arg(long)]
    pub duration_secs: Option<u64>,

    /// URL the simulated tab opens on
    #[arg(long)]
    pub start_url: Option<String>,

    /// Start with the scheduler paused
    #[arg(long)]
    pub paused: bool,
}

pub async fn cmd_run(args: RunArgs, mut config: Config) -> Result<()> {
    if let Some(url) = args.start_url {
        config.start_url = url;
    }
    let context = AppContext::build(config).context("Failed to build application context")?;
    if args.paused {
        context.scheduler().pause();
    }
    context.start().await;
    info!(
        tasks = context.scheduler().tasks().len(),
        "Scheduler running; press Ctrl-C to stop"
    );

    match args.duration_secs {
        Some(secs) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                signal = tokio::signal::ctrl_c() => signal.context("Failed to listen for Ctrl-C")?,
            }
        }
        None => tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl-C")?,
    }

    context.shutdown();
    let metrics = scavbot_scheduler::metrics::snapshot();
    println!(
        "Scheduler counters → scheduled={} started={} completed={} failed={} removed={}",
        metrics.scheduled, metrics.started, metrics.completed, metrics.failed, metrics.removed
    );
    Ok(())
}
