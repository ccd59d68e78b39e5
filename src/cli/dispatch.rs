use anyhow::Result;

use super::env::CliArgs;
use super::run::cmd_run;
use super::tasks::{cmd_list, cmd_remove, cmd_schedule};
use crate::cli::commands::Commands;
use crate::config::Config;

pub async fn dispatch(cli: &CliArgs, config: Config) -> Result<()> {
    match cli.command.clone() {
        Commands::Run(args) => cmd_run(args, config).await,
        Commands::Schedule(args) => cmd_schedule(args, &config),
        Commands::List(args) => cmd_list(args, &config),
        Commands::Remove(args) => cmd_remove(args, &config),
    }
}
