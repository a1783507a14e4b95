//! TMI CLI - Command-line interface for program planning.
//!
//! The main entry point for the `tmi` CLI binary.

use anyhow::Result;
use clap::Parser;

use tmi_cli::{Cli, Commands};
use tmi_core::observability::init_logging;

fn main() -> Result<()> {
    // Parse first so --verbose/--debug can shape the subscriber
    let cli = Cli::parse();
    let config = cli.config();
    init_logging(cli.log_format, cli.log_directive());

    // Create runtime and execute
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        match cli.command {
            Commands::Preview(args) => tmi_cli::commands::preview::execute(&args, &config).await,
            Commands::Simulate(args) => {
                tmi_cli::commands::simulate::execute(&args, &config).await
            }
            Commands::Apply(args) => tmi_cli::commands::apply::execute(&args, &config).await,
            Commands::Purge(args) => tmi_cli::commands::purge::execute(&args, &config).await,
            Commands::PurgeLocal(args) => {
                tmi_cli::commands::purge_local::execute(&args, &config).await
            }
        }
    })
}
