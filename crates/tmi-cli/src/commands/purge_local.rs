//! Purge-local command - stage a plan, then discard it.

use anyhow::{Context, Result};
use clap::Args;
use owo_colors::OwoColorize;

use tmi_flow::lifecycle::PurgeLocalResult;

use super::format_status_colored;
use super::simulate::SimulateArgs;
use crate::scenario::Scenario;
use crate::{Config, OutputFormat};

/// Arguments for the purge-local command.
#[derive(Debug, Args)]
pub struct PurgeLocalArgs {
    /// Simulate options.
    #[command(flatten)]
    pub simulate: SimulateArgs,

    /// Discard every staged plan, not just this program's.
    #[arg(long)]
    pub all: bool,
}

/// Execute the purge-local command.
///
/// # Errors
///
/// Returns an error if the scenario cannot be loaded, the simulate fails or
/// the staged plan cannot be discarded.
pub async fn execute(args: &PurgeLocalArgs, config: &Config) -> Result<()> {
    let scenario = Scenario::load(&config.scenario)?;
    let manager = scenario.manager()?;
    let actor = args.simulate.actor.as_deref();

    let simulated = manager
        .simulate(&args.simulate.request(&scenario))
        .await
        .context("simulate failed")?;
    let program_id = simulated.program.program_id;
    let target = (!args.all).then_some(&program_id);
    let result = manager
        .purge_local(target, actor)
        .await
        .context("purge-local failed")?;
    let program = manager.get_program(&program_id).await?;

    match config.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        OutputFormat::Text | OutputFormat::Table => {
            print_text(&result);
            println!(
                "Program {} is now {}",
                program.program_id.bold(),
                format_status_colored(program.status)
            );
        }
    }

    Ok(())
}

fn print_text(result: &PurgeLocalResult) {
    if result.programs.is_empty() {
        println!("No staged plans");
        return;
    }
    for id in &result.programs {
        println!("Discarded plan: {id}");
    }
    println!("Staged flights cleared: {}", result.flights_cleared);
    println!("Staged slots cleared:   {}", result.slots_cleared);
}
