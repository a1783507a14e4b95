//! Purge command - apply a program, then withdraw it from live flights.
//!
//! Like apply, purge works on a store built fresh from the scenario, so the
//! program is simulated and applied first.

use anyhow::{Context, Result};
use clap::Args;
use owo_colors::OwoColorize;

use tmi_flow::lifecycle::{PurgeResult, PurgeScope};

use super::simulate::SimulateArgs;
use super::{format_status_colored, hhmm, or_dash};
use crate::scenario::Scenario;
use crate::{Config, OutputFormat};

/// Arguments for the purge command.
#[derive(Debug, Args)]
pub struct PurgeArgs {
    /// Simulate options.
    #[command(flatten)]
    pub simulate: SimulateArgs,

    /// Purge every ACTIVE program for the control element instead of one program.
    #[arg(long)]
    pub ctl_element: bool,
}

/// Execute the purge command.
///
/// # Errors
///
/// Returns an error if the scenario cannot be loaded or any of the simulate,
/// apply, or purge steps fails.
pub async fn execute(args: &PurgeArgs, config: &Config) -> Result<()> {
    let scenario = Scenario::load(&config.scenario)?;
    let manager = scenario.manager()?;
    let actor = args.simulate.actor.as_deref();

    let simulated = manager
        .simulate(&args.simulate.request(&scenario))
        .await
        .context("simulate failed")?;
    let program = simulated.program;
    manager
        .apply(&program.program_id, actor)
        .await
        .with_context(|| format!("apply of {} failed", program.program_id))?;

    let scope = if args.ctl_element {
        PurgeScope::ControlElement(program.ctl_element.clone())
    } else {
        PurgeScope::Program(program.program_id.clone())
    };
    let result = manager
        .purge(&scope, actor)
        .await
        .with_context(|| format!("purge of {scope} failed"))?;

    match config.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        OutputFormat::Text => print_text(&result),
        OutputFormat::Table => print_table(&result),
    }

    Ok(())
}

fn print_text(result: &PurgeResult) {
    for program in &result.programs {
        println!(
            "Program: {} {}",
            program.program_id.bold(),
            format_status_colored(program.status)
        );
        if let Some(actor) = &program.purged_by {
            println!("Purged by: {actor}");
        }
    }
    if result.programs.is_empty() {
        println!("No active programs to purge");
        return;
    }
    println!();
    println!("Live flights cleared: {}", result.flights_cleared);
    println!("Slots cancelled:      {}", result.slots_cancelled);
}

fn print_table(result: &PurgeResult) {
    use tabled::{Table, Tabled};

    #[derive(Tabled)]
    struct PurgedRow {
        #[tabled(rename = "Program")]
        program_id: String,
        #[tabled(rename = "Type")]
        kind: String,
        #[tabled(rename = "Status")]
        status: String,
        #[tabled(rename = "Purged")]
        purged_at: String,
        #[tabled(rename = "By")]
        purged_by: String,
    }

    let rows: Vec<_> = result
        .programs
        .iter()
        .map(|p| PurgedRow {
            program_id: p.program_id.to_string(),
            kind: p.kind.to_string(),
            status: p.status.to_string(),
            purged_at: hhmm(p.purged_at),
            purged_by: or_dash(p.purged_by.as_ref()),
        })
        .collect();

    if rows.is_empty() {
        println!("No active programs to purge");
    } else {
        println!("{}", Table::new(rows));
        println!(
            "{} live flights cleared, {} slots cancelled",
            result.flights_cleared, result.slots_cancelled
        );
    }
}
