//! Apply command - simulate, then apply the staged plan to live flights.
//!
//! The scenario store lives only for the duration of the process, so apply
//! always stages a fresh plan first.

use anyhow::{Context, Result};
use clap::Args;
use owo_colors::OwoColorize;

use tmi_flow::lifecycle::ApplyResult;

use super::simulate::SimulateArgs;
use super::{format_status_colored, hhmm, or_dash, print_summary};
use crate::scenario::Scenario;
use crate::{Config, OutputFormat};

/// Arguments for the apply command.
#[derive(Debug, Args)]
pub struct ApplyArgs {
    /// Simulate options.
    #[command(flatten)]
    pub simulate: SimulateArgs,
}

/// Execute the apply command.
///
/// # Errors
///
/// Returns an error if the scenario cannot be loaded, the simulate fails or
/// the apply is rejected.
pub async fn execute(args: &ApplyArgs, config: &Config) -> Result<()> {
    let scenario = Scenario::load(&config.scenario)?;
    let manager = scenario.manager()?;
    let request = args.simulate.request(&scenario);

    let simulated = manager
        .simulate(&request)
        .await
        .context("simulate failed")?;
    let program_id = simulated.program.program_id;
    let result = manager
        .apply(&program_id, args.simulate.actor.as_deref())
        .await
        .with_context(|| format!("apply of {program_id} failed"))?;

    match config.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        OutputFormat::Text => print_text(&result, args.simulate.flights),
        OutputFormat::Table => print_table(&result),
    }

    Ok(())
}

fn print_text(result: &ApplyResult, list_flights: bool) {
    let program = &result.program;
    println!(
        "Program: {} {}",
        program.program_id.bold(),
        format_status_colored(program.status)
    );
    if let Some(actor) = &program.activated_by {
        println!("Activated by: {actor}");
    }
    println!();
    println!("Live flights:");
    println!("  Applied:     {}", result.applied_count);
    println!("  New records: {}", result.control_records_created);
    println!("  Re-tagged:   {}", result.retagged_flights);
    if result.missing_flights > 0 {
        println!(
            "  Missing:     {}",
            result.missing_flights.to_string().yellow()
        );
    }
    println!();
    print_summary(&result.metrics.summary);

    if list_flights {
        println!();
        for live in &result.flights {
            let Some(control) = &live.control else {
                continue;
            };
            println!(
                "  {:<10} {:<7} CTD {}  CTA {}  delay {}",
                live.flight.callsign,
                or_dash(control.control_type),
                hhmm(control.ctd),
                hhmm(control.cta),
                or_dash(control.program_delay_min)
            );
        }
    }
}

fn print_table(result: &ApplyResult) {
    use tabled::{Table, Tabled};

    #[derive(Tabled)]
    struct LiveRow {
        #[tabled(rename = "Callsign")]
        callsign: String,
        #[tabled(rename = "Control")]
        control: String,
        #[tabled(rename = "ETD")]
        etd: String,
        #[tabled(rename = "CTD")]
        ctd: String,
        #[tabled(rename = "CTA")]
        cta: String,
        #[tabled(rename = "Delay")]
        delay: String,
    }

    let rows: Vec<_> = result
        .flights
        .iter()
        .filter_map(|live| {
            live.control.as_ref().map(|control| LiveRow {
                callsign: live.flight.callsign.clone(),
                control: or_dash(control.control_type),
                etd: hhmm(live.flight.etd),
                ctd: hhmm(control.ctd),
                cta: hhmm(control.cta),
                delay: or_dash(control.program_delay_min),
            })
        })
        .collect();

    if rows.is_empty() {
        println!("No live flights controlled");
    } else {
        println!("{}", Table::new(rows));
    }
}
