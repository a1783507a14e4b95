//! Simulate command - stage a plan and print the proposed control.

use anyhow::{Context, Result};
use clap::Args;
use owo_colors::OwoColorize;

use tmi_flow::flight::SandboxFlight;
use tmi_flow::lifecycle::SimulationResult;
use tmi_flow::request::ProgramRequest;

use super::{format_status_colored, hhmm, or_dash, print_summary};
use crate::scenario::Scenario;
use crate::{Config, OutputFormat};

/// Arguments for the simulate command.
#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Program ID to use instead of the derived one.
    #[arg(long)]
    pub program_id: Option<String>,

    /// Operator recorded on the program.
    #[arg(long, env = "TMI_ACTOR")]
    pub actor: Option<String>,

    /// List every staged flight.
    #[arg(long, short = 'f')]
    pub flights: bool,
}

impl SimulateArgs {
    /// Applies command-line overrides to the scenario's request.
    #[must_use]
    pub fn request(&self, scenario: &Scenario) -> ProgramRequest {
        let mut request = scenario.request.clone();
        if let Some(program_id) = &self.program_id {
            request = request.with_program_id(program_id);
        }
        if let Some(actor) = &self.actor {
            request = request.requested_by(actor);
        }
        request
    }
}

/// Execute the simulate command.
///
/// # Errors
///
/// Returns an error if the scenario cannot be loaded or the simulate fails.
pub async fn execute(args: &SimulateArgs, config: &Config) -> Result<()> {
    let scenario = Scenario::load(&config.scenario)?;
    let manager = scenario.manager()?;
    let result = manager
        .simulate(&args.request(&scenario))
        .await
        .context("simulate failed")?;

    match config.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        OutputFormat::Text => print_text(&result, args.flights),
        OutputFormat::Table => print_flight_table(&result.flights),
    }

    Ok(())
}

fn print_text(result: &SimulationResult, list_flights: bool) {
    let program = &result.program;
    println!(
        "Program: {} {}",
        program.program_id.bold(),
        format_status_colored(program.status)
    );
    println!("Type: {}  Control element: {}", program.kind, program.ctl_element);
    println!(
        "Window: {} to {}",
        hhmm(program.window.start),
        hhmm(Some(program.window.end))
    );
    println!();
    print_summary(&result.summary);

    if list_flights {
        println!();
        for flight in &result.flights {
            println!("  {}", describe(flight));
        }
    }
}

/// One-line description of a staged flight.
pub(crate) fn describe(flight: &SandboxFlight) -> String {
    if let Some(reason) = &flight.exemption {
        return format!("{:<10} exempt ({reason})", flight.flight.callsign);
    }
    let control = &flight.control;
    format!(
        "{:<10} {:<7} slot {:>4}  CTD {}  CTA {}  delay {}{}",
        flight.flight.callsign,
        or_dash(control.control_type),
        or_dash(control.slot_index),
        hhmm(control.ctd),
        hhmm(control.cta),
        or_dash(control.program_delay_min),
        if control.delay_capped { " (capped)" } else { "" }
    )
}

pub(crate) fn print_flight_table(flights: &[SandboxFlight]) {
    use tabled::{Table, Tabled};

    #[derive(Tabled)]
    struct StagedRow {
        #[tabled(rename = "Callsign")]
        callsign: String,
        #[tabled(rename = "Control")]
        control: String,
        #[tabled(rename = "Slot")]
        slot: String,
        #[tabled(rename = "ETA")]
        eta: String,
        #[tabled(rename = "CTD")]
        ctd: String,
        #[tabled(rename = "CTA")]
        cta: String,
        #[tabled(rename = "Delay")]
        delay: String,
        #[tabled(rename = "Exempt")]
        exempt: String,
    }

    let rows: Vec<_> = flights
        .iter()
        .map(|f| StagedRow {
            callsign: f.flight.callsign.clone(),
            control: or_dash(f.control.control_type),
            slot: or_dash(f.control.slot_index),
            eta: hhmm(f.original_eta),
            ctd: hhmm(f.control.ctd),
            cta: hhmm(f.control.cta),
            delay: or_dash(f.control.program_delay_min),
            exempt: or_dash(f.exemption.as_ref()),
        })
        .collect();

    if rows.is_empty() {
        println!("No flights staged");
    } else {
        println!("{}", Table::new(rows));
    }
}
