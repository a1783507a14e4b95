//! Preview command - show the demand a program would control.

use anyhow::{Context, Result};
use clap::Args;
use owo_colors::OwoColorize;

use tmi_flow::lifecycle::PreviewResult;

use super::{hhmm, print_buckets};
use crate::scenario::Scenario;
use crate::{Config, OutputFormat};

/// Arguments for the preview command.
#[derive(Debug, Args)]
pub struct PreviewArgs {
    /// List every controlled flight.
    #[arg(long, short = 'f')]
    pub flights: bool,
}

/// Execute the preview command.
///
/// # Errors
///
/// Returns an error if the scenario cannot be loaded or the request is
/// invalid.
pub async fn execute(args: &PreviewArgs, config: &Config) -> Result<()> {
    let scenario = Scenario::load(&config.scenario)?;
    let manager = scenario.manager()?;
    let preview = manager
        .preview(&scenario.request)
        .await
        .context("preview failed")?;

    match config.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&preview)?);
        }
        OutputFormat::Text => print_text(&preview, args.flights),
        OutputFormat::Table => print_table(&preview),
    }

    Ok(())
}

fn print_text(preview: &PreviewResult, list_flights: bool) {
    println!("Program: {} ({})", preview.program_id.bold(), preview.kind);
    println!("Control element: {}", preview.ctl_element);
    println!(
        "Window: {} to {}",
        hhmm(preview.window.start),
        hhmm(Some(preview.window.end))
    );
    println!();
    println!(
        "{} flights controlled, {} exempt",
        preview.flights.len().to_string().bold(),
        preview.exempt_flights.len()
    );
    println!();
    println!("Breakdown:");
    print_buckets("Hour", &preview.summary.by_hour);
    print_buckets("Center", &preview.summary.by_origin_center);
    print_buckets("Origin", &preview.summary.by_origin_airport);
    print_buckets("Carrier", &preview.summary.by_carrier);
    print_buckets("Category", &preview.summary.by_aircraft_category);

    if list_flights {
        println!();
        for flight in &preview.flights {
            println!(
                "  {:<10} {} -> {}  ETD {}  ETA {}",
                flight.callsign,
                flight.origin,
                flight.destination,
                hhmm(flight.etd),
                hhmm(flight.eta)
            );
        }
    }
    if !preview.exempt_flights.is_empty() {
        println!();
        println!("Exempt:");
        for exempt in &preview.exempt_flights {
            println!(
                "  {:<10} {}",
                exempt.flight.callsign,
                exempt.reason.to_string().dimmed()
            );
        }
    }
}

fn print_table(preview: &PreviewResult) {
    use tabled::{Table, Tabled};

    #[derive(Tabled)]
    struct FlightRow {
        #[tabled(rename = "Callsign")]
        callsign: String,
        #[tabled(rename = "Origin")]
        origin: String,
        #[tabled(rename = "Dest")]
        destination: String,
        #[tabled(rename = "ETD")]
        etd: String,
        #[tabled(rename = "ETA")]
        eta: String,
        #[tabled(rename = "Exempt")]
        exempt: String,
    }

    let controlled = preview.flights.iter().map(|f| FlightRow {
        callsign: f.callsign.clone(),
        origin: f.origin.clone(),
        destination: f.destination.clone(),
        etd: hhmm(f.etd),
        eta: hhmm(f.eta),
        exempt: String::new(),
    });
    let exempt = preview.exempt_flights.iter().map(|e| FlightRow {
        callsign: e.flight.callsign.clone(),
        origin: e.flight.origin.clone(),
        destination: e.flight.destination.clone(),
        etd: hhmm(e.flight.etd),
        eta: hhmm(e.flight.eta),
        exempt: e.reason.to_string(),
    });
    let rows: Vec<_> = controlled.chain(exempt).collect();

    if rows.is_empty() {
        println!("No flights in scope");
    } else {
        println!("{}", Table::new(rows));
    }
}
