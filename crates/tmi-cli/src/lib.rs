//! # tmi-cli
//!
//! Command-line front end for the traffic management program engine.
//!
//! ## Commands
//!
//! - `tmi preview` - Show the demand a program would control
//! - `tmi simulate` - Stage a plan and print the proposed control
//! - `tmi apply` - Simulate, then apply the plan to the scenario's live flights
//! - `tmi purge` - Apply, then withdraw the program from live flights
//! - `tmi purge-local` - Simulate, then discard the staged plan
//!
//! ## Scenarios
//!
//! Every command runs against a JSON scenario file loaded into an in-memory
//! store: the airport directory, the live flights, the program request and
//! optionally the time to treat as "now". See [`scenario::Scenario`].
//!
//! ## Configuration
//!
//! - `TMI_SCENARIO` - Scenario file path
//! - `TMI_FORMAT` - Output format (`text`, `json`, `table`)
//! - `TMI_LOG_FORMAT` - Log format on stderr (`pretty`, `json`)
//! - `TMI_SANDBOX_SCOPE` and the other engine variables read by
//!   [`EngineConfig::from_env`](tmi_flow::config::EngineConfig::from_env)

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
// CLI uses print! macros intentionally
#![allow(clippy::print_stdout)]
#![allow(clippy::print_stderr)]

pub mod commands;
pub mod scenario;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tmi_core::observability::LogFormat;

/// TMI CLI - traffic management program planning.
#[derive(Debug, Parser)]
#[command(name = "tmi")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Scenario file (JSON).
    #[arg(long, short = 's', env = "TMI_SCENARIO")]
    pub scenario: PathBuf,

    /// Output format.
    #[arg(long, env = "TMI_FORMAT", default_value = "text")]
    pub format: OutputFormat,

    /// Log format on stderr (`pretty` or `json`).
    #[arg(long, env = "TMI_LOG_FORMAT", default_value = "pretty", global = true)]
    pub log_format: LogFormat,

    /// Log engine progress at info level.
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Log engine internals at debug level.
    #[arg(long, global = true)]
    pub debug: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Get the effective configuration.
    #[must_use]
    pub fn config(&self) -> Config {
        Config {
            scenario: self.scenario.clone(),
            format: self.format.clone(),
        }
    }

    /// Returns the log filter implied by `--verbose` / `--debug`, if any.
    #[must_use]
    pub fn log_directive(&self) -> Option<&'static str> {
        if self.debug {
            Some("tmi_flow=debug,tmi_cli=debug,info")
        } else if self.verbose {
            Some("info")
        } else {
            None
        }
    }
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show the flights a program would control.
    Preview(commands::preview::PreviewArgs),
    /// Stage a plan and print the proposed control.
    Simulate(commands::simulate::SimulateArgs),
    /// Simulate, then apply the staged plan to live flights.
    Apply(commands::apply::ApplyArgs),
    /// Apply a program, then withdraw it from live flights.
    Purge(commands::purge::PurgeArgs),
    /// Stage a plan, then discard it.
    PurgeLocal(commands::purge_local::PurgeLocalArgs),
}

/// Output format.
#[derive(Debug, Clone, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output.
    Json,
    /// Table output.
    Table,
}

/// CLI configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Scenario file path.
    pub scenario: PathBuf,
    /// Output format.
    pub format: OutputFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_config_from_flags() {
        let cli = Cli::parse_from([
            "tmi",
            "--scenario",
            "demos/gdp_katl.json",
            "--format",
            "json",
            "simulate",
            "--program-id",
            "GDP-KATL-TEST",
        ]);

        let config = cli.config();
        assert_eq!(config.scenario, PathBuf::from("demos/gdp_katl.json"));
        assert!(matches!(config.format, OutputFormat::Json));
        assert!(cli.log_directive().is_none());
        let Commands::Simulate(args) = cli.command else {
            panic!("expected simulate");
        };
        assert_eq!(args.program_id.as_deref(), Some("GDP-KATL-TEST"));
    }

    #[test]
    fn test_debug_flag_wins_over_verbose() {
        let cli = Cli::parse_from(["tmi", "-s", "x.json", "preview", "--verbose", "--debug"]);
        assert_eq!(cli.log_directive(), Some("tmi_flow=debug,tmi_cli=debug,info"));
        assert_eq!(cli.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_purge_commands_parse() {
        let cli = Cli::parse_from([
            "tmi",
            "-s",
            "demos/gs_kjfk.json",
            "--log-format",
            "json",
            "purge",
            "--ctl-element",
            "--actor",
            "ops1",
        ]);
        assert_eq!(cli.log_format, LogFormat::Json);
        let Commands::Purge(args) = cli.command else {
            panic!("expected purge");
        };
        assert!(args.ctl_element);
        assert_eq!(args.simulate.actor.as_deref(), Some("ops1"));

        let cli = Cli::parse_from(["tmi", "-s", "x.json", "purge-local", "--all"]);
        let Commands::PurgeLocal(args) = cli.command else {
            panic!("expected purge-local");
        };
        assert!(args.all);
        assert!(args.simulate.program_id.is_none());
    }
}
