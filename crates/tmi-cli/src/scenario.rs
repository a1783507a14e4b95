//! Scenario files.
//!
//! A scenario is a self-contained JSON document the CLI loads into an
//! in-memory store:
//!
//! ```json
//! {
//!   "now": "2026-03-14 17:00",
//!   "sandboxScope": "per_program",
//!   "airports": [{ "code": "KATL", "lat": 33.6367, "lon": -84.4281 }],
//!   "flights": [{ "flightKey": "DAL100-KORD-KATL", "callsign": "DAL100", ... }],
//!   "request": { "type": "GDP", "ctlElement": "KATL", "start": "...", "end": "..." }
//! }
//! ```
//!
//! `now` and `sandboxScope` are optional; without them the wall clock and the
//! environment's engine configuration apply.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use tmi_core::clock::{Clock, FixedClock, SystemClock};
use tmi_core::geo::{AirportRecord, StaticAirportDirectory};
use tmi_core::time::parse_utc;
use tmi_flow::config::EngineConfig;
use tmi_flow::flight::Flight;
use tmi_flow::lifecycle::ProgramLifecycleManager;
use tmi_flow::request::ProgramRequest;
use tmi_flow::sandbox::SandboxScope;
use tmi_flow::store::memory::InMemoryStore;

/// A loaded scenario file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    /// Time to treat as "now" (any accepted timestamp text).
    #[serde(default)]
    pub now: Option<String>,
    /// Overrides `TMI_SANDBOX_SCOPE`.
    #[serde(default)]
    pub sandbox_scope: Option<SandboxScope>,
    /// Airport reference data for distance scopes.
    #[serde(default)]
    pub airports: Vec<AirportRecord>,
    /// Live flights.
    #[serde(default)]
    pub flights: Vec<Flight>,
    /// The program request to run.
    pub request: ProgramRequest,
}

impl Scenario {
    /// Reads and parses a scenario file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid scenario.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("invalid scenario {}", path.display()))
    }

    /// Parses a scenario document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not a valid scenario.
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Returns the scenario's "now", if pinned.
    ///
    /// # Errors
    ///
    /// Returns an error if `now` is not a recognized timestamp.
    pub fn pinned_now(&self) -> Result<Option<DateTime<Utc>>> {
        self.now
            .as_deref()
            .map(parse_utc)
            .transpose()
            .context("scenario 'now' is not a valid timestamp")
    }

    /// Builds a lifecycle manager over a fresh in-memory store holding the
    /// scenario's flights.
    ///
    /// # Errors
    ///
    /// Returns an error if `now` is invalid or the engine environment is
    /// misconfigured.
    pub fn manager(&self) -> Result<ProgramLifecycleManager<InMemoryStore>> {
        let mut config = EngineConfig::from_env().context("invalid engine configuration")?;
        if let Some(scope) = self.sandbox_scope {
            config = config.with_sandbox_scope(scope);
        }

        let clock: Arc<dyn Clock> = match self.pinned_now()? {
            Some(now) => Arc::new(FixedClock::new(now)),
            None => Arc::new(SystemClock),
        };
        let store = Arc::new(InMemoryStore::with_live_flights(
            self.flights.clone(),
            clock.now(),
        ));
        let airports: StaticAirportDirectory = self.airports.iter().cloned().collect();

        tracing::debug!(
            flights = self.flights.len(),
            airports = airports.len(),
            sandbox_scope = %config.sandbox_scope,
            "scenario loaded"
        );

        Ok(ProgramLifecycleManager::new(store, config)
            .with_airports(Arc::new(airports))
            .with_clock(clock))
    }
}
