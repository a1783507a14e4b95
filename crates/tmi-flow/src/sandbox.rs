//! Staging areas for simulated plans.
//!
//! A [`Sandbox`] holds one program's staged flights and slot calendar between
//! simulate and apply. Flights are stored in an arena (`Vec`) with a
//! [`FlightKey`] index, so lookups during apply never depend on row identity.
//!
//! How sandboxes are keyed is a configuration choice ([`SandboxScope`]):
//!
//! - [`SandboxScope::PerProgram`]: one staging area per program. Concurrent
//!   programs of the same type coexist.
//! - [`SandboxScope::PerProgramType`]: one staging area per family (GS, GDP).
//!   Each simulate replaces the family's staging area; applying a program
//!   whose plan was replaced fails with
//!   [`Error::SandboxConflict`](crate::error::Error::SandboxConflict).

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tmi_core::{FlightKey, ProgramId};

use crate::flight::SandboxFlight;
use crate::program::{ProgramConfig, ProgramFamily};
use crate::slot::Slot;

/// How staging areas are keyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxScope {
    /// One staging area per program ID.
    #[default]
    PerProgram,
    /// One staging area per program family; last simulate wins.
    PerProgramType,
}

impl SandboxScope {
    /// Returns the key under which `program_id` stages its plan.
    #[must_use]
    pub fn key_for(self, program_id: &ProgramId, family: ProgramFamily) -> SandboxKey {
        match self {
            Self::PerProgram => SandboxKey::Program(program_id.clone()),
            Self::PerProgramType => SandboxKey::Family(family),
        }
    }
}

impl FromStr for SandboxScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "per_program" | "program" => Ok(Self::PerProgram),
            "per_program_type" | "program_type" | "type" => Ok(Self::PerProgramType),
            other => Err(format!("unknown sandbox scope '{other}'")),
        }
    }
}

impl fmt::Display for SandboxScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PerProgram => write!(f, "per_program"),
            Self::PerProgramType => write!(f, "per_program_type"),
        }
    }
}

/// Key of a staging area.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "scope", content = "key")]
pub enum SandboxKey {
    /// Staging area of one program.
    Program(ProgramId),
    /// Shared staging area of a program family.
    Family(ProgramFamily),
}

impl fmt::Display for SandboxKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Program(id) => write!(f, "program:{id}"),
            Self::Family(family) => write!(f, "family:{family}"),
        }
    }
}

/// A staged plan for one program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sandbox {
    /// Where the plan is staged.
    pub key: SandboxKey,
    /// The program that staged it.
    pub program_id: ProgramId,
    /// When it was staged.
    pub staged_at: DateTime<Utc>,
    /// Configuration the plan was computed from; written to the program
    /// row when the plan is applied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ProgramConfig>,
    flights: Vec<SandboxFlight>,
    slots: Vec<Slot>,
    #[serde(skip)]
    index: HashMap<FlightKey, usize>,
}

impl Sandbox {
    /// Stages flights and slots.
    ///
    /// Duplicate flight keys keep the row with the earliest original ETA.
    #[must_use]
    pub fn new(
        key: SandboxKey,
        program_id: ProgramId,
        flights: Vec<SandboxFlight>,
        slots: Vec<Slot>,
        staged_at: DateTime<Utc>,
    ) -> Self {
        let mut arena: Vec<SandboxFlight> = Vec::with_capacity(flights.len());
        let mut index: HashMap<FlightKey, usize> = HashMap::with_capacity(flights.len());
        for flight in flights {
            match index.get(flight.flight_key()) {
                Some(&pos) => {
                    let existing = &arena[pos];
                    if earlier(flight.original_eta, existing.original_eta) {
                        arena[pos] = flight;
                    }
                }
                None => {
                    index.insert(flight.flight_key().clone(), arena.len());
                    arena.push(flight);
                }
            }
        }
        Self {
            key,
            program_id,
            staged_at,
            config: None,
            flights: arena,
            slots,
            index,
        }
    }

    /// Records the configuration the plan was computed from.
    #[must_use]
    pub fn with_config(mut self, config: ProgramConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Returns every staged flight.
    #[must_use]
    pub fn flights(&self) -> &[SandboxFlight] {
        &self.flights
    }

    /// Returns the staged slot calendar.
    #[must_use]
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Looks up a staged flight by key.
    #[must_use]
    pub fn get(&self, key: &FlightKey) -> Option<&SandboxFlight> {
        match self.index.get(key) {
            Some(&pos) => self.flights.get(pos),
            // Deserialized sandboxes carry no index.
            None if self.index.is_empty() => {
                self.flights.iter().find(|f| f.flight_key() == key)
            }
            None => None,
        }
    }

    /// Iterates over flights that apply will write to live.
    pub fn controlled(&self) -> impl Iterator<Item = &SandboxFlight> {
        self.flights.iter().filter(|f| f.is_controlled())
    }

    /// Number of flights apply will write to live.
    #[must_use]
    pub fn controlled_count(&self) -> usize {
        self.controlled().count()
    }

    /// Number of staged flights, exempt ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.flights.len()
    }

    /// Returns true if nothing is staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flights.is_empty()
    }

    /// Returns true if `program_id` staged this plan.
    #[must_use]
    pub fn is_owned_by(&self, program_id: &ProgramId) -> bool {
        self.program_id == *program_id
    }
}

fn earlier(candidate: Option<DateTime<Utc>>, existing: Option<DateTime<Utc>>) -> bool {
    match (candidate, existing) {
        (Some(c), Some(e)) => c < e,
        (Some(_), None) => true,
        _ => false,
    }
}
