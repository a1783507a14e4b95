//! Pluggable storage for programs, slots, staging areas and live flights.
//!
//! Every write goes through [`Store::commit`], which applies a
//! [`UnitOfWork`] atomically: either every [`Mutation`] takes effect or none
//! does. A failing mutation surfaces as
//! [`Error::CommitFailed`](crate::error::Error::CommitFailed) naming its
//! [`CommitStep`].
//!
//! ## Design Principles
//!
//! - **One transaction per operation**: simulate, apply and purge each build a
//!   single unit of work
//! - **Optimistic concurrency**: program upserts carry the version read at the
//!   start of the operation
//! - **Testability**: the in-memory implementation can inject a failure at
//!   any step

pub mod memory;

use std::collections::BTreeSet;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tmi_core::codes::normalize_code;
use tmi_core::{FlightKey, ProgramId};

use crate::demand::FlightDemandSource;
use crate::error::Result;
use crate::field_map::FieldMapping;
use crate::flight::{ControlRecord, Flight, LiveFlight};
use crate::program::{Program, ProgramFamily, ProgramStatus};
use crate::sandbox::{Sandbox, SandboxKey};
use crate::slot::Slot;

/// A named step of a unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitStep {
    /// Write a staged plan.
    StageSandbox,
    /// Replace a program's slot calendar.
    ReplaceSlots,
    /// Create missing live control records.
    EnsureControlRecords,
    /// Copy staged control fields to live flights.
    CopyControlFields,
    /// Clear control fields from live flights.
    ClearControlFields,
    /// Mark assigned slots cancelled.
    CancelSlots,
    /// Insert or update a program row.
    UpsertProgram,
    /// Remove a staged plan.
    ClearSandbox,
}

impl CommitStep {
    /// Every step.
    pub const ALL: [Self; 8] = [
        Self::StageSandbox,
        Self::ReplaceSlots,
        Self::EnsureControlRecords,
        Self::CopyControlFields,
        Self::ClearControlFields,
        Self::CancelSlots,
        Self::UpsertProgram,
        Self::ClearSandbox,
    ];

    /// Returns the step name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StageSandbox => "stage_sandbox",
            Self::ReplaceSlots => "replace_slots",
            Self::EnsureControlRecords => "ensure_control_records",
            Self::CopyControlFields => "copy_control_fields",
            Self::ClearControlFields => "clear_control_fields",
            Self::CancelSlots => "cancel_slots",
            Self::UpsertProgram => "upsert_program",
            Self::ClearSandbox => "clear_sandbox",
        }
    }
}

impl fmt::Display for CommitStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One write inside a unit of work.
#[derive(Debug, Clone)]
pub enum Mutation {
    /// Stage a plan, replacing whatever is staged under its key.
    StageSandbox(Sandbox),
    /// Remove the plan staged under `key`.
    ClearSandbox {
        /// Staging key.
        key: SandboxKey,
        /// When set, only remove the plan if this program staged it.
        owner: Option<ProgramId>,
    },
    /// Replace a program's committed slot calendar.
    ReplaceSlots {
        /// Owning program.
        program_id: ProgramId,
        /// The new calendar.
        slots: Vec<Slot>,
    },
    /// Create an empty control record on each listed live flight lacking one.
    EnsureControlRecords {
        /// Flights to prepare.
        keys: Vec<FlightKey>,
    },
    /// Copy staged control fields onto live flights, matched by flight key.
    CopyControlFields {
        /// Fields to copy.
        mapping: FieldMapping,
        /// Staged control per flight.
        updates: Vec<(FlightKey, ControlRecord)>,
    },
    /// Clear control fields on live flights tagged with a program.
    ClearControlFields {
        /// Fields to clear.
        mapping: FieldMapping,
        /// Program whose tags are removed.
        program_id: ProgramId,
        /// Flights to leave untouched.
        keep: BTreeSet<FlightKey>,
    },
    /// Mark every assigned slot of a program cancelled.
    CancelAssignedSlots {
        /// Owning program.
        program_id: ProgramId,
    },
    /// Insert or update a program row.
    UpsertProgram {
        /// The new row.
        program: Box<Program>,
        /// Version read before the operation; `None` for a new program.
        expected_version: Option<u64>,
    },
}

impl Mutation {
    /// Returns the step this mutation belongs to.
    #[must_use]
    pub const fn step(&self) -> CommitStep {
        match self {
            Self::StageSandbox(_) => CommitStep::StageSandbox,
            Self::ClearSandbox { .. } => CommitStep::ClearSandbox,
            Self::ReplaceSlots { .. } => CommitStep::ReplaceSlots,
            Self::EnsureControlRecords { .. } => CommitStep::EnsureControlRecords,
            Self::CopyControlFields { .. } => CommitStep::CopyControlFields,
            Self::ClearControlFields { .. } => CommitStep::ClearControlFields,
            Self::CancelAssignedSlots { .. } => CommitStep::CancelSlots,
            Self::UpsertProgram { .. } => CommitStep::UpsertProgram,
        }
    }
}

/// Mutations committed together.
#[derive(Debug, Clone)]
pub struct UnitOfWork {
    /// Operation name, for errors and logs.
    pub operation: &'static str,
    /// Mutations, applied in order.
    pub mutations: Vec<Mutation>,
}

impl UnitOfWork {
    /// Starts an empty unit of work.
    #[must_use]
    pub const fn new(operation: &'static str) -> Self {
        Self {
            operation,
            mutations: Vec::new(),
        }
    }

    /// Appends a mutation.
    #[must_use]
    pub fn with(mut self, mutation: Mutation) -> Self {
        self.mutations.push(mutation);
        self
    }

    /// Appends a mutation in place.
    pub fn push(&mut self, mutation: Mutation) {
        self.mutations.push(mutation);
    }

    /// Returns the steps in order.
    #[must_use]
    pub fn steps(&self) -> Vec<CommitStep> {
        self.mutations.iter().map(Mutation::step).collect()
    }
}

/// What a commit changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitReport {
    /// Flights written to staging.
    pub sandbox_flights_staged: usize,
    /// Staged flights removed.
    pub sandbox_flights_cleared: usize,
    /// Staged slots removed.
    pub sandbox_slots_cleared: usize,
    /// Committed slots written.
    pub slots_written: usize,
    /// Slots marked cancelled.
    pub slots_cancelled: usize,
    /// Live control records created.
    pub control_records_created: usize,
    /// Live flights whose control fields were written.
    pub flights_updated: usize,
    /// Staged flights with no live counterpart.
    pub flights_missing: usize,
    /// Live flights moved from another program's tag.
    pub flights_retagged: usize,
    /// Live flights whose control fields were cleared.
    pub flights_cleared: usize,
    /// Program rows written.
    pub programs_upserted: usize,
}

/// Filter for [`Store::list_programs`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramFilter {
    /// Only programs in this state.
    pub status: Option<ProgramStatus>,
    /// Only programs of this family.
    pub family: Option<ProgramFamily>,
    /// Only programs for this control element.
    pub ctl_element: Option<String>,
}

impl ProgramFilter {
    /// Matches every program.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Restricts to a state.
    #[must_use]
    pub fn with_status(mut self, status: ProgramStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Restricts to a family.
    #[must_use]
    pub fn with_family(mut self, family: ProgramFamily) -> Self {
        self.family = Some(family);
        self
    }

    /// Restricts to a control element.
    #[must_use]
    pub fn with_ctl_element(mut self, ctl_element: &str) -> Self {
        self.ctl_element = Some(normalize_code(ctl_element));
        self
    }

    /// Returns true if `program` passes the filter.
    #[must_use]
    pub fn matches(&self, program: &Program) -> bool {
        self.status.map_or(true, |s| program.status == s)
            && self.family.map_or(true, |f| program.family() == f)
            && self
                .ctl_element
                .as_deref()
                .map_or(true, |c| program.ctl_element == c)
    }
}

/// Storage abstraction for program state and live flights.
///
/// Reads see committed state only. Implementations must apply a
/// [`UnitOfWork`] atomically and check `expected_version` on program
/// upserts.
#[async_trait]
pub trait Store: FlightDemandSource {
    // --- Programs ---

    /// Gets a program by ID.
    async fn get_program(&self, program_id: &ProgramId) -> Result<Option<Program>>;

    /// Lists programs, newest first, then by ID.
    async fn list_programs(&self, filter: &ProgramFilter) -> Result<Vec<Program>>;

    /// Gets a program's committed slot calendar, in index order.
    async fn get_slots(&self, program_id: &ProgramId) -> Result<Vec<Slot>>;

    // --- Staging ---

    /// Gets the plan staged under `key`.
    async fn get_sandbox(&self, key: &SandboxKey) -> Result<Option<Sandbox>>;

    /// Lists every staged plan.
    async fn list_sandboxes(&self) -> Result<Vec<Sandbox>>;

    // --- Live flights ---

    /// Gets a live flight.
    async fn get_live_flight(&self, key: &FlightKey) -> Result<Option<LiveFlight>>;

    /// Gets every live flight tagged with `program_id`.
    async fn live_flights_for_program(&self, program_id: &ProgramId) -> Result<Vec<LiveFlight>>;

    /// Refreshes live flights from the feed, keeping control records.
    ///
    /// Returns the number of flights written.
    async fn sync_live_flights(&self, flights: Vec<Flight>, at: DateTime<Utc>) -> Result<usize>;

    /// Drops flights that left the feed. Returns the number removed.
    async fn remove_live_flights(&self, keys: &[FlightKey]) -> Result<usize>;

    // --- Writes ---

    /// Applies `work` atomically.
    async fn commit(&self, work: UnitOfWork) -> Result<CommitReport>;
}
