//! Builds the atomic units of work that move plans between sandbox and live.
//!
//! ## Apply
//!
//! ```text
//! clear_control_fields    flights this program tagged earlier but no longer plans
//! ensure_control_records  create a live control record where none exists
//! copy_control_fields     staged fields -> live, matched by flight key
//! replace_slots           committed calendar (GDP)
//! upsert_program          status, actor stamps, metrics snapshot
//! clear_sandbox           only if this program still owns the staging area
//! ```
//!
//! ## Purge
//!
//! Clears the program's live tags, marks its assigned slots CANCELLED,
//! discards any staged revision, and writes the PURGED row. Slots and the
//! metrics snapshot stay for audit.

use std::collections::BTreeSet;

use tmi_core::{FlightKey, ProgramId};

use crate::field_map::{FieldMapping, LIVE_CONTROL_MAPPING};
use crate::program::{Program, ProgramFamily};
use crate::sandbox::{Sandbox, SandboxKey};
use crate::store::{Mutation, UnitOfWork};

/// A program row to write, with the version it was read at.
#[derive(Debug, Clone)]
pub struct ProgramWrite {
    /// The new row.
    pub program: Program,
    /// Version read before the operation; `None` for a new program.
    pub expected_version: Option<u64>,
}

impl ProgramWrite {
    /// Wraps a row read at `expected_version`.
    #[must_use]
    pub fn new(program: Program, expected_version: Option<u64>) -> Self {
        Self {
            program,
            expected_version,
        }
    }

    fn into_mutation(self) -> Mutation {
        Mutation::UpsertProgram {
            program: Box::new(self.program),
            expected_version: self.expected_version,
        }
    }
}

/// One program to withdraw in a purge.
#[derive(Debug, Clone)]
pub struct PurgeTarget {
    /// The PURGED row.
    pub write: ProgramWrite,
    /// Where the program stages its plans.
    pub sandbox_key: SandboxKey,
}

/// Translates lifecycle operations into store mutations.
#[derive(Debug, Clone, Copy)]
pub struct LiveStateApplier {
    mapping: FieldMapping,
}

impl Default for LiveStateApplier {
    fn default() -> Self {
        Self::new(LIVE_CONTROL_MAPPING)
    }
}

impl LiveStateApplier {
    /// Creates an applier copying the fields in `mapping`.
    #[must_use]
    pub const fn new(mapping: FieldMapping) -> Self {
        Self { mapping }
    }

    /// Returns the field mapping.
    #[must_use]
    pub const fn mapping(&self) -> FieldMapping {
        self.mapping
    }

    /// Flight keys apply will write.
    #[must_use]
    pub fn affected_keys(sandbox: &Sandbox) -> BTreeSet<FlightKey> {
        sandbox.controlled().map(|f| f.flight_key().clone()).collect()
    }

    /// Stages a plan and records the SIMULATED row.
    #[must_use]
    pub fn plan_simulate(&self, sandbox: Sandbox, write: ProgramWrite) -> UnitOfWork {
        UnitOfWork::new("simulate")
            .with(Mutation::StageSandbox(sandbox))
            .with(write.into_mutation())
    }

    /// Commits a staged plan to live.
    #[must_use]
    pub fn plan_apply(&self, sandbox: &Sandbox, write: ProgramWrite) -> UnitOfWork {
        let program_id = write.program.program_id.clone();
        let is_gdp = write.program.family() == ProgramFamily::GroundDelay;
        let keep = Self::affected_keys(sandbox);
        let updates: Vec<_> = sandbox
            .controlled()
            .map(|f| (f.flight_key().clone(), f.control.clone()))
            .collect();

        let mut work = UnitOfWork::new("apply")
            .with(Mutation::ClearControlFields {
                mapping: self.mapping,
                program_id: program_id.clone(),
                keep: keep.clone(),
            })
            .with(Mutation::EnsureControlRecords {
                keys: keep.into_iter().collect(),
            })
            .with(Mutation::CopyControlFields {
                mapping: self.mapping,
                updates,
            });
        if is_gdp {
            work.push(Mutation::ReplaceSlots {
                program_id: program_id.clone(),
                slots: sandbox.slots().to_vec(),
            });
        }
        work.with(write.into_mutation()).with(Mutation::ClearSandbox {
            key: sandbox.key.clone(),
            owner: Some(program_id),
        })
    }

    /// Withdraws every target from live in one unit.
    #[must_use]
    pub fn plan_purge(&self, targets: Vec<PurgeTarget>) -> UnitOfWork {
        let mut work = UnitOfWork::new("purge");
        for target in targets {
            let program_id = target.write.program.program_id.clone();
            work.push(Mutation::ClearControlFields {
                mapping: self.mapping,
                program_id: program_id.clone(),
                keep: BTreeSet::new(),
            });
            work.push(Mutation::CancelAssignedSlots {
                program_id: program_id.clone(),
            });
            work.push(Mutation::ClearSandbox {
                key: target.sandbox_key,
                owner: Some(program_id),
            });
            work.push(target.write.into_mutation());
        }
        work
    }

    /// Discards staged plans and records the resulting program rows.
    #[must_use]
    pub fn plan_purge_local(
        &self,
        discards: Vec<(SandboxKey, Option<ProgramId>)>,
        writes: Vec<ProgramWrite>,
    ) -> UnitOfWork {
        let mut work = UnitOfWork::new("purge_local");
        for (key, owner) in discards {
            work.push(Mutation::ClearSandbox { key, owner });
        }
        for write in writes {
            work.push(write.into_mutation());
        }
        work
    }

    /// Records a completed program.
    #[must_use]
    pub fn plan_complete(&self, write: ProgramWrite) -> UnitOfWork {
        UnitOfWork::new("complete").with(write.into_mutation())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::flight::{AircraftCategory, ControlType, Flight, SandboxFlight};
    use crate::request::ProgramRequest;
    use crate::store::CommitStep;
    use chrono::{TimeZone, Utc};

    fn program(kind_gdp: bool) -> Program {
        let config = EngineConfig::default();
        let request = if kind_gdp {
            ProgramRequest::ground_delay("KJFK", "2026-03-14 18:00", "2026-03-14 20:00")
        } else {
            ProgramRequest::ground_stop("KJFK", "2026-03-14 20:00")
        };
        let spec = request.validate(&config).unwrap();
        Program::draft(&spec, Utc.with_ymd_and_hms(2026, 3, 14, 17, 0, 0).unwrap())
    }

    fn sandbox(program: &Program) -> Sandbox {
        let flight = Flight {
            flight_key: FlightKey::new("AAL1").unwrap(),
            callsign: "AAL1".into(),
            origin: "KORD".into(),
            destination: "KJFK".into(),
            origin_center: None,
            origin_tracon: None,
            dest_center: None,
            dest_tracon: None,
            aircraft_category: AircraftCategory::Jet,
            carrier: None,
            phase: None,
            etd: None,
            eta: None,
            ete_minutes: None,
        };
        let mut row = SandboxFlight::new(flight);
        row.control.program_id = Some(program.program_id.clone());
        row.control.control_type = Some(ControlType::GroundStop);
        Sandbox::new(
            SandboxKey::Program(program.program_id.clone()),
            program.program_id.clone(),
            vec![row],
            Vec::new(),
            program.created_at,
        )
    }

    #[test]
    fn apply_steps_are_ordered() {
        let applier = LiveStateApplier::default();
        let gdp = program(true);
        let work = applier.plan_apply(&sandbox(&gdp), ProgramWrite::new(gdp, Some(1)));
        assert_eq!(
            work.steps(),
            vec![
                CommitStep::ClearControlFields,
                CommitStep::EnsureControlRecords,
                CommitStep::CopyControlFields,
                CommitStep::ReplaceSlots,
                CommitStep::UpsertProgram,
                CommitStep::ClearSandbox,
            ]
        );

        let gs = program(false);
        let work = applier.plan_apply(&sandbox(&gs), ProgramWrite::new(gs, Some(1)));
        assert!(!work.steps().contains(&CommitStep::ReplaceSlots));
    }

    #[test]
    fn purge_covers_every_target() {
        let applier = LiveStateApplier::default();
        let a = program(true);
        let key = SandboxKey::Program(a.program_id.clone());
        let work = applier.plan_purge(vec![PurgeTarget {
            write: ProgramWrite::new(a, Some(2)),
            sandbox_key: key,
        }]);
        assert_eq!(
            work.steps(),
            vec![
                CommitStep::ClearControlFields,
                CommitStep::CancelSlots,
                CommitStep::ClearSandbox,
                CommitStep::UpsertProgram,
            ]
        );
    }
}
