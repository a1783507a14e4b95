//! In-memory store implementation for testing.
//!
//! This module provides [`InMemoryStore`], an in-memory implementation of
//! the [`Store`] trait suitable for testing, demos and the CLI.
//!
//! Commits are copy-on-write: the committed state is cloned, every mutation
//! is applied to the copy, and the copy replaces the committed state only if
//! all of them succeed. A failure leaves the committed state untouched.
//!
//! ## Limitations
//!
//! - **NOT suitable for production**: No durability, no cross-process coordination
//! - **Single-process only**: State is not shared across process boundaries
//! - **Whole-state copies**: Each commit clones every table

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use tmi_core::{FlightKey, ProgramId};

use super::{CommitReport, CommitStep, Mutation, ProgramFilter, Store, UnitOfWork};
use crate::demand::{dedupe_by_flight_key, DemandCriteria, FlightDemandSource};
use crate::error::{Error, Result};
use crate::flight::{Flight, LiveFlight};
use crate::program::Program;
use crate::sandbox::{Sandbox, SandboxKey};
use crate::slot::Slot;

#[derive(Debug, Clone, Default)]
struct State {
    programs: HashMap<ProgramId, Program>,
    slots: HashMap<ProgramId, Vec<Slot>>,
    sandboxes: BTreeMap<SandboxKey, Sandbox>,
    live: BTreeMap<FlightKey, LiveFlight>,
}

/// In-memory store for testing.
///
/// ## Example
///
/// ```rust
/// use tmi_flow::store::memory::InMemoryStore;
///
/// let store = InMemoryStore::new();
/// assert_eq!(store.live_flight_count().unwrap(), 0);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
    failure: Mutex<Option<CommitStep>>,
}

/// Converts a lock poison error to a storage error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("lock poisoned")
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with live flights.
    #[must_use]
    pub fn with_live_flights(flights: Vec<Flight>, synced_at: DateTime<Utc>) -> Self {
        let mut state = State::default();
        for flight in flights {
            state
                .live
                .insert(flight.flight_key.clone(), LiveFlight::new(flight, synced_at));
        }
        Self {
            state: RwLock::new(state),
            failure: Mutex::new(None),
        }
    }

    /// Makes the next commit that reaches `step` fail and roll back.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn fail_at(&self, step: CommitStep) -> Result<()> {
        *self.failure.lock().map_err(poison_err)? = Some(step);
        Ok(())
    }

    /// Cancels a pending injected failure.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn clear_failure(&self) -> Result<()> {
        *self.failure.lock().map_err(poison_err)? = None;
        Ok(())
    }

    /// Returns the number of live flights.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn live_flight_count(&self) -> Result<usize> {
        let count = {
            let state = self.state.read().map_err(poison_err)?;
            state.live.len()
        };
        Ok(count)
    }

    /// Returns the number of program rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn program_count(&self) -> Result<usize> {
        let count = {
            let state = self.state.read().map_err(poison_err)?;
            state.programs.len()
        };
        Ok(count)
    }

    fn take_failure(&self, step: CommitStep) -> Result<bool> {
        let mut failure = self.failure.lock().map_err(poison_err)?;
        if *failure == Some(step) {
            *failure = None;
            return Ok(true);
        }
        Ok(false)
    }
}

impl State {
    fn apply(&mut self, mutation: Mutation, report: &mut CommitReport) -> Result<()> {
        match mutation {
            Mutation::StageSandbox(sandbox) => {
                report.sandbox_flights_staged += sandbox.len();
                self.sandboxes.insert(sandbox.key.clone(), sandbox);
            }
            Mutation::ClearSandbox { key, owner } => {
                let owned = self
                    .sandboxes
                    .get(&key)
                    .is_some_and(|sb| owner.as_ref().map_or(true, |o| sb.is_owned_by(o)));
                if owned {
                    if let Some(sandbox) = self.sandboxes.remove(&key) {
                        report.sandbox_flights_cleared += sandbox.len();
                        report.sandbox_slots_cleared += sandbox.slots().len();
                    }
                }
            }
            Mutation::ReplaceSlots { program_id, slots } => {
                report.slots_written += slots.len();
                self.slots.insert(program_id, slots);
            }
            Mutation::EnsureControlRecords { keys } => {
                for key in keys {
                    if let Some(live) = self.live.get_mut(&key) {
                        if live.control.is_none() {
                            live.control = Some(Default::default());
                            report.control_records_created += 1;
                        }
                    }
                }
            }
            Mutation::CopyControlFields { mapping, updates } => {
                for (key, staged) in updates {
                    let Some(live) = self.live.get_mut(&key) else {
                        report.flights_missing += 1;
                        continue;
                    };
                    let control = live.control.get_or_insert_with(Default::default);
                    if let (Some(current), Some(incoming)) = (&control.program_id, &staged.program_id) {
                        if current != incoming {
                            tracing::info!(
                                flight_key = %key,
                                from = %current,
                                to = %incoming,
                                "flight re-tagged to new program"
                            );
                            report.flights_retagged += 1;
                        }
                    }
                    mapping.copy(&staged, control);
                    report.flights_updated += 1;
                }
            }
            Mutation::ClearControlFields {
                mapping,
                program_id,
                keep,
            } => {
                for (key, live) in &mut self.live {
                    if keep.contains(key) {
                        continue;
                    }
                    if let Some(control) = live.control.as_mut().filter(|c| c.is_tagged_with(&program_id)) {
                        mapping.clear(control);
                        report.flights_cleared += 1;
                    }
                }
            }
            Mutation::CancelAssignedSlots { program_id } => {
                if let Some(slots) = self.slots.get_mut(&program_id) {
                    report.slots_cancelled += slots
                        .iter_mut()
                        .map(Slot::cancel_if_assigned)
                        .filter(|changed| *changed)
                        .count();
                }
            }
            Mutation::UpsertProgram {
                mut program,
                expected_version,
            } => {
                let actual = self.programs.get(&program.program_id).map(|p| p.version);
                if actual != expected_version {
                    return Err(Error::VersionConflict {
                        program_id: program.program_id.clone(),
                        expected: expected_version,
                        actual,
                    });
                }
                program.version = expected_version.unwrap_or(0) + 1;
                self.programs.insert(program.program_id.clone(), *program);
                report.programs_upserted += 1;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl FlightDemandSource for InMemoryStore {
    async fn query(&self, criteria: &DemandCriteria) -> Result<Vec<Flight>> {
        let matched: Vec<Flight> = {
            let state = self.state.read().map_err(poison_err)?;
            state
                .live
                .values()
                .filter(|live| criteria.matches(&live.flight))
                .map(|live| live.flight.clone())
                .collect()
        };
        let mut flights = dedupe_by_flight_key(matched);
        criteria.sort(&mut flights);
        Ok(flights)
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get_program(&self, program_id: &ProgramId) -> Result<Option<Program>> {
        let result = {
            let state = self.state.read().map_err(poison_err)?;
            state.programs.get(program_id).cloned()
        };
        Ok(result)
    }

    async fn list_programs(&self, filter: &ProgramFilter) -> Result<Vec<Program>> {
        let mut programs: Vec<Program> = {
            let state = self.state.read().map_err(poison_err)?;
            state
                .programs
                .values()
                .filter(|p| filter.matches(p))
                .cloned()
                .collect()
        };
        programs.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.program_id.cmp(&b.program_id))
        });
        Ok(programs)
    }

    async fn get_slots(&self, program_id: &ProgramId) -> Result<Vec<Slot>> {
        let result = {
            let state = self.state.read().map_err(poison_err)?;
            state.slots.get(program_id).cloned().unwrap_or_default()
        };
        Ok(result)
    }

    async fn get_sandbox(&self, key: &SandboxKey) -> Result<Option<Sandbox>> {
        let result = {
            let state = self.state.read().map_err(poison_err)?;
            state.sandboxes.get(key).cloned()
        };
        Ok(result)
    }

    async fn list_sandboxes(&self) -> Result<Vec<Sandbox>> {
        let result = {
            let state = self.state.read().map_err(poison_err)?;
            state.sandboxes.values().cloned().collect()
        };
        Ok(result)
    }

    async fn get_live_flight(&self, key: &FlightKey) -> Result<Option<LiveFlight>> {
        let result = {
            let state = self.state.read().map_err(poison_err)?;
            state.live.get(key).cloned()
        };
        Ok(result)
    }

    async fn live_flights_for_program(&self, program_id: &ProgramId) -> Result<Vec<LiveFlight>> {
        let result = {
            let state = self.state.read().map_err(poison_err)?;
            state
                .live
                .values()
                .filter(|live| live.program_id() == Some(program_id))
                .cloned()
                .collect()
        };
        Ok(result)
    }

    async fn sync_live_flights(&self, flights: Vec<Flight>, at: DateTime<Utc>) -> Result<usize> {
        let mut state = self.state.write().map_err(poison_err)?;
        let count = flights.len();
        for flight in flights {
            match state.live.entry(flight.flight_key.clone()) {
                Entry::Occupied(mut entry) => {
                    let live = entry.get_mut();
                    live.flight = flight;
                    live.synced_at = at;
                }
                Entry::Vacant(entry) => {
                    entry.insert(LiveFlight::new(flight, at));
                }
            }
        }
        drop(state);
        tracing::debug!(flights = count, "synced live flights");
        Ok(count)
    }

    async fn remove_live_flights(&self, keys: &[FlightKey]) -> Result<usize> {
        let removed = {
            let mut state = self.state.write().map_err(poison_err)?;
            keys.iter().filter(|k| state.live.remove(*k).is_some()).count()
        };
        Ok(removed)
    }

    async fn commit(&self, work: UnitOfWork) -> Result<CommitReport> {
        let UnitOfWork {
            operation,
            mutations,
        } = work;

        let mut state = self.state.write().map_err(poison_err)?;
        let mut working = state.clone();
        let mut report = CommitReport::default();

        for mutation in mutations {
            let step = mutation.step();
            if self.take_failure(step)? {
                drop(state);
                tracing::warn!(operation, %step, "injected commit failure");
                return Err(Error::CommitFailed {
                    operation: operation.to_string(),
                    step,
                    source: Box::new(Error::storage(format!("injected failure at {step}"))),
                });
            }
            if let Err(err) = working.apply(mutation, &mut report) {
                drop(state);
                return Err(match err {
                    conflict @ Error::VersionConflict { .. } => conflict,
                    other => Error::CommitFailed {
                        operation: operation.to_string(),
                        step,
                        source: Box::new(other),
                    },
                });
            }
        }

        *state = working;
        drop(state);
        Ok(report)
    }
}
