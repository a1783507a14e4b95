//! Program lifecycle operations.
//!
//! [`ProgramLifecycleManager`] is the command surface of the engine:
//!
//! | Operation | Effect | Transition |
//! |-----------|--------|------------|
//! | [`preview`](ProgramLifecycleManager::preview) | read-only demand and exemption breakdown | none |
//! | [`simulate`](ProgramLifecycleManager::simulate) | stage a plan in the sandbox | DRAFT/SIMULATED -> SIMULATED, ACTIVE -> ACTIVE |
//! | [`apply`](ProgramLifecycleManager::apply) | copy the staged plan to live | SIMULATED/ACTIVE -> ACTIVE |
//! | [`purge`](ProgramLifecycleManager::purge) | clear live tags, cancel slots | ACTIVE -> PURGED |
//! | [`purge_local`](ProgramLifecycleManager::purge_local) | discard the staged plan | DRAFT/SIMULATED -> DRAFT, ACTIVE -> ACTIVE |
//! | [`complete`](ProgramLifecycleManager::complete) | mark the window elapsed | ACTIVE -> COMPLETED |
//!
//! Every write runs as one [`UnitOfWork`]. Requests are validated before
//! anything is read or written, and audit events are sent only after the
//! commit succeeds.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::Instrument;

use tmi_core::clock::{Clock, SystemClock};
use tmi_core::geo::{AirportDirectory, StaticAirportDirectory};
use tmi_core::observability::{commit_span, program_span};
use tmi_core::ProgramId;

use crate::applier::{LiveStateApplier, ProgramWrite, PurgeTarget};
use crate::config::EngineConfig;
use crate::demand::FlightDemandSource;
use crate::error::{Error, Result};
use crate::exemption::{ExemptionEvaluator, ExemptionReason};
use crate::flight::{Flight, LiveFlight, SandboxFlight};
use crate::metrics::{time_operation, FlowMetrics};
use crate::outbox::{AuditAction, AuditEvent, EventSink, TracingSink};
use crate::program::{
    Program, ProgramConfig, ProgramKind, ProgramStatus, ProgramTransition, TimeWindow,
};
use crate::request::ProgramRequest;
use crate::sandbox::{Sandbox, SandboxKey};
use crate::slot::Slot;
use crate::store::{CommitReport, ProgramFilter, Store, UnitOfWork};
use crate::strategy::{strategy_for, PlanContext};
use crate::summary::{MetricsAggregator, PreviewSummary, ProgramMetrics, SimulationSummary};

/// A flight excluded from control by an exemption rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExemptFlight {
    /// The flight.
    pub flight: Flight,
    /// Highest-priority matching rule.
    pub reason: ExemptionReason,
    /// Every matching rule, in priority order.
    pub matches: Vec<ExemptionReason>,
}

/// Result of [`ProgramLifecycleManager::preview`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResult {
    /// Program the preview describes.
    pub program_id: ProgramId,
    /// Program type.
    pub kind: ProgramKind,
    /// Control element.
    pub ctl_element: String,
    /// Program window.
    pub window: TimeWindow,
    /// Flights the program would control.
    pub flights: Vec<Flight>,
    /// Flights in scope but exempt.
    pub exempt_flights: Vec<ExemptFlight>,
    /// Breakdown of `flights`.
    pub summary: PreviewSummary,
}

/// Result of [`ProgramLifecycleManager::simulate`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    /// The program row after the simulate.
    pub program: Program,
    /// Staged flights with proposed control, exempt included.
    pub flights: Vec<SandboxFlight>,
    /// Slot calendar with assignments (GDP).
    pub slots: Vec<Slot>,
    /// Aggregate statistics.
    pub summary: SimulationSummary,
}

/// Result of [`ProgramLifecycleManager::apply`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyResult {
    /// The program row after the apply.
    pub program: Program,
    /// Live flights written.
    pub applied_count: usize,
    /// Staged flights with no live counterpart.
    pub missing_flights: usize,
    /// Live flights moved from another program.
    pub retagged_flights: usize,
    /// Live control records created.
    pub control_records_created: usize,
    /// Snapshot stored on the program.
    pub metrics: ProgramMetrics,
    /// Live flights now tagged with the program.
    pub flights: Vec<LiveFlight>,
}

/// What to purge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurgeScope {
    /// One program.
    Program(ProgramId),
    /// Every ACTIVE program for a control element.
    ControlElement(String),
}

impl fmt::Display for PurgeScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Program(id) => write!(f, "program {id}"),
            Self::ControlElement(ctl) => write!(f, "control element {ctl}"),
        }
    }
}

/// Result of [`ProgramLifecycleManager::purge`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeResult {
    /// Live flights whose control fields were cleared.
    pub flights_cleared: usize,
    /// Slots marked cancelled.
    pub slots_cancelled: usize,
    /// The purged program rows.
    pub programs: Vec<Program>,
}

/// Result of [`ProgramLifecycleManager::purge_local`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeLocalResult {
    /// Staged flights discarded.
    pub flights_cleared: usize,
    /// Staged slots discarded.
    pub slots_cleared: usize,
    /// Programs whose staged plans were discarded.
    pub programs: Vec<ProgramId>,
}

/// Runs program operations against a [`Store`].
pub struct ProgramLifecycleManager<S: Store> {
    store: Arc<S>,
    airports: Arc<dyn AirportDirectory>,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    metrics: FlowMetrics,
    applier: LiveStateApplier,
}

impl<S: Store> fmt::Debug for ProgramLifecycleManager<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgramLifecycleManager")
            .field("config", &self.config)
            .field("applier", &self.applier)
            .finish_non_exhaustive()
    }
}

impl<S: Store> ProgramLifecycleManager<S> {
    /// Creates a manager with the system clock, no airport locations and
    /// audit events written to the log.
    #[must_use]
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        Self {
            store,
            airports: Arc::new(StaticAirportDirectory::new()),
            sink: Arc::new(TracingSink),
            clock: Arc::new(SystemClock),
            config,
            metrics: FlowMetrics::new(),
            applier: LiveStateApplier::default(),
        }
    }

    /// Sets the airport directory used for distance scope.
    #[must_use]
    pub fn with_airports(mut self, airports: Arc<dyn AirportDirectory>) -> Self {
        self.airports = airports;
        self
    }

    /// Sets the audit event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Sets the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the store.
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Returns the engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Lists the flights a program would control, without writing anything.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a malformed request, or a storage
    /// error if the demand query fails.
    #[tracing::instrument(
        skip(self, request),
        fields(program_id = tracing::field::Empty, kind = tracing::field::Empty)
    )]
    pub async fn preview(&self, request: &ProgramRequest) -> Result<PreviewResult> {
        let _timer = time_operation("preview");
        let spec = request.validate(&self.config)?;
        let span = tracing::Span::current();
        span.record("program_id", tracing::field::display(&spec.program_id));
        span.record("kind", spec.kind.as_str());

        let strategy = strategy_for(spec.kind);
        let now = self.clock.now();
        let criteria = strategy.demand_criteria(&spec, &self.plan_context(now));
        let candidates = self.store.query(&criteria).await?;

        let evaluator = ExemptionEvaluator::new(&spec.exemptions, strategy.family());
        let mut flights = Vec::with_capacity(candidates.len());
        let mut exempt_flights = Vec::new();
        for flight in candidates {
            let decision = evaluator.evaluate(&flight);
            match decision.reason {
                Some(reason) => exempt_flights.push(ExemptFlight {
                    flight,
                    reason,
                    matches: decision.matches,
                }),
                None => flights.push(flight),
            }
        }

        let summary = MetricsAggregator::summarize_preview(&flights, strategy.time_field());
        tracing::info!(
            flights = flights.len(),
            exempt = exempt_flights.len(),
            "preview complete"
        );
        self.metrics.record_operation("preview", spec.kind.as_str());

        Ok(PreviewResult {
            program_id: spec.program_id,
            kind: spec.kind,
            ctl_element: spec.ctl_element,
            window: spec.window,
            flights,
            exempt_flights,
            summary,
        })
    }

    /// Computes a plan and stages it, replacing whatever was staged before.
    ///
    /// Creates the program on first call. "No matching flights" is a valid
    /// outcome and stages an empty plan.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a malformed request or a program type
    /// change, [`Error::InvalidStateTransition`] for a terminal program, or
    /// [`Error::CommitFailed`] / [`Error::VersionConflict`] if the commit is
    /// rolled back.
    #[tracing::instrument(
        skip(self, request),
        fields(program_id = tracing::field::Empty, kind = tracing::field::Empty)
    )]
    pub async fn simulate(&self, request: &ProgramRequest) -> Result<SimulationResult> {
        let _timer = time_operation("simulate");
        let spec = request.validate(&self.config)?;
        let span = tracing::Span::current();
        span.record("program_id", tracing::field::display(&spec.program_id));
        span.record("kind", spec.kind.as_str());

        let now = self.clock.now();
        let config = ProgramConfig::from_spec(&spec);
        let existing = self.store.get_program(&spec.program_id).await?;
        let expected_version = existing.as_ref().map(|p| p.version);
        let mut program = match existing {
            Some(mut program) => {
                if program.family() != spec.kind.family() {
                    return Err(Error::validation(format!(
                        "program {} is a {}; it cannot be simulated as {}",
                        program.program_id,
                        program.kind,
                        spec.kind
                    )));
                }
                if program.status == ProgramStatus::Active {
                    tracing::debug!("staging a revision; the applied configuration stays current");
                } else {
                    program.configure(&config, now);
                }
                program
            }
            None => Program::draft(&spec, now),
        };
        program.transition(ProgramTransition::Simulate, spec.requested_by.as_deref(), now)?;

        let strategy = strategy_for(spec.kind);
        let ctx = self.plan_context(now);
        let criteria = strategy.demand_criteria(&spec, &ctx);
        let candidates = self.store.query(&criteria).await?;
        tracing::debug!(candidates = candidates.len(), "demand selected");
        let plan = strategy.plan(&spec, candidates, &ctx);
        let summary = MetricsAggregator::summarize(&plan.flights, &plan.slots);

        let key = self.sandbox_key(&program);
        if let Some(previous) = self.store.get_sandbox(&key).await? {
            if !previous.is_owned_by(&program.program_id) {
                tracing::warn!(
                    sandbox = %key,
                    replaced = %previous.program_id,
                    "replacing another program's staged plan"
                );
            }
        }
        let sandbox = Sandbox::new(key, program.program_id.clone(), plan.flights, plan.slots, now)
            .with_config(config);
        let flights = sandbox.flights().to_vec();
        let slots = sandbox.slots().to_vec();

        let work = self
            .applier
            .plan_simulate(sandbox, ProgramWrite::new(program.clone(), expected_version));
        self.commit(work).await?;
        let program = self.get_program(&program.program_id).await?;

        tracing::info!(
            staged = summary.total_flights,
            controlled = summary.controlled_flights,
            stacked = summary.stacked_flights,
            exempt = summary.exempt_flights,
            utilization_pct = summary.utilization_pct,
            "simulation staged"
        );
        self.metrics.record_operation("simulate", program.kind.as_str());
        self.metrics
            .record_plan(program.kind.as_str(), program.program_id.as_str(), &summary);
        self.sink.record(
            AuditEvent::new(AuditAction::ProgramSimulated, now)
                .for_program(&program.program_id, &program.ctl_element)
                .by(spec.requested_by.as_deref())
                .with_detail(serde_json::json!({
                    "totalFlights": summary.total_flights,
                    "controlledFlights": summary.controlled_flights,
                    "stackedFlights": summary.stacked_flights,
                    "exemptFlights": summary.exempt_flights,
                    "totalSlots": summary.total_slots,
                })),
        );

        Ok(SimulationResult {
            program,
            flights,
            slots,
            summary,
        })
    }

    /// Copies the staged plan to live flights and activates the program.
    ///
    /// Staged and live flights are matched by flight key; staged flights no
    /// longer in the live store are counted as missing. Re-applying an ACTIVE
    /// program replaces its metrics snapshot and releases flights the new
    /// plan no longer controls.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProgramNotFound`], [`Error::InvalidStateTransition`],
    /// [`Error::NothingToApply`] for an empty or missing plan,
    /// [`Error::SandboxConflict`] if another program's plan replaced this
    /// one, or a rolled-back commit error.
    #[tracing::instrument(skip(self), fields(program_id = %program_id))]
    pub async fn apply(&self, program_id: &ProgramId, actor: Option<&str>) -> Result<ApplyResult> {
        let _timer = time_operation("apply");
        let now = self.clock.now();
        let mut program = self.get_program(program_id).await?;
        let expected_version = Some(program.version);
        let revision = program.status == ProgramStatus::Active;
        program.transition(ProgramTransition::Apply, actor, now)?;

        let key = self.sandbox_key(&program);
        let sandbox = match self.store.get_sandbox(&key).await? {
            Some(sandbox) if !sandbox.is_owned_by(program_id) => {
                return Err(Error::SandboxConflict {
                    program_id: program_id.clone(),
                    owner: sandbox.program_id,
                });
            }
            Some(sandbox) if sandbox.controlled_count() > 0 => sandbox,
            _ => {
                return Err(Error::NothingToApply {
                    program_id: program_id.clone(),
                });
            }
        };

        if let Some(config) = &sandbox.config {
            program.configure(config, now);
        }
        let metrics = ProgramMetrics {
            summary: MetricsAggregator::summarize(sandbox.flights(), sandbox.slots()),
            captured_at: now,
            field_map_version: self.applier.mapping().version,
        };
        program.metrics = Some(metrics.clone());

        let work = self
            .applier
            .plan_apply(&sandbox, ProgramWrite::new(program, expected_version));
        let report = self.commit(work).await?;
        let program = self.get_program(program_id).await?;
        let flights = self.store.live_flights_for_program(program_id).await?;

        if report.flights_missing > 0 {
            tracing::warn!(
                missing = report.flights_missing,
                "staged flights no longer in live data"
            );
        }
        tracing::info!(
            applied = report.flights_updated,
            retagged = report.flights_retagged,
            released = report.flights_cleared,
            revision,
            "program applied"
        );
        self.metrics.record_operation("apply", program.kind.as_str());
        self.sink.record(
            AuditEvent::new(AuditAction::ProgramActivated, now)
                .for_program(program_id, &program.ctl_element)
                .by(actor)
                .with_detail(serde_json::json!({
                    "appliedCount": report.flights_updated,
                    "missingFlights": report.flights_missing,
                    "retaggedFlights": report.flights_retagged,
                    "releasedFlights": report.flights_cleared,
                    "revision": revision,
                })),
        );

        Ok(ApplyResult {
            program,
            applied_count: report.flights_updated,
            missing_flights: report.flights_missing,
            retagged_flights: report.flights_retagged,
            control_records_created: report.control_records_created,
            metrics,
            flights,
        })
    }

    /// Withdraws a program, or every ACTIVE program for a control element.
    ///
    /// Live control fields are cleared; assigned slots become CANCELLED; the
    /// metrics snapshot is kept. Purging a control element with no ACTIVE
    /// program is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProgramNotFound`], [`Error::InvalidStateTransition`]
    /// for a program that is not ACTIVE, or a rolled-back commit error.
    #[tracing::instrument(skip(self), fields(scope = %scope))]
    pub async fn purge(&self, scope: &PurgeScope, actor: Option<&str>) -> Result<PurgeResult> {
        let _timer = time_operation("purge");
        let now = self.clock.now();
        let programs = match scope {
            PurgeScope::Program(id) => vec![self.get_program(id).await?],
            PurgeScope::ControlElement(ctl) => {
                let filter = ProgramFilter::all()
                    .with_status(ProgramStatus::Active)
                    .with_ctl_element(ctl);
                self.store.list_programs(&filter).await?
            }
        };
        if programs.is_empty() {
            tracing::info!("no active programs to purge");
            return Ok(PurgeResult {
                flights_cleared: 0,
                slots_cancelled: 0,
                programs: Vec::new(),
            });
        }

        let mut targets = Vec::with_capacity(programs.len());
        for mut program in programs {
            let expected_version = Some(program.version);
            let span = program_span("purge", program.program_id.as_str(), &program.ctl_element);
            span.in_scope(|| {
                tracing::debug!(status = ?program.status, "withdrawing program");
                program.transition(ProgramTransition::Purge, actor, now)
            })?;
            targets.push(PurgeTarget {
                sandbox_key: self.sandbox_key(&program),
                write: ProgramWrite::new(program, expected_version),
            });
        }
        let ids: Vec<ProgramId> = targets
            .iter()
            .map(|t| t.write.program.program_id.clone())
            .collect();

        let report = self.commit(self.applier.plan_purge(targets)).await?;

        let mut purged = Vec::with_capacity(ids.len());
        for id in &ids {
            let program = self.get_program(id).await?;
            self.metrics.record_operation("purge", program.kind.as_str());
            self.sink.record(
                AuditEvent::new(AuditAction::ProgramPurged, now)
                    .for_program(id, &program.ctl_element)
                    .by(actor),
            );
            purged.push(program);
        }
        tracing::info!(
            programs = purged.len(),
            flights_cleared = report.flights_cleared,
            slots_cancelled = report.slots_cancelled,
            "purge complete"
        );

        Ok(PurgeResult {
            flights_cleared: report.flights_cleared,
            slots_cancelled: report.slots_cancelled,
            programs: purged,
        })
    }

    /// Discards a staged plan, or every staged plan when `program_id` is
    /// `None`. Live data is not touched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProgramNotFound`], [`Error::InvalidStateTransition`]
    /// for a terminal program, or a rolled-back commit error.
    #[tracing::instrument(skip(self), fields(program_id = ?program_id))]
    pub async fn purge_local(
        &self,
        program_id: Option<&ProgramId>,
        actor: Option<&str>,
    ) -> Result<PurgeLocalResult> {
        let _timer = time_operation("purge_local");
        let now = self.clock.now();

        let mut discards: Vec<(SandboxKey, Option<ProgramId>)> = Vec::new();
        let mut writes = Vec::new();
        let mut programs = Vec::new();
        match program_id {
            Some(id) => {
                let mut program = self.get_program(id).await?;
                let expected_version = Some(program.version);
                program.transition(ProgramTransition::PurgeLocal, actor, now)?;
                discards.push((self.sandbox_key(&program), Some(id.clone())));
                writes.push(ProgramWrite::new(program, expected_version));
                programs.push(id.clone());
            }
            None => {
                for sandbox in self.store.list_sandboxes().await? {
                    if let Some(mut program) = self.store.get_program(&sandbox.program_id).await? {
                        if program.status == ProgramStatus::Simulated {
                            let expected_version = Some(program.version);
                            program.transition(ProgramTransition::PurgeLocal, actor, now)?;
                            writes.push(ProgramWrite::new(program, expected_version));
                        }
                    }
                    programs.push(sandbox.program_id.clone());
                    discards.push((sandbox.key, None));
                }
            }
        }

        let report = self
            .commit(self.applier.plan_purge_local(discards, writes))
            .await?;

        for id in &programs {
            self.sink.record(
                AuditEvent::new(AuditAction::SandboxPurged, now)
                    .by(actor)
                    .with_detail(serde_json::json!({ "programId": id.as_str() })),
            );
        }
        self.metrics.record_operation("purge_local", "ALL");
        tracing::info!(
            flights_cleared = report.sandbox_flights_cleared,
            slots_cleared = report.sandbox_slots_cleared,
            "staged plans discarded"
        );

        Ok(PurgeLocalResult {
            flights_cleared: report.sandbox_flights_cleared,
            slots_cleared: report.sandbox_slots_cleared,
            programs,
        })
    }

    /// Marks an ACTIVE program COMPLETED once its window has elapsed.
    ///
    /// Called by an external scheduler; live control fields are left as is.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProgramNotFound`], [`Error::InvalidStateTransition`],
    /// or a rolled-back commit error.
    #[tracing::instrument(skip(self), fields(program_id = %program_id))]
    pub async fn complete(&self, program_id: &ProgramId) -> Result<Program> {
        let now = self.clock.now();
        let mut program = self.get_program(program_id).await?;
        let expected_version = Some(program.version);
        program.transition(ProgramTransition::Complete, None, now)?;
        if now < program.window.end {
            tracing::warn!(end = %program.window.end, "completing before window end");
        }

        let span = program_span("complete", program_id.as_str(), &program.ctl_element);
        self.commit(
            self.applier
                .plan_complete(ProgramWrite::new(program, expected_version)),
        )
        .instrument(span)
        .await?;
        let program = self.get_program(program_id).await?;
        self.metrics.record_operation("complete", program.kind.as_str());
        self.sink.record(
            AuditEvent::new(AuditAction::ProgramCompleted, now)
                .for_program(program_id, &program.ctl_element),
        );
        Ok(program)
    }

    /// Gets a program.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProgramNotFound`] if no such program exists.
    pub async fn get_program(&self, program_id: &ProgramId) -> Result<Program> {
        self.store
            .get_program(program_id)
            .await?
            .ok_or_else(|| Error::program_not_found(program_id))
    }

    /// Lists programs, newest first.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the read fails.
    pub async fn list_programs(&self, filter: &ProgramFilter) -> Result<Vec<Program>> {
        self.store.list_programs(filter).await
    }

    fn plan_context(&self, now: chrono::DateTime<chrono::Utc>) -> PlanContext<'_> {
        PlanContext {
            now,
            config: &self.config,
            airports: self.airports.as_ref(),
        }
    }

    fn sandbox_key(&self, program: &Program) -> SandboxKey {
        self.config
            .sandbox_scope
            .key_for(&program.program_id, program.family())
    }

    async fn commit(&self, work: UnitOfWork) -> Result<CommitReport> {
        let operation = work.operation;
        let span = commit_span(operation, work.mutations.len());
        match self.store.commit(work).instrument(span).await {
            Ok(report) => {
                tracing::debug!(operation, ?report, "committed");
                Ok(report)
            }
            Err(err) => {
                if let Some(step) = err.failed_step() {
                    self.metrics.record_commit_failure(operation, step);
                }
                tracing::warn!(operation, error = %err, "commit rolled back");
                Err(err)
            }
        }
    }
}
