//! Control strategies: how each program family selects and controls demand.
//!
//! | Family | Time field | Calendar | Control |
//! |--------|------------|----------|---------|
//! | GS  | ETD | none | every flight released at the window end |
//! | GDP | ETA | [`SlotGenerator`] | [`SlotAllocator`] then [`DelayCalculator`] |
//!
//! Both strategies share exemption handling: exempt flights are staged with
//! their reason and an empty control record, and never reach the allocator.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};

use tmi_core::codes::CodeList;
use tmi_core::geo::AirportDirectory;
use tmi_core::FlightKey;

use crate::allocation::{AllocationRequest, SlotAllocator};
use crate::calendar::SlotGenerator;
use crate::config::EngineConfig;
use crate::delay::{DelayCalculator, DelayPolicy};
use crate::demand::{dedupe_by_flight_key, DemandCriteria, PhaseRule, TimeField};
use crate::exemption::ExemptionEvaluator;
use crate::flight::{Flight, SandboxFlight};
use crate::program::{ProgramFamily, ProgramKind};
use crate::request::ProgramSpec;
use crate::slot::Slot;

/// Inputs shared by every strategy call.
#[derive(Clone, Copy)]
pub struct PlanContext<'a> {
    /// Current time.
    pub now: DateTime<Utc>,
    /// Engine defaults.
    pub config: &'a EngineConfig,
    /// Reference airport locations for distance scope.
    pub airports: &'a dyn AirportDirectory,
}

impl fmt::Debug for PlanContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanContext")
            .field("now", &self.now)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// A staged plan: flights with proposed control and, for GDP, the calendar.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationPlan {
    /// Staged flights, exempt included, in time-field order.
    pub flights: Vec<SandboxFlight>,
    /// Slot calendar with assignments.
    pub slots: Vec<Slot>,
}

/// Family-specific demand selection and control.
pub trait ControlStrategy: Send + Sync + fmt::Debug {
    /// The family this strategy serves.
    fn family(&self) -> ProgramFamily;

    /// The schedule time the program window applies to.
    fn time_field(&self) -> TimeField;

    /// Describes the flights the program may control.
    fn demand_criteria(&self, spec: &ProgramSpec, ctx: &PlanContext<'_>) -> DemandCriteria;

    /// Computes proposed control for `candidates`.
    fn plan(&self, spec: &ProgramSpec, candidates: Vec<Flight>, ctx: &PlanContext<'_>) -> SimulationPlan;
}

static GROUND_STOP: GroundStopStrategy = GroundStopStrategy;
static GROUND_DELAY: GroundDelayStrategy = GroundDelayStrategy;

/// Returns the strategy for a program type.
#[must_use]
pub fn strategy_for(kind: ProgramKind) -> &'static dyn ControlStrategy {
    match kind.family() {
        ProgramFamily::GroundStop => &GROUND_STOP,
        ProgramFamily::GroundDelay => &GROUND_DELAY,
    }
}

fn delay_calculator(spec: &ProgramSpec, config: &EngineConfig) -> DelayCalculator {
    DelayCalculator::new(DelayPolicy {
        delay_limit_min: spec.delay_limit_min,
        default_ete_min: config.default_ete_min,
        taxi_out_min: config.gs_taxi_out_min,
    })
}

/// Splits candidates into exempt (staged with reason) and eligible flights.
fn apply_exemptions(
    spec: &ProgramSpec,
    family: ProgramFamily,
    candidates: Vec<Flight>,
) -> (Vec<SandboxFlight>, Vec<Flight>) {
    let evaluator = ExemptionEvaluator::new(&spec.exemptions, family);
    let mut exempt = Vec::new();
    let mut eligible = Vec::with_capacity(candidates.len());
    for flight in dedupe_by_flight_key(candidates) {
        let decision = evaluator.evaluate(&flight);
        match decision.reason {
            Some(reason) => {
                tracing::trace!(
                    flight_key = %flight.flight_key,
                    %reason,
                    matches = decision.matches.len(),
                    "flight exempt"
                );
                let mut staged = SandboxFlight::new(flight);
                staged.exemption = Some(reason);
                exempt.push(staged);
            }
            None => eligible.push(flight),
        }
    }
    (exempt, eligible)
}

fn finish(mut flights: Vec<SandboxFlight>, slots: Vec<Slot>, field: TimeField) -> SimulationPlan {
    flights.sort_by(|a, b| {
        match (field.of(&a.flight), field.of(&b.flight)) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        }
        .then_with(|| a.flight_key().cmp(b.flight_key()))
    });
    SimulationPlan { flights, slots }
}

/// Ground stop: hold every qualifying departure until the window end.
#[derive(Debug, Clone, Copy, Default)]
pub struct GroundStopStrategy;

impl ControlStrategy for GroundStopStrategy {
    fn family(&self) -> ProgramFamily {
        ProgramFamily::GroundStop
    }

    fn time_field(&self) -> TimeField {
        TimeField::Etd
    }

    fn demand_criteria(&self, spec: &ProgramSpec, ctx: &PlanContext<'_>) -> DemandCriteria {
        DemandCriteria {
            destinations: spec.arrival_airports.clone(),
            time_field: TimeField::Etd,
            window_start: spec.window.start,
            window_end: spec.window.end,
            origins: spec.scope.resolve_origins(&spec.ctl_element, ctx.airports),
            aircraft: spec.scope.aircraft,
            carriers: spec.scope.carriers.clone(),
            phase: PhaseRule::GroundHold {
                departs_after: ctx.now - ctx.config.gs_departure_grace(),
            },
        }
    }

    fn plan(&self, spec: &ProgramSpec, candidates: Vec<Flight>, ctx: &PlanContext<'_>) -> SimulationPlan {
        let (mut staged, eligible) = apply_exemptions(spec, self.family(), candidates);
        let calculator = delay_calculator(spec, ctx.config);
        for flight in eligible {
            let control = calculator.ground_stop_control(
                &spec.program_id,
                &spec.ctl_element,
                spec.window.end,
                &flight,
            );
            let mut row = SandboxFlight::new(flight);
            row.control = control;
            staged.push(row);
        }
        finish(staged, Vec::new(), self.time_field())
    }
}

/// Ground delay program: meter arrivals into a slot calendar.
#[derive(Debug, Clone, Copy, Default)]
pub struct GroundDelayStrategy;

impl ControlStrategy for GroundDelayStrategy {
    fn family(&self) -> ProgramFamily {
        ProgramFamily::GroundDelay
    }

    fn time_field(&self) -> TimeField {
        TimeField::Eta
    }

    fn demand_criteria(&self, spec: &ProgramSpec, ctx: &PlanContext<'_>) -> DemandCriteria {
        DemandCriteria {
            destinations: CodeList::from_entries([spec.ctl_element.as_str()]),
            time_field: TimeField::Eta,
            window_start: Some(spec.window.anchor()),
            window_end: spec.window.end,
            origins: spec.scope.resolve_origins(&spec.ctl_element, ctx.airports),
            aircraft: spec.scope.aircraft,
            carriers: spec.scope.carriers.clone(),
            phase: PhaseRule::NotArrived,
        }
    }

    fn plan(&self, spec: &ProgramSpec, candidates: Vec<Flight>, ctx: &PlanContext<'_>) -> SimulationPlan {
        let (mut staged, eligible) = apply_exemptions(spec, self.family(), candidates);

        let mut slots = SlotGenerator::new(
            &spec.program_id,
            spec.window.anchor(),
            spec.window.end,
            &spec.rates,
        )
        .generate();

        let requests: Vec<AllocationRequest> = eligible
            .iter()
            .filter_map(|f| {
                Some(AllocationRequest {
                    flight_key: f.flight_key.clone(),
                    callsign: f.callsign.clone(),
                    original_eta: f.eta?,
                })
            })
            .collect();
        let mut allocations: HashMap<FlightKey, _> = SlotAllocator::allocate(&mut slots, &requests)
            .into_iter()
            .map(|a| (a.flight_key.clone(), a))
            .collect();

        let calculator = delay_calculator(spec, ctx.config);
        for flight in eligible {
            let mut row = SandboxFlight::new(flight);
            row.control = match allocations.remove(row.flight_key()) {
                Some(allocation) => calculator.ground_delay_control(
                    &spec.program_id,
                    &spec.ctl_element,
                    &row.flight,
                    &allocation,
                ),
                None => {
                    tracing::warn!(
                        flight_key = %row.flight_key(),
                        "flight has no ETA; staged as stacked"
                    );
                    calculator.stacked_control(&spec.program_id, &spec.ctl_element, &row.flight)
                }
            };
            staged.push(row);
        }
        finish(staged, slots, self.time_field())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exemption::{ExemptionCategory, ExemptionRuleSet};
    use crate::flight::{AircraftCategory, ControlType, FlightPhase};
    use crate::request::ProgramRequest;
    use chrono::{Duration, TimeZone};
    use tmi_core::geo::StaticAirportDirectory;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, h, m, 0).unwrap()
    }

    fn flight(key: &str, etd: DateTime<Utc>, ete: i64) -> Flight {
        Flight {
            flight_key: FlightKey::new(key).unwrap(),
            callsign: key.to_string(),
            origin: "KORD".into(),
            destination: "KJFK".into(),
            origin_center: Some("ZAU".into()),
            origin_tracon: None,
            dest_center: Some("ZNY".into()),
            dest_tracon: None,
            aircraft_category: AircraftCategory::Jet,
            carrier: None,
            phase: Some(FlightPhase::Prefile),
            etd: Some(etd),
            eta: Some(etd + Duration::minutes(ete)),
            ete_minutes: Some(ete),
        }
    }

    #[test]
    fn strategy_dispatch_by_family() {
        assert_eq!(strategy_for(ProgramKind::GroundStop).family(), ProgramFamily::GroundStop);
        assert_eq!(strategy_for(ProgramKind::GDP).time_field(), TimeField::Eta);
    }

    #[test]
    fn gdp_plan_stages_exempt_flights_without_slots() {
        let config = EngineConfig::default();
        let airports = StaticAirportDirectory::new();
        let ctx = PlanContext {
            now: at(15, 0),
            config: &config,
            airports: &airports,
        };
        let spec = ProgramRequest::ground_delay("KJFK", "2026-03-14 18:00", "2026-03-14 19:00")
            .with_rates(4, 0)
            .with_exemptions(ExemptionRuleSet {
                callsigns: CodeList::parse("EXM1"),
                ..ExemptionRuleSet::default()
            })
            .validate(&config)
            .unwrap();

        let candidates = vec![
            flight("EXM1", at(16, 0), 120),
            flight("AAL1", at(16, 0), 120),
            flight("AAL2", at(16, 0), 120),
        ];
        let plan = strategy_for(spec.kind).plan(&spec, candidates, &ctx);

        assert_eq!(plan.slots.len(), 4);
        assert_eq!(plan.flights.len(), 3);
        let exempt = plan.flights.iter().find(|f| f.is_exempt()).unwrap();
        assert_eq!(exempt.flight_key().as_str(), "EXM1");
        assert_eq!(
            exempt.exemption.as_ref().map(|r| r.category),
            Some(ExemptionCategory::Callsign)
        );
        assert!(!exempt.is_slotted());
        assert!(plan
            .slots
            .iter()
            .all(|s| s.assigned_flight.as_ref().map(FlightKey::as_str) != Some("EXM1")));
        let second = plan.flights.iter().find(|f| f.flight_key().as_str() == "AAL2").unwrap();
        assert_eq!(second.control.cta, Some(at(18, 15)));
        assert_eq!(second.control.control_type, Some(ControlType::GroundDelay));
    }

    #[test]
    fn gs_criteria_use_grace_buffer() {
        let config = EngineConfig::default();
        let airports = StaticAirportDirectory::new();
        let ctx = PlanContext {
            now: at(18, 0),
            config: &config,
            airports: &airports,
        };
        let spec = ProgramRequest::ground_stop("KJFK", "2026-03-14 20:00")
            .validate(&config)
            .unwrap();
        let criteria = strategy_for(spec.kind).demand_criteria(&spec, &ctx);
        assert_eq!(criteria.time_field, TimeField::Etd);
        assert_eq!(
            criteria.phase,
            PhaseRule::GroundHold {
                departs_after: at(17, 55)
            }
        );
        assert!(criteria.matches(&flight("AAL1", at(17, 56), 60)));
        assert!(!criteria.matches(&flight("AAL2", at(17, 55), 60)));
        assert!(!criteria.matches(&flight("AAL3", at(20, 1), 60)));
    }
}
