//! Flight demand selection.
//!
//! [`FlightDemandSource`] is the seam to whatever holds live flights. The
//! engine describes what it wants as [`DemandCriteria`]; sources may push the
//! criteria down to their own query language, but [`DemandCriteria::matches`]
//! is the reference predicate and the in-memory store uses it directly.
//!
//! ## Phase eligibility
//!
//! | Program | Time field | Phase rule |
//! |---------|------------|------------|
//! | GS  | ETD | ground phase (prefile, taxiing, unknown) and ETD later than now minus the grace buffer |
//! | GDP | ETA | anything but arrived |

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tmi_core::codes::CodeList;
use tmi_core::geo::AirportDirectory;
use tmi_core::FlightKey;

use crate::error::Result;
use crate::flight::{AircraftCategory, Flight, FlightPhase};

/// Aircraft category filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AircraftFilter {
    /// No restriction.
    #[default]
    All,
    /// Jets only.
    Jet,
    /// Props only.
    Prop,
}

impl AircraftFilter {
    /// Returns true if `category` passes the filter.
    #[must_use]
    pub fn admits(self, category: AircraftCategory) -> bool {
        match self {
            Self::All => true,
            Self::Jet => category == AircraftCategory::Jet,
            Self::Prop => category == AircraftCategory::Prop,
        }
    }
}

/// Operator-configured scope of a program.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemandScope {
    /// Departure airport allow-list.
    #[serde(default)]
    pub origin_airports: CodeList,
    /// Departure center allow-list; `ALL` means unrestricted.
    #[serde(default)]
    pub origin_centers: CodeList,
    /// Additional departure facilities merged into the center list.
    #[serde(default)]
    pub departure_facilities: CodeList,
    /// Aircraft category filter.
    #[serde(default)]
    pub aircraft: AircraftFilter,
    /// Carrier allow-list.
    #[serde(default)]
    pub carriers: CodeList,
    /// Radius around the control element in nautical miles; replaces the
    /// origin lists when set.
    #[serde(default)]
    pub distance_nm: Option<f64>,
}

impl DemandScope {
    /// Resolves origin restrictions, consulting `airports` for distance scope.
    #[must_use]
    pub fn resolve_origins(&self, ctl_element: &str, airports: &dyn AirportDirectory) -> OriginScope {
        if let Some(radius) = self.distance_nm.filter(|r| *r > 0.0) {
            let Some(center) = airports.coordinates(ctl_element) else {
                tracing::warn!(
                    ctl_element,
                    radius_nm = radius,
                    "control element location unknown; distance scope ignored"
                );
                return OriginScope::Any;
            };
            let within = airports.airports_within(center, radius);
            tracing::debug!(
                ctl_element,
                radius_nm = radius,
                airports = within.len(),
                "resolved distance scope"
            );
            return OriginScope::Radius {
                airports: CodeList::from_entries(within),
            };
        }

        let centers = self.origin_centers.clone().union(&self.departure_facilities);
        let centers = if centers.is_wildcard() {
            CodeList::default()
        } else {
            centers
        };
        if self.origin_airports.is_empty() && centers.is_empty() {
            OriginScope::Any
        } else {
            OriginScope::Lists {
                airports: self.origin_airports.clone(),
                centers,
            }
        }
    }
}

/// Resolved departure restriction.
#[derive(Debug, Clone, PartialEq)]
pub enum OriginScope {
    /// No restriction.
    Any,
    /// Origin airport and/or center allow-lists; an empty list is not applied.
    Lists {
        /// Airport allow-list.
        airports: CodeList,
        /// Center allow-list.
        centers: CodeList,
    },
    /// Airports within a radius; an empty list admits nothing.
    Radius {
        /// Airports within the radius.
        airports: CodeList,
    },
}

impl OriginScope {
    fn admits(&self, flight: &Flight) -> bool {
        match self {
            Self::Any => true,
            Self::Lists { airports, centers } => {
                (airports.is_empty() || airports.contains(&flight.origin))
                    && (centers.is_empty()
                        || flight
                            .origin_center
                            .as_deref()
                            .is_some_and(|c| centers.contains(c)))
            }
            Self::Radius { airports } => airports.contains(&flight.origin),
        }
    }
}

/// Which schedule time the window applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeField {
    /// Estimated time of departure (GS).
    Etd,
    /// Estimated time of arrival (GDP).
    Eta,
}

impl TimeField {
    /// Reads this field from a flight.
    #[must_use]
    pub fn of(self, flight: &Flight) -> Option<DateTime<Utc>> {
        match self {
            Self::Etd => flight.etd,
            Self::Eta => flight.eta,
        }
    }
}

/// Phase eligibility rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseRule {
    /// Ground-phase flights not yet departed (GS).
    GroundHold {
        /// ETD must be after this instant (now minus grace); missing ETD passes.
        departs_after: DateTime<Utc>,
    },
    /// Any flight that has not arrived (GDP).
    NotArrived,
}

impl PhaseRule {
    fn admits(self, flight: &Flight) -> bool {
        match self {
            Self::GroundHold { departs_after } => {
                flight.effective_phase().is_ground()
                    && flight.etd.map_or(true, |etd| etd > departs_after)
            }
            Self::NotArrived => flight.effective_phase() != FlightPhase::Arrived,
        }
    }
}

/// What a program asks of the demand source.
#[derive(Debug, Clone, PartialEq)]
pub struct DemandCriteria {
    /// Arrival airports.
    pub destinations: CodeList,
    /// Field the window applies to.
    pub time_field: TimeField,
    /// Inclusive lower bound; `None` means unbounded.
    pub window_start: Option<DateTime<Utc>>,
    /// Inclusive upper bound.
    pub window_end: DateTime<Utc>,
    /// Departure restriction.
    pub origins: OriginScope,
    /// Aircraft category filter.
    pub aircraft: AircraftFilter,
    /// Carrier allow-list; empty means unrestricted.
    pub carriers: CodeList,
    /// Phase eligibility.
    pub phase: PhaseRule,
}

impl DemandCriteria {
    /// Returns true if `flight` is in scope.
    #[must_use]
    pub fn matches(&self, flight: &Flight) -> bool {
        let Some(time) = self.time_field.of(flight) else {
            return false;
        };
        self.destinations.contains(&flight.destination)
            && self.window_start.map_or(true, |start| time >= start)
            && time <= self.window_end
            && self.phase.admits(flight)
            && self.origins.admits(flight)
            && self.aircraft.admits(flight.aircraft_category)
            && (self.carriers.is_empty()
                || flight
                    .carrier_code()
                    .is_some_and(|c| self.carriers.contains(c)))
    }

    /// Orders flights by the time field, then flight key.
    pub fn sort(&self, flights: &mut [Flight]) {
        let field = self.time_field;
        flights.sort_by(|a, b| compare_by(field, a, b));
    }
}

fn compare_by(field: TimeField, a: &Flight, b: &Flight) -> Ordering {
    match (field.of(a), field.of(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.flight_key.cmp(&b.flight_key))
}

/// Collapses duplicate flight keys, keeping the earliest ETA.
#[must_use]
pub fn dedupe_by_flight_key(flights: Vec<Flight>) -> Vec<Flight> {
    let mut out: Vec<Flight> = Vec::with_capacity(flights.len());
    let mut seen: HashMap<FlightKey, usize> = HashMap::with_capacity(flights.len());
    for flight in flights {
        if let Some(&pos) = seen.get(&flight.flight_key) {
            let keep_new = match (flight.eta, out[pos].eta) {
                (Some(new), Some(old)) => new < old,
                (Some(_), None) => true,
                _ => false,
            };
            if keep_new {
                out[pos] = flight;
            }
        } else {
            seen.insert(flight.flight_key.clone(), out.len());
            out.push(flight);
        }
    }
    out
}

/// Source of candidate flights.
#[async_trait]
pub trait FlightDemandSource: Send + Sync {
    /// Returns flights matching `criteria`, ordered by the criteria's time
    /// field ascending.
    async fn query(&self, criteria: &DemandCriteria) -> Result<Vec<Flight>>;
}
