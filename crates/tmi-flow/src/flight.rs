//! Flight records and their control fields.
//!
//! A flight exists in two parallel stores:
//!
//! - **Live** ([`LiveFlight`]): the system of record, refreshed from the
//!   external feed. Control fields live in an optional [`ControlRecord`]
//!   created the first time a program touches the flight.
//! - **Sandbox** ([`SandboxFlight`]): a staged copy produced by simulate,
//!   carrying the proposed [`ControlRecord`] and, for exempt flights, the
//!   [`ExemptionReason`](crate::exemption::ExemptionReason).
//!
//! Staged and live rows are joined on [`FlightKey`] only.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use tmi_core::{FlightKey, ProgramId, RowId};

use crate::exemption::ExemptionReason;

/// Flight phase as reported by the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlightPhase {
    /// Flight plan filed, not yet moving.
    Prefile,
    /// Moving on the ground before departure.
    Taxiing,
    /// Wheels up.
    Departed,
    /// In cruise.
    Enroute,
    /// On descent to destination.
    Descending,
    /// Landed.
    Arrived,
    /// The feed has not classified the flight.
    Unknown,
}

impl FlightPhase {
    /// Returns true if a ground stop can still hold the flight.
    #[must_use]
    pub const fn is_ground(self) -> bool {
        matches!(self, Self::Prefile | Self::Taxiing | Self::Unknown)
    }

    /// Returns true if the flight is in the air.
    #[must_use]
    pub const fn is_airborne(self) -> bool {
        matches!(self, Self::Departed | Self::Enroute | Self::Descending)
    }
}

impl fmt::Display for FlightPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Prefile => "prefile",
            Self::Taxiing => "taxiing",
            Self::Departed => "departed",
            Self::Enroute => "enroute",
            Self::Descending => "descending",
            Self::Arrived => "arrived",
            Self::Unknown => "unknown",
        };
        f.write_str(text)
    }
}

impl FromStr for FlightPhase {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "prefile" => Self::Prefile,
            "taxiing" => Self::Taxiing,
            "departed" => Self::Departed,
            "enroute" => Self::Enroute,
            "descending" => Self::Descending,
            "arrived" => Self::Arrived,
            _ => Self::Unknown,
        })
    }
}

/// Broad aircraft category used by scope filters and exemptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AircraftCategory {
    /// Turbojet or turbofan.
    Jet,
    /// Piston or turboprop.
    Prop,
    /// Not classified.
    #[default]
    #[serde(other)]
    Other,
}

impl fmt::Display for AircraftCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Jet => write!(f, "JET"),
            Self::Prop => write!(f, "PROP"),
            Self::Other => write!(f, "OTHER"),
        }
    }
}

/// Flight data as delivered by the live feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flight {
    /// Stable external identity.
    pub flight_key: FlightKey,
    /// ATC callsign.
    pub callsign: String,
    /// Departure airport.
    pub origin: String,
    /// Arrival airport.
    pub destination: String,
    /// Departure center (ARTCC).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_center: Option<String>,
    /// Departure TRACON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_tracon: Option<String>,
    /// Arrival center (ARTCC).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest_center: Option<String>,
    /// Arrival TRACON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest_tracon: Option<String>,
    /// Aircraft category.
    #[serde(default)]
    pub aircraft_category: AircraftCategory,
    /// Operating carrier code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier: Option<String>,
    /// Flight phase; `None` is treated as unknown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<FlightPhase>,
    /// Estimated time of departure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etd: Option<DateTime<Utc>>,
    /// Estimated time of arrival.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta: Option<DateTime<Utc>>,
    /// Estimated time enroute in minutes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ete_minutes: Option<i64>,
}

impl Flight {
    /// Returns the phase, treating a missing value as unknown.
    #[must_use]
    pub fn effective_phase(&self) -> FlightPhase {
        self.phase.unwrap_or(FlightPhase::Unknown)
    }

    /// Returns the enroute time, deriving it from ETA minus ETD if missing.
    #[must_use]
    pub fn effective_ete(&self) -> Option<i64> {
        self.ete_minutes.filter(|m| *m > 0).or_else(|| {
            let (etd, eta) = (self.etd?, self.eta?);
            let minutes = (eta - etd).num_minutes();
            (minutes > 0).then_some(minutes)
        })
    }

    /// Returns the carrier, falling back to the callsign's ICAO prefix.
    #[must_use]
    pub fn carrier_code(&self) -> Option<&str> {
        if let Some(carrier) = self.carrier.as_deref().filter(|c| !c.trim().is_empty()) {
            return Some(carrier);
        }
        let prefix = self.callsign.get(..3)?;
        prefix
            .chars()
            .all(|c| c.is_ascii_alphabetic())
            .then_some(prefix)
    }

    /// Returns the enroute time, or `fallback` when it cannot be determined.
    #[must_use]
    pub fn ete_or(&self, fallback: i64) -> i64 {
        self.effective_ete().unwrap_or(fallback)
    }

    /// Returns the arrival baseline: the ETA, or ETD plus enroute time.
    #[must_use]
    pub fn baseline_eta(&self, fallback_ete: i64) -> Option<DateTime<Utc>> {
        self.eta
            .or_else(|| Some(self.etd? + Duration::minutes(self.ete_or(fallback_ete))))
    }
}

/// Control tag written to a controlled flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlType {
    /// Held by a ground stop.
    #[serde(rename = "GS")]
    GroundStop,
    /// Metered into a ground delay program slot.
    #[serde(rename = "GDP")]
    GroundDelay,
    /// Slotted, with delay capped at the program limit.
    #[serde(rename = "GDP-CAP")]
    GroundDelayCapped,
    /// In the program but no slot was available.
    #[serde(rename = "GDP-STK")]
    GroundDelayStacked,
}

impl fmt::Display for ControlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GroundStop => write!(f, "GS"),
            Self::GroundDelay => write!(f, "GDP"),
            Self::GroundDelayCapped => write!(f, "GDP-CAP"),
            Self::GroundDelayStacked => write!(f, "GDP-STK"),
        }
    }
}

/// Original and baseline schedule times recorded when control begins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaselineTimes {
    /// Original ETD.
    pub oetd: Option<DateTime<Utc>>,
    /// Baseline ETD.
    pub betd: Option<DateTime<Utc>>,
    /// Original ETA.
    pub oeta: Option<DateTime<Utc>>,
    /// Baseline ETA.
    pub beta: Option<DateTime<Utc>>,
}

impl BaselineTimes {
    /// Fills unset fields from the given departure and arrival times.
    pub fn fill_missing(&mut self, etd: Option<DateTime<Utc>>, eta: Option<DateTime<Utc>>) {
        self.oetd = self.oetd.or(etd);
        self.betd = self.betd.or(etd);
        self.oeta = self.oeta.or(eta);
        self.beta = self.beta.or(eta);
    }
}

/// Control fields attached to a flight by a program.
///
/// The live copy of these fields is written only through
/// [`FieldMapping`](crate::field_map::FieldMapping).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlRecord {
    /// Program that controls the flight.
    pub program_id: Option<ProgramId>,
    /// Control tag.
    pub control_type: Option<ControlType>,
    /// Control element (airport) of the program.
    pub ctl_element: Option<String>,
    /// Controlled time of departure (EDCT).
    pub ctd: Option<DateTime<Utc>>,
    /// Controlled time of arrival.
    pub cta: Option<DateTime<Utc>>,
    /// Assigned slot index (GDP).
    pub slot_index: Option<u32>,
    /// Assigned slot time (GDP); may differ from the CTA when capped.
    pub slot_time: Option<DateTime<Utc>>,
    /// Program delay in minutes.
    pub program_delay_min: Option<i64>,
    /// Positive part of the program delay in minutes.
    pub absolute_delay_min: Option<i64>,
    /// CTA relative to the schedule baseline in minutes.
    pub schedule_variation_min: Option<i64>,
    /// True if the delay was capped at the program limit.
    pub delay_capped: bool,
    /// Schedule baselines.
    pub baseline: BaselineTimes,
}

impl ControlRecord {
    /// Returns true if the record carries a program tag.
    #[must_use]
    pub fn is_controlled(&self) -> bool {
        self.program_id.is_some() && self.control_type.is_some()
    }

    /// Returns true if the record is tagged with `program_id`.
    #[must_use]
    pub fn is_tagged_with(&self, program_id: &ProgramId) -> bool {
        self.program_id.as_ref() == Some(program_id)
    }
}

/// A flight in the live store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveFlight {
    /// Latest feed data.
    pub flight: Flight,
    /// Control record, created on first control.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control: Option<ControlRecord>,
    /// When the feed last refreshed this flight.
    pub synced_at: DateTime<Utc>,
}

impl LiveFlight {
    /// Wraps feed data with no control record.
    #[must_use]
    pub fn new(flight: Flight, synced_at: DateTime<Utc>) -> Self {
        Self {
            flight,
            control: None,
            synced_at,
        }
    }

    /// Returns the program currently controlling the flight, if any.
    #[must_use]
    pub fn program_id(&self) -> Option<&ProgramId> {
        self.control.as_ref().and_then(|c| c.program_id.as_ref())
    }
}

/// A staged flight produced by simulate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxFlight {
    /// Staging row identity; never used for matching.
    pub row_id: RowId,
    /// Flight data as read at simulate time.
    pub flight: Flight,
    /// ETA the allocation was computed from.
    pub original_eta: Option<DateTime<Utc>>,
    /// Exemption reason, if the flight is exempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exemption: Option<ExemptionReason>,
    /// Proposed control fields.
    pub control: ControlRecord,
}

impl SandboxFlight {
    /// Stages a flight with an empty control record.
    #[must_use]
    pub fn new(flight: Flight) -> Self {
        let original_eta = flight.eta;
        Self {
            row_id: RowId::generate(),
            flight,
            original_eta,
            exemption: None,
            control: ControlRecord::default(),
        }
    }

    /// Returns the stable flight key.
    #[must_use]
    pub fn flight_key(&self) -> &FlightKey {
        &self.flight.flight_key
    }

    /// Returns true if the flight was exempted.
    #[must_use]
    pub fn is_exempt(&self) -> bool {
        self.exemption.is_some()
    }

    /// Returns true if the flight will be written to live on apply.
    #[must_use]
    pub fn is_controlled(&self) -> bool {
        !self.is_exempt() && self.control.is_controlled()
    }

    /// Returns true if the flight is in the program but has no slot.
    #[must_use]
    pub fn is_stacked(&self) -> bool {
        self.control.control_type == Some(ControlType::GroundDelayStacked)
    }

    /// Returns true if the flight holds a slot.
    #[must_use]
    pub fn is_slotted(&self) -> bool {
        self.control.slot_index.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn flight() -> Flight {
        Flight {
            flight_key: FlightKey::new("DAL1-KJFK-KATL").unwrap(),
            callsign: "DAL1".into(),
            origin: "KJFK".into(),
            destination: "KATL".into(),
            origin_center: Some("ZNY".into()),
            origin_tracon: Some("N90".into()),
            dest_center: Some("ZTL".into()),
            dest_tracon: Some("A80".into()),
            aircraft_category: AircraftCategory::Jet,
            carrier: Some("DAL".into()),
            phase: None,
            etd: Some(Utc.with_ymd_and_hms(2026, 3, 14, 16, 0, 0).unwrap()),
            eta: Some(Utc.with_ymd_and_hms(2026, 3, 14, 18, 10, 0).unwrap()),
            ete_minutes: None,
        }
    }

    #[test]
    fn ete_is_derived_from_times_when_missing() {
        let f = flight();
        assert_eq!(f.effective_ete(), Some(130));
        let explicit = Flight {
            ete_minutes: Some(125),
            ..flight()
        };
        assert_eq!(explicit.effective_ete(), Some(125));
        let unknown = Flight { eta: None, ..flight() };
        assert_eq!(unknown.ete_or(60), 60);
    }

    #[test]
    fn baseline_eta_falls_back_to_etd_plus_ete() {
        let f = Flight {
            eta: None,
            ete_minutes: Some(90),
            ..flight()
        };
        assert_eq!(
            f.baseline_eta(60),
            Some(Utc.with_ymd_and_hms(2026, 3, 14, 17, 30, 0).unwrap())
        );
    }

    #[test]
    fn carrier_falls_back_to_callsign_prefix() {
        assert_eq!(flight().carrier_code(), Some("DAL"));
        let no_carrier = Flight {
            carrier: None,
            callsign: "JBU412".into(),
            ..flight()
        };
        assert_eq!(no_carrier.carrier_code(), Some("JBU"));
        let general_aviation = Flight {
            carrier: None,
            callsign: "N123AB".into(),
            ..flight()
        };
        assert_eq!(general_aviation.carrier_code(), None);
    }

    #[test]
    fn phase_classification() {
        assert!(FlightPhase::Unknown.is_ground());
        assert!(FlightPhase::Taxiing.is_ground());
        assert!(!FlightPhase::Departed.is_ground());
        assert!(FlightPhase::Descending.is_airborne());
        assert_eq!("ENROUTE".parse::<FlightPhase>().unwrap(), FlightPhase::Enroute);
        assert_eq!("??".parse::<FlightPhase>().unwrap(), FlightPhase::Unknown);
        assert_eq!(flight().effective_phase(), FlightPhase::Unknown);
    }

    #[test]
    fn baselines_fill_only_missing() {
        let early = Utc.with_ymd_and_hms(2026, 3, 14, 15, 0, 0).unwrap();
        let mut baseline = BaselineTimes {
            oetd: Some(early),
            ..BaselineTimes::default()
        };
        let f = flight();
        baseline.fill_missing(f.etd, f.eta);
        assert_eq!(baseline.oetd, Some(early));
        assert_eq!(baseline.betd, f.etd);
        assert_eq!(baseline.beta, f.eta);
    }

    #[test]
    fn control_type_wire_names() {
        let json = serde_json::to_string(&ControlType::GroundDelayCapped).unwrap();
        assert_eq!(json, "\"GDP-CAP\"");
        assert_eq!(ControlType::GroundDelayStacked.to_string(), "GDP-STK");
    }

    #[test]
    fn unknown_aircraft_category_deserializes_as_other() {
        let cat: AircraftCategory = serde_json::from_str("\"HELO\"").unwrap();
        assert_eq!(cat, AircraftCategory::Other);
    }
}
