//! Per-flight delay and control time computation.
//!
//! ## Ground delay
//!
//! `raw_delay = slot_time - original_ETA`. When the exact difference exceeds
//! the delay limit, even by seconds, the delay is capped: the CTA becomes
//! `original_ETA + limit` while the flight keeps its slot index.
//! `CTD = CTA - ETE`. Reported delays are whole minutes.
//!
//! ## Ground stop
//!
//! `CTD = gs_end`, `CTA = CTD + ETE`, `delay = max(0, CTA - baseline_ETA)`.
//! Schedule variation is measured from the baseline minus taxi-out.

use chrono::{DateTime, Duration, Utc};

use tmi_core::time::whole_minutes_between;
use tmi_core::ProgramId;

use crate::allocation::{Allocation, AllocationOutcome};
use crate::flight::{ControlRecord, ControlType, Flight};

/// Delay policy of one program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayPolicy {
    /// Maximum assigned delay in minutes.
    pub delay_limit_min: i64,
    /// Enroute time used when a flight has none.
    pub default_ete_min: i64,
    /// Taxi-out allowance for GS schedule variation.
    pub taxi_out_min: i64,
}

/// Delay of one slotted flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotDelay {
    /// Slot time minus original ETA, truncated to whole minutes.
    pub raw_delay_min: i64,
    /// Delay after capping.
    pub effective_delay_min: i64,
    /// True if the raw delay exceeded the limit.
    pub capped: bool,
    /// Controlled arrival.
    pub cta: DateTime<Utc>,
    /// Controlled departure.
    pub ctd: DateTime<Utc>,
}

/// Computes control times for individual flights.
#[derive(Debug, Clone, Copy)]
pub struct DelayCalculator {
    policy: DelayPolicy,
}

impl DelayCalculator {
    /// Creates a calculator for `policy`.
    #[must_use]
    pub const fn new(policy: DelayPolicy) -> Self {
        Self { policy }
    }

    /// Returns the policy.
    #[must_use]
    pub const fn policy(&self) -> &DelayPolicy {
        &self.policy
    }

    /// Delay of a flight holding a slot.
    #[must_use]
    pub fn slot_delay(
        &self,
        original_eta: DateTime<Utc>,
        slot_time: DateTime<Utc>,
        ete_min: Option<i64>,
    ) -> SlotDelay {
        let raw_delay_min = whole_minutes_between(original_eta, slot_time);
        let limit = Duration::minutes(self.policy.delay_limit_min);
        let capped = slot_time - original_eta > limit;
        let (effective_delay_min, cta) = if capped {
            (self.policy.delay_limit_min, original_eta + limit)
        } else {
            (raw_delay_min, slot_time)
        };
        let ete = ete_min.unwrap_or(self.policy.default_ete_min);
        SlotDelay {
            raw_delay_min,
            effective_delay_min,
            capped,
            cta,
            ctd: cta - Duration::minutes(ete),
        }
    }

    /// Control record for one allocated GDP flight.
    #[must_use]
    pub fn ground_delay_control(
        &self,
        program_id: &ProgramId,
        ctl_element: &str,
        flight: &Flight,
        allocation: &Allocation,
    ) -> ControlRecord {
        let mut record = ControlRecord {
            program_id: Some(program_id.clone()),
            ctl_element: Some(ctl_element.to_string()),
            ..ControlRecord::default()
        };
        record
            .baseline
            .fill_missing(flight.etd, Some(allocation.original_eta));

        match allocation.outcome {
            AllocationOutcome::Assigned {
                slot_index,
                slot_time,
                ..
            } => {
                let delay = self.slot_delay(allocation.original_eta, slot_time, flight.effective_ete());
                record.control_type = Some(if delay.capped {
                    ControlType::GroundDelayCapped
                } else {
                    ControlType::GroundDelay
                });
                record.slot_index = Some(slot_index);
                record.slot_time = Some(slot_time);
                record.cta = Some(delay.cta);
                record.ctd = Some(delay.ctd);
                record.program_delay_min = Some(delay.effective_delay_min);
                record.absolute_delay_min = Some(delay.effective_delay_min.max(0));
                record.schedule_variation_min =
                    Some(whole_minutes_between(allocation.original_eta, delay.cta));
                record.delay_capped = delay.capped;
            }
            AllocationOutcome::Stacked => {
                record.control_type = Some(ControlType::GroundDelayStacked);
            }
        }
        record
    }

    /// Control record for a GDP flight that could not be offered a slot.
    #[must_use]
    pub fn stacked_control(
        &self,
        program_id: &ProgramId,
        ctl_element: &str,
        flight: &Flight,
    ) -> ControlRecord {
        let mut record = ControlRecord {
            program_id: Some(program_id.clone()),
            control_type: Some(ControlType::GroundDelayStacked),
            ctl_element: Some(ctl_element.to_string()),
            ..ControlRecord::default()
        };
        record.baseline.fill_missing(flight.etd, flight.eta);
        record
    }

    /// Control record for a flight held by a ground stop ending at `gs_end`.
    #[must_use]
    pub fn ground_stop_control(
        &self,
        program_id: &ProgramId,
        ctl_element: &str,
        gs_end: DateTime<Utc>,
        flight: &Flight,
    ) -> ControlRecord {
        let ete = flight.ete_or(self.policy.default_ete_min);
        let ctd = gs_end;
        let cta = ctd + Duration::minutes(ete);
        let baseline_eta = flight.baseline_eta(self.policy.default_ete_min);
        let delay = baseline_eta.map(|beta| whole_minutes_between(beta, cta).max(0));
        let variation = baseline_eta.map(|beta| {
            whole_minutes_between(beta - Duration::minutes(self.policy.taxi_out_min), cta)
        });

        let mut record = ControlRecord {
            program_id: Some(program_id.clone()),
            control_type: Some(ControlType::GroundStop),
            ctl_element: Some(ctl_element.to_string()),
            ctd: Some(ctd),
            cta: Some(cta),
            program_delay_min: delay,
            absolute_delay_min: delay,
            schedule_variation_min: variation,
            ..ControlRecord::default()
        };
        record.baseline.fill_missing(flight.etd, baseline_eta);
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flight::AircraftCategory;
    use chrono::TimeZone;
    use tmi_core::FlightKey;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, h, m, 0).unwrap()
    }

    fn calculator(limit: i64) -> DelayCalculator {
        DelayCalculator::new(DelayPolicy {
            delay_limit_min: limit,
            default_ete_min: 60,
            taxi_out_min: 10,
        })
    }

    fn flight(etd: Option<DateTime<Utc>>, eta: Option<DateTime<Utc>>, ete: Option<i64>) -> Flight {
        Flight {
            flight_key: FlightKey::new("UAL9").unwrap(),
            callsign: "UAL9".into(),
            origin: "KORD".into(),
            destination: "KJFK".into(),
            origin_center: None,
            origin_tracon: None,
            dest_center: None,
            dest_tracon: None,
            aircraft_category: AircraftCategory::Jet,
            carrier: None,
            phase: None,
            etd,
            eta,
            ete_minutes: ete,
        }
    }

    #[test]
    fn delay_over_limit_is_capped_at_eta_plus_limit() {
        let delay = calculator(60).slot_delay(at(18, 0), at(19, 30), Some(90));
        assert_eq!(delay.raw_delay_min, 90);
        assert_eq!(delay.effective_delay_min, 60);
        assert!(delay.capped);
        assert_eq!(delay.cta, at(19, 0));
        assert_eq!(delay.ctd, at(17, 30));
    }

    #[test]
    fn delay_at_limit_is_not_capped() {
        let delay = calculator(60).slot_delay(at(18, 0), at(19, 0), None);
        assert!(!delay.capped);
        assert_eq!(delay.cta, at(19, 0));
        assert_eq!(delay.ctd, at(18, 0), "default ETE of 60 applies");
    }

    #[test]
    fn fractional_overrun_is_capped() {
        let slot = at(19, 0) + Duration::seconds(30);
        let delay = calculator(60).slot_delay(at(18, 0), slot, Some(90));
        assert_eq!(delay.raw_delay_min, 60);
        assert!(delay.capped);
        assert_eq!(delay.effective_delay_min, 60);
        assert_eq!(delay.cta, at(19, 0));
        assert_eq!(delay.ctd, at(17, 30));
    }

    #[test]
    fn stacked_flight_has_tag_but_no_times() {
        let f = flight(Some(at(16, 0)), Some(at(18, 0)), Some(120));
        let allocation = Allocation {
            flight_key: f.flight_key.clone(),
            original_eta: at(18, 0),
            outcome: AllocationOutcome::Stacked,
        };
        let id = ProgramId::new("GDP-KJFK-1").unwrap();
        let record = calculator(180).ground_delay_control(&id, "KJFK", &f, &allocation);
        assert_eq!(record.control_type, Some(ControlType::GroundDelayStacked));
        assert!(record.is_controlled());
        assert_eq!(record.cta, None);
        assert_eq!(record.slot_index, None);
        assert_eq!(record.baseline.oeta, Some(at(18, 0)));
    }

    #[test]
    fn ground_stop_hold() {
        let f = flight(Some(at(19, 0)), None, Some(120));
        let id = ProgramId::new("GS-KJFK-1").unwrap();
        let record = calculator(180).ground_stop_control(&id, "KJFK", at(20, 0), &f);
        assert_eq!(record.ctd, Some(at(20, 0)));
        assert_eq!(record.cta, Some(at(22, 0)));
        assert_eq!(record.program_delay_min, Some(60));
        assert_eq!(record.schedule_variation_min, Some(70));
        assert_eq!(record.baseline.beta, Some(at(21, 0)));
        assert_eq!(record.control_type, Some(ControlType::GroundStop));
    }

    #[test]
    fn ground_stop_delay_is_never_negative() {
        let f = flight(Some(at(21, 0)), Some(at(23, 0)), Some(120));
        let id = ProgramId::new("GS-KJFK-1").unwrap();
        let record = calculator(180).ground_stop_control(&id, "KJFK", at(20, 0), &f);
        assert_eq!(record.program_delay_min, Some(0));
        assert_eq!(record.schedule_variation_min, Some(-50));
    }
}
