//! Summary statistics for previews, simulations and applied programs.
//!
//! Two delay aggregates are kept side by side:
//!
//! | Name | Population |
//! |------|------------|
//! | `delay` | every controlled flight with a computed delay, zero included |
//! | `positive_delay` | controlled flights with delay greater than zero |
//!
//! Averages and utilization are rounded to one decimal place.

use std::collections::BTreeMap;

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::demand::TimeField;
use crate::flight::{Flight, SandboxFlight};
use crate::slot::{Slot, SlotStatus};

/// Count, sum, mean and maximum of a set of delays in minutes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelayStats {
    /// Number of delays aggregated.
    pub count: usize,
    /// Sum of delays.
    pub total_min: i64,
    /// Mean delay, one decimal place.
    pub avg_min: f64,
    /// Largest delay.
    pub max_min: i64,
}

impl DelayStats {
    /// Aggregates `delays`.
    #[must_use]
    pub fn from_delays(delays: impl IntoIterator<Item = i64>) -> Self {
        let mut stats = Self::default();
        for delay in delays {
            stats.count += 1;
            stats.total_min += delay;
            stats.max_min = if stats.count == 1 {
                delay
            } else {
                stats.max_min.max(delay)
            };
        }
        if stats.count > 0 {
            #[allow(clippy::cast_precision_loss)]
            let avg = stats.total_min as f64 / stats.count as f64;
            stats.avg_min = round1(avg);
        }
        stats
    }
}

/// Summary of one staged plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationSummary {
    /// Flights staged, exempt included.
    pub total_flights: usize,
    /// Non-exempt flights carrying a control tag.
    pub controlled_flights: usize,
    /// Flights holding a slot.
    pub assigned_flights: usize,
    /// Flights in the program without a slot.
    pub stacked_flights: usize,
    /// Flights matched by an exemption rule.
    pub exempt_flights: usize,
    /// Flights whose delay was capped.
    pub capped_flights: usize,
    /// Slots in the calendar.
    pub total_slots: usize,
    /// Slots assigned to a flight.
    pub assigned_slots: usize,
    /// Slots left open.
    pub open_slots: usize,
    /// `assigned_slots / total_slots * 100`, one decimal place.
    pub utilization_pct: f64,
    /// Delay over every controlled flight, zero included.
    pub delay: DelayStats,
    /// Delay over controlled flights with positive delay only.
    pub positive_delay: DelayStats,
}

/// Metrics snapshot stored on the program when it is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramMetrics {
    /// Summary of the applied plan.
    pub summary: SimulationSummary,
    /// When the snapshot was taken.
    pub captured_at: DateTime<Utc>,
    /// Version of the field mapping used to write live flights.
    pub field_map_version: u32,
}

/// One bucket of a preview breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountBucket {
    /// Bucket label.
    pub key: String,
    /// Flights in the bucket.
    pub count: usize,
}

/// Breakdown of preview demand.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewSummary {
    /// By departure center.
    pub by_origin_center: Vec<CountBucket>,
    /// By departure airport.
    pub by_origin_airport: Vec<CountBucket>,
    /// By carrier.
    pub by_carrier: Vec<CountBucket>,
    /// By hour of the program's time field (`HHMMZ`), chronological.
    pub by_hour: Vec<CountBucket>,
    /// By aircraft category.
    pub by_aircraft_category: Vec<CountBucket>,
}

const UNKNOWN: &str = "UNKNOWN";

/// Computes summaries.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsAggregator;

impl MetricsAggregator {
    /// Summarizes a staged plan.
    #[must_use]
    pub fn summarize(flights: &[SandboxFlight], slots: &[Slot]) -> SimulationSummary {
        let controlled: Vec<&SandboxFlight> = flights.iter().filter(|f| f.is_controlled()).collect();
        let delays: Vec<i64> = controlled
            .iter()
            .filter_map(|f| f.control.program_delay_min)
            .collect();

        let total_slots = slots.len();
        let assigned_slots = slots
            .iter()
            .filter(|s| s.status == SlotStatus::Assigned)
            .count();
        let utilization_pct = if total_slots == 0 {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let pct = assigned_slots as f64 / total_slots as f64 * 100.0;
            round1(pct)
        };

        SimulationSummary {
            total_flights: flights.len(),
            controlled_flights: controlled.len(),
            assigned_flights: controlled.iter().filter(|f| f.is_slotted()).count(),
            stacked_flights: controlled.iter().filter(|f| f.is_stacked()).count(),
            exempt_flights: flights.iter().filter(|f| f.is_exempt()).count(),
            capped_flights: controlled.iter().filter(|f| f.control.delay_capped).count(),
            total_slots,
            assigned_slots,
            open_slots: slots.iter().filter(|s| s.is_open()).count(),
            utilization_pct,
            delay: DelayStats::from_delays(delays.iter().copied()),
            positive_delay: DelayStats::from_delays(delays.iter().copied().filter(|d| *d > 0)),
        }
    }

    /// Breaks preview demand down by origin, carrier, hour and category.
    #[must_use]
    pub fn summarize_preview(flights: &[Flight], time_field: TimeField) -> PreviewSummary {
        let by_count = |label: &dyn Fn(&Flight) -> String| -> Vec<CountBucket> {
            let mut counts: BTreeMap<String, usize> = BTreeMap::new();
            for flight in flights {
                *counts.entry(label(flight)).or_default() += 1;
            }
            let mut buckets: Vec<CountBucket> = counts
                .into_iter()
                .map(|(key, count)| CountBucket { key, count })
                .collect();
            buckets.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
            buckets
        };

        let mut hours: BTreeMap<DateTime<Utc>, usize> = BTreeMap::new();
        let mut undated = 0;
        for flight in flights {
            match time_field.of(flight).and_then(truncate_to_hour) {
                Some(hour) => *hours.entry(hour).or_default() += 1,
                None => undated += 1,
            }
        }
        let mut by_hour: Vec<CountBucket> = hours
            .into_iter()
            .map(|(hour, count)| CountBucket {
                key: hour.format("%H%MZ").to_string(),
                count,
            })
            .collect();
        if undated > 0 {
            by_hour.push(CountBucket {
                key: UNKNOWN.to_string(),
                count: undated,
            });
        }

        PreviewSummary {
            by_origin_center: by_count(&|f: &Flight| {
                f.origin_center.clone().unwrap_or_else(|| UNKNOWN.to_string())
            }),
            by_origin_airport: by_count(&|f: &Flight| f.origin.clone()),
            by_carrier: by_count(&|f: &Flight| f.carrier_code().unwrap_or(UNKNOWN).to_string()),
            by_hour,
            by_aircraft_category: by_count(&|f: &Flight| f.aircraft_category.to_string()),
        }
    }
}

fn truncate_to_hour(at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    at.with_minute(0)?.with_second(0)?.with_nanosecond(0)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exemption::{ExemptionCategory, ExemptionReason};
    use crate::flight::{AircraftCategory, ControlType};
    use chrono::TimeZone;
    use tmi_core::{FlightKey, ProgramId};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, h, m, 0).unwrap()
    }

    fn flight(key: &str, center: &str, eta: DateTime<Utc>) -> Flight {
        Flight {
            flight_key: FlightKey::new(key).unwrap(),
            callsign: key.to_string(),
            origin: "KORD".into(),
            destination: "KJFK".into(),
            origin_center: Some(center.into()),
            origin_tracon: None,
            dest_center: None,
            dest_tracon: None,
            aircraft_category: AircraftCategory::Jet,
            carrier: None,
            phase: None,
            etd: None,
            eta: Some(eta),
            ete_minutes: None,
        }
    }

    fn staged(key: &str, control_type: Option<ControlType>, delay: Option<i64>) -> SandboxFlight {
        let mut staged = SandboxFlight::new(flight(key, "ZAU", at(18, 0)));
        staged.control.program_id = control_type.map(|_| ProgramId::new("GDP-KJFK-1").unwrap());
        staged.control.control_type = control_type;
        staged.control.program_delay_min = delay;
        if matches!(control_type, Some(ControlType::GroundDelay | ControlType::GroundDelayCapped)) {
            staged.control.slot_index = Some(1);
        }
        staged.control.delay_capped = control_type == Some(ControlType::GroundDelayCapped);
        staged
    }

    #[test]
    fn delay_stats_round_average() {
        let stats = DelayStats::from_delays([10, 0, 5]);
        assert_eq!(stats.count, 3);
        assert_eq!(stats.total_min, 15);
        assert!((stats.avg_min - 5.0).abs() < f64::EPSILON);
        assert_eq!(stats.max_min, 10);

        let thirds = DelayStats::from_delays([1, 1, 2]);
        assert!((thirds.avg_min - 1.3).abs() < f64::EPSILON);
        assert_eq!(DelayStats::from_delays([]), DelayStats::default());
    }

    #[test]
    fn two_delay_definitions_differ_on_zero_delays() {
        let flights = vec![
            staged("A", Some(ControlType::GroundDelay), Some(0)),
            staged("B", Some(ControlType::GroundDelay), Some(20)),
            staged("C", Some(ControlType::GroundDelayCapped), Some(60)),
            staged("D", Some(ControlType::GroundDelayStacked), None),
        ];
        let summary = MetricsAggregator::summarize(&flights, &[]);
        assert_eq!(summary.delay.count, 3);
        assert!((summary.delay.avg_min - 26.7).abs() < f64::EPSILON);
        assert_eq!(summary.positive_delay.count, 2);
        assert!((summary.positive_delay.avg_min - 40.0).abs() < f64::EPSILON);
        assert_eq!(summary.assigned_flights, 3);
        assert_eq!(summary.stacked_flights, 1);
        assert_eq!(summary.capped_flights, 1);
        assert!((summary.utilization_pct - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn exempt_flights_are_counted_only_as_exempt() {
        let mut exempt = staged("X", None, None);
        exempt.exemption = Some(ExemptionReason {
            category: ExemptionCategory::Carrier,
            matched: "XAA".into(),
        });
        let flights = vec![exempt, staged("A", Some(ControlType::GroundDelay), Some(5))];
        let summary = MetricsAggregator::summarize(&flights, &[]);
        assert_eq!(summary.total_flights, 2);
        assert_eq!(summary.exempt_flights, 1);
        assert_eq!(summary.controlled_flights, 1);
        assert_eq!(summary.delay.count, 1);
    }

    #[test]
    fn preview_buckets_sort_by_count_and_hours_chronologically() {
        let flights = vec![
            flight("AAL1", "ZNY", at(19, 5)),
            flight("DAL2", "ZAU", at(18, 40)),
            flight("DAL3", "ZAU", at(18, 50)),
        ];
        let summary = MetricsAggregator::summarize_preview(&flights, TimeField::Eta);
        assert_eq!(summary.by_origin_center[0], CountBucket { key: "ZAU".into(), count: 2 });
        assert_eq!(summary.by_carrier[0].key, "DAL");
        assert_eq!(
            summary.by_hour,
            vec![
                CountBucket { key: "1800Z".into(), count: 2 },
                CountBucket { key: "1900Z".into(), count: 1 },
            ]
        );
        assert_eq!(summary.by_aircraft_category[0].key, "JET");
    }
}
