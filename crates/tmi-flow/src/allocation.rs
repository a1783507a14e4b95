//! ETA-based slot allocation (EBSA).
//!
//! Flights are taken in ascending original ETA (ties by flight key). Each
//! takes the earliest OPEN regular slot at or after its ETA, else the
//! earliest OPEN reserved slot at or after its ETA, else it is stacked.
//! Single pass, greedy, no reassignment: first come, first served by ETA.
//!
//! Open slots are indexed by `(slot_time, slot_index)` in ordered maps, so
//! each lookup is a range query and a full run is `O((F + S) log S)`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tmi_core::FlightKey;

use crate::slot::{Slot, SlotType};

/// A flight asking for a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationRequest {
    /// Flight identity.
    pub flight_key: FlightKey,
    /// Callsign recorded on the slot.
    pub callsign: String,
    /// ETA before control.
    pub original_eta: DateTime<Utc>,
}

/// Result of allocating one flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "outcome")]
pub enum AllocationOutcome {
    /// The flight holds a slot.
    Assigned {
        /// Index of the slot.
        slot_index: u32,
        /// Time of the slot.
        slot_time: DateTime<Utc>,
        /// Category of the slot.
        slot_type: SlotType,
    },
    /// No slot at or after the ETA was open.
    Stacked,
}

/// One flight's allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    /// Flight identity.
    pub flight_key: FlightKey,
    /// ETA before control.
    pub original_eta: DateTime<Utc>,
    /// What the flight received.
    pub outcome: AllocationOutcome,
}

/// Greedy ETA-ordered slot allocator.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlotAllocator;

impl SlotAllocator {
    /// Sorts requests into allocation order: ETA, then flight key.
    pub fn order(requests: &mut [AllocationRequest]) {
        requests.sort_by(|a, b| {
            a.original_eta
                .cmp(&b.original_eta)
                .then_with(|| a.flight_key.cmp(&b.flight_key))
        });
    }

    /// Allocates `requests` against `slots`, marking assigned slots.
    ///
    /// Requests are processed in allocation order regardless of input order.
    /// Returns one allocation per request, in allocation order.
    #[must_use]
    pub fn allocate(slots: &mut [Slot], requests: &[AllocationRequest]) -> Vec<Allocation> {
        let mut ordered = requests.to_vec();
        Self::order(&mut ordered);

        let mut open_regular: BTreeMap<(DateTime<Utc>, u32), usize> = BTreeMap::new();
        let mut open_reserved: BTreeMap<(DateTime<Utc>, u32), usize> = BTreeMap::new();
        for (pos, slot) in slots.iter().enumerate().filter(|(_, s)| s.is_open()) {
            let key = (slot.slot_time, slot.slot_index);
            match slot.slot_type {
                SlotType::Regular => open_regular.insert(key, pos),
                SlotType::Reserved => open_reserved.insert(key, pos),
            };
        }

        let mut allocations = Vec::with_capacity(ordered.len());
        for request in ordered {
            let taken = take_earliest(&mut open_regular, request.original_eta)
                .or_else(|| take_earliest(&mut open_reserved, request.original_eta));

            let outcome = match taken {
                Some(pos) => {
                    let slot = &mut slots[pos];
                    slot.assign(&request.flight_key, &request.callsign);
                    AllocationOutcome::Assigned {
                        slot_index: slot.slot_index,
                        slot_time: slot.slot_time,
                        slot_type: slot.slot_type,
                    }
                }
                None => AllocationOutcome::Stacked,
            };

            allocations.push(Allocation {
                flight_key: request.flight_key,
                original_eta: request.original_eta,
                outcome,
            });
        }

        let stacked = allocations
            .iter()
            .filter(|a| a.outcome == AllocationOutcome::Stacked)
            .count();
        tracing::debug!(
            flights = allocations.len(),
            stacked,
            "allocated slots"
        );
        allocations
    }
}

fn take_earliest(
    open: &mut BTreeMap<(DateTime<Utc>, u32), usize>,
    not_before: DateTime<Utc>,
) -> Option<usize> {
    let key = *open.range((not_before, 0)..).next()?.0;
    open.remove(&key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::SlotGenerator;
    use crate::program::RateConfig;
    use crate::slot::SlotStatus;
    use chrono::{Duration, TimeZone};
    use tmi_core::ProgramId;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, h, m, 0).unwrap()
    }

    fn request(key: &str, eta: DateTime<Utc>) -> AllocationRequest {
        AllocationRequest {
            flight_key: FlightKey::new(key).unwrap(),
            callsign: key.to_string(),
            original_eta: eta,
        }
    }

    fn calendar(rate: u32, reserve: u32, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Slot> {
        let id = ProgramId::new("GDP-TEST").unwrap();
        SlotGenerator::new(&id, start, end, &RateConfig::flat(rate, reserve)).generate()
    }

    #[test]
    fn assigns_earliest_slot_not_before_eta() {
        let mut slots = calendar(4, 0, at(18, 0), at(20, 0));
        let allocations = SlotAllocator::allocate(&mut slots, &[request("A", at(18, 20))]);
        assert_eq!(
            allocations[0].outcome,
            AllocationOutcome::Assigned {
                slot_index: 3,
                slot_time: at(18, 30),
                slot_type: SlotType::Regular,
            }
        );
        assert_eq!(slots[2].status, SlotStatus::Assigned);
        assert_eq!(slots[2].assigned_callsign.as_deref(), Some("A"));
    }

    #[test]
    fn ties_break_by_flight_key() {
        let mut slots = calendar(4, 0, at(18, 0), at(20, 0));
        let allocations = SlotAllocator::allocate(
            &mut slots,
            &[request("B", at(18, 0)), request("A", at(18, 0))],
        );
        assert_eq!(allocations[0].flight_key.as_str(), "A");
        assert!(matches!(
            allocations[0].outcome,
            AllocationOutcome::Assigned { slot_index: 1, .. }
        ));
        assert!(matches!(
            allocations[1].outcome,
            AllocationOutcome::Assigned { slot_index: 2, .. }
        ));
    }

    #[test]
    fn reserved_slots_are_a_fallback() {
        // 8/hr with 4 reserve: per bin 1 regular + 1 reserved, 450s apart.
        let mut slots = calendar(8, 4, at(18, 0), at(18, 15));
        assert_eq!(slots.len(), 2);
        let allocations = SlotAllocator::allocate(
            &mut slots,
            &[request("A", at(18, 0)), request("B", at(18, 0)), request("C", at(18, 0))],
        );
        assert!(matches!(
            allocations[0].outcome,
            AllocationOutcome::Assigned { slot_type: SlotType::Regular, .. }
        ));
        assert!(matches!(
            allocations[1].outcome,
            AllocationOutcome::Assigned { slot_type: SlotType::Reserved, .. }
        ));
        assert_eq!(allocations[2].outcome, AllocationOutcome::Stacked);
    }

    #[test]
    fn flights_after_last_slot_are_stacked() {
        let mut slots = calendar(40, 0, at(18, 0), at(19, 0));
        let late = at(19, 0) + Duration::minutes(1);
        let allocations = SlotAllocator::allocate(&mut slots, &[request("LATE", late)]);
        assert_eq!(allocations[0].outcome, AllocationOutcome::Stacked);
        assert!(slots.iter().all(Slot::is_open));
    }

    #[test]
    fn non_open_slots_are_skipped() {
        let mut slots = calendar(4, 0, at(18, 0), at(19, 0));
        slots[0].status = SlotStatus::Cancelled;
        let allocations = SlotAllocator::allocate(&mut slots, &[request("A", at(18, 0))]);
        assert!(matches!(
            allocations[0].outcome,
            AllocationOutcome::Assigned { slot_index: 2, .. }
        ));
    }
}
