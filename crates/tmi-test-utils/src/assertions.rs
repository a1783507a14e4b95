//! Custom assertion helpers for integration tests.

use std::collections::HashSet;

use chrono::Duration;

use tmi_core::ProgramId;
use tmi_flow::flight::{LiveFlight, SandboxFlight};
use tmi_flow::slot::{Slot, SlotStatus};

/// Asserts slot indexes are unique, 1-based and follow slot time order.
///
/// # Panics
///
/// Panics if any index repeats or indexes are out of time order.
pub fn assert_calendar_well_formed(slots: &[Slot]) {
    let mut seen = HashSet::new();
    for slot in slots {
        assert!(slot.slot_index >= 1, "slot index must start at 1");
        assert!(
            seen.insert(slot.slot_index),
            "duplicate slot index {}",
            slot.slot_index
        );
    }
    let mut ordered: Vec<&Slot> = slots.iter().collect();
    ordered.sort_by_key(|s| s.slot_index);
    for pair in ordered.windows(2) {
        assert!(
            pair[0].slot_time <= pair[1].slot_time,
            "slot {} at {} precedes slot {} at {}",
            pair[1].slot_index,
            pair[1].slot_time,
            pair[0].slot_index,
            pair[0].slot_time
        );
    }
}

/// Asserts no flight holds two slots and no slot is held by two flights.
///
/// # Panics
///
/// Panics on a double assignment in either direction.
pub fn assert_no_double_booking(slots: &[Slot], flights: &[SandboxFlight]) {
    let mut holders = HashSet::new();
    for slot in slots.iter().filter(|s| s.status == SlotStatus::Assigned) {
        let holder = slot
            .assigned_flight
            .as_ref()
            .expect("assigned slot has a flight");
        assert!(
            holders.insert(holder.clone()),
            "flight {holder} holds more than one slot"
        );
    }

    let mut indexes = HashSet::new();
    for flight in flights {
        if let Some(index) = flight.control.slot_index {
            assert!(
                indexes.insert(index),
                "slot {index} assigned to more than one flight"
            );
        }
    }
}

/// Asserts every slotted flight's slot is at or after its original ETA.
///
/// # Panics
///
/// Panics if a flight was moved earlier.
pub fn assert_slots_not_before_eta(flights: &[SandboxFlight]) {
    for flight in flights.iter().filter(|f| f.is_slotted()) {
        let (Some(slot_time), Some(eta)) = (flight.control.slot_time, flight.original_eta) else {
            panic!("slotted flight {} is missing times", flight.flight_key());
        };
        assert!(
            slot_time >= eta,
            "flight {} slotted at {slot_time} before its ETA {eta}",
            flight.flight_key()
        );
    }
}

/// Asserts no controlled flight's delay exceeds `limit_min`, and no slotted
/// flight's CTA is later than its original ETA plus the limit.
///
/// # Panics
///
/// Panics if any delay is above the limit.
pub fn assert_delays_within_limit(flights: &[SandboxFlight], limit_min: i64) {
    for flight in flights {
        if let Some(delay) = flight.control.program_delay_min {
            assert!(
                delay <= limit_min,
                "flight {} has delay {delay} above limit {limit_min}",
                flight.flight_key()
            );
        }
        if !flight.is_slotted() {
            continue;
        }
        let (Some(cta), Some(eta)) = (flight.control.cta, flight.original_eta) else {
            panic!("slotted flight {} is missing times", flight.flight_key());
        };
        assert!(
            cta <= eta + Duration::minutes(limit_min),
            "flight {} has CTA {cta} past ETA {eta} plus {limit_min} minutes",
            flight.flight_key()
        );
    }
}

/// Asserts no live flight is tagged with `program_id`.
///
/// # Panics
///
/// Panics if any live flight still carries the program's tag.
pub fn assert_untagged(flights: &[LiveFlight], program_id: &ProgramId) {
    for flight in flights {
        assert_ne!(
            flight.program_id(),
            Some(program_id),
            "live flight {} still tagged with {program_id}",
            flight.flight.flight_key
        );
    }
}
