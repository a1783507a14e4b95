//! Arrival slots of a ground delay program.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tmi_core::{FlightKey, ProgramId};

/// Slot category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotType {
    /// Allocated in ETA order.
    Regular,
    /// Held back; used only when no regular slot fits.
    Reserved,
}

impl fmt::Display for SlotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Regular => write!(f, "REGULAR"),
            Self::Reserved => write!(f, "RESERVED"),
        }
    }
}

/// Slot state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotStatus {
    /// Available.
    Open,
    /// Held by a flight.
    Assigned,
    /// Withdrawn by a purge; kept for audit.
    Cancelled,
}

impl fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::Assigned => write!(f, "ASSIGNED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// One timestamped arrival permission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    /// Owning program.
    pub program_id: ProgramId,
    /// Position in the calendar, starting at 1.
    pub slot_index: u32,
    /// Arrival time the slot grants.
    pub slot_time: DateTime<Utc>,
    /// Slot category.
    #[serde(rename = "type")]
    pub slot_type: SlotType,
    /// Slot state.
    pub status: SlotStatus,
    /// UTC hour of the 15-minute bin the slot belongs to.
    pub bin_hour: u8,
    /// Quarter (0..=3) of the bin within its hour.
    pub bin_quarter: u8,
    /// Flight holding the slot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_flight: Option<FlightKey>,
    /// Callsign of the flight holding the slot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_callsign: Option<String>,
}

impl Slot {
    /// Returns true if the slot can be assigned.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == SlotStatus::Open
    }

    /// Assigns the slot to a flight.
    pub fn assign(&mut self, flight: &FlightKey, callsign: &str) {
        self.status = SlotStatus::Assigned;
        self.assigned_flight = Some(flight.clone());
        self.assigned_callsign = Some(callsign.to_string());
    }

    /// Cancels an assigned slot, keeping the assignment for audit.
    ///
    /// Returns true if the slot changed.
    pub fn cancel_if_assigned(&mut self) -> bool {
        if self.status == SlotStatus::Assigned {
            self.status = SlotStatus::Cancelled;
            true
        } else {
            false
        }
    }
}
