//! Slot calendar generation for ground delay programs.
//!
//! The calendar is built in 15-minute bins. For a bin whose hour has program
//! rate `R` and reserve rate `V`:
//!
//! ```text
//! total    = max(1, R / 4)
//! reserve  = min(total - 1, V / 4)
//! regular  = max(1, total - reserve)
//! interval = 900s / (regular + reserve)
//! ```
//!
//! Regular slots sit at offsets `0, interval, ...` and reserved slots follow
//! at the next offsets. Slot indexes run across the whole window and are
//! never reused. The calendar is a pure function of its inputs.

use chrono::{DateTime, Duration, Timelike, Utc};

use tmi_core::time::floor_to_quarter_hour;
use tmi_core::ProgramId;

use crate::program::RateConfig;
use crate::slot::{Slot, SlotStatus, SlotType};

const BIN_SECONDS: i64 = 900;

/// Per-bin slot counts derived from hourly rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinCapacity {
    /// Regular slots in the bin.
    pub regular: u32,
    /// Reserved slots in the bin.
    pub reserve: u32,
}

impl BinCapacity {
    /// Derives bin capacity from hourly program and reserve rates.
    #[must_use]
    pub fn from_hourly(program_rate: u32, reserve_rate: u32) -> Self {
        let total = (program_rate / 4).max(1);
        let reserve = (reserve_rate / 4).min(total - 1);
        let regular = total.saturating_sub(reserve).max(1);
        Self { regular, reserve }
    }

    /// Seconds between consecutive slots in the bin.
    #[must_use]
    pub fn interval_seconds(&self) -> i64 {
        BIN_SECONDS / i64::from(self.regular + self.reserve)
    }
}

/// Builds the slot calendar of one program.
#[derive(Debug, Clone)]
pub struct SlotGenerator<'a> {
    program_id: &'a ProgramId,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    rates: &'a RateConfig,
}

impl<'a> SlotGenerator<'a> {
    /// Creates a generator for `[start, end)`.
    #[must_use]
    pub fn new(
        program_id: &'a ProgramId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        rates: &'a RateConfig,
    ) -> Self {
        Self {
            program_id,
            start,
            end,
            rates,
        }
    }

    /// Generates the calendar, every slot OPEN.
    ///
    /// Bins start at `start` rounded down to a quarter hour; slots computed
    /// before `start` or at/after `end` are dropped.
    #[must_use]
    pub fn generate(&self) -> Vec<Slot> {
        let mut slots = Vec::new();
        let mut next_index: u32 = 1;
        let mut bin_start = floor_to_quarter_hour(self.start);

        while bin_start < self.end {
            let capacity = BinCapacity::from_hourly(
                self.rates.program_rate_at(bin_start),
                self.rates.reserve_rate_at(bin_start),
            );
            let interval = Duration::seconds(capacity.interval_seconds());
            let bin_hour = u8::try_from(bin_start.hour()).unwrap_or_default();
            let bin_quarter = u8::try_from(bin_start.minute() / 15).unwrap_or_default();

            let per_bin = capacity.regular + capacity.reserve;
            for position in 0..per_bin {
                let slot_time = bin_start + interval * i32::try_from(position).unwrap_or(i32::MAX);
                if slot_time >= self.end {
                    break;
                }
                if slot_time < self.start {
                    continue;
                }
                let slot_type = if position < capacity.regular {
                    SlotType::Regular
                } else {
                    SlotType::Reserved
                };
                slots.push(Slot {
                    program_id: self.program_id.clone(),
                    slot_index: next_index,
                    slot_time,
                    slot_type,
                    status: SlotStatus::Open,
                    bin_hour,
                    bin_quarter,
                    assigned_flight: None,
                    assigned_callsign: None,
                });
                next_index += 1;
            }

            bin_start += Duration::seconds(BIN_SECONDS);
        }

        tracing::debug!(
            program_id = %self.program_id,
            slots = slots.len(),
            "generated slot calendar"
        );
        slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, h, m, 0).unwrap()
    }

    fn pid() -> ProgramId {
        ProgramId::new("GDP-KATL-202603141800").unwrap()
    }

    #[test]
    fn bin_capacity_formula() {
        assert_eq!(BinCapacity::from_hourly(40, 0), BinCapacity { regular: 10, reserve: 0 });
        assert_eq!(BinCapacity::from_hourly(40, 8), BinCapacity { regular: 8, reserve: 2 });
        assert_eq!(BinCapacity::from_hourly(2, 0), BinCapacity { regular: 1, reserve: 0 });
        // Reserve never consumes the whole bin.
        assert_eq!(BinCapacity::from_hourly(4, 40), BinCapacity { regular: 1, reserve: 0 });
        assert_eq!(BinCapacity::from_hourly(40, 0).interval_seconds(), 90);
    }

    #[test]
    fn forty_per_hour_for_two_hours_yields_eighty_regular_slots() {
        let rates = RateConfig::flat(40, 0);
        let id = pid();
        let slots = SlotGenerator::new(&id, at(18, 0), at(20, 0), &rates).generate();
        assert_eq!(slots.len(), 80);
        assert!(slots.iter().all(|s| s.slot_type == SlotType::Regular));
        assert_eq!(slots[0].slot_time, at(18, 0));
        assert_eq!(slots[1].slot_time, at(18, 0) + Duration::seconds(90));
        assert_eq!(slots[79].slot_index, 80);
        assert_eq!(slots[79].bin_hour, 19);
        assert_eq!(slots[79].bin_quarter, 3);
    }

    #[test]
    fn reserved_slots_follow_regular_within_bin() {
        let rates = RateConfig::flat(40, 8);
        let id = pid();
        let slots = SlotGenerator::new(&id, at(18, 0), at(18, 15), &rates).generate();
        let types: Vec<SlotType> = slots.iter().map(|s| s.slot_type).collect();
        assert_eq!(types.len(), 10);
        assert!(types[..8].iter().all(|t| *t == SlotType::Regular));
        assert!(types[8..].iter().all(|t| *t == SlotType::Reserved));
        assert_eq!(slots[8].slot_time, at(18, 12));
    }

    #[test]
    fn hourly_overrides_change_bin_density() {
        let mut rates = RateConfig::flat(40, 0);
        rates.program_rates_hourly.insert(19, 20);
        let id = pid();
        let slots = SlotGenerator::new(&id, at(18, 0), at(20, 0), &rates).generate();
        assert_eq!(slots.len(), 40 + 20);
        let h19: Vec<&Slot> = slots.iter().filter(|s| s.bin_hour == 19).collect();
        assert_eq!(h19.len(), 20);
        assert_eq!(h19[1].slot_time - h19[0].slot_time, Duration::seconds(180));
    }

    #[test]
    fn unaligned_window_drops_slots_outside_bounds() {
        let rates = RateConfig::flat(40, 0);
        let id = pid();
        let start = at(18, 7);
        let end = at(18, 20);
        let slots = SlotGenerator::new(&id, start, end, &rates).generate();
        assert!(!slots.is_empty());
        assert!(slots.iter().all(|s| s.slot_time >= start && s.slot_time < end));
        assert_eq!(slots[0].slot_index, 1);
        assert_eq!(slots[0].slot_time, at(18, 7) + Duration::seconds(30));
    }

    #[test]
    fn generation_is_deterministic() {
        let rates = RateConfig::flat(36, 4);
        let id = pid();
        let a = SlotGenerator::new(&id, at(18, 0), at(21, 0), &rates).generate();
        let b = SlotGenerator::new(&id, at(18, 0), at(21, 0), &rates).generate();
        assert_eq!(a, b);
    }
}
