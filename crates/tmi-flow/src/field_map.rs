//! The fixed table of control fields copied from sandbox to live.
//!
//! Apply copies exactly the fields listed in [`LIVE_CONTROL_MAPPING`], in
//! table order. Adding a field to [`ControlRecord`] without deciding whether
//! it belongs here fails to compile: [`ControlField::covers`] destructures
//! the record without a rest pattern. Changing the table bumps
//! [`FIELD_MAP_VERSION`], which is stamped on every metrics snapshot.

use serde::{Deserialize, Serialize};

use crate::flight::{BaselineTimes, ControlRecord};

/// Version of [`LIVE_CONTROL_MAPPING`].
pub const FIELD_MAP_VERSION: u32 = 1;

/// One copyable control field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlField {
    /// Controlling program.
    ProgramId,
    /// Control tag.
    ControlType,
    /// Control element.
    CtlElement,
    /// Controlled departure.
    Ctd,
    /// Controlled arrival.
    Cta,
    /// Slot index.
    SlotIndex,
    /// Slot time.
    SlotTime,
    /// Program delay.
    ProgramDelay,
    /// Positive program delay.
    AbsoluteDelay,
    /// Schedule variation.
    ScheduleVariation,
    /// Capped flag.
    DelayCapped,
    /// Original ETD.
    Oetd,
    /// Baseline ETD.
    Betd,
    /// Original ETA.
    Oeta,
    /// Baseline ETA.
    Beta,
}

impl ControlField {
    /// Every field, in record order.
    pub const ALL: [Self; 15] = [
        Self::ProgramId,
        Self::ControlType,
        Self::CtlElement,
        Self::Ctd,
        Self::Cta,
        Self::SlotIndex,
        Self::SlotTime,
        Self::ProgramDelay,
        Self::AbsoluteDelay,
        Self::ScheduleVariation,
        Self::DelayCapped,
        Self::Oetd,
        Self::Betd,
        Self::Oeta,
        Self::Beta,
    ];

    /// Copies this field from `src` to `dst`.
    ///
    /// Baseline fields are copied only where `dst` has none, so the first
    /// control of a flight fixes its baselines.
    pub fn copy(self, src: &ControlRecord, dst: &mut ControlRecord) {
        match self {
            Self::ProgramId => dst.program_id.clone_from(&src.program_id),
            Self::ControlType => dst.control_type = src.control_type,
            Self::CtlElement => dst.ctl_element.clone_from(&src.ctl_element),
            Self::Ctd => dst.ctd = src.ctd,
            Self::Cta => dst.cta = src.cta,
            Self::SlotIndex => dst.slot_index = src.slot_index,
            Self::SlotTime => dst.slot_time = src.slot_time,
            Self::ProgramDelay => dst.program_delay_min = src.program_delay_min,
            Self::AbsoluteDelay => dst.absolute_delay_min = src.absolute_delay_min,
            Self::ScheduleVariation => dst.schedule_variation_min = src.schedule_variation_min,
            Self::DelayCapped => dst.delay_capped = src.delay_capped,
            Self::Oetd => dst.baseline.oetd = dst.baseline.oetd.or(src.baseline.oetd),
            Self::Betd => dst.baseline.betd = dst.baseline.betd.or(src.baseline.betd),
            Self::Oeta => dst.baseline.oeta = dst.baseline.oeta.or(src.baseline.oeta),
            Self::Beta => dst.baseline.beta = dst.baseline.beta.or(src.baseline.beta),
        }
    }

    /// Resets this field on `dst`. Baselines are history and are kept.
    pub fn clear(self, dst: &mut ControlRecord) {
        match self {
            Self::ProgramId => dst.program_id = None,
            Self::ControlType => dst.control_type = None,
            Self::CtlElement => dst.ctl_element = None,
            Self::Ctd => dst.ctd = None,
            Self::Cta => dst.cta = None,
            Self::SlotIndex => dst.slot_index = None,
            Self::SlotTime => dst.slot_time = None,
            Self::ProgramDelay => dst.program_delay_min = None,
            Self::AbsoluteDelay => dst.absolute_delay_min = None,
            Self::ScheduleVariation => dst.schedule_variation_min = None,
            Self::DelayCapped => dst.delay_capped = false,
            Self::Oetd | Self::Betd | Self::Oeta | Self::Beta => {}
        }
    }

    /// Returns the number of control fields. Destructures `record` in full.
    #[must_use]
    pub fn covers(record: &ControlRecord) -> usize {
        let ControlRecord {
            program_id: _,
            control_type: _,
            ctl_element: _,
            ctd: _,
            cta: _,
            slot_index: _,
            slot_time: _,
            program_delay_min: _,
            absolute_delay_min: _,
            schedule_variation_min: _,
            delay_capped: _,
            baseline:
                BaselineTimes {
                    oetd: _,
                    betd: _,
                    oeta: _,
                    beta: _,
                },
        } = record;
        Self::ALL.len()
    }
}

/// A versioned list of fields to copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMapping {
    /// Table version.
    pub version: u32,
    /// Fields, in copy order.
    pub fields: &'static [ControlField],
}

/// Control fields written to live flights on apply.
pub const LIVE_CONTROL_MAPPING: FieldMapping = FieldMapping {
    version: FIELD_MAP_VERSION,
    fields: &ControlField::ALL,
};

impl FieldMapping {
    /// Copies every mapped field from `src` to `dst`.
    pub fn copy(&self, src: &ControlRecord, dst: &mut ControlRecord) {
        for field in self.fields {
            field.copy(src, dst);
        }
    }

    /// Clears every mapped field on `dst`.
    pub fn clear(&self, dst: &mut ControlRecord) {
        for field in self.fields {
            field.clear(dst);
        }
    }

    /// Returns true if the mapping lists every field exactly once.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        let probe = ControlRecord::default();
        self.fields.len() == ControlField::covers(&probe)
            && ControlField::ALL.iter().all(|f| self.fields.contains(f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flight::ControlType;
    use chrono::{TimeZone, Utc};
    use tmi_core::ProgramId;

    fn staged() -> ControlRecord {
        let at = |h| Utc.with_ymd_and_hms(2026, 3, 14, h, 0, 0).unwrap();
        ControlRecord {
            program_id: Some(ProgramId::new("GDP-KJFK-1").unwrap()),
            control_type: Some(ControlType::GroundDelayCapped),
            ctl_element: Some("KJFK".into()),
            ctd: Some(at(17)),
            cta: Some(at(19)),
            slot_index: Some(7),
            slot_time: Some(at(20)),
            program_delay_min: Some(60),
            absolute_delay_min: Some(60),
            schedule_variation_min: Some(60),
            delay_capped: true,
            baseline: BaselineTimes {
                oetd: Some(at(16)),
                betd: Some(at(16)),
                oeta: Some(at(18)),
                beta: Some(at(18)),
            },
        }
    }

    #[test]
    fn live_mapping_is_complete() {
        assert!(LIVE_CONTROL_MAPPING.is_complete());
        assert_eq!(LIVE_CONTROL_MAPPING.version, FIELD_MAP_VERSION);
    }

    #[test]
    fn copy_onto_empty_record_reproduces_source() {
        let src = staged();
        let mut dst = ControlRecord::default();
        LIVE_CONTROL_MAPPING.copy(&src, &mut dst);
        assert_eq!(dst, src);
    }

    #[test]
    fn copy_preserves_existing_baselines() {
        let src = staged();
        let early = Utc.with_ymd_and_hms(2026, 3, 14, 15, 0, 0).unwrap();
        let mut dst = ControlRecord::default();
        dst.baseline.oeta = Some(early);
        LIVE_CONTROL_MAPPING.copy(&src, &mut dst);
        assert_eq!(dst.baseline.oeta, Some(early));
        assert_eq!(dst.cta, src.cta);
    }

    #[test]
    fn clear_removes_control_but_keeps_history() {
        let mut record = staged();
        LIVE_CONTROL_MAPPING.clear(&mut record);
        assert!(!record.is_controlled());
        assert_eq!(record.cta, None);
        assert!(!record.delay_capped);
        assert_eq!(record.baseline, staged().baseline);
    }
}
