//! Program requests and their validation.
//!
//! A [`ProgramRequest`] is what an operator submits: loosely typed, with
//! timestamps as text and rates as signed numbers so bad input produces a
//! descriptive validation error instead of a deserialization failure.
//! [`ProgramRequest::validate`] turns it into a [`ProgramSpec`] or rejects it
//! before anything is read or written.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use tmi_core::codes::{normalize_code, CodeList};
use tmi_core::time::{parse_optional_utc, parse_required_utc};
use tmi_core::ProgramId;

use crate::config::EngineConfig;
use crate::demand::DemandScope;
use crate::error::{Error, Result};
use crate::exemption::ExemptionRuleSet;
use crate::program::{ProgramFamily, ProgramKind, RateConfig, TimeWindow};

/// An operator's preview or simulate request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramRequest {
    /// Explicit program ID; derived when absent.
    #[serde(default)]
    pub program_id: Option<String>,
    /// Program type.
    #[serde(rename = "type", default)]
    pub kind: ProgramKind,
    /// Control element (airport).
    #[serde(default)]
    pub ctl_element: Option<String>,
    /// GS arrival airports; defaults to the control element.
    #[serde(default)]
    pub arrival_airports: CodeList,
    /// Window start text.
    #[serde(default)]
    pub start: Option<String>,
    /// Window end text (the GS release time).
    #[serde(default)]
    pub end: Option<String>,
    /// Flat program rate per hour.
    #[serde(default)]
    pub program_rate: Option<i64>,
    /// Flat reserve rate per hour.
    #[serde(default)]
    pub reserve_rate: Option<i64>,
    /// Hourly program rate overrides keyed by UTC hour.
    #[serde(default)]
    pub program_rates_hourly: BTreeMap<u8, i64>,
    /// Hourly reserve rate overrides keyed by UTC hour.
    #[serde(default)]
    pub reserve_rates_hourly: BTreeMap<u8, i64>,
    /// Delay limit in minutes.
    #[serde(default)]
    pub delay_limit_min: Option<i64>,
    /// Demand scope.
    #[serde(default)]
    pub scope: DemandScope,
    /// Exemption rules.
    #[serde(default)]
    pub exemptions: ExemptionRuleSet,
    /// Requesting operator.
    #[serde(default)]
    pub requested_by: Option<String>,
}

impl ProgramRequest {
    /// Starts a GS request for `ctl_element` releasing at `end`.
    #[must_use]
    pub fn ground_stop(ctl_element: &str, end: &str) -> Self {
        Self {
            kind: ProgramKind::GroundStop,
            ctl_element: Some(ctl_element.to_string()),
            end: Some(end.to_string()),
            ..Self::default()
        }
    }

    /// Starts a GDP request for `ctl_element` over `[start, end)`.
    #[must_use]
    pub fn ground_delay(ctl_element: &str, start: &str, end: &str) -> Self {
        Self {
            kind: ProgramKind::GDP,
            ctl_element: Some(ctl_element.to_string()),
            start: Some(start.to_string()),
            end: Some(end.to_string()),
            ..Self::default()
        }
    }

    /// Sets the flat program and reserve rates.
    #[must_use]
    pub fn with_rates(mut self, program_rate: i64, reserve_rate: i64) -> Self {
        self.program_rate = Some(program_rate);
        self.reserve_rate = Some(reserve_rate);
        self
    }

    /// Sets the delay limit.
    #[must_use]
    pub fn with_delay_limit(mut self, minutes: i64) -> Self {
        self.delay_limit_min = Some(minutes);
        self
    }

    /// Sets the window start.
    #[must_use]
    pub fn with_start(mut self, start: &str) -> Self {
        self.start = Some(start.to_string());
        self
    }

    /// Sets the exemption rules.
    #[must_use]
    pub fn with_exemptions(mut self, exemptions: ExemptionRuleSet) -> Self {
        self.exemptions = exemptions;
        self
    }

    /// Sets the demand scope.
    #[must_use]
    pub fn with_scope(mut self, scope: DemandScope) -> Self {
        self.scope = scope;
        self
    }

    /// Sets the explicit program ID.
    #[must_use]
    pub fn with_program_id(mut self, program_id: &str) -> Self {
        self.program_id = Some(program_id.to_string());
        self
    }

    /// Sets the requesting operator.
    #[must_use]
    pub fn requested_by(mut self, actor: &str) -> Self {
        self.requested_by = Some(actor.to_string());
        self
    }

    /// Validates the request against engine defaults.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a missing control element, a missing or
    /// unparseable window, a non-positive rate or delay limit, or an
    /// out-of-range hourly key.
    pub fn validate(&self, config: &EngineConfig) -> Result<ProgramSpec> {
        let ctl_element = self
            .ctl_element
            .as_deref()
            .map(normalize_code)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::validation("missing control element"))?;

        let end = parse_required_utc("end", self.end.as_deref())?;
        let start = match self.kind.family() {
            ProgramFamily::GroundDelay => Some(parse_required_utc("start", self.start.as_deref())?),
            ProgramFamily::GroundStop => parse_optional_utc("start", self.start.as_deref())?,
        };
        let window = TimeWindow::new(start, end)?;

        let rates = RateConfig {
            program_rate: positive_rate(
                "program rate",
                self.program_rate,
                config.default_program_rate,
            )?,
            reserve_rate: non_negative_rate(
                "reserve rate",
                self.reserve_rate,
                config.default_reserve_rate,
            )?,
            program_rates_hourly: hourly_rates("program rate", &self.program_rates_hourly, true)?,
            reserve_rates_hourly: hourly_rates("reserve rate", &self.reserve_rates_hourly, false)?,
        };

        let delay_limit_min = self
            .delay_limit_min
            .unwrap_or(config.default_delay_limit_min);
        if delay_limit_min <= 0 {
            return Err(Error::validation(format!(
                "delay limit must be positive, got {delay_limit_min}"
            )));
        }

        if let Some(radius) = self.scope.distance_nm {
            if !radius.is_finite() || radius < 0.0 {
                return Err(Error::validation(format!(
                    "distance scope must be a non-negative number of miles, got {radius}"
                )));
            }
        }

        let program_id = match self.program_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => ProgramId::new(id)?,
            _ => ProgramId::derive(self.kind.family().prefix(), &ctl_element, window.anchor()),
        };

        let arrival_airports = if self.arrival_airports.is_empty() {
            CodeList::from_entries([ctl_element.as_str()])
        } else {
            self.arrival_airports.clone()
        };

        Ok(ProgramSpec {
            program_id,
            kind: self.kind,
            ctl_element,
            arrival_airports,
            window,
            rates,
            delay_limit_min,
            scope: self.scope.clone(),
            exemptions: self.exemptions.clone(),
            requested_by: self.requested_by.clone(),
        })
    }
}

fn positive_rate(label: &str, value: Option<i64>, default: u32) -> Result<u32> {
    match value {
        None => Ok(default),
        Some(v) if v > 0 => {
            u32::try_from(v).map_err(|_| Error::validation(format!("{label} {v} is too large")))
        }
        Some(v) => Err(Error::validation(format!(
            "{label} must be positive, got {v}"
        ))),
    }
}

fn non_negative_rate(label: &str, value: Option<i64>, default: u32) -> Result<u32> {
    match value {
        None => Ok(default),
        Some(v) if v >= 0 => {
            u32::try_from(v).map_err(|_| Error::validation(format!("{label} {v} is too large")))
        }
        Some(v) => Err(Error::validation(format!(
            "{label} cannot be negative, got {v}"
        ))),
    }
}

fn hourly_rates(
    label: &str,
    raw: &BTreeMap<u8, i64>,
    require_positive: bool,
) -> Result<BTreeMap<u8, u32>> {
    let mut out = BTreeMap::new();
    for (&hour, &value) in raw {
        if hour > 23 {
            return Err(Error::validation(format!(
                "{label} hour {hour} is outside 0..=23"
            )));
        }
        let hour_label = format!("{label} for hour {hour:02}");
        let rate = if require_positive {
            positive_rate(&hour_label, Some(value), 0)?
        } else {
            non_negative_rate(&hour_label, Some(value), 0)?
        };
        out.insert(hour, rate);
    }
    Ok(out)
}

/// A validated program configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramSpec {
    /// Program identifier.
    pub program_id: ProgramId,
    /// Program type.
    pub kind: ProgramKind,
    /// Normalized control element.
    pub ctl_element: String,
    /// Arrival airports (GS); at least the control element.
    pub arrival_airports: CodeList,
    /// Program window.
    pub window: TimeWindow,
    /// Rates (used by GDP).
    pub rates: RateConfig,
    /// Delay limit in minutes (used by GDP).
    pub delay_limit_min: i64,
    /// Demand scope.
    pub scope: DemandScope,
    /// Exemption rules.
    pub exemptions: ExemptionRuleSet,
    /// Requesting operator.
    pub requested_by: Option<String>,
}
