//! Programs and their lifecycle state machine.
//!
//! A program is created by its first simulate and is never hard-deleted:
//!
//! ```text
//!            simulate            apply             purge
//!   DRAFT ───────────▶ SIMULATED ──────▶ ACTIVE ─────────▶ PURGED
//!     ▲  ◀─purge_local─┘    ▲ │ simulate   │ │ complete
//!     └─────────────────────┘ └────────────┘ └──────────▶ COMPLETED
//! ```
//!
//! An ACTIVE program may be re-simulated (staging a revision), re-applied,
//! or have the staged revision discarded with purge_local; it stays ACTIVE
//! through all three. A revision's [`ProgramConfig`] travels with the staged
//! plan and reaches the program row only when it is applied. PURGED and
//! COMPLETED are terminal.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use tmi_core::codes::CodeList;
use tmi_core::ProgramId;

use crate::demand::DemandScope;
use crate::error::{Error, Result};
use crate::exemption::ExemptionRuleSet;
use crate::request::ProgramSpec;
use crate::summary::ProgramMetrics;

/// Program family: the unit of strategy dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProgramFamily {
    /// Ground stop.
    #[serde(rename = "GS")]
    GroundStop,
    /// Ground delay program (every GDP variant).
    #[serde(rename = "GDP")]
    GroundDelay,
}

impl ProgramFamily {
    /// Prefix used in derived program IDs.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::GroundStop => "GS",
            Self::GroundDelay => "GDP",
        }
    }
}

impl fmt::Display for ProgramFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// GDP flavor. All variants share one allocation algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GdpVariant {
    /// Plain `GDP`.
    #[default]
    Standard,
    /// Delay assignment mode.
    Das,
    /// General aviation airport program.
    Gaap,
    /// Unified delay program.
    Udp,
}

/// Program type identifier (`GS`, `GDP`, `GDP-DAS`, `GDP-GAAP`, `GDP-UDP`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ProgramKind {
    /// Ground stop.
    GroundStop,
    /// Ground delay program of the given variant.
    GroundDelay(GdpVariant),
}

impl ProgramKind {
    /// Plain GDP.
    pub const GDP: Self = Self::GroundDelay(GdpVariant::Standard);

    /// Returns the strategy family.
    #[must_use]
    pub const fn family(self) -> ProgramFamily {
        match self {
            Self::GroundStop => ProgramFamily::GroundStop,
            Self::GroundDelay(_) => ProgramFamily::GroundDelay,
        }
    }

    /// Returns the wire identifier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GroundStop => "GS",
            Self::GroundDelay(GdpVariant::Standard) => "GDP",
            Self::GroundDelay(GdpVariant::Das) => "GDP-DAS",
            Self::GroundDelay(GdpVariant::Gaap) => "GDP-GAAP",
            Self::GroundDelay(GdpVariant::Udp) => "GDP-UDP",
        }
    }
}

impl Default for ProgramKind {
    fn default() -> Self {
        Self::GDP
    }
}

impl fmt::Display for ProgramKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProgramKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().replace('_', "-").as_str() {
            "GS" => Ok(Self::GroundStop),
            "GDP" => Ok(Self::GDP),
            "GDP-DAS" => Ok(Self::GroundDelay(GdpVariant::Das)),
            "GDP-GAAP" => Ok(Self::GroundDelay(GdpVariant::Gaap)),
            "GDP-UDP" => Ok(Self::GroundDelay(GdpVariant::Udp)),
            other => Err(Error::validation(format!("unknown program type '{other}'"))),
        }
    }
}

impl TryFrom<String> for ProgramKind {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ProgramKind> for String {
    fn from(kind: ProgramKind) -> Self {
        kind.as_str().to_string()
    }
}

/// Program lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgramStatus {
    /// Created, nothing staged.
    #[default]
    Draft,
    /// A plan is staged in the sandbox.
    Simulated,
    /// Applied to live flights.
    Active,
    /// Withdrawn; live control fields cleared.
    Purged,
    /// Window elapsed.
    Completed,
}

/// Events that move a program between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramTransition {
    /// Stage a plan.
    Simulate,
    /// Commit the staged plan to live.
    Apply,
    /// Withdraw the program from live.
    Purge,
    /// Discard the staged plan.
    PurgeLocal,
    /// Mark the window elapsed.
    Complete,
}

impl fmt::Display for ProgramTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simulate => write!(f, "simulate"),
            Self::Apply => write!(f, "apply"),
            Self::Purge => write!(f, "purge"),
            Self::PurgeLocal => write!(f, "purge_local"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

impl ProgramStatus {
    /// Returns true if this is a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Purged | Self::Completed)
    }

    /// Returns the state reached by `transition`, or `None` if not allowed.
    #[must_use]
    pub const fn next(self, transition: ProgramTransition) -> Option<Self> {
        use ProgramTransition as T;
        match (self, transition) {
            (Self::Draft | Self::Simulated, T::Simulate) => Some(Self::Simulated),
            (Self::Draft | Self::Simulated, T::PurgeLocal) => Some(Self::Draft),
            (Self::Simulated | Self::Active, T::Apply)
            | (Self::Active, T::Simulate | T::PurgeLocal) => Some(Self::Active),
            (Self::Active, T::Purge) => Some(Self::Purged),
            (Self::Active, T::Complete) => Some(Self::Completed),
            _ => None,
        }
    }

    /// Returns true if `transition` is allowed from this state.
    #[must_use]
    pub const fn allows(self, transition: ProgramTransition) -> bool {
        self.next(transition).is_some()
    }
}

impl fmt::Display for ProgramStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft => write!(f, "DRAFT"),
            Self::Simulated => write!(f, "SIMULATED"),
            Self::Active => write!(f, "ACTIVE"),
            Self::Purged => write!(f, "PURGED"),
            Self::Completed => write!(f, "COMPLETED"),
        }
    }
}

/// Program time window.
///
/// GDP windows always have a start. A GS window may be open-ended at the
/// start, meaning "every qualifying flight departing before the end".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeWindow {
    /// Window start, inclusive.
    pub start: Option<DateTime<Utc>>,
    /// Window end; exclusive for slots, inclusive for demand selection.
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Creates a window.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `start` is not before `end`.
    pub fn new(start: Option<DateTime<Utc>>, end: DateTime<Utc>) -> Result<Self> {
        if let Some(start) = start {
            if start >= end {
                return Err(Error::validation(format!(
                    "window start {start} must be before end {end}"
                )));
            }
        }
        Ok(Self { start, end })
    }

    /// Returns the instant used to derive program IDs.
    #[must_use]
    pub fn anchor(&self) -> DateTime<Utc> {
        self.start.unwrap_or(self.end)
    }
}

/// Hourly rate configuration for a GDP.
///
/// Hourly maps are keyed by UTC hour of day; missing hours use the flat rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateConfig {
    /// Flat arrivals per hour.
    pub program_rate: u32,
    /// Flat reserved arrivals per hour.
    pub reserve_rate: u32,
    /// Per-hour program rate overrides.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub program_rates_hourly: BTreeMap<u8, u32>,
    /// Per-hour reserve rate overrides.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub reserve_rates_hourly: BTreeMap<u8, u32>,
}

impl RateConfig {
    /// A flat configuration with no hourly overrides.
    #[must_use]
    pub fn flat(program_rate: u32, reserve_rate: u32) -> Self {
        Self {
            program_rate,
            reserve_rate,
            program_rates_hourly: BTreeMap::new(),
            reserve_rates_hourly: BTreeMap::new(),
        }
    }

    /// Program rate for the hour containing `at`.
    #[must_use]
    pub fn program_rate_at(&self, at: DateTime<Utc>) -> u32 {
        hour_of(at)
            .and_then(|h| self.program_rates_hourly.get(&h).copied())
            .unwrap_or(self.program_rate)
    }

    /// Reserve rate for the hour containing `at`.
    #[must_use]
    pub fn reserve_rate_at(&self, at: DateTime<Utc>) -> u32 {
        hour_of(at)
            .and_then(|h| self.reserve_rates_hourly.get(&h).copied())
            .unwrap_or(self.reserve_rate)
    }
}

fn hour_of(at: DateTime<Utc>) -> Option<u8> {
    u8::try_from(at.hour()).ok()
}

/// The operator-controlled part of a program: what a simulate stages and
/// an apply makes current.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramConfig {
    /// Program type.
    #[serde(rename = "type")]
    pub kind: ProgramKind,
    /// Control element (airport).
    pub ctl_element: String,
    /// Arrival airports held by a GS.
    #[serde(default)]
    pub arrival_airports: CodeList,
    /// Program window.
    pub window: TimeWindow,
    /// Rates (GDP only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rates: Option<RateConfig>,
    /// Delay limit in minutes (GDP only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_limit_min: Option<i64>,
    /// Demand scope.
    pub scope: DemandScope,
    /// Exemption rules.
    pub exemptions: ExemptionRuleSet,
}

impl ProgramConfig {
    /// Extracts the configuration from a validated request.
    #[must_use]
    pub fn from_spec(spec: &ProgramSpec) -> Self {
        let is_gdp = spec.kind.family() == ProgramFamily::GroundDelay;
        Self {
            kind: spec.kind,
            ctl_element: spec.ctl_element.clone(),
            arrival_airports: spec.arrival_airports.clone(),
            window: spec.window,
            rates: is_gdp.then(|| spec.rates.clone()),
            delay_limit_min: is_gdp.then_some(spec.delay_limit_min),
            scope: spec.scope.clone(),
            exemptions: spec.exemptions.clone(),
        }
    }
}

/// A traffic management program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Program {
    /// Program identifier.
    pub program_id: ProgramId,
    /// Program type.
    #[serde(rename = "type")]
    pub kind: ProgramKind,
    /// Control element (airport).
    pub ctl_element: String,
    /// Arrival airports held by a GS.
    #[serde(default)]
    pub arrival_airports: CodeList,
    /// Lifecycle state.
    pub status: ProgramStatus,
    /// Program window.
    pub window: TimeWindow,
    /// Rates (GDP only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rates: Option<RateConfig>,
    /// Delay limit in minutes (GDP only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_limit_min: Option<i64>,
    /// Demand scope.
    pub scope: DemandScope,
    /// Exemption rules.
    pub exemptions: ExemptionRuleSet,
    /// Snapshot written on apply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ProgramMetrics>,
    /// Who created the program.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
    /// Last simulate time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulated_at: Option<DateTime<Utc>>,
    /// Who applied the program.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activated_by: Option<String>,
    /// First apply time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activated_at: Option<DateTime<Utc>>,
    /// Who purged the program.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purged_by: Option<String>,
    /// Purge time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purged_at: Option<DateTime<Utc>>,
    /// Completion time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Row version; 0 until first persisted.
    pub version: u64,
}

impl Program {
    /// Creates a DRAFT program from a validated request.
    #[must_use]
    pub fn draft(spec: &ProgramSpec, at: DateTime<Utc>) -> Self {
        let mut program = Self {
            program_id: spec.program_id.clone(),
            kind: spec.kind,
            ctl_element: spec.ctl_element.clone(),
            arrival_airports: CodeList::default(),
            status: ProgramStatus::Draft,
            window: spec.window,
            rates: None,
            delay_limit_min: None,
            scope: DemandScope::default(),
            exemptions: ExemptionRuleSet::default(),
            metrics: None,
            created_by: spec.requested_by.clone(),
            created_at: at,
            updated_at: at,
            simulated_at: None,
            activated_by: None,
            activated_at: None,
            purged_by: None,
            purged_at: None,
            completed_at: None,
            version: 0,
        };
        program.configure(&ProgramConfig::from_spec(spec), at);
        program
    }

    /// Replaces the program's configuration.
    pub fn configure(&mut self, config: &ProgramConfig, at: DateTime<Utc>) {
        self.kind = config.kind;
        self.ctl_element.clone_from(&config.ctl_element);
        self.arrival_airports = config.arrival_airports.clone();
        self.window = config.window;
        self.rates.clone_from(&config.rates);
        self.delay_limit_min = config.delay_limit_min;
        self.scope = config.scope.clone();
        self.exemptions = config.exemptions.clone();
        self.updated_at = at;
    }

    /// Returns the configuration currently on the row.
    #[must_use]
    pub fn config(&self) -> ProgramConfig {
        ProgramConfig {
            kind: self.kind,
            ctl_element: self.ctl_element.clone(),
            arrival_airports: self.arrival_airports.clone(),
            window: self.window,
            rates: self.rates.clone(),
            delay_limit_min: self.delay_limit_min,
            scope: self.scope.clone(),
            exemptions: self.exemptions.clone(),
        }
    }

    /// Returns the program family.
    #[must_use]
    pub const fn family(&self) -> ProgramFamily {
        self.kind.family()
    }

    /// Applies a lifecycle transition, stamping actor and time fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStateTransition`] if the transition is not
    /// allowed from the current state.
    #[tracing::instrument(skip(self), fields(program_id = %self.program_id, from = %self.status))]
    pub fn transition(
        &mut self,
        transition: ProgramTransition,
        actor: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let Some(next) = self.status.next(transition) else {
            return Err(Error::InvalidStateTransition {
                from: self.status.to_string(),
                to: transition.to_string(),
                reason: if self.status.is_terminal() {
                    format!("{} programs are terminal", self.status)
                } else {
                    format!("{transition} is not allowed from {}", self.status)
                },
            });
        };

        match transition {
            ProgramTransition::Simulate => self.simulated_at = Some(at),
            ProgramTransition::Apply => {
                if self.activated_at.is_none() {
                    self.activated_at = Some(at);
                    self.activated_by = actor.map(str::to_string);
                }
            }
            ProgramTransition::Purge => {
                self.purged_at = Some(at);
                self.purged_by = actor.map(str::to_string);
            }
            ProgramTransition::Complete => self.completed_at = Some(at),
            ProgramTransition::PurgeLocal => {}
        }

        tracing::debug!(to = %next, "program transition");
        self.status = next;
        self.updated_at = at;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn program_kind_parses_every_variant() {
        for (text, family) in [
            ("GS", ProgramFamily::GroundStop),
            ("gdp", ProgramFamily::GroundDelay),
            ("GDP-DAS", ProgramFamily::GroundDelay),
            ("gdp_gaap", ProgramFamily::GroundDelay),
            ("GDP-UDP", ProgramFamily::GroundDelay),
        ] {
            let kind: ProgramKind = text.parse().unwrap();
            assert_eq!(kind.family(), family, "{text}");
        }
        assert!("AFP".parse::<ProgramKind>().is_err());
    }

    #[test]
    fn program_kind_serde_uses_wire_names() {
        let kind = ProgramKind::GroundDelay(GdpVariant::Gaap);
        let json = serde_json::to_string(&kind).unwrap();
        assert_eq!(json, "\"GDP-GAAP\"");
        let back: ProgramKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, kind);
    }

    #[test]
    fn lifecycle_transitions() {
        use ProgramStatus as S;
        use ProgramTransition as T;
        assert_eq!(S::Draft.next(T::Simulate), Some(S::Simulated));
        assert_eq!(S::Simulated.next(T::Simulate), Some(S::Simulated));
        assert_eq!(S::Simulated.next(T::Apply), Some(S::Active));
        assert_eq!(S::Simulated.next(T::PurgeLocal), Some(S::Draft));
        assert_eq!(S::Active.next(T::Purge), Some(S::Purged));
        assert_eq!(S::Active.next(T::Simulate), Some(S::Active));
        assert_eq!(S::Active.next(T::PurgeLocal), Some(S::Active));
        assert_eq!(S::Active.next(T::Complete), Some(S::Completed));
        assert_eq!(S::Draft.next(T::Apply), None);
        assert_eq!(S::Simulated.next(T::Purge), None);
    }

    #[test]
    fn terminal_states_allow_nothing() {
        use ProgramTransition as T;
        for status in [ProgramStatus::Purged, ProgramStatus::Completed] {
            assert!(status.is_terminal());
            for t in [T::Simulate, T::Apply, T::Purge, T::PurgeLocal, T::Complete] {
                assert!(!status.allows(t), "{status} allowed {t}");
            }
        }
    }

    #[test]
    fn hourly_rates_fall_back_to_flat() {
        let mut rates = RateConfig::flat(40, 4);
        rates.program_rates_hourly.insert(19, 30);
        let h18 = Utc.with_ymd_and_hms(2026, 3, 14, 18, 45, 0).unwrap();
        let h19 = Utc.with_ymd_and_hms(2026, 3, 14, 19, 0, 0).unwrap();
        assert_eq!(rates.program_rate_at(h18), 40);
        assert_eq!(rates.program_rate_at(h19), 30);
        assert_eq!(rates.reserve_rate_at(h19), 4);
    }

    #[test]
    fn window_rejects_inverted_bounds() {
        let a = Utc.with_ymd_and_hms(2026, 3, 14, 18, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2026, 3, 14, 20, 0, 0).unwrap();
        assert!(TimeWindow::new(Some(b), a).is_err());
        assert!(TimeWindow::new(Some(a), a).is_err());
        assert_eq!(TimeWindow::new(None, b).unwrap().anchor(), b);
        assert_eq!(TimeWindow::new(Some(a), b).unwrap().anchor(), a);
    }
}
