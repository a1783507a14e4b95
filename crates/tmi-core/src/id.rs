//! Strongly-typed identifiers for TMI entities.
//!
//! Two kinds of identity live here:
//! - **Natural keys** ([`ProgramId`], [`FlightKey`]): stable text identities
//!   that survive re-syncs of the live flight feed and are safe to join on.
//! - **Row identities** ([`RowId`], [`EventId`]): ULIDs minted locally for
//!   staged rows and audit events. They are never used to match a staged
//!   flight back to its live counterpart.
//!
//! # Example
//!
//! ```rust
//! use tmi_core::id::{FlightKey, RowId};
//!
//! let key = FlightKey::new("DAL123-KJFK-KATL-20260314").unwrap();
//! let row = RowId::generate();
//! assert_ne!(row.to_string(), key.to_string());
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

use crate::codes::normalize_code;
use crate::error::{Error, Result};

/// Identifier of a traffic management program.
///
/// Program IDs are upper-case and contain no whitespace. Callers may supply
/// their own; otherwise one is derived from the program family, control
/// element, and window start (see [`ProgramId::derive`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProgramId(String);

impl ProgramId {
    /// Creates a program ID from caller-supplied text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidId`] if the text is empty or contains whitespace.
    pub fn new(value: impl AsRef<str>) -> Result<Self> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidId {
                message: "program ID cannot be empty".into(),
            });
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(Error::InvalidId {
                message: format!("program ID '{trimmed}' cannot contain whitespace"),
            });
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    /// Derives the conventional ID `{PREFIX}-{ELEMENT}-{YYYYMMDDHHMM}`.
    #[must_use]
    pub fn derive(prefix: &str, ctl_element: &str, anchor: DateTime<Utc>) -> Self {
        Self(format!(
            "{}-{}-{}",
            prefix.to_ascii_uppercase(),
            normalize_code(ctl_element).replace(' ', "_"),
            anchor.format("%Y%m%d%H%M")
        ))
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProgramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ProgramId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for ProgramId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<ProgramId> for String {
    fn from(id: ProgramId) -> Self {
        id.0
    }
}

/// Stable external identity of a flight.
///
/// The live feed may delete and re-insert flight rows between a simulate and
/// an apply; the flight key is what survives. Comparison is exact after
/// trimming, and the ordering is used as the allocation tie-breaker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FlightKey(String);

impl FlightKey {
    /// Creates a flight key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidId`] if the key is empty.
    pub fn new(value: impl AsRef<str>) -> Result<Self> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidId {
                message: "flight key cannot be empty".into(),
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FlightKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for FlightKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for FlightKey {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<FlightKey> for String {
    fn from(key: FlightKey) -> Self {
        key.0
    }
}

/// Identity of a staged (sandbox) flight row.
///
/// Row IDs are regenerated on every simulate and carry no meaning outside the
/// staging area that minted them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(Ulid);

impl RowId {
    /// Generates a new unique row ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new())
    }

    /// Creates a row ID from a raw ULID.
    #[must_use]
    pub const fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    /// Returns the underlying ULID.
    #[must_use]
    pub const fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RowId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ulid::from_string(s)
            .map(Self)
            .map_err(|e| Error::InvalidId {
                message: format!("invalid row ID '{s}': {e}"),
            })
    }
}

/// A unique identifier for an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Ulid);

impl EventId {
    /// Generates a new unique event ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new())
    }

    /// Returns the creation timestamp encoded in the ID.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        let ms = i64::try_from(self.0.timestamp_ms()).unwrap_or(i64::MAX);
        DateTime::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EventId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ulid::from_string(s)
            .map(Self)
            .map_err(|e| Error::InvalidId {
                message: format!("invalid event ID '{s}': {e}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn program_id_derivation_uses_window_anchor() {
        let start = Utc.with_ymd_and_hms(2026, 3, 14, 18, 0, 0).unwrap();
        let id = ProgramId::derive("GDP", " katl ", start);
        assert_eq!(id.as_str(), "GDP-KATL-202603141800");
    }

    #[test]
    fn program_id_rejects_blank_and_whitespace() {
        assert!(ProgramId::new("   ").is_err());
        assert!(ProgramId::new("GS KJFK").is_err());
        assert_eq!(ProgramId::new("gs-kjfk-1").unwrap().as_str(), "GS-KJFK-1");
    }

    #[test]
    fn program_id_serde_validates() {
        let parsed: std::result::Result<ProgramId, _> = serde_json::from_str("\"\"");
        assert!(parsed.is_err());
        let ok: ProgramId = serde_json::from_str("\"gdp-katl-1\"").unwrap();
        assert_eq!(ok.as_str(), "GDP-KATL-1");
    }

    #[test]
    fn flight_keys_order_lexically() {
        let a = FlightKey::new("AAL1").unwrap();
        let b = FlightKey::new("AAL2").unwrap();
        assert!(a < b);
        assert!(FlightKey::new("").is_err());
    }

    #[test]
    fn row_ids_are_unique_and_parse() {
        let a = RowId::generate();
        let b = RowId::generate();
        assert_ne!(a, b);
        let parsed: RowId = a.to_string().parse().unwrap();
        assert_eq!(parsed, a);
    }

    #[test]
    fn event_id_roundtrips_through_display() {
        let id = EventId::generate();
        let parsed: EventId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-ulid".parse::<EventId>().is_err());
    }
}
