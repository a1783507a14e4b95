//! UTC timestamp normalization.
//!
//! Every timestamp entering the engine is normalized to `DateTime<Utc>`.
//! Accepted text formats:
//!
//! - RFC 3339 with any offset (`2026-03-14T18:00:00-04:00`)
//! - `YYYY-MM-DD HH:MM[:SS]` and `YYYY-MM-DDTHH:MM[:SS]`, optionally suffixed
//!   with `Z`; offset-less values are taken as UTC

use chrono::{DateTime, Duration, NaiveDateTime, Timelike, Utc};

use crate::error::{Error, Result};

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Parses a timestamp in any accepted format and converts it to UTC.
///
/// # Errors
///
/// Returns [`Error::InvalidTimestamp`] if the text matches no accepted format.
pub fn parse_utc(raw: &str) -> Result<DateTime<Utc>> {
    parse_utc_field("timestamp", raw)
}

/// Parses a timestamp, naming `field` in any error.
///
/// # Errors
///
/// Returns [`Error::InvalidTimestamp`] if the text matches no accepted format.
pub fn parse_utc_field(field: &str, raw: &str) -> Result<DateTime<Utc>> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(Error::invalid_timestamp(field, raw));
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Ok(parsed.with_timezone(&Utc));
    }

    let naive_text = text
        .strip_suffix('Z')
        .or_else(|| text.strip_suffix('z'))
        .unwrap_or(text);
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(naive_text, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| Error::invalid_timestamp(field, raw))
}

/// Parses an optional timestamp field; blank text counts as absent.
///
/// # Errors
///
/// Returns [`Error::InvalidTimestamp`] if non-blank text fails to parse.
pub fn parse_optional_utc(field: &str, raw: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => parse_utc_field(field, text).map(Some),
    }
}

/// Parses a required timestamp field.
///
/// # Errors
///
/// Returns [`Error::MissingField`] when absent or blank, and
/// [`Error::InvalidTimestamp`] when unparseable.
pub fn parse_required_utc(field: &str, raw: Option<&str>) -> Result<DateTime<Utc>> {
    parse_optional_utc(field, raw)?.ok_or_else(|| Error::missing_field(field))
}

/// Rounds a timestamp down to the nearest quarter hour.
#[must_use]
pub fn floor_to_quarter_hour(at: DateTime<Utc>) -> DateTime<Utc> {
    let into_quarter = Duration::minutes(i64::from(at.minute() % 15))
        + Duration::seconds(i64::from(at.second()))
        + Duration::nanoseconds(i64::from(at.nanosecond()));
    at - into_quarter
}

/// Whole minutes from `from` to `to`, truncated toward zero.
#[must_use]
pub fn whole_minutes_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_minutes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, h, m, s).unwrap()
    }

    #[test]
    fn parses_rfc3339_with_offset() {
        let parsed = parse_utc("2026-03-14T14:00:00-04:00").unwrap();
        assert_eq!(parsed, utc(18, 0, 0));
    }

    #[test]
    fn parses_naive_formats_as_utc() {
        for text in [
            "2026-03-14 18:00",
            "2026-03-14 18:00:00",
            "2026-03-14T18:00",
            "2026-03-14T18:00Z",
            "2026-03-14T18:00:00Z",
        ] {
            assert_eq!(parse_utc(text).unwrap(), utc(18, 0, 0), "format {text}");
        }
    }

    #[test]
    fn rejects_garbage_with_field_name() {
        let err = parse_utc_field("end", "tomorrow").unwrap_err();
        assert!(err.to_string().contains("end"));
    }

    #[test]
    fn required_field_reports_missing() {
        let err = parse_required_utc("gs_end", Some("  ")).unwrap_err();
        assert!(matches!(err, Error::MissingField { .. }));
        assert_eq!(parse_optional_utc("start", None).unwrap(), None);
    }

    #[test]
    fn quarter_hour_floor() {
        assert_eq!(floor_to_quarter_hour(utc(18, 7, 42)), utc(18, 0, 0));
        assert_eq!(floor_to_quarter_hour(utc(18, 15, 0)), utc(18, 15, 0));
        assert_eq!(floor_to_quarter_hour(utc(18, 59, 59)), utc(18, 45, 0));
    }

    #[test]
    fn minutes_truncate_toward_zero() {
        assert_eq!(whole_minutes_between(utc(18, 0, 0), utc(19, 30, 59)), 90);
        assert_eq!(whole_minutes_between(utc(19, 0, 30), utc(19, 0, 0)), 0);
    }
}
