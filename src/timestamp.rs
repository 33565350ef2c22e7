//! RFC-3339 string ⇄ typed timestamp helpers for the fields named in
//! [`crate::config::Config::timestamp_fields`].
//!
//! Arrow's JSON decoder parses RFC-3339 strings into a `Timestamp` column
//! directly once the target schema field is typed that way (see
//! `encode::build_properties_batch`), so this module mostly exists for the
//! inverse direction and for validating raw strings up front.

use crate::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};

/// The arrow time unit used for every typed timestamp column.
pub const TIME_UNIT: arrow_schema::TimeUnit = arrow_schema::TimeUnit::Microsecond;

/// Parses an RFC-3339 string into microseconds since the epoch (UTC).
pub fn parse_to_micros(value: &str) -> Result<i64> {
    let parsed = DateTime::parse_from_rfc3339(value)?;
    Ok(parsed.with_timezone(&Utc).timestamp_micros())
}

/// Formats microseconds since the epoch (UTC) back to an RFC-3339 string.
///
/// Always `%Y-%m-%dT%H:%M:%SZ`: no fractional seconds, `Z` rather than
/// `+00:00`, matching `pc.strftime(column, format="%Y-%m-%dT%H:%M:%SZ")` in
/// the original source — sub-second precision is unconditionally dropped,
/// not just when the value happens to fall on a whole second.
pub fn format_micros(micros: i64) -> Result<String> {
    let datetime = DateTime::<Utc>::from_timestamp_micros(micros)
        .ok_or_else(|| Error::MalformedInput(format!("timestamp out of range: {micros}")))?;
    Ok(datetime.to_rfc3339_opts(SecondsFormat::Secs, true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_whole_second() {
        let micros = parse_to_micros("2020-01-01T00:00:00Z").unwrap();
        assert_eq!(format_micros(micros).unwrap(), "2020-01-01T00:00:00Z");
    }

    #[test]
    fn round_trip_with_offset() {
        let micros = parse_to_micros("2020-01-01T00:00:00+02:00").unwrap();
        assert_eq!(format_micros(micros).unwrap(), "2019-12-31T22:00:00Z");
    }

    #[test]
    fn fractional_seconds_are_truncated() {
        let micros = parse_to_micros("2020-06-15T12:30:45.123456Z").unwrap();
        assert_eq!(format_micros(micros).unwrap(), "2020-06-15T12:30:45Z");
    }
}
