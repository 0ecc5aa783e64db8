//! ISO 8601 timestamp decoding for wire fields
//!
//! Devices and the model both send ISO 8601 times, sometimes without an
//! offset. Use with `#[serde(deserialize_with = "timestamp::deserialize")]`.
//! Serialization is left to chrono, which always writes RFC 3339.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};

/// Format for timestamps that carry no offset. `%.f` also matches no fraction.
const NAIVE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Parse an ISO 8601 timestamp. A value without an offset is read as UTC.
pub fn parse(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    match DateTime::parse_from_rfc3339(value) {
        Ok(dt) => Ok(dt.with_timezone(&Utc)),
        Err(rfc_err) => NaiveDateTime::parse_from_str(value, NAIVE_FORMAT)
            .map(|naive| naive.and_utc())
            .map_err(|_| rfc_err),
    }
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse(&raw).map_err(|e| serde::de::Error::custom(format!("invalid timestamp {raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_offset_is_normalized_to_utc() {
        let dt = parse("2024-03-01T12:15:00+02:00").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2024, 3, 1, 10, 15, 0).unwrap());
    }

    #[test]
    fn test_naive_time_is_read_as_utc() {
        assert_eq!(
            parse("2024-03-01T10:15:00").unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 15, 0).unwrap()
        );
        let fractional = parse("2024-03-01T10:15:00.1234567").unwrap();
        assert_eq!(fractional.timestamp_subsec_micros(), 123_456);
    }

    #[test]
    fn test_garbage_is_rejected() {
        for value in ["", "yesterday", "2024-03-01", "2024-13-01T10:15:00"] {
            assert!(parse(value).is_err(), "{value:?} should not parse");
        }
    }
}
