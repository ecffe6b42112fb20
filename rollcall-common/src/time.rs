//! Timestamp utilities
//!
//! Upstream records carry timestamps in several ISO-8601 flavours (with or
//! without offset, with a space instead of `T`, or date-only). Everything is
//! normalized to `DateTime<FixedOffset>`; values without an offset are read as UTC.

use crate::{Error, Result};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parse an upstream timestamp, returning `None` when it is empty or unparsable
pub fn parse_timestamp(value: &str) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(dt);
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc().fixed_offset());
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().fixed_offset())
}

/// Parse a UTC offset such as `+08:00`, `-0530`, `+09` or `UTC`
pub fn parse_utc_offset(value: &str) -> Result<FixedOffset> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("utc") || value == "Z" {
        return FixedOffset::east_opt(0).ok_or_else(|| Error::Internal("zero offset".to_string()));
    }

    let invalid = || Error::InvalidInput(format!("Invalid UTC offset '{}' (expected e.g. +08:00)", value));

    let (sign, rest) = match value.as_bytes().first() {
        Some(b'+') => (1, &value[1..]),
        Some(b'-') => (-1, &value[1..]),
        _ => return Err(invalid()),
    };

    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    let (hours, minutes) = match digits.len() {
        2 => (digits.parse::<i32>().map_err(|_| invalid())?, 0),
        4 => (
            digits[..2].parse::<i32>().map_err(|_| invalid())?,
            digits[2..].parse::<i32>().map_err(|_| invalid())?,
        ),
        _ => return Err(invalid()),
    };
    if hours > 23 || minutes > 59 {
        return Err(invalid());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

/// Today's calendar date at the given offset
pub fn local_today(offset: FixedOffset) -> NaiveDate {
    Utc::now().with_timezone(&offset).date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_parse_rfc3339_with_z() {
        let dt = parse_timestamp("2024-09-01T08:30:00Z").unwrap();
        assert_eq!(dt.offset().local_minus_utc(), 0);
        assert_eq!(dt.hour(), 8);
    }

    #[test]
    fn test_parse_rfc3339_with_offset() {
        let dt = parse_timestamp("2024-09-01T08:30:00+08:00").unwrap();
        assert_eq!(dt.offset().local_minus_utc(), 8 * 3600);
    }

    #[test]
    fn test_parse_naive_is_utc() {
        let dt = parse_timestamp("2024-09-01 08:30:00").unwrap();
        assert_eq!(dt.offset().local_minus_utc(), 0);
        assert_eq!(dt.minute(), 30);

        let dt = parse_timestamp("2024-09-01T08:30:00.250").unwrap();
        assert_eq!(dt.nanosecond(), 250_000_000);
    }

    #[test]
    fn test_parse_date_only() {
        let dt = parse_timestamp("2024-09-01").unwrap();
        assert_eq!(dt.hour(), 0);
        assert_eq!(dt.date_naive(), NaiveDate::from_ymd_opt(2024, 9, 1).unwrap());
    }

    #[test]
    fn test_parse_garbage() {
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("   ").is_none());
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("2024-13-45").is_none());
    }

    #[test]
    fn test_offsets_compare_by_instant() {
        let a = parse_timestamp("2024-09-01T10:00:00+08:00").unwrap();
        let b = parse_timestamp("2024-09-01T03:00:00Z").unwrap();
        assert!(b > a);
    }

    #[test]
    fn test_parse_utc_offset_forms() {
        assert_eq!(parse_utc_offset("+08:00").unwrap().local_minus_utc(), 8 * 3600);
        assert_eq!(parse_utc_offset("-0530").unwrap().local_minus_utc(), -(5 * 3600 + 30 * 60));
        assert_eq!(parse_utc_offset("+09").unwrap().local_minus_utc(), 9 * 3600);
        assert_eq!(parse_utc_offset("UTC").unwrap().local_minus_utc(), 0);
    }

    #[test]
    fn test_parse_utc_offset_rejects_invalid() {
        assert!(parse_utc_offset("Asia/Shanghai").is_err());
        assert!(parse_utc_offset("+25:00").is_err());
        assert!(parse_utc_offset("08:00").is_err());
        assert!(parse_utc_offset("+8:0").is_err());
    }
}
