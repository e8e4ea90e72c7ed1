//! Calendar decomposition of pickup timestamps.
//!
//! Requests are expected in `%Y-%m-%dT%H/%M/%S%z`. Anything else goes through a
//! list of common layouts before giving up. Offsets are kept as wall-clock
//! time: `08:30+0500` decomposes to hour 8, not to its UTC equivalent.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike};
use serde::Serialize;
use std::borrow::Cow;

use crate::error::{FeatureError, Result};

pub const STRICT_FORMAT: &str = "%Y-%m-%dT%H/%M/%S%z";

const OFFSET_FORMATS: [&str; 3] = [
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f %z",
];

const NAIVE_FORMATS: [&str; 14] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %H:%M",
    "%B %d %Y %H:%M:%S",
    "%B %d %Y %H:%M",
    "%B %d, %Y %H:%M:%S",
    "%B %d, %Y %H:%M",
    "%d %B %Y %H:%M:%S",
    "%d %B %Y %H:%M",
];

const DATE_FORMATS: [&str; 6] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%B %d %Y",
    "%B %d, %Y",
    "%d %B %Y",
];

/// Calendar features derived from a pickup timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CalendarFeatures {
    pub hour: u32,
    pub minute: u32,
    /// Monday = 0 .. Sunday = 6
    pub day_of_week: u32,
    pub day_of_month: u32,
}

impl CalendarFeatures {
    pub fn from_datetime(dt: &NaiveDateTime) -> Self {
        Self {
            hour: dt.hour(),
            minute: dt.minute(),
            day_of_week: dt.weekday().num_days_from_monday(),
            day_of_month: dt.day(),
        }
    }
}

/// chrono's `%z` has no `Z` form, so a trailing UTC designator is spelled out.
fn zulu_to_offset(s: &str) -> Cow<'_, str> {
    match s.strip_suffix(['Z', 'z']) {
        Some(head) => Cow::Owned(format!("{}+0000", head)),
        None => Cow::Borrowed(s),
    }
}

/// Parses with the strict request format only. A trailing `Z` counts as `+0000`.
pub fn parse_strict(input: &str) -> Option<NaiveDateTime> {
    DateTime::parse_from_str(&zulu_to_offset(input.trim()), STRICT_FORMAT)
        .ok()
        .map(|dt| dt.naive_local())
}

/// General-purpose fallback parser.
pub fn parse_permissive(input: &str) -> Option<NaiveDateTime> {
    let s = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.naive_local());
    }
    let zoned = zulu_to_offset(s);
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(&zoned, fmt) {
            return Some(dt.naive_local());
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Strict format first, then the permissive parser.
pub fn parse_timestamp(input: &str) -> Result<NaiveDateTime> {
    parse_strict(input)
        .or_else(|| parse_permissive(input))
        .ok_or_else(|| FeatureError::TimestampParse {
            input: input.to_string(),
        })
}

pub fn decompose(input: &str) -> Result<CalendarFeatures> {
    parse_timestamp(input).map(|dt| CalendarFeatures::from_datetime(&dt))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_format_is_recognised() {
        let dt = parse_strict("2024-01-05T08/30/00+0000").unwrap();
        assert_eq!(dt.to_string(), "2024-01-05 08:30:00");
        assert!(parse_strict("2024-01-05 08:30:00").is_none());
    }

    #[test]
    fn strict_format_accepts_utc_designator() {
        let dt = parse_strict("2024-01-05T08/30/00Z").unwrap();
        assert_eq!(dt.to_string(), "2024-01-05 08:30:00");
        assert_eq!(
            decompose("2024-01-05T08/30/00Z").unwrap(),
            decompose("2024-01-05T08/30/00+0000").unwrap()
        );
        assert_eq!(decompose("2024-01-05 08:30:00Z").unwrap().hour, 8);
    }

    #[test]
    fn fallback_matches_strict_decomposition() {
        let strict = decompose("2024-01-05T08/30/00+0000").unwrap();
        let loose = decompose("2024-01-05 08:30:00").unwrap();
        assert_eq!(strict, loose);
        // 2024-01-05 was a Friday
        assert_eq!(
            strict,
            CalendarFeatures {
                hour: 8,
                minute: 30,
                day_of_week: 4,
                day_of_month: 5
            }
        );
    }

    #[test]
    fn offsets_keep_wall_clock() {
        let f = decompose("2024-03-10T23/15/00+0500").unwrap();
        assert_eq!((f.hour, f.minute, f.day_of_month), (23, 15, 10));
        let f = decompose("2024-03-10T23:15:00Z").unwrap();
        assert_eq!(f.hour, 23);
    }

    #[test]
    fn assorted_layouts() {
        assert_eq!(decompose("2024-01-05 08:30:00.250").unwrap().minute, 30);
        assert_eq!(decompose("01/05/2024 08:30:00 PM").unwrap().hour, 20);
        assert_eq!(decompose("2024-01-07").unwrap().day_of_week, 6);
    }

    #[test]
    fn month_name_layouts() {
        let expected = decompose("2024-01-05 08:30:00").unwrap();
        assert_eq!(decompose("Jan 5 2024 08:30").unwrap(), expected);
        assert_eq!(decompose("January 5, 2024 08:30:00").unwrap(), expected);
        assert_eq!(decompose("5 Jan 2024 08:30").unwrap(), expected);
        assert_eq!(decompose("Jan 7 2024").unwrap().day_of_week, 6);
    }

    #[test]
    fn garbage_is_an_error() {
        match decompose("yesterday-ish") {
            Err(FeatureError::TimestampParse { input }) => assert_eq!(input, "yesterday-ish"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(decompose("2024-13-45 99:00:00").is_err());
    }
}
