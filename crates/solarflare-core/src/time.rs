//! Timestamp and day parsing for upstream payloads and trigger messages.
//!
//! Upstream timestamps look like `2024-01-02T03:04Z`: ISO 8601, often without
//! seconds, usually with a trailing `Z`. Trigger messages may carry either a
//! plain day (`2024-01-02`) or a full timestamp with an offset.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};

use crate::error::AppError;

const DAY_FORMAT: &str = "%Y-%m-%d";

/// Naive layouts tried after RFC 3339, most specific first.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

/// Layouts with an explicit offset but no seconds (RFC 3339 requires seconds).
const OFFSET_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M%:z", "%Y-%m-%dT%H:%M%z"];

/// Parse an upstream timestamp into UTC.
///
/// Accepts RFC 3339, a trailing `Z` with or without seconds, explicit offsets,
/// and naive timestamps (taken as UTC).
pub fn parse_time(input: &str) -> Result<DateTime<Utc>, AppError> {
    parse_with_offset(input).map(|dt| dt.with_timezone(&Utc))
}

/// Normalize a date or timestamp string to a calendar day.
///
/// Day-only strings pass through. For timestamps the day is the one written
/// in the string, not the UTC day, so `2024-01-02T23:00:00-05:00` stays on
/// the 2nd.
pub fn to_ymd(input: &str) -> Result<NaiveDate, AppError> {
    let trimmed = input.trim();
    if let Ok(day) = NaiveDate::parse_from_str(trimmed, DAY_FORMAT) {
        return Ok(day);
    }
    parse_with_offset(trimmed).map(|dt| dt.date_naive())
}

/// Format a day the way the upstream API expects it.
pub fn format_ymd(day: NaiveDate) -> String {
    day.format(DAY_FORMAT).to_string()
}

fn parse_with_offset(input: &str) -> Result<DateTime<FixedOffset>, AppError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidDate("empty timestamp".into()));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt);
    }

    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(trimmed, format) {
            return Ok(dt);
        }
    }

    let naive = trimmed
        .strip_suffix('Z')
        .or_else(|| trimmed.strip_suffix('z'))
        .unwrap_or(trimmed);

    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(naive, format).ok())
        .map(|dt| dt.and_utc().fixed_offset())
        .ok_or_else(|| AppError::InvalidDate(format!("unrecognized timestamp '{trimmed}'")))
}
