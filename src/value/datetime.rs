//! Datetime parsing, formatting and calendar bucket helpers.
//!
//! Datetimes are stored as nanoseconds since the Unix epoch and interpreted
//! as timezone-naive UTC throughout. Calendar buckets (months, quarters,
//! years) use the proleptic Gregorian calendar in UTC.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DatetimeError {
    #[error("invalid datetime: {0:?}")]
    Invalid(String),
    #[error("datetime out of range: {0:?}")]
    OutOfRange(String),
}

/// Render nanoseconds since epoch as RFC 3339 UTC. Whole-second instants
/// omit the fractional part; otherwise the shortest exact fraction is kept.
pub fn format_datetime_ns(ns: i64) -> String {
    let dt: DateTime<Utc> = DateTime::from_timestamp_nanos(ns);
    if ns.rem_euclid(1_000_000_000) == 0 {
        dt.to_rfc3339_opts(SecondsFormat::Secs, true)
    } else {
        dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    }
}

/// Parse a datetime string into nanoseconds since epoch.
///
/// Accepts RFC 3339 with offset, a bare date (`2024-01-01`, midnight UTC)
/// and a bare datetime with `T` or space separator.
pub fn parse_datetime(input: &str) -> Result<i64, DatetimeError> {
    let s = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt
            .timestamp_nanos_opt()
            .ok_or_else(|| DatetimeError::OutOfRange(input.to_string()));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return naive
                .and_utc()
                .timestamp_nanos_opt()
                .ok_or_else(|| DatetimeError::OutOfRange(input.to_string()));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let naive = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| DatetimeError::Invalid(input.to_string()))?;
        return naive
            .and_utc()
            .timestamp_nanos_opt()
            .ok_or_else(|| DatetimeError::OutOfRange(input.to_string()));
    }

    Err(DatetimeError::Invalid(input.to_string()))
}

/// Whole calendar months since the epoch month (1970-01).
pub fn months_since_epoch(ns: i64) -> i64 {
    let dt: DateTime<Utc> = DateTime::from_timestamp_nanos(ns);
    (i64::from(dt.year()) - 1970) * 12 + i64::from(dt.month0())
}

/// Whole calendar quarters since 1970-Q1.
pub fn quarters_since_epoch(ns: i64) -> i64 {
    months_since_epoch(ns).div_euclid(3)
}

/// Whole calendar years since 1970.
pub fn years_since_epoch(ns: i64) -> i64 {
    let dt: DateTime<Utc> = DateTime::from_timestamp_nanos(ns);
    i64::from(dt.year()) - 1970
}
