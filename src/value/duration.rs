//! Duration parsing and formatting.
//!
//! Textual durations are a signed sequence of `<count><unit>` components in
//! descending unit order: `3d4h30m`, `-2h`, `1m30s500ms`. The zero duration
//! renders as `0s`. Units run from days down to nanoseconds; weeks are
//! accepted by `unit_nanos` for `duration(value, unit)` but never emitted.

use std::fmt::Write as _;

pub const NANOS_PER_MICRO: i64 = 1_000;
pub const NANOS_PER_MILLI: i64 = 1_000_000;
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;
pub const NANOS_PER_MINUTE: i64 = 60 * NANOS_PER_SECOND;
pub const NANOS_PER_HOUR: i64 = 60 * NANOS_PER_MINUTE;
pub const NANOS_PER_DAY: i64 = 24 * NANOS_PER_HOUR;
pub const NANOS_PER_WEEK: i64 = 7 * NANOS_PER_DAY;

/// Error raised when a duration string cannot be parsed or a computed
/// duration leaves the representable range.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DurationError {
    #[error("invalid duration: {0:?}")]
    Invalid(String),
    #[error("unknown duration unit: {0:?}")]
    UnknownUnit(String),
    #[error("duration overflow")]
    Overflow,
}

/// Parse the textual duration grammar into nanoseconds.
///
/// Accepts any subset of `[Nd][Nh][Nm][Ns][Nms][Nus][Nns]` in that order,
/// with an optional leading `-`. `0s` and a bare `0` both parse to zero.
pub fn parse_duration(input: &str) -> Result<i64, DurationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(DurationError::Invalid(input.to_string()));
    }

    let (negative, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    if body.is_empty() {
        return Err(DurationError::Invalid(input.to_string()));
    }
    if body == "0" {
        return Ok(0);
    }

    let mut total: i64 = 0;
    let mut rest = body;
    let mut last_rank = 0u8;

    while !rest.is_empty() {
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| DurationError::Invalid(input.to_string()))?;
        if digits_end == 0 {
            return Err(DurationError::Invalid(input.to_string()));
        }
        let count: i64 = rest[..digits_end]
            .parse()
            .map_err(|_| DurationError::Overflow)?;
        rest = &rest[digits_end..];

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(rest.len());
        let unit = &rest[..unit_end];
        rest = &rest[unit_end..];

        let (per, rank) = match unit {
            "d" => (NANOS_PER_DAY, 1),
            "h" => (NANOS_PER_HOUR, 2),
            "m" => (NANOS_PER_MINUTE, 3),
            "s" => (NANOS_PER_SECOND, 4),
            "ms" => (NANOS_PER_MILLI, 5),
            "us" | "\u{b5}s" => (NANOS_PER_MICRO, 6),
            "ns" => (1, 7),
            _ => return Err(DurationError::UnknownUnit(unit.to_string())),
        };
        // Components must appear at most once, in descending unit order
        if rank <= last_rank {
            return Err(DurationError::Invalid(input.to_string()));
        }
        last_rank = rank;

        let part = count.checked_mul(per).ok_or(DurationError::Overflow)?;
        total = total.checked_add(part).ok_or(DurationError::Overflow)?;
    }

    if negative {
        total = total.checked_neg().ok_or(DurationError::Overflow)?;
    }
    Ok(total)
}

/// Nanoseconds per unit for `duration(value, unit)`.
///
/// Accepts short, singular and plural spellings for ns, us (µs), ms, s, m,
/// h, d and w.
pub fn unit_nanos(unit: &str) -> Result<i64, DurationError> {
    let per = match unit {
        "ns" | "nano" | "nanos" | "nanosecond" | "nanoseconds" => 1,
        "us" | "\u{b5}s" | "micro" | "micros" | "microsecond" | "microseconds" => NANOS_PER_MICRO,
        "ms" | "milli" | "millis" | "millisecond" | "milliseconds" => NANOS_PER_MILLI,
        "s" | "sec" | "secs" | "second" | "seconds" => NANOS_PER_SECOND,
        "m" | "min" | "mins" | "minute" | "minutes" => NANOS_PER_MINUTE,
        "h" | "hr" | "hrs" | "hour" | "hours" => NANOS_PER_HOUR,
        "d" | "day" | "days" => NANOS_PER_DAY,
        "w" | "week" | "weeks" => NANOS_PER_WEEK,
        _ => return Err(DurationError::UnknownUnit(unit.to_string())),
    };
    Ok(per)
}

/// Render nanoseconds in the compact component form (`3d4h30m`, `-2h`,
/// `0s` for zero).
pub fn format_duration_ns(ns: i64) -> String {
    if ns == 0 {
        return "0s".to_string();
    }

    let mut out = String::new();
    let mut rest = ns.unsigned_abs();
    if ns < 0 {
        out.push('-');
    }

    const UNITS: [(u64, &str); 7] = [
        (NANOS_PER_DAY as u64, "d"),
        (NANOS_PER_HOUR as u64, "h"),
        (NANOS_PER_MINUTE as u64, "m"),
        (NANOS_PER_SECOND as u64, "s"),
        (NANOS_PER_MILLI as u64, "ms"),
        (NANOS_PER_MICRO as u64, "us"),
        (1, "ns"),
    ];
    for (per, label) in UNITS {
        let count = rest / per;
        rest %= per;
        if count > 0 {
            let _ = write!(out, "{count}{label}");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_compound() {
        assert_eq!(parse_duration("3d4h30m").unwrap(), 3 * NANOS_PER_DAY + 4 * NANOS_PER_HOUR + 30 * NANOS_PER_MINUTE);
        assert_eq!(parse_duration("-2h").unwrap(), -2 * NANOS_PER_HOUR);
        assert_eq!(parse_duration("1m30s").unwrap(), 90 * NANOS_PER_SECOND);
        assert_eq!(parse_duration("500ms").unwrap(), 500 * NANOS_PER_MILLI);
        assert_eq!(parse_duration("250us").unwrap(), 250 * NANOS_PER_MICRO);
        assert_eq!(parse_duration("17ns").unwrap(), 17);
        assert_eq!(parse_duration("0s").unwrap(), 0);
        assert_eq!(parse_duration("0").unwrap(), 0);
    }

    #[test]
    fn test_parse_rejects_bad_order() {
        // components must be in descending unit order, at most once each
        assert!(parse_duration("30m4h").is_err());
        assert!(parse_duration("1h1h").is_err());
        assert!(parse_duration("").is_err());
        assert!(parse_duration("h").is_err());
        assert!(parse_duration("5x").is_err());
    }

    #[test]
    fn test_format_compact() {
        assert_eq!(format_duration_ns(0), "0s");
        assert_eq!(format_duration_ns(3 * NANOS_PER_DAY + 4 * NANOS_PER_HOUR + 30 * NANOS_PER_MINUTE), "3d4h30m");
        assert_eq!(format_duration_ns(-2 * NANOS_PER_HOUR), "-2h");
        assert_eq!(format_duration_ns(90 * NANOS_PER_SECOND), "1m30s");
        assert_eq!(format_duration_ns(NANOS_PER_SECOND + 5), "1s5ns");
    }

    #[test]
    fn test_roundtrip() {
        for ns in [0, 1, -1, 61 * NANOS_PER_SECOND, 25 * NANOS_PER_HOUR, -3 * NANOS_PER_DAY] {
            assert_eq!(parse_duration(&format_duration_ns(ns)).unwrap(), ns);
        }
    }

    #[test]
    fn test_unit_nanos_spellings() {
        assert_eq!(unit_nanos("s").unwrap(), NANOS_PER_SECOND);
        assert_eq!(unit_nanos("seconds").unwrap(), NANOS_PER_SECOND);
        assert_eq!(unit_nanos("w").unwrap(), NANOS_PER_WEEK);
        assert_eq!(unit_nanos("\u{b5}s").unwrap(), NANOS_PER_MICRO);
        assert!(unit_nanos("fortnight").is_err());
    }
}
