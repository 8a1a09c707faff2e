//! Parsing of the `interval` query parameter.
//!
//! Accepts the compact duration notation (`500ms`, `1s`, `1h30m`, `1.5s`)
//! with units `ns`, `us`/`µs`, `ms`, `s`, `m` and `h`. Values concatenate
//! additively and may carry a decimal fraction.

use std::time::Duration;
use thiserror::Error;

/// Interval used when the request does not name one.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Largest representable duration in nanoseconds (signed 64-bit range).
const MAX_NANOS: u64 = i64::MAX as u64;

/// Errors produced while parsing an interval. All of them are client errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntervalError {
    /// Syntax error or a value outside the representable range.
    #[error("invalid duration \"{0}\"")]
    Invalid(String),

    /// A number was not followed by a unit.
    #[error("missing unit in duration \"{0}\"")]
    MissingUnit(String),

    /// A unit outside the supported set.
    #[error("unknown unit \"{unit}\" in duration \"{raw}\"")]
    UnknownUnit { unit: String, raw: String },

    /// Zero or negative durations cannot drive a periodic timer.
    #[error("interval must be positive, got \"{0}\"")]
    NotPositive(String),
}

/// Parse the raw `interval` parameter.
///
/// Absent or empty input yields [`DEFAULT_INTERVAL`].
pub fn parse_interval(raw: Option<&str>) -> Result<Duration, IntervalError> {
    let raw = match raw {
        None | Some("") => return Ok(DEFAULT_INTERVAL),
        Some(raw) => raw,
    };

    let (negative, nanos) = parse_duration(raw)?;
    if negative || nanos == 0 {
        return Err(IntervalError::NotPositive(raw.to_string()));
    }
    Ok(Duration::from_nanos(nanos))
}

/// Parse a signed duration into its sign and magnitude in nanoseconds.
fn parse_duration(raw: &str) -> Result<(bool, u64), IntervalError> {
    let invalid = || IntervalError::Invalid(raw.to_string());

    let mut s = raw;
    let mut negative = false;
    if let Some(rest) = s.strip_prefix('-') {
        negative = true;
        s = rest;
    } else if let Some(rest) = s.strip_prefix('+') {
        s = rest;
    }

    if s == "0" {
        return Ok((negative, 0));
    }
    if s.is_empty() {
        return Err(invalid());
    }

    let mut total: u64 = 0;
    while !s.is_empty() {
        let lead = s.as_bytes()[0];
        if !(lead == b'.' || lead.is_ascii_digit()) {
            return Err(invalid());
        }

        let before = s.len();
        let (whole, rest) = leading_int(s).ok_or_else(invalid)?;
        s = rest;
        let has_whole = s.len() != before;

        let mut fraction = 0u64;
        let mut scale = 1f64;
        let mut has_fraction = false;
        if let Some(rest) = s.strip_prefix('.') {
            let before = rest.len();
            let (f, sc, rest) = leading_fraction(rest);
            fraction = f;
            scale = sc;
            has_fraction = rest.len() != before;
            s = rest;
        }
        if !has_whole && !has_fraction {
            return Err(invalid());
        }

        // Unit bytes run up to the next digit or '.'; both are ASCII so the
        // split always lands on a char boundary.
        let end = s
            .bytes()
            .position(|c| c == b'.' || c.is_ascii_digit())
            .unwrap_or(s.len());
        if end == 0 {
            return Err(IntervalError::MissingUnit(raw.to_string()));
        }
        let (unit, rest) = s.split_at(end);
        s = rest;

        let unit_nanos = unit_nanos(unit).ok_or_else(|| IntervalError::UnknownUnit {
            unit: unit.to_string(),
            raw: raw.to_string(),
        })?;

        if whole > MAX_NANOS / unit_nanos {
            return Err(invalid());
        }
        let mut value = whole * unit_nanos;
        if fraction > 0 {
            let extra = (fraction as f64 * (unit_nanos as f64 / scale)) as u64;
            value = value
                .checked_add(extra)
                .filter(|v| *v <= MAX_NANOS)
                .ok_or_else(invalid)?;
        }

        total = total
            .checked_add(value)
            .filter(|t| *t <= MAX_NANOS)
            .ok_or_else(invalid)?;
    }

    Ok((negative, total))
}

/// Consume leading decimal digits. `None` on overflow.
fn leading_int(s: &str) -> Option<(u64, &str)> {
    let end = s.bytes().position(|c| !c.is_ascii_digit()).unwrap_or(s.len());
    let mut x: u64 = 0;
    for c in s[..end].bytes() {
        if x > MAX_NANOS / 10 {
            return None;
        }
        x = x * 10 + u64::from(c - b'0');
        if x > MAX_NANOS {
            return None;
        }
    }
    Some((x, &s[end..]))
}

/// Consume the digits after a decimal point.
///
/// Returns the digits as an integer and the power of ten they are scaled by.
/// Digits past the precision limit are consumed but ignored.
fn leading_fraction(s: &str) -> (u64, f64, &str) {
    let end = s.bytes().position(|c| !c.is_ascii_digit()).unwrap_or(s.len());
    let mut x: u64 = 0;
    let mut scale = 1f64;
    let mut overflow = false;
    for c in s[..end].bytes() {
        if overflow {
            continue;
        }
        if x > MAX_NANOS / 10 {
            overflow = true;
            continue;
        }
        let y = x * 10 + u64::from(c - b'0');
        if y > MAX_NANOS {
            overflow = true;
            continue;
        }
        x = y;
        scale *= 10.0;
    }
    (x, scale, &s[end..])
}

fn unit_nanos(unit: &str) -> Option<u64> {
    match unit {
        "ns" => Some(1),
        "us" | "\u{00b5}s" | "\u{03bc}s" => Some(1_000),
        "ms" => Some(1_000_000),
        "s" => Some(1_000_000_000),
        "m" => Some(60 * 1_000_000_000),
        "h" => Some(3_600 * 1_000_000_000),
        _ => None,
    }
}
