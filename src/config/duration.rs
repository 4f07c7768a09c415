//! # Duration Parsing
//!
//! Parses unit-suffixed duration strings (`90s`, `1m30s`, `-5s`) as used in the operator ConfigMap.
//!
//! Accepted forms: a signed sequence of decimal numbers with unit suffixes,
//! e.g. `300ms`, `-1.5h`, `2h45m`, or the bare `0`. Valid units are
//! `ns`, `us` (or `µs`), `ms`, `s`, `m`, `h`.

use super::ConfigError;
use chrono::TimeDelta;
use regex::Regex;
use std::time::Duration;

/// Parse a duration string into a signed [`TimeDelta`]
pub fn parse_signed_duration(input: &str) -> Result<TimeDelta, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidDuration {
        value: input.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(invalid("empty duration"));
    }

    let (negative, body) = match trimmed.as_bytes()[0] {
        b'-' => (true, &trimmed[1..]),
        b'+' => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    if body == "0" {
        return Ok(TimeDelta::zero());
    }

    let whole = Regex::new(r"^(?:(?:\d+(?:\.\d*)?|\.\d+)(?:ns|us|µs|μs|ms|s|m|h))+$")
        .map_err(|e| invalid(&format!("failed to compile regex: {e}")))?;
    if !whole.is_match(body) {
        return Err(invalid("expected <number><unit> components, e.g. 1m30s"));
    }

    let component = Regex::new(r"(?P<number>\d+(?:\.\d*)?|\.\d+)(?P<unit>ns|us|µs|μs|ms|s|m|h)")
        .map_err(|e| invalid(&format!("failed to compile regex: {e}")))?;

    let mut total_nanos: f64 = 0.0;
    for captures in component.captures_iter(body) {
        let number: f64 = captures["number"]
            .parse()
            .map_err(|e| invalid(&format!("invalid number: {e}")))?;
        let unit_nanos: f64 = match &captures["unit"] {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            other => return Err(invalid(&format!("unknown unit {other}"))),
        };
        total_nanos += number * unit_nanos;
    }

    // i64 nanoseconds cover roughly 292 years
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        reason = "Overflow is checked against i64::MAX before the cast"
    )]
    let nanos = {
        let rounded = total_nanos.round();
        if rounded >= i64::MAX as f64 {
            return Err(invalid("duration out of range"));
        }
        rounded as i64
    };

    let delta = TimeDelta::nanoseconds(nanos);
    Ok(if negative { -delta } else { delta })
}

/// Parse a duration that must not be negative
pub fn parse_std_duration(input: &str) -> Result<Duration, ConfigError> {
    let delta = parse_signed_duration(input)?;
    if delta < TimeDelta::zero() {
        return Err(ConfigError::NegativeDuration {
            value: input.to_string(),
        });
    }
    Ok(delta.to_std().unwrap_or_default())
}
