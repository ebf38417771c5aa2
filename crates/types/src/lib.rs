//! Core scalar types for the federation broker.
//!
//! Simulated time is a `u64` count of nanoseconds since federation start.
//! All protocol times (requests, grants, granularities) are carried on the
//! wire as decimal nanosecond strings and held in memory as [`SimTime`].

use thiserror::Error;

/// Simulated time in nanoseconds since federation start.
pub type SimTime = u64;

/// Index of a federation member in registration order.
///
/// The index is the member's identity in ACK frames and in logs.
pub type SimIndex = usize;

/// Sentinel requested-time for a member that has said BYE.
///
/// A departed member never asks to be woken again; `TIME_NEVER` can only
/// lower a minimum when every member carries it, and the BYE-count check
/// terminates the federation before that point.
pub const TIME_NEVER: SimTime = SimTime::MAX;

/// Default per-member time granularity when a HELLO config omits one.
pub const DEFAULT_TIME_DELTA: SimTime = 1_000_000_000;

/// Error parsing a duration string such as `100ms` or `1s`.
#[derive(Debug, Error)]
pub enum TimeParseError {
    #[error("invalid duration string '{0}'")]
    Invalid(String),

    #[error("duration '{0}' overflows nanosecond range")]
    Overflow(String),
}

/// Parse a human duration string (`100ms`, `1s`, `5m`) into nanoseconds.
pub fn parse_time(s: &str) -> Result<SimTime, TimeParseError> {
    let duration =
        humantime::parse_duration(s.trim()).map_err(|_| TimeParseError::Invalid(s.to_string()))?;
    SimTime::try_from(duration.as_nanos()).map_err(|_| TimeParseError::Overflow(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_seconds() {
        assert_eq!(parse_time("1s").unwrap(), 1_000_000_000);
        assert_eq!(parse_time("2s").unwrap(), 2_000_000_000);
    }

    #[test]
    fn test_parse_subsecond_units() {
        assert_eq!(parse_time("100ms").unwrap(), 100_000_000);
        assert_eq!(parse_time("250us").unwrap(), 250_000);
        assert_eq!(parse_time("7ns").unwrap(), 7);
    }

    #[test]
    fn test_parse_minutes() {
        assert_eq!(parse_time("5m").unwrap(), 300 * 1_000_000_000);
    }

    #[test]
    fn test_parse_trims_whitespace() {
        assert_eq!(parse_time(" 1s ").unwrap(), 1_000_000_000);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_time("fast"),
            Err(TimeParseError::Invalid(_))
        ));
        assert!(matches!(parse_time(""), Err(TimeParseError::Invalid(_))));
    }

    #[test]
    fn test_default_delta_is_one_second() {
        assert_eq!(DEFAULT_TIME_DELTA, parse_time("1s").unwrap());
    }
}
