use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;

/// Milliseconds since the Unix epoch. Every adapter and the planner agree on
/// this unit.
pub type Timestamp = i64;

pub const MILLIS_PER_SECOND: i64 = 1_000;
pub const MILLIS_PER_MINUTE: i64 = 60 * MILLIS_PER_SECOND;
pub const MILLIS_PER_HOUR: i64 = 60 * MILLIS_PER_MINUTE;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimestampError {
    #[error("Invalid timestamp '{0}': expected milliseconds or an RFC 3339 date")]
    Unparseable(String),

    #[error("Timestamp {0} is out of the representable range")]
    OutOfRange(i64),
}

/// Parses either a plain integer (milliseconds) or an RFC 3339 string.
pub fn parse_timestamp(raw: &str) -> Result<Timestamp, TimestampError> {
    let trimmed = raw.trim();
    if let Ok(ms) = trimmed.parse::<i64>() {
        return Ok(ms);
    }

    DateTime::parse_from_rfc3339(trimmed)
        .map(|dt| dt.with_timezone(&Utc).timestamp_millis())
        .map_err(|_| TimestampError::Unparseable(raw.to_string()))
}

pub fn to_datetime(ts: Timestamp) -> Result<DateTime<Utc>, TimestampError> {
    Utc.timestamp_millis_opt(ts)
        .single()
        .ok_or(TimestampError::OutOfRange(ts))
}

/// Human readable rendering used in logs and reports. Falls back to the raw
/// millisecond value when the timestamp cannot be represented as a date.
pub fn display(ts: Timestamp) -> String {
    match to_datetime(ts) {
        Ok(dt) => dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        Err(_) => ts.to_string(),
    }
}
