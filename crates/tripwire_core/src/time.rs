//! Time types for TRIPWIRE.
//!
//! Logical time orders cache accesses deterministically. Wall clock
//! timestamps are metadata only and never drive eviction decisions.

use crate::error::{CoreError, CoreResult};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::sync::atomic::{AtomicU64, Ordering};

/// Logical time - monotonically increasing counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LogicalTime(u64);

impl LogicalTime {
    /// Logical time zero
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Create from raw value
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Get raw value
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for LogicalTime {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for LogicalTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// Shared tick source. Every call to [`LogicalClock::tick`] returns a
/// strictly greater time than any earlier call on the same clock.
#[derive(Debug, Default)]
pub struct LogicalClock {
    next: AtomicU64,
}

impl LogicalClock {
    /// Create a clock starting at T1
    #[must_use]
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Advance and return the new time
    pub fn tick(&self) -> LogicalTime {
        LogicalTime(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// Last time handed out (zero if none)
    #[must_use]
    pub fn current(&self) -> LogicalTime {
        LogicalTime(self.next.load(Ordering::Relaxed).saturating_sub(1))
    }
}

/// Wall clock timestamp, serialized as ISO-8601 / RFC 3339 in UTC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Current wall clock time
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Parse an ISO-8601 string.
    ///
    /// Accepts RFC 3339 with an offset (`2024-01-15T10:30:00Z`,
    /// `2024-01-15T10:30:00+02:00`) and naive date-times, which are read as UTC.
    ///
    /// # Errors
    ///
    /// Returns error if the string is not a recognizable ISO-8601 date-time
    pub fn parse(value: &str) -> CoreResult<Self> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Ok(Self(dt.with_timezone(&Utc)));
        }
        NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| Self(naive.and_utc()))
            .map_err(|e| CoreError::InvalidTimestamp {
                reason: format!("{}: {}", value, e),
            })
    }

    /// Get as chrono date-time
    #[must_use]
    pub const fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Milliseconds since the Unix epoch
    #[must_use]
    pub fn as_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }

    /// Render as RFC 3339 with millisecond precision
    #[must_use]
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_rfc3339())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logical_clock_monotonic() {
        let clock = LogicalClock::new();
        assert_eq!(clock.current(), LogicalTime::zero());
        let a = clock.tick();
        let b = clock.tick();
        assert!(b > a);
        assert_eq!(clock.current(), b);
    }

    #[test]
    fn test_logical_time_display() {
        assert_eq!(LogicalTime::from_raw(7).to_string(), "T7");
    }

    #[test]
    fn test_timestamp_parse_rfc3339() {
        let ts = Timestamp::parse("2024-01-15T10:30:00Z").unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-01-15T10:30:00.000Z");

        let offset = Timestamp::parse("2024-01-15T12:30:00+02:00").unwrap();
        assert_eq!(ts, offset);
    }

    #[test]
    fn test_timestamp_parse_naive() {
        let ts = Timestamp::parse("2024-01-15T10:30:00.123456").unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-01-15T10:30:00.123Z");
    }

    #[test]
    fn test_timestamp_parse_invalid() {
        assert!(Timestamp::parse("yesterday").is_err());
        assert!(Timestamp::parse("2024-13-01T00:00:00Z").is_err());
        assert!(Timestamp::parse("").is_err());
    }

    #[test]
    fn test_timestamp_serde_roundtrip() {
        let ts = Timestamp::parse("2024-01-15T10:30:00.250Z").unwrap();
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(json, "\"2024-01-15T10:30:00.250Z\"");
        let back: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(ts, back);
    }
}
