//! Shared domain types.
//!
//! Event kinds, redemption outcomes and the hour-bucket key used by the
//! statistics ledger. Persisted record shapes live next to the component
//! that owns them (codes, stats, occupancy).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::TurnstileError;

static HOUR_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})-(\d{2})$").expect("valid hour key regex"));

/// Direction of a redemption event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    /// The code holder is entering the facility.
    #[serde(alias = "enter")]
    Enter,
    /// The code holder is leaving the facility.
    #[serde(alias = "exit")]
    Exit,
}

impl EventType {
    /// Wire name, as written in JSON results.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Enter => "ENTER",
            Self::Exit => "EXIT",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Issuers write `enter`/`exit` in lower case; accept any casing.
impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "enter" => Ok(Self::Enter),
            "exit" => Ok(Self::Exit),
            other => Err(format!("unknown event type '{other}'")),
        }
    }
}

/// Why a code was not accepted.
///
/// These are expected outcomes of a redemption attempt, not failures of the
/// system. Store outages are reported separately as
/// [`StoreError`](crate::store::StoreError).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// No code was supplied.
    EmptyInput,
    /// The code does not exist (never issued, or already consumed).
    NotFound,
    /// The code document exists but lacks a required field. Left untouched.
    Malformed,
    /// The code was past its expiry. It has been consumed anyway.
    Expired,
}

impl RejectReason {
    /// Machine-readable reason code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EmptyInput => "empty_input",
            Self::NotFound => "not_found",
            Self::Malformed => "malformed",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of resolving a single access code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The code was valid and has been consumed.
    Accepted {
        /// Owner of the code.
        user_id: String,
        /// Direction encoded in the code.
        event_type: EventType,
    },
    /// The code was not accepted.
    Rejected(RejectReason),
}

impl Outcome {
    /// Returns `true` for [`Outcome::Accepted`].
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

/// Health check response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Service status.
    #[schema(example = "ok")]
    pub status: String,

    /// Service version.
    #[schema(example = "0.1.0")]
    pub version: String,

    /// Store backend in use.
    #[schema(example = "file")]
    pub store_backend: String,

    /// Timezone used for local times in audit and CLI output.
    #[schema(example = "Europe/Berlin")]
    pub timezone: String,
}

/// Key of an hourly statistics bucket: `YYYY-MM-DD-HH` in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HourKey(DateTime<Utc>);

impl HourKey {
    /// Bucket that contains `instant`.
    #[must_use]
    pub fn containing(instant: DateTime<Utc>) -> Self {
        let hour = instant
            .date_naive()
            .and_hms_opt(instant.hour(), 0, 0)
            .unwrap_or_else(|| instant.naive_utc());
        Self(Utc.from_utc_datetime(&hour))
    }

    /// The 24 buckets of a UTC calendar day, in order.
    #[must_use]
    pub fn day(date: NaiveDate) -> Vec<Self> {
        (0..24)
            .filter_map(|h| NaiveTime::from_hms_opt(h, 0, 0))
            .map(|t| Self(Utc.from_utc_datetime(&NaiveDateTime::new(date, t))))
            .collect()
    }

    /// First instant covered by this bucket.
    #[must_use]
    pub const fn start(&self) -> DateTime<Utc> {
        self.0
    }

    /// Returns `true` if `instant` falls inside this bucket.
    #[must_use]
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        Self::containing(instant) == *self
    }
}

impl fmt::Display for HourKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d-%H"))
    }
}

impl FromStr for HourKey {
    type Err = TurnstileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TurnstileError::InvalidHourKey(s.to_string());
        let caps = HOUR_KEY_RE.captures(s).ok_or_else(invalid)?;
        let field = |i: usize| -> Result<u32, TurnstileError> {
            caps.get(i)
                .and_then(|m| m.as_str().parse().ok())
                .ok_or_else(invalid)
        };

        let year = i32::try_from(field(1)?).map_err(|_| invalid())?;
        let date = NaiveDate::from_ymd_opt(year, field(2)?, field(3)?).ok_or_else(invalid)?;
        let time = NaiveTime::from_hms_opt(field(4)?, 0, 0).ok_or_else(invalid)?;

        Ok(Self(Utc.from_utc_datetime(&NaiveDateTime::new(date, time))))
    }
}

impl Serialize for HourKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for HourKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_event_type_parses_any_case() {
        assert_eq!("enter".parse::<EventType>().unwrap(), EventType::Enter);
        assert_eq!("EXIT".parse::<EventType>().unwrap(), EventType::Exit);
        assert_eq!(" Enter ".parse::<EventType>().unwrap(), EventType::Enter);
        assert!("leave".parse::<EventType>().is_err());
    }

    #[test]
    fn test_event_type_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&EventType::Enter).unwrap(), "\"ENTER\"");
        assert_eq!(serde_json::to_string(&EventType::Exit).unwrap(), "\"EXIT\"");
    }

    #[test]
    fn test_hour_key_is_zero_padded() {
        let key = HourKey::containing(at("2025-03-04T05:59:59Z"));
        assert_eq!(key.to_string(), "2025-03-04-05");
    }

    #[test]
    fn test_same_hour_same_key() {
        let a = HourKey::containing(at("2025-01-15T10:00:00Z"));
        let b = HourKey::containing(at("2025-01-15T10:59:59.999Z"));
        assert_eq!(a, b);
        assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn test_different_hours_never_collide() {
        let a = HourKey::containing(at("2025-01-15T10:59:59Z"));
        let b = HourKey::containing(at("2025-01-15T11:00:00Z"));
        let c = HourKey::containing(at("2025-01-16T10:30:00Z"));
        assert_ne!(a, b);
        assert_ne!(a.to_string(), c.to_string());
    }

    #[test]
    fn test_hour_key_uses_utc() {
        let local = DateTime::parse_from_rfc3339("2025-01-15T23:30:00-08:00").unwrap();
        let key = HourKey::containing(local.with_timezone(&Utc));
        assert_eq!(key.to_string(), "2025-01-16-07");
    }

    #[test]
    fn test_hour_key_parse_roundtrip() {
        let key: HourKey = "2024-12-31-23".parse().unwrap();
        assert_eq!(key.to_string(), "2024-12-31-23");
        assert!(key.contains(at("2024-12-31T23:15:00Z")));
    }

    #[test]
    fn test_hour_key_rejects_bad_input() {
        for bad in ["2024-12-31", "2024-13-01-00", "2024-12-31-24", "24-12-31-01", "abcd-ef-gh-ij"] {
            assert!(bad.parse::<HourKey>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn test_day_has_24_ordered_buckets() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let keys = HourKey::day(date);
        assert_eq!(keys.len(), 24);
        assert_eq!(keys[0].to_string(), "2025-06-01-00");
        assert_eq!(keys[23].to_string(), "2025-06-01-23");
    }
}
