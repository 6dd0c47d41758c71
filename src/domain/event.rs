//! Event kinds and aggregate state.
//!
//! The event payload is a tagged union serialised as `kind` + `data`.
//! Known kinds are matched case-insensitively; anything else passes
//! through as a generic payload so foreign producers are not rejected.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use super::casing;

/// Discriminator for the event payload union.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// The scoreboard snapshot changed (new score, quarter, or clock).
    MatchStateUpdated,
    /// A connected trainer submitted a metrics sample.
    TrainerMetricsCaptured,
    /// Unknown kind passed through unmodified.
    Generic(String),
}

impl EventKind {
    /// Parses a kind string, matching known kinds case-insensitively.
    #[must_use]
    pub fn parse(kind: &str) -> Self {
        if kind.eq_ignore_ascii_case("MatchStateUpdated") {
            Self::MatchStateUpdated
        } else if kind.eq_ignore_ascii_case("TrainerMetricsCaptured") {
            Self::TrainerMetricsCaptured
        } else {
            Self::Generic(kind.to_string())
        }
    }

    /// Returns the canonical kind string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::MatchStateUpdated => "MatchStateUpdated",
            Self::TrainerMetricsCaptured => "TrainerMetricsCaptured",
            Self::Generic(kind) => kind,
        }
    }

    /// Returns the outbox kind this event implies, if any.
    ///
    /// Only `TrainerMetricsCaptured` produces a transactional side-effect
    /// record today.
    #[must_use]
    pub fn outbox_kind(&self) -> Option<&'static str> {
        match self {
            Self::TrainerMetricsCaptured => Some("trainerEffect"),
            Self::MatchStateUpdated | Self::Generic(_) => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for EventKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let kind = String::deserialize(deserializer)?;
        if kind.is_empty() {
            return Err(D::Error::custom("event kind must not be empty"));
        }
        Ok(Self::parse(&kind))
    }
}

/// Score pair of the canonical aggregate state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    /// Home side score.
    pub home: i64,
    /// Away side score.
    pub away: i64,
}

/// Canonical aggregate state for a match stream.
///
/// Trainer metrics never mutate this; they flow through as events only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchState {
    /// Current score.
    pub score: Score,
    /// Current quarter (1-based).
    pub quarter: u32,
    /// Game clock, `mm:ss`.
    pub clock: String,
}

impl MatchState {
    /// Tolerantly extracts a `MatchState` from an arbitrary state value.
    ///
    /// Accepts camelCase and PascalCase field names. Returns `None` when
    /// the value is not match-state shaped (e.g. a generic stream).
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        let score = casing::field(value, "score")?;
        let home = casing::field_i64(score, "home")?;
        let away = casing::field_i64(score, "away")?;
        let quarter = casing::field_u64(value, "quarter").unwrap_or(0);
        let clock = casing::field_str(value, "clock").unwrap_or_default();
        Some(Self {
            score: Score { home, away },
            quarter: u32::try_from(quarter).unwrap_or(u32::MAX),
            clock: clock.to_string(),
        })
    }
}

/// Trainer metrics sample as carried in `TrainerMetricsCaptured` data
/// and in the projected `metrics` field of read-model rows.
#[derive(Debug, Clone)]
pub struct TrainerMetrics {
    /// Rider submitting the sample, when known.
    pub rider_id: Option<String>,
    /// Instantaneous power output in watts.
    pub watts: f64,
    /// Pedalling cadence in rpm.
    pub cadence: f64,
    /// Heart rate in bpm.
    pub heart_rate: f64,
    /// Capture time on the trainer agent, when present and well-formed.
    pub captured_at: Option<DateTime<Utc>>,
}

impl TrainerMetrics {
    /// Tolerantly extracts a metrics sample from an event `data` or
    /// read-model `metrics` value.
    ///
    /// Accepts camelCase and PascalCase field names. Missing numerics
    /// default to 0; a missing or malformed timestamp is `None` so the
    /// caller can fall back to the row's write time.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        Self {
            rider_id: casing::field_str(value, "riderId").map(str::to_string),
            watts: casing::field_f64(value, "watts").unwrap_or(0.0),
            cadence: casing::field_f64(value, "cadence").unwrap_or(0.0),
            heart_rate: casing::field_f64(value, "heartRate").unwrap_or(0.0),
            captured_at: casing::field_str(value, "capturedAt")
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }
}
