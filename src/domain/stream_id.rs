//! Type-safe stream identifier.
//!
//! [`StreamId`] is a newtype wrapper around the free-form stream key
//! (typically `match-<id>` or `afl-live`). Every document belonging to a
//! stream shares this value as its partition key.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of an event-sourced stream.
///
/// The stream id is the partition unit: all event, snapshot, and outbox
/// documents for a stream carry it as their partition key, and the store
/// serialises appends per stream through it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(String);

impl StreamId {
    /// Creates a `StreamId` from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the stream id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the stream id is the empty string.
    ///
    /// Empty stream ids are never valid targets; callers log and skip them.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for StreamId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for StreamId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn display_round_trips() {
        let id = StreamId::new("match-42");
        assert_eq!(format!("{id}"), "match-42");
        assert_eq!(id.as_str(), "match-42");
    }

    #[test]
    fn empty_is_detected() {
        assert!(StreamId::new("").is_empty());
        assert!(!StreamId::new("afl-live").is_empty());
    }

    #[test]
    fn serde_is_transparent() {
        let id = StreamId::new("m1");
        let json = serde_json::to_string(&id).ok();
        let Some(json) = json else {
            panic!("serialization failed");
        };
        assert_eq!(json, "\"m1\"");
        let back: StreamId = serde_json::from_str(&json).ok().unwrap_or_else(|| {
            panic!("deserialization failed");
        });
        assert_eq!(back, id);
    }

    #[test]
    fn hash_works_in_hashset() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(StreamId::new("a"));
        assert!(set.contains(&StreamId::new("a")));
        assert!(!set.contains(&StreamId::new("b")));
    }
}
