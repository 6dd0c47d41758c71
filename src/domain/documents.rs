//! Persisted document shapes for the event container.
//!
//! Three document types share the `es` container, discriminated by the
//! `type` field: immutable events, the mutable per-stream snapshot, and
//! transactional outbox records. All of them carry the stream id as
//! partition key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::event::EventKind;

/// `type` value of event documents.
pub const DOC_TYPE_EVENT: &str = "event";
/// `type` value of snapshot documents.
pub const DOC_TYPE_SNAPSHOT: &str = "snapshot";
/// `type` value of outbox documents.
pub const DOC_TYPE_OUTBOX: &str = "outbox";

/// Document id of the singleton snapshot for a stream.
#[must_use]
pub fn snapshot_id(stream_id: &str) -> String {
    format!("snap-{stream_id}")
}

/// Deterministic outbox id derived from the source event id.
///
/// The derivation makes outbox creation at-most-once: a duplicate append
/// of the same event id fails the batch on the outbox `Create`.
#[must_use]
pub fn outbox_id(event_id: &str) -> String {
    format!("out-{event_id}")
}

/// Immutable record of one accepted change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDocument {
    /// Globally unique, opaque id. Monotonicity is not required.
    pub id: String,
    /// Always [`DOC_TYPE_EVENT`].
    #[serde(rename = "type")]
    pub doc_type: String,
    /// Owning stream; partition key.
    pub stream_id: String,
    /// 1-based contiguous version within the stream.
    pub seq: u64,
    /// Payload discriminator.
    pub kind: EventKind,
    /// Kind-shaped payload.
    pub data: Value,
    /// UTC write time.
    pub ts: DateTime<Utc>,
}

/// Mutable singleton holding the materialised aggregate state.
///
/// The store attaches an opaque ETag that changes on every write; the
/// snapshot is the sole optimistic-concurrency token holder for a stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotDocument {
    /// `snap-<streamId>`.
    pub id: String,
    /// Always [`DOC_TYPE_SNAPSHOT`].
    #[serde(rename = "type")]
    pub doc_type: String,
    /// Owning stream; partition key.
    pub stream_id: String,
    /// Largest event `seq` contributing to `state`. Never decreases.
    pub agg_version: u64,
    /// Full aggregate state at `agg_version`.
    pub state: Value,
    /// UTC time of the last write.
    pub updated_at: DateTime<Utc>,
}

impl SnapshotDocument {
    /// Builds the snapshot body for a stream at the given version.
    #[must_use]
    pub fn new(stream_id: &str, agg_version: u64, state: Value, updated_at: DateTime<Utc>) -> Self {
        Self {
            id: snapshot_id(stream_id),
            doc_type: DOC_TYPE_SNAPSHOT.to_string(),
            stream_id: stream_id.to_string(),
            agg_version,
            state,
            updated_at,
        }
    }
}

/// Transactional side-effect record, created in the same batch as its
/// source event and marked (never deleted) once the projector has
/// broadcast it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxDocument {
    /// `out-<eventId>`.
    pub id: String,
    /// Always [`DOC_TYPE_OUTBOX`].
    #[serde(rename = "type")]
    pub doc_type: String,
    /// Owning stream; partition key.
    pub stream_id: String,
    /// Effect discriminator, e.g. `trainerEffect`.
    pub kind: String,
    /// Effect payload forwarded to hub subscribers.
    pub payload: Value,
    /// UTC creation time.
    pub ts: DateTime<Utc>,
    /// Set by the projector after the broadcast; overwritten on redelivery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn snapshot_id_is_prefixed() {
        assert_eq!(snapshot_id("m1"), "snap-m1");
    }

    #[test]
    fn outbox_id_is_derived_from_event_id() {
        assert_eq!(outbox_id("evt-7"), "out-evt-7");
    }

    #[test]
    fn event_document_serialises_camel_case() {
        let doc = EventDocument {
            id: "e1".to_string(),
            doc_type: DOC_TYPE_EVENT.to_string(),
            stream_id: "m1".to_string(),
            seq: 3,
            kind: EventKind::MatchStateUpdated,
            data: json!({ "score": { "home": 1, "away": 0 } }),
            ts: Utc::now(),
        };
        let value = serde_json::to_value(&doc).ok();
        let Some(value) = value else {
            panic!("serialization failed");
        };
        assert_eq!(value["type"], "event");
        assert_eq!(value["streamId"], "m1");
        assert_eq!(value["seq"], 3);
        assert_eq!(value["kind"], "MatchStateUpdated");
    }

    #[test]
    fn snapshot_body_carries_version_and_state() {
        let snap = SnapshotDocument::new("m1", 4, json!({ "quarter": 2 }), Utc::now());
        assert_eq!(snap.id, "snap-m1");
        assert_eq!(snap.agg_version, 4);
        let value = serde_json::to_value(&snap).ok();
        let Some(value) = value else {
            panic!("serialization failed");
        };
        assert_eq!(value["aggVersion"], 4);
        assert_eq!(value["type"], "snapshot");
    }

    #[test]
    fn unprocessed_outbox_omits_processed_at() {
        let outbox = OutboxDocument {
            id: outbox_id("e1"),
            doc_type: DOC_TYPE_OUTBOX.to_string(),
            stream_id: "m1".to_string(),
            kind: "trainerEffect".to_string(),
            payload: json!({ "watts": 280 }),
            ts: Utc::now(),
            processed_at: None,
        };
        let value = serde_json::to_value(&outbox).ok();
        let Some(value) = value else {
            panic!("serialization failed");
        };
        assert!(value.get("processedAt").is_none());
    }
}
