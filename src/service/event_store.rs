//! Event store: atomic per-stream append of events, snapshot, and outbox.
//!
//! One append is one transactional batch on the stream's partition:
//! an optimistic guard on the snapshot, the event creates, the real
//! snapshot upsert, and the outbox creates. The store's ETag and
//! unique-id guarantees are the only serialisation point; there is no
//! in-process locking per stream.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use crate::domain::documents::{
    outbox_id, snapshot_id, EventDocument, OutboxDocument, SnapshotDocument, DOC_TYPE_EVENT,
    DOC_TYPE_OUTBOX,
};
use crate::domain::{EventKind, StreamId};
use crate::error::AppError;
use crate::store::{DocumentStore, StoreError, TransactionalBatch};

/// One event to append, before a sequence number is assigned.
#[derive(Debug, Clone)]
pub struct NewEvent {
    /// Globally unique, caller-supplied event id.
    pub id: String,
    /// Payload discriminator.
    pub kind: EventKind,
    /// Kind-shaped payload.
    pub data: Value,
}

/// A snapshot read together with its concurrency token.
#[derive(Debug, Clone)]
pub struct SnapshotRead {
    /// The typed snapshot document.
    pub snapshot: SnapshotDocument,
    /// Current ETag, passed back as `expected_etag` on append.
    pub etag: String,
}

/// Append-side API over the event container.
#[derive(Debug, Clone)]
pub struct EventStore {
    store: Arc<dyn DocumentStore>,
    container: String,
}

impl EventStore {
    /// Creates an event store over the given container.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, container: impl Into<String>) -> Self {
        Self {
            store,
            container: container.into(),
        }
    }

    /// Reads the current snapshot for a stream, or `None` for a brand-new
    /// stream.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Store`] on infrastructure failure; a missing
    /// snapshot is `Ok(None)`, never an error.
    pub async fn read_snapshot(
        &self,
        stream_id: &StreamId,
    ) -> Result<Option<SnapshotRead>, AppError> {
        let id = snapshot_id(stream_id.as_str());
        match self
            .store
            .read_item(&self.container, &id, stream_id.as_str())
            .await
        {
            Ok(read) => {
                let snapshot: SnapshotDocument =
                    serde_json::from_value(read.body).map_err(|e| {
                        AppError::Internal(format!(
                            "malformed snapshot document for stream `{stream_id}`: {e}"
                        ))
                    })?;
                Ok(Some(SnapshotRead {
                    snapshot,
                    etag: read.etag,
                }))
            }
            Err(StoreError::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Appends `events` to a stream and replaces its snapshot, atomically.
    ///
    /// `expected_version` is the last known aggregate version (0 for a
    /// brand-new stream); `expected_etag` is the last observed snapshot
    /// ETag, or `None` for first creation. Events receive
    /// `seq = expected_version + 1 ..= expected_version + len`.
    ///
    /// # Errors
    ///
    /// - [`AppError::Concurrency`] when the guard fails: the snapshot
    ///   ETag moved, or a snapshot already exists for a `None` etag. The
    ///   caller must re-read, re-derive, and retry.
    /// - [`AppError::Validation`] for an empty event list or empty
    ///   stream id.
    /// - [`AppError::Store`] for throttled/transient/fatal store errors.
    pub async fn append_with_snapshot(
        &self,
        stream_id: &StreamId,
        expected_version: u64,
        expected_etag: Option<&str>,
        snapshot_state: Value,
        events: Vec<NewEvent>,
    ) -> Result<(), AppError> {
        if stream_id.is_empty() {
            return Err(AppError::Validation("stream id must not be empty".to_string()));
        }
        if events.is_empty() {
            return Err(AppError::Validation(
                "append requires at least one event".to_string(),
            ));
        }

        let now = Utc::now();
        let len = events.len() as u64;
        let snap_id = snapshot_id(stream_id.as_str());
        let snapshot = SnapshotDocument::new(
            stream_id.as_str(),
            expected_version + len,
            snapshot_state,
            now,
        );
        let snapshot_body = serde_json::to_value(&snapshot)
            .map_err(|e| AppError::Internal(format!("snapshot serialisation failed: {e}")))?;

        // Step 1: optimistic guard. The guard body is the full real
        // snapshot, so the batch stays correct even if a store reorders
        // the guard relative to the upsert in step 3.
        let mut batch = match expected_etag {
            Some(etag) => {
                TransactionalBatch::new().replace(&snap_id, snapshot_body.clone(), etag)
            }
            None => TransactionalBatch::new().create(&snap_id, snapshot_body.clone()),
        };

        // Step 2: event creates in order.
        let mut outbox_docs = Vec::new();
        for (i, event) in events.into_iter().enumerate() {
            let seq = expected_version + 1 + i as u64;
            if let Some(kind) = event.kind.outbox_kind() {
                outbox_docs.push(OutboxDocument {
                    id: outbox_id(&event.id),
                    doc_type: DOC_TYPE_OUTBOX.to_string(),
                    stream_id: stream_id.to_string(),
                    kind: kind.to_string(),
                    payload: event.data.clone(),
                    ts: now,
                    processed_at: None,
                });
            }
            let doc = EventDocument {
                id: event.id,
                doc_type: DOC_TYPE_EVENT.to_string(),
                stream_id: stream_id.to_string(),
                seq,
                kind: event.kind,
                data: event.data,
                ts: now,
            };
            let body = serde_json::to_value(&doc)
                .map_err(|e| AppError::Internal(format!("event serialisation failed: {e}")))?;
            batch = batch.create(doc.id.clone(), body);
        }

        // Step 3: authoritative snapshot upsert, overriding the guard.
        batch = batch.upsert(&snap_id, snapshot_body);

        // Step 4: outbox creates with deterministic ids (at-most-once).
        for outbox in outbox_docs {
            let body = serde_json::to_value(&outbox)
                .map_err(|e| AppError::Internal(format!("outbox serialisation failed: {e}")))?;
            batch = batch.create(outbox.id.clone(), body);
        }

        match self
            .store
            .execute_batch(&self.container, stream_id.as_str(), batch)
            .await
        {
            Ok(()) => {
                tracing::debug!(
                    stream_id = %stream_id,
                    version = expected_version + len,
                    events = len,
                    "appended events"
                );
                Ok(())
            }
            Err(e) if e.is_concurrency() => Err(AppError::Concurrency(format!(
                "append to stream `{stream_id}` at version {expected_version} lost the race: {e}"
            ))),
            Err(e) => Err(e.into()),
        }
    }
}
