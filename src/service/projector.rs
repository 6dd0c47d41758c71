//! Change-feed projector: materialises read models and fans derived
//! state to the hub.
//!
//! The projector is a [`ChangeHandler`] over the event container's
//! change feed. Delivery is at-least-once in per-partition commit order,
//! so every effect here is idempotent: read-model upserts are
//! deterministic in their inputs, broadcasts are re-sent harmlessly, and
//! the outbox `processedAt` patch simply overwrites.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use crate::domain::casing;
use crate::domain::documents::{DOC_TYPE_EVENT, DOC_TYPE_OUTBOX, DOC_TYPE_SNAPSHOT};
use crate::domain::{EventKind, HubEvent, StreamId};
use crate::service::read_model::{
    ReadModelService, DEFAULT_LEADERBOARD_TOP, DEFAULT_MOMENTUM_POINTS,
};
use crate::store::{retry, ChangeHandler, DocumentStore, PatchOp, StoreError, StoreResult};

/// Read-model upserts retry transient store errors this many times
/// before failing the batch (which triggers redelivery).
const UPSERT_ATTEMPTS: u32 = 4;
const UPSERT_BASE_DELAY: Duration = Duration::from_millis(50);

/// Materialises read models from the event container's change feed.
#[derive(Debug)]
pub struct Projector {
    store: Arc<dyn DocumentStore>,
    es_container: String,
    match_state_container: String,
    tes_history_container: String,
    leaderboard_container: String,
    read_models: ReadModelService,
    hub: broadcast::Sender<HubEvent>,
}

impl Projector {
    /// Creates a projector writing to the given read-model containers.
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        es_container: impl Into<String>,
        match_state_container: impl Into<String>,
        tes_history_container: impl Into<String>,
        leaderboard_container: impl Into<String>,
        read_models: ReadModelService,
        hub: broadcast::Sender<HubEvent>,
    ) -> Self {
        Self {
            store,
            es_container: es_container.into(),
            match_state_container: match_state_container.into(),
            tes_history_container: tes_history_container.into(),
            leaderboard_container: leaderboard_container.into(),
            read_models,
            hub,
        }
    }

    async fn upsert_with_retry(
        &self,
        container: &str,
        partition_key: &str,
        body: Value,
    ) -> StoreResult<()> {
        retry::with_backoff("read-model upsert", UPSERT_ATTEMPTS, UPSERT_BASE_DELAY, || {
            self.store.upsert_item(container, partition_key, body.clone())
        })
        .await?;
        Ok(())
    }

    /// Projects one snapshot document into the current-match-state read
    /// model and broadcasts the refreshed view.
    async fn project_snapshot(&self, stream_id: &StreamId, doc: &Value) -> StoreResult<()> {
        let row = json!({
            "id": stream_id.as_str(),
            "streamId": stream_id.as_str(),
            "state": casing::field(doc, "state").cloned().unwrap_or(Value::Null),
            "aggVersion": casing::field_u64(doc, "aggVersion").unwrap_or(0),
            "updatedAt": Utc::now(),
        });
        self.upsert_with_retry(&self.match_state_container, stream_id.as_str(), row)
            .await?;

        match self.read_models.get_match_state(stream_id).await {
            Ok(Some(view)) => {
                if let Ok(payload) = serde_json::to_value(&view) {
                    let _ = self.hub.send(HubEvent::MatchState {
                        stream_id: stream_id.clone(),
                        payload,
                    });
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(stream_id = %stream_id, err = %e, "match-state read-back failed");
            }
        }
        Ok(())
    }

    /// Projects one trainer-metrics event into the momentum-history and
    /// leaderboard read models and broadcasts both refreshed views.
    async fn project_metrics_event(&self, stream_id: &StreamId, doc: &Value) -> StoreResult<()> {
        let seq = casing::field_u64(doc, "seq").unwrap_or(0);
        let data = casing::field(doc, "data").cloned().unwrap_or(Value::Null);
        let ts = casing::field(doc, "ts").cloned().unwrap_or(Value::Null);

        // Row id collides by design on redelivery; the upsert makes it
        // idempotent.
        let momentum_row = json!({
            "id": format!("{stream_id}-{seq}"),
            "streamId": stream_id.as_str(),
            "metrics": data,
            "ts": ts,
        });
        self.upsert_with_retry(&self.tes_history_container, stream_id.as_str(), momentum_row)
            .await?;

        let leaderboard_row = json!({
            "id": stream_id.as_str(),
            "streamId": stream_id.as_str(),
            "metrics": casing::field(doc, "data").cloned().unwrap_or(Value::Null),
            "updatedAt": Utc::now(),
        });
        self.upsert_with_retry(&self.leaderboard_container, stream_id.as_str(), leaderboard_row)
            .await?;

        match self
            .read_models
            .get_momentum(stream_id, DEFAULT_MOMENTUM_POINTS)
            .await
        {
            Ok(Some(view)) => {
                if let Ok(payload) = serde_json::to_value(&view) {
                    let _ = self.hub.send(HubEvent::TesHistory {
                        stream_id: stream_id.clone(),
                        payload,
                    });
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(stream_id = %stream_id, err = %e, "momentum read-back failed");
            }
        }
        match self.read_models.get_leaderboard(DEFAULT_LEADERBOARD_TOP).await {
            Ok(view) => {
                if let Ok(payload) = serde_json::to_value(&view) {
                    let _ = self.hub.send(HubEvent::Leaderboard { payload });
                }
            }
            Err(e) => {
                tracing::warn!(err = %e, "leaderboard read-back failed");
            }
        }
        Ok(())
    }

    /// Broadcasts one outbox payload and marks the document processed.
    ///
    /// The marking write re-enters the change feed; those deliveries
    /// carry `processedAt` and are skipped here, which is what breaks
    /// the re-patch cycle. Genuine redeliveries carry the original body
    /// and re-broadcast, which is allowed.
    async fn project_outbox(&self, stream_id: &StreamId, doc: &Value) -> StoreResult<()> {
        if casing::field(doc, "processedAt").is_some() {
            return Ok(());
        }
        let payload = casing::field(doc, "payload").cloned().unwrap_or(Value::Null);
        let _ = self.hub.send(HubEvent::TrainerEffect {
            stream_id: stream_id.clone(),
            payload,
        });

        let Some(id) = casing::field_str(doc, "id") else {
            return Ok(());
        };
        let ops = [PatchOp::Set {
            path: "/processedAt".to_string(),
            value: json!(Utc::now()),
        }];
        match self
            .store
            .patch_item(&self.es_container, id, stream_id.as_str(), &ops)
            .await
        {
            // A purged or racing outbox is fine; the broadcast happened.
            Ok(()) | Err(StoreError::NotFound) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl ChangeHandler for Projector {
    async fn handle(&self, partition_key: &str, docs: &[Value]) -> StoreResult<()> {
        for doc in docs {
            let Some(stream_id) = casing::field_str(doc, "streamId").map(StreamId::from) else {
                tracing::warn!(partition = partition_key, "document without streamId; skipped");
                continue;
            };

            match casing::field_str(doc, "type") {
                Some(DOC_TYPE_SNAPSHOT) => self.project_snapshot(&stream_id, doc).await?,
                Some(DOC_TYPE_EVENT) => {
                    let kind = casing::field_str(doc, "kind").map(EventKind::parse);
                    if kind == Some(EventKind::TrainerMetricsCaptured) {
                        self.project_metrics_event(&stream_id, doc).await?;
                    }
                }
                Some(DOC_TYPE_OUTBOX) => {
                    let kind = casing::field_str(doc, "kind").unwrap_or_default();
                    if kind == "trainerEffect" {
                        self.project_outbox(&stream_id, doc).await?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}
