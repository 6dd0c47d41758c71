//! Ingestion worker: polls the external scoreboard feed and coalesces it
//! into idempotent appends.
//!
//! The worker owns no state between iterations; it is safe to run
//! multiple instances because the snapshot's optimistic guard serialises
//! them. A feed state equal to the current snapshot produces no append.

use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::{broadcast, watch};
use uuid::Uuid;

use crate::config::AflFeedConfig;
use crate::domain::{EventKind, HubEvent, MatchState, StreamId};
use crate::error::AppError;
use crate::service::event_store::{EventStore, NewEvent};

/// Extra attempts after a concurrency failure.
const CONCURRENCY_RETRIES: u32 = 2;
/// Delay between concurrency retries.
const RETRY_DELAY: Duration = Duration::from_millis(200);

/// Long-running feed poller for one stream.
#[derive(Debug)]
pub struct IngestWorker {
    config: AflFeedConfig,
    stream_id: StreamId,
    http: reqwest::Client,
    event_store: EventStore,
    hub: broadcast::Sender<HubEvent>,
}

impl IngestWorker {
    /// Creates a worker for the configured stream.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Internal`] when the HTTP client cannot be
    /// built.
    pub fn new(
        config: AflFeedConfig,
        event_store: EventStore,
        hub: broadcast::Sender<HubEvent>,
    ) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build feed http client: {e}")))?;
        let stream_id = StreamId::new(config.stream_id.clone());
        Ok(Self {
            config,
            stream_id,
            http,
            event_store,
            hub,
        })
    }

    /// Runs the poll loop until `shutdown` flips to `true`.
    ///
    /// Each iteration completes before the loop observes cancellation, so
    /// an in-flight append is never abandoned.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        if !self.config.enabled || self.stream_id.is_empty() {
            tracing::info!("ingestion worker disabled");
            return;
        }
        tracing::info!(
            stream_id = %self.stream_id,
            endpoint = %self.config.endpoint,
            interval_secs = self.config.poll_interval_secs,
            "ingestion worker started"
        );

        let interval = Duration::from_secs(self.config.poll_interval_secs.max(1));
        loop {
            self.run_once().await;

            tokio::select! {
                () = tokio::time::sleep(interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!(stream_id = %self.stream_id, "ingestion worker stopped");
    }

    /// One iteration: fetch, compare, maybe append. Errors never escape;
    /// they are logged and the next iteration starts fresh.
    async fn run_once(&self) {
        let Some(fetched) = self.fetch_feed().await else {
            return;
        };
        if let Err(e) = self.sync_state(&fetched).await {
            tracing::warn!(stream_id = %self.stream_id, err = %e, "feed sync failed");
        }
    }

    /// Fetches and parses the external feed. Any failure logs a warning
    /// and yields no update.
    async fn fetch_feed(&self) -> Option<MatchState> {
        let mut request = self.http.get(&self.config.endpoint);
        if !self.config.api_key.is_empty() {
            request = request.header(&self.config.api_key_header, &self.config.api_key);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(err = %e, "feed fetch failed");
                return None;
            }
        };
        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "feed returned non-success status");
            return None;
        }

        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(err = %e, "feed body is not valid JSON");
                return None;
            }
        };
        let state = MatchState::from_value(&body);
        if state.is_none() {
            tracing::warn!("feed body is not match-state shaped");
        }
        state
    }

    /// Appends one `MatchStateUpdated` event when the feed state differs
    /// from the current snapshot, retrying on concurrency failures.
    ///
    /// # Errors
    ///
    /// Returns the final [`AppError`] after retries are exhausted.
    pub async fn sync_state(&self, fetched: &MatchState) -> Result<(), AppError> {
        let mut attempts_left = CONCURRENCY_RETRIES + 1;
        loop {
            let read = self.event_store.read_snapshot(&self.stream_id).await?;
            let (expected_version, expected_etag, current) = match &read {
                Some(read) => (
                    read.snapshot.agg_version,
                    Some(read.etag.as_str()),
                    MatchState::from_value(&read.snapshot.state),
                ),
                None => (0, None, None),
            };

            // Structural equality of aggregate fields: nothing to do.
            if current.as_ref() == Some(fetched) {
                tracing::debug!(stream_id = %self.stream_id, "feed state unchanged");
                return Ok(());
            }

            let state = serde_json::to_value(fetched)
                .map_err(|e| AppError::Internal(format!("state serialisation failed: {e}")))?;
            let event = NewEvent {
                id: Uuid::new_v4().to_string(),
                kind: EventKind::MatchStateUpdated,
                data: state.clone(),
            };

            match self
                .event_store
                .append_with_snapshot(
                    &self.stream_id,
                    expected_version,
                    expected_etag,
                    state,
                    vec![event],
                )
                .await
            {
                Ok(()) => {
                    tracing::info!(
                        stream_id = %self.stream_id,
                        version = expected_version + 1,
                        "ingested feed update"
                    );
                    let _ = self.hub.send(HubEvent::MatchState {
                        stream_id: self.stream_id.clone(),
                        payload: match_state_payload(&self.stream_id, fetched),
                    });
                    return Ok(());
                }
                Err(AppError::Concurrency(msg)) => {
                    attempts_left -= 1;
                    if attempts_left == 0 {
                        return Err(AppError::Concurrency(msg));
                    }
                    // A concurrent ingester or manual append moved the
                    // stream forward; re-read and re-derive.
                    tracing::debug!(stream_id = %self.stream_id, "append lost race; retrying");
                    tokio::time::sleep(RETRY_DELAY).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Flattened `matchState` broadcast payload for a freshly appended state.
fn match_state_payload(stream_id: &StreamId, state: &MatchState) -> Value {
    json!({
        "streamId": stream_id.as_str(),
        "scoreHome": state.score.home,
        "scoreAway": state.score.away,
        "quarter": state.quarter,
        "clock": state.clock,
        "updatedAt": Utc::now(),
    })
}
