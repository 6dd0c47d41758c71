//! Match stream handlers: snapshot reads and event appends.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{AppendRequest, StreamEnvelope};
use crate::app_state::AppState;
use crate::domain::{EventKind, HubEvent, MatchState, StreamId};
use crate::error::{AppError, Problem};
use crate::service::event_store::SnapshotRead;
use crate::service::NewEvent;

/// `GET /api/matches/{streamId}` — Current snapshot state.
///
/// # Errors
///
/// Returns [`AppError::NotFound`] for an unknown stream.
#[utoipa::path(
    get,
    path = "/api/matches/{streamId}",
    tag = "Matches",
    summary = "Get current match state",
    description = "Returns the aggregate state of the stream's current snapshot.",
    params(
        ("streamId" = String, Path, description = "Stream identifier"),
    ),
    responses(
        (status = 200, description = "Current aggregate state", body = serde_json::Value),
        (status = 404, description = "Unknown stream", body = Problem),
    )
)]
pub async fn get_match(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let stream_id = StreamId::new(stream_id);
    let read = require_snapshot(&state, &stream_id).await?;
    Ok(Json(read.snapshot.state))
}

/// `GET /api/afl/matches/{streamId}` — Versioned stream envelope.
///
/// # Errors
///
/// Returns [`AppError::NotFound`] for an unknown stream.
#[utoipa::path(
    get,
    path = "/api/afl/matches/{streamId}",
    tag = "Matches",
    summary = "Get stream envelope",
    description = "Returns the snapshot state together with the aggregate version and ETag needed for the next append.",
    params(
        ("streamId" = String, Path, description = "Stream identifier"),
    ),
    responses(
        (status = 200, description = "Stream envelope", body = StreamEnvelope),
        (status = 404, description = "Unknown stream", body = Problem),
    )
)]
pub async fn get_match_envelope(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let stream_id = StreamId::new(stream_id);
    let read = require_snapshot(&state, &stream_id).await?;
    Ok(Json(envelope(&stream_id, read)))
}

/// `POST /api/matches/{streamId}/events` — Append events.
///
/// # Errors
///
/// Returns [`AppError::Concurrency`] (412) when the optimistic guard
/// fails; the client must re-read and re-submit.
#[utoipa::path(
    post,
    path = "/api/matches/{streamId}/events",
    tag = "Matches",
    summary = "Append events to a stream",
    description = "Appends events and replaces the snapshot in one atomic batch, guarded by the expected version and ETag.",
    params(
        ("streamId" = String, Path, description = "Stream identifier"),
    ),
    request_body = AppendRequest,
    responses(
        (status = 202, description = "Events accepted"),
        (status = 400, description = "Invalid request", body = Problem),
        (status = 412, description = "Version or ETag conflict", body = Problem),
    )
)]
pub async fn append_events(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
    Json(request): Json<AppendRequest>,
) -> Result<impl IntoResponse, AppError> {
    let stream_id = StreamId::new(stream_id);
    do_append(&state, &stream_id, &request).await?;
    Ok(StatusCode::ACCEPTED)
}

/// `POST /api/afl/matches/{streamId}/apply` — Append and return the
/// resulting envelope.
///
/// # Errors
///
/// Returns [`AppError::Concurrency`] (412) when the optimistic guard
/// fails.
#[utoipa::path(
    post,
    path = "/api/afl/matches/{streamId}/apply",
    tag = "Matches",
    summary = "Apply events and return the new envelope",
    description = "Same body as the append route; on success returns the post-append stream envelope.",
    params(
        ("streamId" = String, Path, description = "Stream identifier"),
    ),
    request_body = AppendRequest,
    responses(
        (status = 200, description = "Post-append envelope", body = StreamEnvelope),
        (status = 400, description = "Invalid request", body = Problem),
        (status = 412, description = "Version or ETag conflict", body = Problem),
    )
)]
pub async fn apply_events(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
    Json(request): Json<AppendRequest>,
) -> Result<impl IntoResponse, AppError> {
    let stream_id = StreamId::new(stream_id);
    do_append(&state, &stream_id, &request).await?;
    let read = require_snapshot(&state, &stream_id).await?;
    Ok(Json(envelope(&stream_id, read)))
}

/// Match stream routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/matches/{streamId}", get(get_match))
        .route("/api/matches/{streamId}/events", post(append_events))
        .route("/api/afl/matches/{streamId}", get(get_match_envelope))
        .route("/api/afl/matches/{streamId}/apply", post(apply_events))
}

/// Runs one append and broadcasts the new match state when the snapshot
/// is match-shaped. The projector broadcasts again once the change feed
/// catches up; both pushes are idempotent for clients.
async fn do_append(
    state: &AppState,
    stream_id: &StreamId,
    request: &AppendRequest,
) -> Result<(), AppError> {
    let events: Vec<NewEvent> = request
        .events
        .iter()
        .map(|event| NewEvent {
            id: event.id.clone(),
            kind: EventKind::parse(&event.kind),
            data: event.payload.clone(),
        })
        .collect();

    state
        .event_store
        .append_with_snapshot(
            stream_id,
            request.expected_version,
            request.etag(),
            request.snapshot.clone(),
            events,
        )
        .await?;

    if let Some(match_state) = MatchState::from_value(&request.snapshot) {
        let _ = state.hub.send(HubEvent::MatchState {
            stream_id: stream_id.clone(),
            payload: serde_json::json!({
                "streamId": stream_id.as_str(),
                "scoreHome": match_state.score.home,
                "scoreAway": match_state.score.away,
                "quarter": match_state.quarter,
                "clock": match_state.clock,
                "updatedAt": chrono::Utc::now(),
            }),
        });
    }
    Ok(())
}

async fn require_snapshot(
    state: &AppState,
    stream_id: &StreamId,
) -> Result<SnapshotRead, AppError> {
    state
        .event_store
        .read_snapshot(stream_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("stream `{stream_id}` has no snapshot")))
}

fn envelope(stream_id: &StreamId, read: SnapshotRead) -> StreamEnvelope {
    StreamEnvelope {
        stream_id: stream_id.to_string(),
        aggregate_version: read.snapshot.agg_version,
        etag: read.etag,
        state: read.snapshot.state,
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::service::read_model::ReadModelContainers;
    use crate::service::{EventStore, ReadModelService};
    use crate::store::{DocumentStore, MemoryStore};
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::broadcast;

    fn app_state() -> AppState {
        let store = Arc::new(MemoryStore::new()) as Arc<dyn DocumentStore>;
        let read_models = ReadModelService::new(
            Arc::clone(&store),
            ReadModelContainers {
                match_state: "rm_match_state".to_string(),
                tes_history: "rm_tes_history".to_string(),
                leaderboard: "rm_leaderboard".to_string(),
            },
        );
        AppState {
            event_store: Arc::new(EventStore::new(Arc::clone(&store), "es")),
            read_models: Arc::new(read_models),
            hub: broadcast::channel(16).0,
            es_container: "es".to_string(),
            store,
        }
    }

    fn fresh_request() -> AppendRequest {
        serde_json::from_value(json!({
            "expectedVersion": 0,
            "expectedEtag": "",
            "snapshot": { "score": { "home": 0, "away": 1 }, "quarter": 1, "clock": "01:23" },
            "events": [ { "id": "e1", "kind": "MatchStateUpdated",
                          "payload": { "score": { "home": 0, "away": 1 } } } ],
        }))
        .ok()
        .unwrap_or_else(|| panic!("request build failed"))
    }

    #[tokio::test]
    async fn fresh_append_then_read_back() {
        let state = app_state();
        let stream = StreamId::new("m1");

        let Ok(()) = do_append(&state, &stream, &fresh_request()).await else {
            panic!("append failed");
        };

        let Ok(read) = require_snapshot(&state, &stream).await else {
            panic!("snapshot missing");
        };
        assert_eq!(read.snapshot.state["score"]["away"], 1);
        assert_eq!(read.snapshot.agg_version, 1);
    }

    #[tokio::test]
    async fn replayed_append_conflicts_with_412() {
        let state = app_state();
        let stream = StreamId::new("m1");

        let Ok(()) = do_append(&state, &stream, &fresh_request()).await else {
            panic!("append failed");
        };
        let result = do_append(&state, &stream, &fresh_request()).await;
        let Err(err) = result else {
            panic!("expected conflict");
        };
        assert_eq!(err.status_code(), StatusCode::PRECONDITION_FAILED);
    }

    #[tokio::test]
    async fn append_with_current_etag_succeeds() {
        let state = app_state();
        let stream = StreamId::new("m1");

        let Ok(()) = do_append(&state, &stream, &fresh_request()).await else {
            panic!("append failed");
        };
        let Ok(read) = require_snapshot(&state, &stream).await else {
            panic!("snapshot missing");
        };

        let next: AppendRequest = serde_json::from_value(json!({
            "expectedVersion": read.snapshot.agg_version,
            "expectedEtag": read.etag,
            "snapshot": { "score": { "home": 1, "away": 1 }, "quarter": 1, "clock": "05:00" },
            "events": [ { "id": "e2", "kind": "matchstateupdated", "payload": {} } ],
        }))
        .ok()
        .unwrap_or_else(|| panic!("request build failed"));

        let Ok(()) = do_append(&state, &stream, &next).await else {
            panic!("second append failed");
        };
        let Ok(read) = require_snapshot(&state, &stream).await else {
            panic!("snapshot missing");
        };
        assert_eq!(read.snapshot.agg_version, 2);
        assert_eq!(read.snapshot.state["score"]["home"], 1);
    }

    #[tokio::test]
    async fn missing_stream_is_not_found() {
        let state = app_state();
        let result = require_snapshot(&state, &StreamId::new("ghost")).await;
        let Err(err) = result else {
            panic!("expected not found");
        };
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn successful_append_broadcasts_match_state() {
        let state = app_state();
        let mut rx = state.hub.subscribe();

        let Ok(()) = do_append(&state, &StreamId::new("m1"), &fresh_request()).await else {
            panic!("append failed");
        };

        let Ok(event) = rx.try_recv() else {
            panic!("expected broadcast");
        };
        assert_eq!(event.event_name(), "matchState");
        assert_eq!(event.payload()["scoreAway"], 1);
    }

    #[tokio::test]
    async fn envelope_carries_version_and_etag() {
        let state = app_state();
        let stream = StreamId::new("m1");
        let Ok(()) = do_append(&state, &stream, &fresh_request()).await else {
            panic!("append failed");
        };

        let Ok(read) = require_snapshot(&state, &stream).await else {
            panic!("snapshot missing");
        };
        let etag = read.etag.clone();
        let env = envelope(&stream, read);
        assert_eq!(env.stream_id, "m1");
        assert_eq!(env.aggregate_version, 1);
        assert_eq!(env.etag, etag);
        assert_eq!(env.state["clock"], "01:23");
    }
}
