//! Hub connection state machine.
//!
//! Handles the read/write loop for a single hub connection: dispatches
//! client commands (`sendMetrics`, `subscribeToStream`) and forwards
//! server pushes filtered by the connection's stream groups.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::messages::{ClientMessage, ServerMessage};
use super::subscription::StreamSubscriptions;
use crate::domain::hub_event::{EVENT_LEADERBOARD, EVENT_MATCH_STATE, EVENT_TES_HISTORY};
use crate::domain::{HubEvent, StreamId};
use crate::service::read_model::{DEFAULT_LEADERBOARD_TOP, DEFAULT_MOMENTUM_POINTS};
use crate::service::ReadModelService;

/// Runs the read/write loop for a single hub connection.
pub async fn run_connection(
    socket: WebSocket,
    conn_id: Uuid,
    mut event_rx: broadcast::Receiver<HubEvent>,
    hub: broadcast::Sender<HubEvent>,
    read_models: Arc<ReadModelService>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut subs = StreamSubscriptions::new();

    tracing::debug!(%conn_id, "hub connection opened");

    loop {
        tokio::select! {
            // Incoming command from the client
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let replies =
                            handle_client_message(&text, conn_id, &mut subs, &hub, &read_models)
                                .await;
                        for reply in replies {
                            if ws_tx.send(Message::text(reply.to_json())).await.is_err() {
                                return;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
            // Server push from the bus
            event = event_rx.recv() => {
                match event {
                    Ok(event) => {
                        if should_deliver(&event, conn_id, &subs) {
                            let msg =
                                ServerMessage::new(event.event_name(), event.payload().clone());
                            if ws_tx.send(Message::text(msg.to_json())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(%conn_id, lagged = n, "hub client lagged behind bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    tracing::debug!(%conn_id, "hub connection closed");
}

/// Decides whether one push reaches this connection.
///
/// Metrics exclude the sender; stream-scoped pushes require group
/// membership; the leaderboard reaches everyone.
pub(crate) fn should_deliver(
    event: &HubEvent,
    conn_id: Uuid,
    subs: &StreamSubscriptions,
) -> bool {
    if let HubEvent::Metrics { sender, .. } = event {
        return *sender != conn_id;
    }
    match event.stream_id() {
        Some(stream_id) => subs.matches(stream_id),
        None => true,
    }
}

/// Handles one client text frame, returning the replies to send.
pub(crate) async fn handle_client_message(
    text: &str,
    conn_id: Uuid,
    subs: &mut StreamSubscriptions,
    hub: &broadcast::Sender<HubEvent>,
    read_models: &ReadModelService,
) -> Vec<ServerMessage> {
    let msg = match serde_json::from_str::<ClientMessage>(text) {
        Ok(msg) => msg,
        Err(e) => {
            return vec![ServerMessage::new(
                "error",
                json!({ "code": 400, "message": format!("malformed command: {e}") }),
            )];
        }
    };

    match msg {
        ClientMessage::SendMetrics {
            watts,
            cadence,
            heart_rate,
        } => {
            let _ = hub.send(HubEvent::Metrics {
                sender: conn_id,
                payload: json!({ "watts": watts, "cadence": cadence, "heartRate": heart_rate }),
            });
            Vec::new()
        }
        ClientMessage::SubscribeToStream { stream_id } => {
            let stream_id = StreamId::new(stream_id);
            if stream_id.is_empty() {
                tracing::warn!(%conn_id, "subscribe with empty stream id ignored");
                return Vec::new();
            }
            subs.subscribe(stream_id.clone());
            prime_subscriber(&stream_id, read_models).await
        }
    }
}

/// Builds the subscribe-time priming pushes: current match state, the
/// momentum window when present, and the leaderboard.
async fn prime_subscriber(
    stream_id: &StreamId,
    read_models: &ReadModelService,
) -> Vec<ServerMessage> {
    let mut replies = Vec::new();

    match read_models.get_match_state(stream_id).await {
        Ok(Some(view)) => {
            if let Ok(payload) = serde_json::to_value(&view) {
                replies.push(ServerMessage::new(EVENT_MATCH_STATE, payload));
            }
        }
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(stream_id = %stream_id, err = %e, "priming match state failed");
        }
    }

    match read_models
        .get_momentum(stream_id, DEFAULT_MOMENTUM_POINTS)
        .await
    {
        Ok(Some(view)) => {
            if let Ok(payload) = serde_json::to_value(&view) {
                replies.push(ServerMessage::new(EVENT_TES_HISTORY, payload));
            }
        }
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(stream_id = %stream_id, err = %e, "priming momentum failed");
        }
    }

    match read_models.get_leaderboard(DEFAULT_LEADERBOARD_TOP).await {
        Ok(view) => {
            if let Ok(payload) = serde_json::to_value(&view) {
                replies.push(ServerMessage::new(EVENT_LEADERBOARD, payload));
            }
        }
        Err(e) => {
            tracing::warn!(err = %e, "priming leaderboard failed");
        }
    }

    replies
}
