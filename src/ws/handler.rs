//! Axum WebSocket upgrade handler for the match hub.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::IntoResponse;
use uuid::Uuid;

use super::connection::run_connection;
use crate::app_state::AppState;

/// `GET /hub/match` — Upgrade to the bidirectional push hub.
pub async fn hub_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let conn_id = Uuid::new_v4();
    let event_rx = state.hub.subscribe();
    let hub = state.hub.clone();
    let read_models = std::sync::Arc::clone(&state.read_models);

    ws.on_upgrade(move |socket| run_connection(socket, conn_id, event_rx, hub, read_models))
}
