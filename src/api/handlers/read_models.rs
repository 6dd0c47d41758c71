//! Read-model query handlers.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::app_state::AppState;
use crate::domain::StreamId;
use crate::error::{AppError, Problem};
use crate::service::read_model::{
    LeaderboardView, MomentumView, DEFAULT_LEADERBOARD_TOP, DEFAULT_MOMENTUM_POINTS,
};

/// `GET /api/readmodels/tes/{streamId}` — Momentum window.
///
/// # Errors
///
/// Returns [`AppError::NotFound`] when the stream has no momentum rows.
#[utoipa::path(
    get,
    path = "/api/readmodels/tes/{streamId}",
    tag = "ReadModels",
    summary = "Get the momentum window",
    description = "Returns the newest 60 trainer-metric points for the stream, ascending by capture time.",
    params(
        ("streamId" = String, Path, description = "Stream identifier"),
    ),
    responses(
        (status = 200, description = "Momentum window", body = MomentumView),
        (status = 404, description = "No momentum recorded for the stream", body = Problem),
    )
)]
pub async fn get_momentum(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let stream_id = StreamId::new(stream_id);
    let view = state
        .read_models
        .get_momentum(&stream_id, DEFAULT_MOMENTUM_POINTS)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no momentum for stream `{stream_id}`")))?;
    Ok(Json(view))
}

/// `GET /api/readmodels/leaderboard` — Top-10 leaderboard.
///
/// # Errors
///
/// Returns [`AppError::Store`] on infrastructure failure.
#[utoipa::path(
    get,
    path = "/api/readmodels/leaderboard",
    tag = "ReadModels",
    summary = "Get the leaderboard",
    description = "Returns the top 10 streams by most recent power output, descending.",
    responses(
        (status = 200, description = "Leaderboard", body = LeaderboardView),
    )
)]
pub async fn get_leaderboard(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let view = state
        .read_models
        .get_leaderboard(DEFAULT_LEADERBOARD_TOP)
        .await?;
    Ok(Json(view))
}

/// Read-model routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/readmodels/tes/{streamId}", get(get_momentum))
        .route("/api/readmodels/leaderboard", get(get_leaderboard))
}
