//! REST API layer: route handlers, DTOs, and router composition.

pub mod dto;
pub mod handlers;

use axum::Router;
use utoipa::OpenApi;

use crate::app_state::AppState;

/// OpenAPI documentation for the FanRide REST API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "fanride-backend",
        version = "0.1.0",
        description = "Event-sourced backend for the FanRide live sports telemetry platform.",
        license(name = "MIT"),
    ),
    tags(
        (name = "System", description = "Liveness and health"),
        (name = "Matches", description = "Snapshot reads and event appends"),
        (name = "ReadModels", description = "Projected momentum and leaderboard views"),
    ),
    paths(
        handlers::system::root_handler,
        handlers::system::health_handler,
        handlers::matches::get_match,
        handlers::matches::get_match_envelope,
        handlers::matches::append_events,
        handlers::matches::apply_events,
        handlers::read_models::get_momentum,
        handlers::read_models::get_leaderboard,
    ),
    components(schemas(
        crate::error::Problem,
        dto::AppendEventDto,
        dto::AppendRequest,
        dto::StreamEnvelope,
        crate::service::read_model::MatchStateView,
        crate::service::read_model::MomentumPoint,
        crate::service::read_model::MomentumView,
        crate::service::read_model::LeaderboardEntry,
        crate::service::read_model::LeaderboardView,
    ))
)]
#[derive(Debug)]
pub struct ApiDoc;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    handlers::routes()
}
