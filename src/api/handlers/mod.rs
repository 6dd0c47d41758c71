//! REST endpoint handlers organized by resource.

pub mod matches;
pub mod read_models;
pub mod system;

use axum::Router;

use crate::app_state::AppState;

/// Composes all resource routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(system::routes())
        .merge(matches::routes())
        .merge(read_models::routes())
}
