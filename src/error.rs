//! Central error type with HTTP (problem-details) mapping.
//!
//! [`AppError`] is the error surface of the service layer and the REST
//! handlers. Each variant maps to an HTTP status and renders as an
//! RFC-7807 style problem document.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::store::StoreError;

/// Problem-details response body returned for every error.
///
/// ```json
/// {
///   "status": 412,
///   "title": "concurrency conflict",
///   "detail": "snapshot etag moved for stream `m1`"
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct Problem {
    /// HTTP status code.
    pub status: u16,
    /// Short, stable category name.
    pub title: String,
    /// Human-readable error message.
    pub detail: String,
}

/// Server-side error enum with HTTP status code mapping.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Requested stream or read model does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Request validation failed.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Optimistic-concurrency failure on an append. The caller must
    /// re-read the snapshot and re-submit.
    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    /// Store failure propagated from the adapter.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) | Self::Store(StoreError::NotFound) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Concurrency(_) => StatusCode::PRECONDITION_FAILED,
            Self::Store(e) if e.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
            Self::Store(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the stable problem title for this variant.
    #[must_use]
    pub const fn title(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not found",
            Self::Validation(_) => "invalid request",
            Self::Concurrency(_) => "concurrency conflict",
            Self::Store(_) => "store error",
            Self::Internal(_) => "internal error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Problem {
            status: status.as_u16(),
            title: self.title().to_string(),
            detail: self.to_string(),
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
