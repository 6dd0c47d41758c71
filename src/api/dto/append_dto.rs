//! Append request/response DTOs.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// One event in an append request body.
///
/// `kind` is matched case-insensitively against the known set; unknown
/// kinds pass through as generic payloads.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AppendEventDto {
    /// Globally unique event id supplied by the caller.
    pub id: String,
    /// Event kind, e.g. `MatchStateUpdated`.
    pub kind: String,
    /// Kind-shaped payload.
    #[serde(default)]
    pub payload: Value,
}

/// Request body for the two append routes.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppendRequest {
    /// Last known aggregate version; 0 for a brand-new stream.
    #[serde(default)]
    pub expected_version: u64,
    /// Last observed snapshot ETag; empty for first creation.
    #[serde(default)]
    pub expected_etag: String,
    /// Full aggregate state at the post-append version.
    pub snapshot: Value,
    /// Ordered events to append.
    pub events: Vec<AppendEventDto>,
}

impl AppendRequest {
    /// Returns the ETag as the optimistic token, mapping the empty
    /// string to "first creation".
    #[must_use]
    pub fn etag(&self) -> Option<&str> {
        if self.expected_etag.is_empty() {
            None
        } else {
            Some(&self.expected_etag)
        }
    }
}

/// Stream envelope returned by the `afl` routes.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StreamEnvelope {
    /// Stream id.
    pub stream_id: String,
    /// Current aggregate version.
    pub aggregate_version: u64,
    /// Current snapshot ETag, passed back on the next append.
    pub etag: String,
    /// Current aggregate state.
    pub state: Value,
}
