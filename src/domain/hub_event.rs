//! Server-push events fanned out to hub subscribers.
//!
//! Derived-state changes surface as [`HubEvent`]s on the hub's
//! `tokio::sync::broadcast` channel. The projector, the HTTP append
//! handlers, and the ingestion worker all hold the sender; every hub
//! connection subscribes and filters per its stream subscriptions.

use serde_json::Value;
use uuid::Uuid;

use super::StreamId;

/// Wire name of the `matchState` push.
pub const EVENT_MATCH_STATE: &str = "matchState";
/// Wire name of the `tesHistory` push.
pub const EVENT_TES_HISTORY: &str = "tesHistory";
/// Wire name of the `leaderboard` push.
pub const EVENT_LEADERBOARD: &str = "leaderboard";
/// Wire name of the `trainerEffect` push.
pub const EVENT_TRAINER_EFFECT: &str = "trainerEffect";
/// Wire name of the `metrics` push.
pub const EVENT_METRICS: &str = "metrics";

/// One server-initiated push.
///
/// Stream-scoped variants carry the stream id used for per-stream
/// delivery; the leaderboard is a cross-stream view and goes to everyone.
#[derive(Debug, Clone)]
pub enum HubEvent {
    /// Current match state changed for a stream.
    MatchState {
        /// Stream the state belongs to.
        stream_id: StreamId,
        /// Flattened match-state view.
        payload: Value,
    },
    /// Momentum window changed for a stream.
    TesHistory {
        /// Stream the window belongs to.
        stream_id: StreamId,
        /// Momentum view with points ascending by capture time.
        payload: Value,
    },
    /// The cross-stream leaderboard changed.
    Leaderboard {
        /// Top-K leaderboard view.
        payload: Value,
    },
    /// A transactional trainer effect reached the projector.
    TrainerEffect {
        /// Stream the effect originated on.
        stream_id: StreamId,
        /// Outbox payload, verbatim.
        payload: Value,
    },
    /// A connected client submitted live metrics; fanned to other
    /// connections only, never persisted.
    Metrics {
        /// Connection that submitted the sample.
        sender: Uuid,
        /// Raw metrics payload.
        payload: Value,
    },
}

impl HubEvent {
    /// Returns the wire event name clients receive.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::MatchState { .. } => EVENT_MATCH_STATE,
            Self::TesHistory { .. } => EVENT_TES_HISTORY,
            Self::Leaderboard { .. } => EVENT_LEADERBOARD,
            Self::TrainerEffect { .. } => EVENT_TRAINER_EFFECT,
            Self::Metrics { .. } => EVENT_METRICS,
        }
    }

    /// Returns the stream this event is scoped to, if any.
    #[must_use]
    pub fn stream_id(&self) -> Option<&StreamId> {
        match self {
            Self::MatchState { stream_id, .. }
            | Self::TesHistory { stream_id, .. }
            | Self::TrainerEffect { stream_id, .. } => Some(stream_id),
            Self::Leaderboard { .. } | Self::Metrics { .. } => None,
        }
    }

    /// Returns the payload forwarded to clients.
    #[must_use]
    pub fn payload(&self) -> &Value {
        match self {
            Self::MatchState { payload, .. }
            | Self::TesHistory { payload, .. }
            | Self::Leaderboard { payload }
            | Self::TrainerEffect { payload, .. }
            | Self::Metrics { payload, .. } => payload,
        }
    }
}
