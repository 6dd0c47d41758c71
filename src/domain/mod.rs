//! Domain layer: stream identity, event kinds, persisted document shapes,
//! and the hub push-event vocabulary.
//!
//! This module contains everything the write path, projector, and hub
//! agree on: the aggregate state union, the three document types sharing
//! the event container, and the server-push events fanned out over the
//! hub's `tokio::sync::broadcast` channel.

pub mod casing;
pub mod documents;
pub mod event;
pub mod hub_event;
pub mod stream_id;

pub use event::{EventKind, MatchState, Score, TrainerMetrics};
pub use hub_event::HubEvent;
pub use stream_id::StreamId;
