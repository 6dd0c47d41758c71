//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::domain::HubEvent;
use crate::service::{EventStore, ReadModelService};
use crate::store::DocumentStore;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Shared document store client, held for the process lifetime.
    pub store: Arc<dyn DocumentStore>,
    /// Append-side API over the event container.
    pub event_store: Arc<EventStore>,
    /// Query-side API over the read-model containers.
    pub read_models: Arc<ReadModelService>,
    /// Sender half of the hub broadcast channel; each connection
    /// subscribes on upgrade, and publishers ignore the no-receiver
    /// error.
    pub hub: broadcast::Sender<HubEvent>,
    /// Event container name, used by the health probe.
    pub es_container: String,
}
