//! Service layer: the event-sourced write path and its consumers.
//!
//! [`EventStore`] owns the atomic append; [`Projector`] materialises
//! read models from the change feed; [`ReadModelService`] serves the
//! query side; [`IngestWorker`] coalesces the external feed into
//! appends.

pub mod event_store;
pub mod ingest;
pub mod projector;
pub mod read_model;

pub use event_store::{EventStore, NewEvent};
pub use ingest::IngestWorker;
pub use projector::Projector;
pub use read_model::{ReadModelContainers, ReadModelService};
