//! Document store adapter: typed surface over the external partitioned
//! JSON store.
//!
//! The backing store is a strongly-consistent, partitioned document store
//! with ETag-guarded replaces, per-partition transactional batches, and a
//! per-partition change feed. [`DocumentStore`] captures exactly that
//! capability set; [`MemoryStore`] is the embedded implementation used by
//! the binary and by tests, and a hosted adapter would implement the same
//! trait.

pub mod adapter;
pub mod batch;
pub mod change_feed;
pub mod memory;
pub mod retry;

pub use adapter::{ChangePage, DocumentStore, ItemQuery, ItemRead, OrderBy, PatchOp};
pub use batch::{BatchOp, TransactionalBatch};
pub use change_feed::{ChangeFeedProcessor, ChangeHandler, StartMode};
pub use memory::MemoryStore;

use thiserror::Error;

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Error taxonomy surfaced by every store operation.
///
/// Callers branch on three groups: concurrency failures
/// ([`is_concurrency`]), retryable infrastructure errors
/// ([`is_retryable`]), and everything else (fatal).
///
/// [`is_concurrency`]: StoreError::is_concurrency
/// [`is_retryable`]: StoreError::is_retryable
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The item does not exist. Never fatal; readers surface it as `None`.
    #[error("item not found")]
    NotFound,

    /// An `IfMatch` ETag guard did not match the current item.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// A `Create` collided with an existing unique id.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The store rejected the request under load; retry with backoff.
    #[error("request throttled by store")]
    Throttled,

    /// Transient infrastructure failure; retry with backoff.
    #[error("transient store error: {0}")]
    Transient(String),

    /// Unrecoverable failure; propagated to the caller.
    #[error("fatal store error: {0}")]
    Fatal(String),
}

impl StoreError {
    /// Returns `true` for errors a bounded-backoff retry may resolve.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Throttled | Self::Transient(_))
    }

    /// Returns `true` for optimistic-concurrency failures.
    ///
    /// Both guard outcomes of a transactional batch land here: an ETag
    /// mismatch on `Replace` and an id collision on `Create`.
    #[must_use]
    pub const fn is_concurrency(&self) -> bool {
        matches!(self, Self::PreconditionFailed(_) | Self::Conflict(_))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(StoreError::Throttled.is_retryable());
        assert!(StoreError::Transient("io".to_string()).is_retryable());
        assert!(!StoreError::NotFound.is_retryable());
        assert!(!StoreError::Fatal("x".to_string()).is_retryable());
    }

    #[test]
    fn concurrency_classification() {
        assert!(StoreError::PreconditionFailed("etag moved".to_string()).is_concurrency());
        assert!(StoreError::Conflict("id exists".to_string()).is_concurrency());
        assert!(!StoreError::Throttled.is_concurrency());
    }
}
