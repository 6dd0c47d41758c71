//! The [`DocumentStore`] capability trait.

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use super::batch::TransactionalBatch;
use super::StoreResult;

/// An item read together with its concurrency token.
#[derive(Debug, Clone)]
pub struct ItemRead {
    /// Item body.
    pub body: Value,
    /// Opaque ETag; changes on every write.
    pub etag: String,
}

/// One patch operation applied to an existing item.
#[derive(Debug, Clone)]
pub enum PatchOp {
    /// Set the field at `path` (slash-separated, e.g. `/processedAt`).
    Set {
        /// Field path.
        path: String,
        /// New value.
        value: Value,
    },
}

/// Sort clause of an [`ItemQuery`].
#[derive(Debug, Clone)]
pub struct OrderBy {
    /// Dot-separated path into the item body, e.g. `metrics.watts`.
    pub path: String,
    /// Descending when `true`.
    pub descending: bool,
}

/// Structured cross-partition query.
///
/// Equality filters on top-level fields, one sort clause, and a limit —
/// the full query surface the read models need. Results are finite and
/// the query is restartable (no server-side cursor state).
#[derive(Debug, Clone, Default)]
pub struct ItemQuery {
    /// Top-level field equality filters, ANDed.
    pub filters: Vec<(String, Value)>,
    /// Optional sort clause.
    pub order_by: Option<OrderBy>,
    /// Optional result cap, applied after sorting.
    pub limit: Option<usize>,
}

impl ItemQuery {
    /// Creates an unconstrained query.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a top-level field equality filter.
    #[must_use]
    pub fn filter(mut self, field: impl Into<String>, value: Value) -> Self {
        self.filters.push((field.into(), value));
        self
    }

    /// Sorts results descending by the given body path.
    #[must_use]
    pub fn order_by_desc(mut self, path: impl Into<String>) -> Self {
        self.order_by = Some(OrderBy {
            path: path.into(),
            descending: true,
        });
        self
    }

    /// Caps the number of results.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// One page of a partition's change feed.
#[derive(Debug, Clone)]
pub struct ChangePage {
    /// Changed documents in commit order.
    pub docs: Vec<Value>,
    /// Continuation token: the LSN of the last document returned, or the
    /// requested watermark when the page is empty.
    pub continuation: u64,
}

/// Typed surface over the external partitioned JSON store.
///
/// Guarantees the adapter relies on:
/// - batches are atomic per partition;
/// - the ETag attached to an item changes on every write;
/// - within a partition the change feed delivers in commit order, one
///   change per document id per batch (the final body).
#[async_trait]
pub trait DocumentStore: Send + Sync + fmt::Debug {
    /// Reads one item by id within a partition.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`](super::StoreError::NotFound) for
    /// an absent id, or another [`StoreError`](super::StoreError) variant
    /// on infrastructure failure.
    async fn read_item(&self, container: &str, id: &str, partition_key: &str)
        -> StoreResult<ItemRead>;

    /// Creates or overwrites an item, returning its new ETag.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`](super::StoreError) on infrastructure
    /// failure.
    async fn upsert_item(
        &self,
        container: &str,
        partition_key: &str,
        body: Value,
    ) -> StoreResult<String>;

    /// Applies patch operations to an existing item.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`](super::StoreError::NotFound) for
    /// an absent id; callers that tolerate it say so.
    async fn patch_item(
        &self,
        container: &str,
        id: &str,
        partition_key: &str,
        ops: &[PatchOp],
    ) -> StoreResult<()>;

    /// Runs a structured query across all partitions of a container.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`](super::StoreError) on infrastructure
    /// failure.
    async fn query(&self, container: &str, query: &ItemQuery) -> StoreResult<Vec<Value>>;

    /// Executes a [`TransactionalBatch`] atomically on one partition.
    ///
    /// # Errors
    ///
    /// Returns [`PreconditionFailed`](super::StoreError::PreconditionFailed)
    /// on an `IfMatch` mismatch, [`Conflict`](super::StoreError::Conflict)
    /// on a `Create` id collision, or another variant on infrastructure
    /// failure. No operation applies on failure.
    async fn execute_batch(
        &self,
        container: &str,
        partition_key: &str,
        batch: TransactionalBatch,
    ) -> StoreResult<()>;

    /// Deletes one item. Used by lease purges only; deletes do not appear
    /// on the change feed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`](super::StoreError::NotFound) for
    /// an absent id.
    async fn delete_item(&self, container: &str, id: &str, partition_key: &str) -> StoreResult<()>;

    /// Lists the partition keys present in a container.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`](super::StoreError) on infrastructure
    /// failure.
    async fn list_partitions(&self, container: &str) -> StoreResult<Vec<String>>;

    /// Reads up to `max_items` changes committed after `after_lsn` in one
    /// partition, in commit order.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`](super::StoreError) on infrastructure
    /// failure.
    async fn read_changes(
        &self,
        container: &str,
        partition_key: &str,
        after_lsn: u64,
        max_items: usize,
    ) -> StoreResult<ChangePage>;

    /// Returns the LSN of the most recent commit in a partition (0 when
    /// empty). Used to start a subscription at the current tail.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`](super::StoreError) on infrastructure
    /// failure.
    async fn latest_lsn(&self, container: &str, partition_key: &str) -> StoreResult<u64>;
}
