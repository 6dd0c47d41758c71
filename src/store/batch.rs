//! Transactional batch builder.
//!
//! A batch collects operations against one partition and executes
//! atomically: either every operation succeeds or none applies. The event
//! store relies on this for its guard + events + snapshot + outbox append.

use serde_json::Value;

/// One operation inside a [`TransactionalBatch`].
#[derive(Debug, Clone)]
pub enum BatchOp {
    /// Create a new item; fails the batch if the id already exists.
    Create {
        /// Item id, unique within the partition.
        id: String,
        /// Item body.
        body: Value,
    },
    /// Create or overwrite an item unconditionally.
    Upsert {
        /// Item id.
        id: String,
        /// Item body.
        body: Value,
    },
    /// Replace an existing item, guarded by its ETag.
    Replace {
        /// Item id.
        id: String,
        /// Replacement body.
        body: Value,
        /// Expected current ETag; mismatch fails the batch.
        if_match: String,
    },
}

impl BatchOp {
    /// Returns the target item id of this operation.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Create { id, .. } | Self::Upsert { id, .. } | Self::Replace { id, .. } => id,
        }
    }
}

/// Ordered list of operations executed atomically on one partition.
#[derive(Debug, Clone, Default)]
pub struct TransactionalBatch {
    ops: Vec<BatchOp>,
}

impl TransactionalBatch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues a `Create`.
    #[must_use]
    pub fn create(mut self, id: impl Into<String>, body: Value) -> Self {
        self.ops.push(BatchOp::Create {
            id: id.into(),
            body,
        });
        self
    }

    /// Enqueues an `Upsert`.
    #[must_use]
    pub fn upsert(mut self, id: impl Into<String>, body: Value) -> Self {
        self.ops.push(BatchOp::Upsert {
            id: id.into(),
            body,
        });
        self
    }

    /// Enqueues an ETag-guarded `Replace`.
    #[must_use]
    pub fn replace(mut self, id: impl Into<String>, body: Value, if_match: impl Into<String>) -> Self {
        self.ops.push(BatchOp::Replace {
            id: id.into(),
            body,
            if_match: if_match.into(),
        });
        self
    }

    /// Returns the operations in enqueue order.
    #[must_use]
    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    /// Returns the number of enqueued operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns `true` if no operations are enqueued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_preserves_order() {
        let batch = TransactionalBatch::new()
            .replace("snap-m1", json!({}), "etag-1")
            .create("e1", json!({ "seq": 1 }))
            .upsert("snap-m1", json!({ "aggVersion": 1 }));

        assert_eq!(batch.len(), 3);
        assert!(matches!(batch.ops()[0], BatchOp::Replace { .. }));
        assert!(matches!(batch.ops()[1], BatchOp::Create { .. }));
        assert!(matches!(batch.ops()[2], BatchOp::Upsert { .. }));
    }

    #[test]
    fn op_id_accessor() {
        let batch = TransactionalBatch::new().create("e1", json!({}));
        assert_eq!(batch.ops()[0].id(), "e1");
    }

    #[test]
    fn empty_batch() {
        let batch = TransactionalBatch::new();
        assert!(batch.is_empty());
        assert_eq!(batch.len(), 0);
    }
}
