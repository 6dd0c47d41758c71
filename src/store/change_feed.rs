//! Durable, lease-coordinated change-feed consumer.
//!
//! [`ChangeFeedProcessor`] tails a source container partition by
//! partition, tracking its read cursor in durable lease documents. A
//! handler failure leaves the lease untouched, so the page is redelivered
//! on the next poll: delivery is at-least-once within a partition, in
//! commit order, and handlers must be idempotent.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::watch;

use super::adapter::DocumentStore;
use super::{StoreError, StoreResult};

/// `type` value of lease documents.
pub const DOC_TYPE_LEASE: &str = "lease";

/// Where a fresh subscription (no lease documents) begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
    /// Replay the whole container.
    FromBeginning,
    /// Begin at the current tail.
    FromNow,
}

/// Receives one page of changed documents for a partition.
///
/// Implementations must be idempotent: a page is redelivered whenever the
/// handler fails or the process restarts before the lease advances.
#[async_trait]
pub trait ChangeHandler: Send + Sync {
    /// Handles one page of documents, in commit order.
    ///
    /// # Errors
    ///
    /// Returning an error aborts the page; the lease is not advanced and
    /// the page is redelivered.
    async fn handle(&self, partition_key: &str, docs: &[Value]) -> StoreResult<()>;
}

/// Lease-coordinated consumer over one source container.
#[derive(Debug)]
pub struct ChangeFeedProcessor {
    store: Arc<dyn DocumentStore>,
    source_container: String,
    lease_container: String,
    name: String,
    instance: String,
    start_mode: StartMode,
    poll_interval: Duration,
    page_size: usize,
}

impl ChangeFeedProcessor {
    /// Creates a processor with the given logical `name` and
    /// `instance` identity.
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        source_container: impl Into<String>,
        lease_container: impl Into<String>,
        name: impl Into<String>,
        instance: impl Into<String>,
        start_mode: StartMode,
    ) -> Self {
        Self {
            store,
            source_container: source_container.into(),
            lease_container: lease_container.into(),
            name: name.into(),
            instance: instance.into(),
            start_mode,
            poll_interval: Duration::from_millis(500),
            page_size: 100,
        }
    }

    /// Overrides the poll interval (default 500 ms).
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn lease_id(&self, partition_key: &str) -> String {
        format!("lease-{}-{partition_key}", self.name)
    }

    /// Deletes every lease document belonging to this logical name.
    ///
    /// This is the supported way to replay a container from the
    /// beginning: purge, then start with [`StartMode::FromBeginning`].
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the lease container cannot be
    /// queried; individual delete races are tolerated.
    pub async fn purge_leases(&self) -> StoreResult<()> {
        let query = super::ItemQuery::new()
            .filter("type", json!(DOC_TYPE_LEASE))
            .filter("name", json!(self.name.clone()));
        let leases = self.store.query(&self.lease_container, &query).await?;
        for lease in leases {
            let Some(id) = lease.get("id").and_then(Value::as_str) else {
                continue;
            };
            match self.store.delete_item(&self.lease_container, id, id).await {
                Ok(()) | Err(StoreError::NotFound) => {}
                Err(e) => return Err(e),
            }
        }
        tracing::info!(name = %self.name, "purged change-feed leases");
        Ok(())
    }

    /// Runs the poll loop until `shutdown` flips to `true`.
    ///
    /// Errors on individual partitions are logged and retried on the next
    /// poll; the loop itself only exits on shutdown.
    pub async fn run(self, handler: Arc<dyn ChangeHandler>, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            name = %self.name,
            instance = %self.instance,
            source = %self.source_container,
            ?self.start_mode,
            "change-feed processor started"
        );

        loop {
            if let Err(e) = self.poll_once(handler.as_ref()).await {
                tracing::warn!(name = %self.name, err = %e, "change-feed poll failed");
            }

            tokio::select! {
                () = tokio::time::sleep(self.poll_interval) => {}
                changed = shutdown.changed() => {
                    // A dropped sender also means shutdown.
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!(name = %self.name, "change-feed processor stopped");
    }

    /// Processes at most one page per partition.
    ///
    /// # Errors
    ///
    /// Returns the first infrastructure error; handler failures are
    /// logged per partition and leave that partition's lease untouched.
    pub async fn poll_once(&self, handler: &dyn ChangeHandler) -> StoreResult<()> {
        let partitions = self.store.list_partitions(&self.source_container).await?;
        for partition_key in partitions {
            self.poll_partition(handler, &partition_key).await?;
        }
        Ok(())
    }

    async fn poll_partition(
        &self,
        handler: &dyn ChangeHandler,
        partition_key: &str,
    ) -> StoreResult<()> {
        let continuation = self.load_continuation(partition_key).await?;
        let page = self
            .store
            .read_changes(
                &self.source_container,
                partition_key,
                continuation,
                self.page_size,
            )
            .await?;

        if page.docs.is_empty() {
            return Ok(());
        }

        match handler.handle(partition_key, &page.docs).await {
            Ok(()) => {
                self.save_continuation(partition_key, page.continuation)
                    .await?;
            }
            Err(e) => {
                // Lease not advanced: the page will be redelivered.
                tracing::warn!(
                    name = %self.name,
                    partition = partition_key,
                    batch = page.docs.len(),
                    err = %e,
                    "change handler failed; batch will be redelivered"
                );
            }
        }
        Ok(())
    }

    async fn load_continuation(&self, partition_key: &str) -> StoreResult<u64> {
        let lease_id = self.lease_id(partition_key);
        match self
            .store
            .read_item(&self.lease_container, &lease_id, &lease_id)
            .await
        {
            Ok(read) => Ok(read
                .body
                .get("continuation")
                .and_then(Value::as_u64)
                .unwrap_or(0)),
            Err(StoreError::NotFound) => {
                let initial = match self.start_mode {
                    StartMode::FromBeginning => 0,
                    StartMode::FromNow => {
                        self.store
                            .latest_lsn(&self.source_container, partition_key)
                            .await?
                    }
                };
                self.save_continuation(partition_key, initial).await?;
                Ok(initial)
            }
            Err(e) => Err(e),
        }
    }

    async fn save_continuation(&self, partition_key: &str, continuation: u64) -> StoreResult<()> {
        let lease_id = self.lease_id(partition_key);
        let lease = json!({
            "id": lease_id,
            "type": DOC_TYPE_LEASE,
            "name": self.name,
            "partition": partition_key,
            "continuation": continuation,
            "owner": self.instance,
            "updatedAt": Utc::now(),
        });
        self.store
            .upsert_item(&self.lease_container, &lease_id, lease)
            .await?;
        Ok(())
    }
}
