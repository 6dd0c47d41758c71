//! Embedded implementation of [`DocumentStore`].
//!
//! Containers map to partitions, partitions hold documents plus a commit
//! log with monotonically increasing LSNs. All mutations on a partition
//! run under one lock, which gives the partition-level atomicity and
//! commit ordering the adapter contract requires.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::adapter::{ChangePage, DocumentStore, ItemQuery, ItemRead, PatchOp};
use super::batch::{BatchOp, TransactionalBatch};
use super::{StoreError, StoreResult};

#[derive(Debug, Clone)]
struct StoredDoc {
    body: Value,
    etag: String,
}

#[derive(Debug, Clone)]
struct LogEntry {
    lsn: u64,
    doc: Value,
}

#[derive(Debug, Default)]
struct Partition {
    docs: HashMap<String, StoredDoc>,
    log: Vec<LogEntry>,
    next_lsn: u64,
}

impl Partition {
    fn commit(&mut self, id: &str, body: Value) -> String {
        let etag = new_etag();
        self.docs.insert(
            id.to_string(),
            StoredDoc {
                body: body.clone(),
                etag: etag.clone(),
            },
        );
        self.next_lsn += 1;
        self.log.push(LogEntry {
            lsn: self.next_lsn,
            doc: body,
        });
        etag
    }
}

#[derive(Debug, Default)]
struct Container {
    partitions: HashMap<String, Partition>,
}

/// In-process partitioned document store.
///
/// Containers and partitions are created on first write. ETags are opaque
/// and change on every write. Deletes are not logged: the change feed
/// carries creates and updates only.
#[derive(Debug, Default)]
pub struct MemoryStore {
    containers: RwLock<HashMap<String, Container>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn new_etag() -> String {
    format!("\"{}\"", uuid::Uuid::new_v4())
}

/// Resolves a dot-separated path into a JSON value.
fn path_value<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = doc;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Orders two JSON values: numbers numerically, strings lexically,
/// anything else ties. Absent values sort first.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => match (a.as_str(), b.as_str()) {
                (Some(x), Some(y)) => x.cmp(y),
                _ => Ordering::Equal,
            },
        },
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn read_item(
        &self,
        container: &str,
        id: &str,
        partition_key: &str,
    ) -> StoreResult<ItemRead> {
        let containers = self.containers.read().await;
        containers
            .get(container)
            .and_then(|c| c.partitions.get(partition_key))
            .and_then(|p| p.docs.get(id))
            .map(|doc| ItemRead {
                body: doc.body.clone(),
                etag: doc.etag.clone(),
            })
            .ok_or(StoreError::NotFound)
    }

    async fn upsert_item(
        &self,
        container: &str,
        partition_key: &str,
        body: Value,
    ) -> StoreResult<String> {
        let id = body
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| StoreError::Fatal("upsert body missing string `id`".to_string()))?
            .to_string();

        let mut containers = self.containers.write().await;
        let partition = containers
            .entry(container.to_string())
            .or_default()
            .partitions
            .entry(partition_key.to_string())
            .or_default();
        Ok(partition.commit(&id, body))
    }

    async fn patch_item(
        &self,
        container: &str,
        id: &str,
        partition_key: &str,
        ops: &[PatchOp],
    ) -> StoreResult<()> {
        let mut containers = self.containers.write().await;
        let partition = containers
            .get_mut(container)
            .and_then(|c| c.partitions.get_mut(partition_key))
            .ok_or(StoreError::NotFound)?;
        let mut body = partition
            .docs
            .get(id)
            .ok_or(StoreError::NotFound)?
            .body
            .clone();

        for op in ops {
            let PatchOp::Set { path, value } = op;
            apply_set(&mut body, path, value.clone())?;
        }

        partition.commit(id, body);
        Ok(())
    }

    async fn query(&self, container: &str, query: &ItemQuery) -> StoreResult<Vec<Value>> {
        let containers = self.containers.read().await;
        let Some(container) = containers.get(container) else {
            return Ok(Vec::new());
        };

        let mut matches: Vec<Value> = container
            .partitions
            .values()
            .flat_map(|p| p.docs.values())
            .filter(|doc| {
                query
                    .filters
                    .iter()
                    .all(|(field, expected)| doc.body.get(field) == Some(expected))
            })
            .map(|doc| doc.body.clone())
            .collect();

        if let Some(order) = &query.order_by {
            matches.sort_by(|a, b| {
                let ordering =
                    compare_values(path_value(a, &order.path), path_value(b, &order.path));
                if order.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }

        if let Some(limit) = query.limit {
            matches.truncate(limit);
        }

        Ok(matches)
    }

    async fn execute_batch(
        &self,
        container: &str,
        partition_key: &str,
        batch: TransactionalBatch,
    ) -> StoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut containers = self.containers.write().await;
        let partition = containers
            .entry(container.to_string())
            .or_default()
            .partitions
            .entry(partition_key.to_string())
            .or_default();

        // Validate every op against a scratch view before touching the
        // partition, so a failure applies nothing. The scratch view also
        // sees earlier ops in the same batch (create-then-upsert of the
        // snapshot id is a single logical write).
        let mut scratch: HashMap<String, Option<String>> = partition
            .docs
            .iter()
            .map(|(id, doc)| (id.clone(), Some(doc.etag.clone())))
            .collect();
        // Final body per id, ordered by last write within the batch.
        let mut effects: Vec<(String, Value)> = Vec::with_capacity(batch.len());

        for op in batch.ops() {
            match op {
                BatchOp::Create { id, body } => {
                    if scratch.contains_key(id) {
                        return Err(StoreError::Conflict(format!(
                            "item `{id}` already exists in partition `{partition_key}`"
                        )));
                    }
                    scratch.insert(id.clone(), None);
                    record_effect(&mut effects, id, body.clone());
                }
                BatchOp::Upsert { id, body } => {
                    scratch.insert(id.clone(), None);
                    record_effect(&mut effects, id, body.clone());
                }
                BatchOp::Replace { id, body, if_match } => {
                    match scratch.get(id) {
                        None => {
                            return Err(StoreError::PreconditionFailed(format!(
                                "item `{id}` does not exist in partition `{partition_key}`"
                            )));
                        }
                        // Written earlier in this batch; the guard is
                        // against the pre-batch state, which it replaced.
                        Some(None) => {}
                        Some(Some(current)) if current != if_match => {
                            return Err(StoreError::PreconditionFailed(format!(
                                "etag mismatch on `{id}`"
                            )));
                        }
                        Some(Some(_)) => {}
                    }
                    scratch.insert(id.clone(), None);
                    record_effect(&mut effects, id, body.clone());
                }
            }
        }

        // One committed change per document id, in last-write order. The
        // feed therefore shows the real snapshot, never the guard stub.
        for (id, body) in effects {
            partition.commit(&id, body);
        }
        Ok(())
    }

    async fn delete_item(&self, container: &str, id: &str, partition_key: &str) -> StoreResult<()> {
        let mut containers = self.containers.write().await;
        let partition = containers
            .get_mut(container)
            .and_then(|c| c.partitions.get_mut(partition_key))
            .ok_or(StoreError::NotFound)?;
        partition.docs.remove(id).ok_or(StoreError::NotFound)?;
        Ok(())
    }

    async fn list_partitions(&self, container: &str) -> StoreResult<Vec<String>> {
        let containers = self.containers.read().await;
        let mut keys: Vec<String> = containers
            .get(container)
            .map(|c| c.partitions.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        Ok(keys)
    }

    async fn read_changes(
        &self,
        container: &str,
        partition_key: &str,
        after_lsn: u64,
        max_items: usize,
    ) -> StoreResult<ChangePage> {
        let containers = self.containers.read().await;
        let Some(partition) = containers
            .get(container)
            .and_then(|c| c.partitions.get(partition_key))
        else {
            return Ok(ChangePage {
                docs: Vec::new(),
                continuation: after_lsn,
            });
        };

        let entries: Vec<&LogEntry> = partition
            .log
            .iter()
            .filter(|e| e.lsn > after_lsn)
            .take(max_items)
            .collect();

        let continuation = entries.last().map_or(after_lsn, |e| e.lsn);
        Ok(ChangePage {
            docs: entries.into_iter().map(|e| e.doc.clone()).collect(),
            continuation,
        })
    }

    async fn latest_lsn(&self, container: &str, partition_key: &str) -> StoreResult<u64> {
        let containers = self.containers.read().await;
        Ok(containers
            .get(container)
            .and_then(|c| c.partitions.get(partition_key))
            .map_or(0, |p| p.next_lsn))
    }
}

fn record_effect(effects: &mut Vec<(String, Value)>, id: &str, body: Value) {
    effects.retain(|(existing, _)| existing != id);
    effects.push((id.to_string(), body));
}

/// Sets a slash-separated path (`/processedAt`) inside a JSON object.
fn apply_set(body: &mut Value, path: &str, value: Value) -> StoreResult<()> {
    let mut current = body;
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    let (last, parents) = segments
        .split_last()
        .ok_or_else(|| StoreError::Fatal("empty patch path".to_string()))?;

    for segment in parents {
        current = current
            .as_object_mut()
            .ok_or_else(|| StoreError::Fatal(format!("patch path `{path}` is not an object")))?
            .entry((*segment).to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
    }
    current
        .as_object_mut()
        .ok_or_else(|| StoreError::Fatal(format!("patch path `{path}` is not an object")))?
        .insert((*last).to_string(), value);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    const ES: &str = "es";

    #[tokio::test]
    async fn upsert_then_read_round_trips() {
        let store = MemoryStore::new();
        let etag = store
            .upsert_item(ES, "m1", json!({ "id": "a", "streamId": "m1" }))
            .await;
        let Ok(etag) = etag else {
            panic!("upsert failed");
        };

        let Ok(read) = store.read_item(ES, "a", "m1").await else {
            panic!("read failed");
        };
        assert_eq!(read.etag, etag);
        assert_eq!(read.body["streamId"], "m1");
    }

    #[tokio::test]
    async fn read_missing_is_not_found() {
        let store = MemoryStore::new();
        let result = store.read_item(ES, "nope", "m1").await;
        assert!(matches!(result, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn etag_changes_on_every_write() {
        let store = MemoryStore::new();
        let Ok(first) = store.upsert_item(ES, "m1", json!({ "id": "a" })).await else {
            panic!("upsert failed");
        };
        let Ok(second) = store.upsert_item(ES, "m1", json!({ "id": "a" })).await else {
            panic!("upsert failed");
        };
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn batch_is_atomic_on_conflict() {
        let store = MemoryStore::new();
        let Ok(_) = store.upsert_item(ES, "m1", json!({ "id": "e1" })).await else {
            panic!("seed failed");
        };

        let batch = TransactionalBatch::new()
            .create("e2", json!({ "id": "e2" }))
            .create("e1", json!({ "id": "e1" }));
        let result = store.execute_batch(ES, "m1", batch).await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));

        // The first create must not have applied.
        let e2 = store.read_item(ES, "e2", "m1").await;
        assert!(matches!(e2, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn replace_with_stale_etag_fails_batch() {
        let store = MemoryStore::new();
        let Ok(etag) = store.upsert_item(ES, "m1", json!({ "id": "snap-m1" })).await else {
            panic!("seed failed");
        };
        let Ok(_) = store
            .upsert_item(ES, "m1", json!({ "id": "snap-m1", "v": 2 }))
            .await
        else {
            panic!("second write failed");
        };

        let batch = TransactionalBatch::new()
            .replace("snap-m1", json!({ "id": "snap-m1" }), etag)
            .create("e1", json!({ "id": "e1" }));
        let result = store.execute_batch(ES, "m1", batch).await;
        assert!(matches!(result, Err(StoreError::PreconditionFailed(_))));
        assert!(matches!(
            store.read_item(ES, "e1", "m1").await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn replace_on_missing_item_fails_batch() {
        let store = MemoryStore::new();
        let batch =
            TransactionalBatch::new().replace("snap-m1", json!({ "id": "snap-m1" }), "\"x\"");
        let result = store.execute_batch(ES, "m1", batch).await;
        assert!(matches!(result, Err(StoreError::PreconditionFailed(_))));
    }

    #[tokio::test]
    async fn batch_coalesces_same_id_to_one_change() {
        let store = MemoryStore::new();
        let batch = TransactionalBatch::new()
            .create("snap-m1", json!({ "id": "snap-m1", "guard": true }))
            .create("e1", json!({ "id": "e1", "seq": 1 }))
            .upsert("snap-m1", json!({ "id": "snap-m1", "aggVersion": 1 }));
        let Ok(()) = store.execute_batch(ES, "m1", batch).await else {
            panic!("batch failed");
        };

        let Ok(page) = store.read_changes(ES, "m1", 0, 10).await else {
            panic!("read_changes failed");
        };
        // Event first, then the final snapshot body. The guard stub is
        // never observed.
        assert_eq!(page.docs.len(), 2);
        assert_eq!(page.docs[0]["id"], "e1");
        assert_eq!(page.docs[1]["id"], "snap-m1");
        assert_eq!(page.docs[1]["aggVersion"], 1);
        assert!(page.docs[1].get("guard").is_none());
    }

    #[tokio::test]
    async fn change_feed_pages_in_commit_order() {
        let store = MemoryStore::new();
        for i in 1..=5 {
            let Ok(_) = store
                .upsert_item(ES, "m1", json!({ "id": format!("e{i}"), "seq": i }))
                .await
            else {
                panic!("upsert failed");
            };
        }

        let Ok(first) = store.read_changes(ES, "m1", 0, 3).await else {
            panic!("read_changes failed");
        };
        assert_eq!(first.docs.len(), 3);
        assert_eq!(first.docs[0]["seq"], 1);

        let Ok(rest) = store.read_changes(ES, "m1", first.continuation, 10).await else {
            panic!("read_changes failed");
        };
        assert_eq!(rest.docs.len(), 2);
        assert_eq!(rest.docs[0]["seq"], 4);
        assert_eq!(rest.docs[1]["seq"], 5);

        let Ok(empty) = store.read_changes(ES, "m1", rest.continuation, 10).await else {
            panic!("read_changes failed");
        };
        assert!(empty.docs.is_empty());
        assert_eq!(empty.continuation, rest.continuation);
    }

    #[tokio::test]
    async fn query_filters_orders_and_limits() {
        let store = MemoryStore::new();
        for (id, stream, watts) in [("a", "s1", 300), ("b", "s2", 400), ("c", "s3", 350)] {
            let Ok(_) = store
                .upsert_item(
                    "rm_leaderboard",
                    stream,
                    json!({ "id": id, "streamId": stream, "metrics": { "watts": watts } }),
                )
                .await
            else {
                panic!("upsert failed");
            };
        }

        let query = ItemQuery::new().order_by_desc("metrics.watts").limit(2);
        let Ok(rows) = store.query("rm_leaderboard", &query).await else {
            panic!("query failed");
        };
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["id"], "b");
        assert_eq!(rows[1]["id"], "c");

        let query = ItemQuery::new().filter("streamId", json!("s1"));
        let Ok(rows) = store.query("rm_leaderboard", &query).await else {
            panic!("query failed");
        };
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], "a");
    }

    #[tokio::test]
    async fn patch_sets_field_and_tolerates_repeat() {
        let store = MemoryStore::new();
        let Ok(_) = store
            .upsert_item(ES, "m1", json!({ "id": "out-e1", "kind": "trainerEffect" }))
            .await
        else {
            panic!("seed failed");
        };

        let ops = [PatchOp::Set {
            path: "/processedAt".to_string(),
            value: json!("2026-08-02T10:00:00Z"),
        }];
        let Ok(()) = store.patch_item(ES, "out-e1", "m1", &ops).await else {
            panic!("patch failed");
        };
        let Ok(()) = store.patch_item(ES, "out-e1", "m1", &ops).await else {
            panic!("second patch failed");
        };

        let Ok(read) = store.read_item(ES, "out-e1", "m1").await else {
            panic!("read failed");
        };
        assert_eq!(read.body["processedAt"], "2026-08-02T10:00:00Z");
    }

    #[tokio::test]
    async fn patch_missing_item_is_not_found() {
        let store = MemoryStore::new();
        let ops = [PatchOp::Set {
            path: "/processedAt".to_string(),
            value: json!("now"),
        }];
        let result = store.patch_item(ES, "nope", "m1", &ops).await;
        assert!(matches!(result, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn list_partitions_is_sorted() {
        let store = MemoryStore::new();
        for stream in ["b", "a", "c"] {
            let Ok(_) = store
                .upsert_item(ES, stream, json!({ "id": format!("doc-{stream}") }))
                .await
            else {
                panic!("upsert failed");
            };
        }
        let Ok(partitions) = store.list_partitions(ES).await else {
            panic!("list failed");
        };
        assert_eq!(partitions, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn latest_lsn_tracks_writes() {
        let store = MemoryStore::new();
        let Ok(lsn) = store.latest_lsn(ES, "m1").await else {
            panic!("latest_lsn failed");
        };
        assert_eq!(lsn, 0);

        let Ok(_) = store.upsert_item(ES, "m1", json!({ "id": "a" })).await else {
            panic!("upsert failed");
        };
        let Ok(lsn) = store.latest_lsn(ES, "m1").await else {
            panic!("latest_lsn failed");
        };
        assert_eq!(lsn, 1);
    }
}
