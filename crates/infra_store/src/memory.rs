//! In-process document store
//!
//! `MemoryDocumentStore` implements the `DocumentStore` port on top of a
//! map of collections. Ids are time-ordered UUIDs, so query results come
//! back in insertion order.
//!
//! # Fault injection
//!
//! - [`MemoryDocumentStore::set_online`] makes every call fail with a
//!   connection error, as a device without network would see.
//! - [`MemoryDocumentStore::lose_next_responses`] applies the next writes but
//!   reports them as failed, simulating a response lost after the write
//!   landed.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use uuid::Uuid;

use core_kernel::{
    AdapterHealth, Document, DocumentStore, DomainPort, HealthCheckResult, HealthCheckable,
    PortError, Predicate,
};

use crate::error::StoreError;

type Collection = BTreeMap<String, Value>;

/// In-memory implementation of the DocumentStore port
#[derive(Debug)]
pub struct MemoryDocumentStore {
    collections: RwLock<HashMap<String, Collection>>,
    online: AtomicBool,
    lost_responses: AtomicUsize,
    writes: AtomicUsize,
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocumentStore {
    /// Creates an empty, online store
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            online: AtomicBool::new(true),
            lost_responses: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    /// Switches connectivity on or off
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Applies the next `n` writes but reports them as failed
    pub fn lose_next_responses(&self, n: usize) {
        self.lost_responses.store(n, Ordering::SeqCst);
    }

    /// Number of writes that reached the store
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of documents in a collection
    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, |c| c.len())
    }

    fn ensure_online(&self) -> Result<(), StoreError> {
        if self.is_online() {
            Ok(())
        } else {
            Err(StoreError::Offline)
        }
    }

    /// Records a completed write and decides whether its response is delivered
    fn acknowledge_write(&self, operation: &str) -> Result<(), PortError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let lost = self
            .lost_responses
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if lost {
            debug!(operation, "dropping response for applied write");
            return Err(PortError::Timeout {
                operation: operation.to_string(),
                duration_ms: 0,
            });
        }
        Ok(())
    }
}

impl DomainPort for MemoryDocumentStore {}

#[async_trait]
impl HealthCheckable for MemoryDocumentStore {
    async fn health_check(&self) -> HealthCheckResult {
        let (status, message) = if self.is_online() {
            (AdapterHealth::Healthy, None)
        } else {
            (AdapterHealth::Unhealthy, Some("store is offline".to_string()))
        };
        HealthCheckResult {
            adapter_id: "memory-document-store".to_string(),
            status,
            latency_ms: 0,
            message,
            checked_at: Utc::now(),
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    #[instrument(skip(self, record))]
    async fn create(&self, collection: &str, record: Value) -> Result<String, PortError> {
        self.ensure_online()?;
        if !record.is_object() {
            let reason = format!("{collection} record must be an object");
            return Err(StoreError::Malformed(reason).into());
        }

        let id = Uuid::now_v7().to_string();
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), record);

        self.acknowledge_write("create")?;
        Ok(id)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, PortError> {
        self.ensure_online()?;
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .and_then(|c| c.get(id))
            .map(|data| Document {
                id: id.to_string(),
                data: data.clone(),
            }))
    }

    #[instrument(skip(self, patch))]
    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<(), PortError> {
        self.ensure_online()?;
        let Value::Object(fields) = patch else {
            let reason = format!("{collection} patch must be an object");
            return Err(StoreError::Malformed(reason).into());
        };

        {
            let mut collections = self.collections.write().await;
            let stored = collections
                .get_mut(collection)
                .and_then(|c| c.get_mut(id))
                .ok_or_else(|| PortError::not_found(collection, id))?;
            if let Value::Object(target) = stored {
                for (key, value) in fields {
                    target.insert(key, value);
                }
            }
        }

        self.acknowledge_write("update")
    }

    #[instrument(skip(self))]
    async fn delete(&self, collection: &str, id: &str) -> Result<(), PortError> {
        self.ensure_online()?;
        let removed = self
            .collections
            .write()
            .await
            .get_mut(collection)
            .and_then(|c| c.remove(id));
        if removed.is_none() {
            return Err(PortError::not_found(collection, id));
        }
        self.acknowledge_write("delete")
    }

    async fn query(
        &self,
        collection: &str,
        predicate: Predicate,
    ) -> Result<Vec<Document>, PortError> {
        self.ensure_online()?;
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .map(|c| {
                c.iter()
                    .filter(|(_, data)| predicate.matches(data))
                    .map(|(id, data)| Document {
                        id: id.clone(),
                        data: data.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_crud_roundtrip() {
        let store = MemoryDocumentStore::new();
        let id = store.create("expenses", json!({"amount": "10.00"})).await.unwrap();

        let doc = store.get("expenses", &id).await.unwrap().unwrap();
        assert_eq!(doc.data["amount"], "10.00");

        store
            .update("expenses", &id, json!({"amount": "12.00"}))
            .await
            .unwrap();
        let doc = store.get("expenses", &id).await.unwrap().unwrap();
        assert_eq!(doc.data["amount"], "12.00");

        store.delete("expenses", &id).await.unwrap();
        assert!(store.get("expenses", &id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_ids_are_not_found() {
        let store = MemoryDocumentStore::new();
        let err = store.delete("expenses", "nope").await.unwrap_err();
        assert!(err.is_not_found());
        let err = store.update("expenses", "nope", json!({})).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_offline_store_fails_transiently() {
        let store = MemoryDocumentStore::new();
        store.set_online(false);
        let err = store.create("expenses", json!({})).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(store.count("expenses").await, 0);
    }

    #[tokio::test]
    async fn test_lost_response_still_applies_write() {
        let store = MemoryDocumentStore::new();
        store.lose_next_responses(1);

        let err = store.create("expenses", json!({"n": 1})).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(store.count("expenses").await, 1);

        store.create("expenses", json!({"n": 2})).await.unwrap();
        assert_eq!(store.count("expenses").await, 2);
    }

    #[tokio::test]
    async fn test_query_preserves_insertion_order() {
        let store = MemoryDocumentStore::new();
        for n in 0..5 {
            store
                .create("expenses", json!({"n": n, "group": if n % 2 == 0 { "a" } else { "b" }}))
                .await
                .unwrap();
        }
        let docs = store
            .query("expenses", Predicate::eq("group", "a"))
            .await
            .unwrap();
        let ns: Vec<i64> = docs.iter().map(|d| d.data["n"].as_i64().unwrap()).collect();
        assert_eq!(ns, vec![0, 2, 4]);
    }
}
