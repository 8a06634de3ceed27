//! Integration tests for the storage adapters

use serde_json::json;
use std::path::PathBuf;
use uuid::Uuid;

use core_kernel::{AdapterHealth, DocumentStore, HealthCheckable, KeyValueStore, Predicate};
use infra_store::{FileKeyValueStore, MemoryDocumentStore, MemoryKeyValueStore, StoreError};

fn temp_path() -> PathBuf {
    std::env::temp_dir()
        .join(format!("ledger-kv-{}", Uuid::new_v4()))
        .join("state.json")
}

// ============================================================================
// Document store
// ============================================================================

mod document_store_tests {
    use super::*;

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let store = MemoryDocumentStore::new();
        let id = store.create("expenses", json!({"a": 1})).await.unwrap();

        assert!(store.get("settlements", &id).await.unwrap().is_none());
        assert_eq!(store.count("expenses").await, 1);
        assert_eq!(store.count("settlements").await, 0);
    }

    #[tokio::test]
    async fn test_update_merges_top_level_fields() {
        let store = MemoryDocumentStore::new();
        let id = store
            .create("groups", json!({"name": "Trip", "members": ["a"]}))
            .await
            .unwrap();

        store
            .update("groups", &id, json!({"members": ["a", "b"]}))
            .await
            .unwrap();

        let doc = store.get("groups", &id).await.unwrap().unwrap();
        assert_eq!(doc.data["name"], "Trip");
        assert_eq!(doc.data["members"], json!(["a", "b"]));
    }

    #[tokio::test]
    async fn test_query_by_array_membership() {
        let store = MemoryDocumentStore::new();
        store
            .create("expenses", json!({"participants": ["alice", "bob"]}))
            .await
            .unwrap();
        store
            .create("expenses", json!({"participants": ["carol"]}))
            .await
            .unwrap();

        let bob = store
            .query("expenses", Predicate::contains("participants", "bob"))
            .await
            .unwrap();
        assert_eq!(bob.len(), 1);

        let all = store.query("expenses", Predicate::All).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_query_unknown_collection_is_empty() {
        let store = MemoryDocumentStore::new();
        assert!(store.query("nothing", Predicate::All).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_non_object_records() {
        let store = MemoryDocumentStore::new();
        let err = store.create("expenses", json!([1, 2])).await.unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_write_count_includes_lost_responses() {
        let store = MemoryDocumentStore::new();
        store.lose_next_responses(2);
        let id = store.create("expenses", json!({})).await;
        assert!(id.is_err());
        let all = store.query("expenses", Predicate::All).await.unwrap();
        let _ = store.delete("expenses", &all[0].id).await;
        assert_eq!(store.write_count(), 2);
        assert_eq!(store.count("expenses").await, 0);
    }

    #[tokio::test]
    async fn test_health_follows_online_flag() {
        let store = MemoryDocumentStore::new();
        assert_eq!(store.health_check().await.status, AdapterHealth::Healthy);
        store.set_online(false);
        let report = store.health_check().await;
        assert_eq!(report.status, AdapterHealth::Unhealthy);
        assert!(report.message.is_some());
    }
}

// ============================================================================
// Key-value stores
// ============================================================================

mod key_value_tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_overwrites_value() {
        let store = MemoryKeyValueStore::new();
        store.set("k", "1".into()).await.unwrap();
        store.set("k", "2".into()).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("2"));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let path = temp_path();
        {
            let store = FileKeyValueStore::open(&path).await.unwrap();
            store.set("pending_ops_alice", "[]".into()).await.unwrap();
            store.set("fx_rate_EUR_USD_2024-07-04", "{}".into()).await.unwrap();
            store.remove("fx_rate_EUR_USD_2024-07-04").await.unwrap();
        }

        let reopened = FileKeyValueStore::open(&path).await.unwrap();
        assert_eq!(
            reopened.get("pending_ops_alice").await.unwrap().as_deref(),
            Some("[]")
        );
        assert!(reopened.get("fx_rate_EUR_USD_2024-07-04").await.unwrap().is_none());

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn test_file_store_starts_empty_without_file() {
        let path = temp_path();
        let store = FileKeyValueStore::open(&path).await.unwrap();
        assert!(store.get("anything").await.unwrap().is_none());
        assert_eq!(store.path(), path.as_path());
    }

    #[tokio::test]
    async fn test_file_store_rejects_corrupt_file() {
        let path = temp_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "not json").unwrap();

        let result = FileKeyValueStore::open(&path).await;
        assert!(matches!(result, Err(StoreError::Serialization(_))));

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn test_file_store_health() {
        let path = temp_path();
        let store = FileKeyValueStore::open(&path).await.unwrap();
        assert_eq!(store.health_check().await.status, AdapterHealth::Degraded);

        store.set("k", "v".into()).await.unwrap();
        assert_eq!(store.health_check().await.status, AdapterHealth::Healthy);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
