//! Infrastructure Store Layer
//!
//! This crate provides adapters for the two storage ports the ledger core
//! depends on:
//!
//! - [`MemoryDocumentStore`]: an in-process document database implementing
//!   [`DocumentStore`](core_kernel::DocumentStore). It can be switched offline
//!   and can be told to lose responses, which is how offline replay is tested.
//! - [`MemoryKeyValueStore`] and [`FileKeyValueStore`]: implementations of
//!   [`KeyValueStore`](core_kernel::KeyValueStore) used for the pending
//!   operation queue and the persisted FX tier.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_store::{MemoryDocumentStore, FileKeyValueStore};
//!
//! let documents = Arc::new(MemoryDocumentStore::new());
//! let durable = Arc::new(FileKeyValueStore::open("state/kv.json").await?);
//! ```

pub mod error;
pub mod memory;
pub mod kv;

pub use error::StoreError;
pub use memory::MemoryDocumentStore;
pub use kv::{MemoryKeyValueStore, FileKeyValueStore};
