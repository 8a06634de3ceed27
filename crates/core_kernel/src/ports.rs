//! Ports for the external collaborators
//!
//! The ledger core does not own its persistence. It talks to two external
//! systems through the traits defined here:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │        LedgerStore / PendingQueue / RateCache            │
//! └──────────────────────────────────────────────────────────┘
//!               │                          │
//!               ▼                          ▼
//!      ┌─────────────────┐       ┌───────────────────┐
//!      │  DocumentStore  │       │   KeyValueStore   │
//!      │ (CRUD + query)  │       │ (durable strings) │
//!      └─────────────────┘       └───────────────────┘
//! ```
//!
//! Any failure reported by an adapter is a [`PortError`]. The ledger treats
//! transient port errors as transport failures that are eligible for queuing.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Error type for port operations
///
/// Provides a unified error type that all port implementations must use,
/// ensuring consistent error handling across adapters.
#[derive(Debug, Error)]
pub enum PortError {
    /// The requested document was not found
    #[error("Not found: {entity_type} with id {id}")]
    NotFound {
        entity_type: String,
        id: String,
    },

    /// Connection to the underlying system failed
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The operation timed out
    #[error("Timeout after {duration_ms}ms: {operation}")]
    Timeout {
        operation: String,
        duration_ms: u64,
    },

    /// The external system is unavailable
    #[error("Service unavailable: {service}")]
    ServiceUnavailable {
        service: String,
    },

    /// A stored document could not be mapped to or from a domain type
    #[error("Transformation error: {message}")]
    Transformation {
        message: String,
    },

    /// An internal adapter error occurred
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl PortError {
    /// Creates a NotFound error
    pub fn not_found(entity_type: impl Into<String>, id: impl fmt::Display) -> Self {
        PortError::NotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    /// Creates a Connection error
    pub fn connection(message: impl Into<String>) -> Self {
        PortError::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a Transformation error
    pub fn transformation(message: impl fmt::Display) -> Self {
        PortError::Transformation {
            message: message.to_string(),
        }
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        PortError::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Returns true if this error indicates a transient failure that may succeed on retry
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PortError::Connection { .. }
                | PortError::Timeout { .. }
                | PortError::ServiceUnavailable { .. }
                | PortError::Internal { .. }
        )
    }

    /// Returns true if this error indicates the entity was not found
    pub fn is_not_found(&self) -> bool {
        matches!(self, PortError::NotFound { .. })
    }
}

/// Marker trait for all ports
///
/// All port traits extend this marker to ensure they are
/// thread-safe and can be used in async contexts.
pub trait DomainPort: Send + Sync + 'static {}

/// A stored document together with its transport-assigned id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

/// Filter evaluated by a [`DocumentStore`] query
///
/// Field paths are top-level keys of the stored JSON object.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Matches every document
    All,
    /// `data[field] == value`
    Eq(String, Value),
    /// `data[field]` is an array containing `value`
    ArrayContains(String, Value),
    /// `data[field]` is present and not null
    Exists(String),
    /// All inner predicates match
    And(Vec<Predicate>),
    /// Any inner predicate matches
    Or(Vec<Predicate>),
}

impl Predicate {
    /// Identifiers convert to the same JSON string they serialize to
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Eq(field.into(), value.into())
    }

    pub fn contains(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::ArrayContains(field.into(), value.into())
    }

    pub fn exists(field: impl Into<String>) -> Self {
        Predicate::Exists(field.into())
    }

    pub fn and(self, other: Predicate) -> Self {
        match self {
            Predicate::And(mut inner) => {
                inner.push(other);
                Predicate::And(inner)
            }
            first => Predicate::And(vec![first, other]),
        }
    }

    /// Evaluates the predicate against a document body
    pub fn matches(&self, data: &Value) -> bool {
        match self {
            Predicate::All => true,
            Predicate::Eq(field, value) => data.get(field) == Some(value),
            Predicate::ArrayContains(field, value) => data
                .get(field)
                .and_then(Value::as_array)
                .is_some_and(|items| items.contains(value)),
            Predicate::Exists(field) => data.get(field).is_some_and(|v| !v.is_null()),
            Predicate::And(inner) => inner.iter().all(|p| p.matches(data)),
            Predicate::Or(inner) => inner.iter().any(|p| p.matches(data)),
        }
    }
}

/// Document database transport
///
/// Each call reports success or failure independently. Implementations must
/// return `Ok(None)` from [`DocumentStore::get`] for a missing id and
/// `PortError::NotFound` from `update`/`delete` of a missing id.
#[async_trait]
pub trait DocumentStore: DomainPort {
    /// Inserts a document and returns the transport-assigned id
    async fn create(&self, collection: &str, record: Value) -> Result<String, PortError>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, PortError>;

    /// Replaces the top-level fields present in `patch`
    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<(), PortError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<(), PortError>;

    async fn query(
        &self,
        collection: &str,
        predicate: Predicate,
    ) -> Result<Vec<Document>, PortError>;
}

/// Durable string key-value storage
#[async_trait]
pub trait KeyValueStore: DomainPort {
    async fn get(&self, key: &str) -> Result<Option<String>, PortError>;

    async fn set(&self, key: &str, value: String) -> Result<(), PortError>;

    async fn remove(&self, key: &str) -> Result<(), PortError>;
}

/// Health status for an adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterHealth {
    /// Adapter is healthy and operational
    Healthy,
    /// Adapter is degraded but operational
    Degraded,
    /// Adapter is unhealthy and not operational
    Unhealthy,
}

/// Health check result for an adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    /// Adapter identifier
    pub adapter_id: String,
    /// Current health status
    pub status: AdapterHealth,
    /// Latency of the health check in milliseconds
    pub latency_ms: u64,
    /// Optional message with additional details
    pub message: Option<String>,
    /// Timestamp of the health check
    pub checked_at: chrono::DateTime<chrono::Utc>,
}

/// Trait for adapters that support health checks
#[async_trait]
pub trait HealthCheckable: Send + Sync {
    async fn health_check(&self) -> HealthCheckResult;
}
