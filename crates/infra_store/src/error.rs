//! Store error types
//!
//! Adapter-internal failures, mapped onto [`PortError`] at the port boundary.

use core_kernel::PortError;
use thiserror::Error;

/// Errors that can occur inside a storage adapter
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store was switched offline
    #[error("Store is offline")]
    Offline,

    /// Document not found
    #[error("Entity not found: {0}")]
    NotFound(String),

    /// Record body is not a JSON object
    #[error("Malformed record: {0}")]
    Malformed(String),

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found(collection: &str, id: impl std::fmt::Display) -> Self {
        StoreError::NotFound(format!("{} with id '{}' not found", collection, id))
    }

    /// Checks if this error indicates a record was not found
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

impl From<StoreError> for PortError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Offline => PortError::connection("store is offline"),
            StoreError::NotFound(message) => PortError::NotFound {
                entity_type: "document".to_string(),
                id: message,
            },
            StoreError::Malformed(message) => PortError::transformation(message),
            StoreError::Serialization(err) => PortError::transformation(err),
            StoreError::Io(err) => PortError::Internal {
                message: "storage I/O failed".to_string(),
                source: Some(Box::new(err)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_maps_to_transient_port_error() {
        let port: PortError = StoreError::Offline.into();
        assert!(port.is_transient());
    }

    #[test]
    fn test_not_found_maps_to_port_not_found() {
        let port: PortError = StoreError::not_found("expenses", "abc").into();
        assert!(port.is_not_found());
        assert!(!port.is_transient());
    }
}
