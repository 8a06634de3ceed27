//! Sync domain errors

use core_kernel::PortError;
use thiserror::Error;

/// Errors raised by the pending operation queue itself
///
/// Failures of replayed operations are not errors of the queue; they are
/// reported per operation in the drain report and on the commit channel.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The persisted queue could not be read back
    #[error("Pending queue at '{key}' is corrupt: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("Failed to encode pending queue: {0}")]
    Encode(String),

    #[error("Queue storage error: {0}")]
    Storage(#[from] PortError),
}

impl SyncError {
    /// Returns true if retrying the queue call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::Storage(err) if err.is_transient())
    }
}
