//! Sync Domain - Pending operation queue
//!
//! Writes that fail with a retryable error are recorded here and replayed
//! later through the same ledger store calls, in the order they were made.
//!
//! # Guarantees
//!
//! - Delivery is at least once: an operation leaves the queue only after its
//!   replay has landed (or can never land).
//! - Effects are idempotent: creates carry their operation id as an
//!   idempotency key and a delete of an already-removed expense counts as
//!   applied.
//! - Order is preserved: a retryable failure stops the drain with the
//!   failing operation still at the front.

pub mod error;
pub mod operation;
pub mod queue;
pub mod replay;

pub use error::SyncError;
pub use operation::{OperationPayload, PendingOperation};
pub use queue::{
    queue_key, CommitEvent, CommitStatus, DrainReport, PendingQueue, QueueState, QUEUE_KEY_PREFIX,
};
pub use replay::{ReplayTarget, Replayed};
