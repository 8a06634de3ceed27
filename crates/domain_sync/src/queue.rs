//! Durable per-user queue of pending operations
//!
//! The queue lives in a [`KeyValueStore`] under `pending_ops_{userId}` as a
//! JSON array in enqueue order, and is rewritten after every change.
//!
//! # Drain
//!
//! Operations are replayed strictly one at a time from the front:
//!
//! | Replay result                    | Queue            | Event       |
//! |----------------------------------|------------------|-------------|
//! | applied                          | removed          | `Confirmed` |
//! | not found on a delete            | removed          | `Confirmed` |
//! | validation or other not found    | removed          | `Rejected`  |
//! | transport or FX failure          | kept, drain stops| none        |
//!
//! A halted drain leaves the failing operation at the front, so nothing
//! queued behind it is applied ahead of it.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{debug, info, instrument, warn};

use core_kernel::{GroupId, KeyValueStore, OperationId, UserId};

use crate::error::SyncError;
use crate::operation::PendingOperation;
use crate::replay::ReplayTarget;

/// Prefix of every queue's storage key
pub const QUEUE_KEY_PREFIX: &str = "pending_ops_";

const EVENT_CAPACITY: usize = 64;

/// Storage key of `user`'s queue
pub fn queue_key(user: &UserId) -> String {
    format!("{QUEUE_KEY_PREFIX}{user}")
}

/// Whether a drain is in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    Idle,
    Draining,
}

/// Terminal result of a queued operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitStatus {
    Confirmed,
    Rejected { reason: String },
}

/// Published once per operation when it leaves the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitEvent {
    pub operation_id: OperationId,
    pub kind: &'static str,
    /// Groups whose balances changed; empty unless confirmed
    pub groups: Vec<GroupId>,
    pub status: CommitStatus,
}

/// Summary of one drain pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub applied: usize,
    pub dropped: usize,
    pub remaining: usize,
    /// True if the pass stopped on a retryable failure
    pub halted: bool,
}

/// One user's pending operations
pub struct PendingQueue {
    user_id: UserId,
    key: String,
    store: Arc<dyn KeyValueStore>,
    operations: Mutex<Vec<PendingOperation>>,
    drain_lock: Mutex<()>,
    state: watch::Sender<QueueState>,
    events: broadcast::Sender<CommitEvent>,
}

impl std::fmt::Debug for PendingQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingQueue")
            .field("user_id", &self.user_id)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl PendingQueue {
    /// Loads `user_id`'s queue from `store`
    ///
    /// # Errors
    ///
    /// - `Corrupt` if the stored value is not a JSON array of operations
    /// - `Storage` if the store cannot be read
    #[instrument(skip(store))]
    pub async fn open(user_id: UserId, store: Arc<dyn KeyValueStore>) -> Result<Self, SyncError> {
        let key = queue_key(&user_id);
        let operations: Vec<PendingOperation> = match store.get(&key).await? {
            None => Vec::new(),
            Some(raw) if raw.trim().is_empty() => Vec::new(),
            Some(raw) => serde_json::from_str(&raw).map_err(|err| SyncError::Corrupt {
                key: key.clone(),
                reason: err.to_string(),
            })?,
        };
        if !operations.is_empty() {
            info!(pending = operations.len(), "loaded pending operations");
        }

        let (state, _) = watch::channel(QueueState::Idle);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            user_id,
            key,
            store,
            operations: Mutex::new(operations),
            drain_lock: Mutex::new(()),
            state,
            events,
        })
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Appends `operation` and persists the queue
    ///
    /// Enqueuing an operation id that is already queued is a no-op.
    #[instrument(skip(self, operation), fields(operation = %operation))]
    pub async fn enqueue(&self, operation: PendingOperation) -> Result<(), SyncError> {
        let mut operations = self.operations.lock().await;
        if operations.iter().any(|op| op.id == operation.id) {
            debug!("operation already queued");
            return Ok(());
        }
        if operation.user_id != self.user_id {
            warn!(owner = %operation.user_id, "queueing operation recorded for another user");
        }

        operations.push(operation);
        if let Err(err) = self.persist(&operations).await {
            operations.pop();
            return Err(err);
        }
        debug!(pending = operations.len(), "operation queued");
        Ok(())
    }

    /// Snapshot of the queue in replay order
    pub async fn pending(&self) -> Vec<PendingOperation> {
        self.operations.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.operations.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.operations.lock().await.is_empty()
    }

    pub fn state(&self) -> QueueState {
        *self.state.borrow()
    }

    /// Receives every state transition
    pub fn watch_state(&self) -> watch::Receiver<QueueState> {
        self.state.subscribe()
    }

    /// Receives a [`CommitEvent`] for every operation that leaves the queue
    pub fn subscribe(&self) -> broadcast::Receiver<CommitEvent> {
        self.events.subscribe()
    }

    /// Replays queued operations against `target` until the queue is empty
    /// or a retryable failure stops the pass
    ///
    /// Concurrent calls run one after the other.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the shortened queue cannot be persisted. The
    /// operation that was just replayed stays queued; replaying it again is
    /// harmless because every replay is idempotent.
    #[instrument(skip(self, target), fields(user_id = %self.user_id))]
    pub async fn drain(&self, target: &dyn ReplayTarget) -> Result<DrainReport, SyncError> {
        let _running = self.drain_lock.lock().await;
        self.state.send_replace(QueueState::Draining);
        let result = self.drain_pass(target).await;
        self.state.send_replace(QueueState::Idle);

        if let Ok(report) = &result {
            info!(
                applied = report.applied,
                dropped = report.dropped,
                remaining = report.remaining,
                halted = report.halted,
                "drain finished"
            );
        }
        result
    }

    async fn drain_pass(&self, target: &dyn ReplayTarget) -> Result<DrainReport, SyncError> {
        let mut report = DrainReport::default();

        loop {
            let Some(operation) = self.operations.lock().await.first().cloned() else {
                break;
            };

            match target.replay(&operation).await {
                Ok(replayed) => {
                    self.complete(&operation).await?;
                    report.applied += 1;
                    debug!(operation = %operation, "replayed");
                    self.notify(&operation, replayed.groups, CommitStatus::Confirmed);
                }
                Err(err) if err.is_retryable() => {
                    warn!(operation = %operation, error = %err, "replay failed, keeping queue order");
                    report.halted = true;
                    break;
                }
                Err(err) if err.is_not_found() && operation.payload.is_delete() => {
                    self.complete(&operation).await?;
                    report.applied += 1;
                    debug!(operation = %operation, "delete already applied");
                    self.notify(&operation, Vec::new(), CommitStatus::Confirmed);
                }
                Err(err) => {
                    self.complete(&operation).await?;
                    report.dropped += 1;
                    warn!(operation = %operation, error = %err, "dropping operation that can no longer apply");
                    self.notify(
                        &operation,
                        Vec::new(),
                        CommitStatus::Rejected {
                            reason: err.to_string(),
                        },
                    );
                }
            }
        }

        report.remaining = self.len().await;
        Ok(report)
    }

    /// Removes `operation` and persists the queue, restoring it on failure
    async fn complete(&self, operation: &PendingOperation) -> Result<(), SyncError> {
        let mut operations = self.operations.lock().await;
        let Some(position) = operations.iter().position(|op| op.id == operation.id) else {
            return Ok(());
        };
        let removed = operations.remove(position);
        if let Err(err) = self.persist(&operations).await {
            operations.insert(position, removed);
            return Err(err);
        }
        Ok(())
    }

    async fn persist(&self, operations: &[PendingOperation]) -> Result<(), SyncError> {
        if operations.is_empty() {
            self.store.remove(&self.key).await?;
            return Ok(());
        }
        let raw =
            serde_json::to_string(operations).map_err(|err| SyncError::Encode(err.to_string()))?;
        self.store.set(&self.key, raw).await?;
        Ok(())
    }

    fn notify(&self, operation: &PendingOperation, groups: Vec<GroupId>, status: CommitStatus) {
        // No receivers is fine
        let _ = self.events.send(CommitEvent {
            operation_id: operation.id,
            kind: operation.payload.kind(),
            groups,
            status,
        });
    }
}
