//! Observable ledger state
//!
//! One [`LedgerState`] is owned by each engine and shared through an `Arc`.
//! Every change replaces the current [`LedgerSnapshot`] and wakes the
//! receivers returned by [`LedgerState::subscribe`].

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;

use core_kernel::{GroupId, OperationId};
use domain_balance::Balance;
use domain_sync::PendingOperation;

/// Everything the application renders from
#[derive(Debug, Clone, Default)]
pub struct LedgerSnapshot {
    /// Last computed balances per group
    pub balances: HashMap<GroupId, Vec<Balance>>,
    /// Writes accepted locally but not yet confirmed, in replay order
    pub pending: Vec<PendingOperation>,
    /// True while the pending queue is being replayed
    pub syncing: bool,
}

impl LedgerSnapshot {
    pub fn group_balances(&self, group_id: GroupId) -> Option<&[Balance]> {
        self.balances.get(&group_id).map(Vec::as_slice)
    }

    pub fn is_pending(&self, operation_id: OperationId) -> bool {
        self.pending.iter().any(|op| op.id == operation_id)
    }
}

/// State container backed by a `watch` channel
#[derive(Debug)]
pub struct LedgerState {
    current: watch::Sender<Arc<LedgerSnapshot>>,
}

impl Default for LedgerState {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerState {
    pub fn new() -> Self {
        let (current, _) = watch::channel(Arc::new(LedgerSnapshot::default()));
        Self { current }
    }

    pub fn snapshot(&self) -> Arc<LedgerSnapshot> {
        self.current.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<LedgerSnapshot>> {
        self.current.subscribe()
    }

    pub(crate) fn set_balances(&self, group_id: GroupId, balances: Vec<Balance>) {
        self.update(|snapshot| {
            snapshot.balances.insert(group_id, balances);
        });
    }

    pub(crate) fn remove_group(&self, group_id: GroupId) {
        self.update(|snapshot| {
            snapshot.balances.remove(&group_id);
        });
    }

    pub(crate) fn set_pending(&self, pending: Vec<PendingOperation>) {
        self.update(|snapshot| snapshot.pending = pending);
    }

    pub(crate) fn set_syncing(&self, syncing: bool) {
        self.update(|snapshot| snapshot.syncing = syncing);
    }

    fn update(&self, change: impl FnOnce(&mut LedgerSnapshot)) {
        self.current.send_modify(|current| {
            let mut next = LedgerSnapshot::clone(current);
            change(&mut next);
            *current = Arc::new(next);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::{Currency, Money};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_subscribers_see_updates() {
        let state = LedgerState::new();
        let mut rx = state.subscribe();
        let group_id = GroupId::new();

        state.set_balances(
            group_id,
            vec![Balance::new("alice", Money::new(dec!(10), Currency::USD))],
        );

        rx.changed().await.unwrap();
        let snapshot = rx.borrow_and_update().clone();
        assert_eq!(snapshot.group_balances(group_id).map(<[Balance]>::len), Some(1));
    }

    #[test]
    fn test_old_snapshots_are_unchanged() {
        let state = LedgerState::new();
        let before = state.snapshot();

        state.set_syncing(true);

        assert!(!before.syncing);
        assert!(state.snapshot().syncing);
    }

    #[test]
    fn test_remove_group() {
        let state = LedgerState::new();
        let group_id = GroupId::new();
        state.set_balances(group_id, Vec::new());
        state.remove_group(group_id);
        assert!(state.snapshot().group_balances(group_id).is_none());
    }
}
