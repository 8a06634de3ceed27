//! Pending operation queue tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use core_kernel::{ExpenseId, KeyValueStore, OperationId, PortError, UserId};
use domain_ledger::{ActivityKind, LedgerError, ValidationError};
use domain_sync::{
    queue_key, CommitStatus, OperationPayload, PendingOperation, PendingQueue, QueueState,
    ReplayTarget, Replayed, SyncError,
};
use infra_store::MemoryKeyValueStore;
use test_utils::{LedgerHarness, TemporalFixtures, TestExpenseBuilder, UserFixtures};

type Failure = fn() -> LedgerError;

/// Records replays and fails the operations it is told to
#[derive(Default)]
struct ScriptedTarget {
    applied: Mutex<Vec<OperationId>>,
    failures: Mutex<HashMap<OperationId, Failure>>,
}

impl ScriptedTarget {
    fn fail(&self, id: OperationId, failure: Failure) {
        self.failures.lock().unwrap().insert(id, failure);
    }

    fn heal(&self, id: OperationId) {
        self.failures.lock().unwrap().remove(&id);
    }

    fn applied(&self) -> Vec<OperationId> {
        self.applied.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReplayTarget for ScriptedTarget {
    async fn replay(&self, operation: &PendingOperation) -> Result<Replayed, LedgerError> {
        if let Some(failure) = self.failures.lock().unwrap().get(&operation.id) {
            return Err(failure());
        }
        self.applied.lock().unwrap().push(operation.id);
        Ok(Replayed::default())
    }
}

fn offline() -> LedgerError {
    LedgerError::Transport(PortError::connection("offline"))
}

fn invalid() -> LedgerError {
    LedgerError::Validation(ValidationError::EmptySplits)
}

fn missing() -> LedgerError {
    LedgerError::not_found("Expense", "gone")
}

fn delete_op() -> PendingOperation {
    PendingOperation::new(
        OperationId::new_v7(),
        UserFixtures::alice(),
        OperationPayload::DeleteExpense {
            expense_id: ExpenseId::new(),
        },
        TemporalFixtures::start(),
    )
}

fn create_op() -> PendingOperation {
    PendingOperation::new(
        OperationId::new_v7(),
        UserFixtures::alice(),
        OperationPayload::CreateExpense {
            draft: TestExpenseBuilder::new().draft(),
        },
        TemporalFixtures::start(),
    )
}

async fn queue_with(ops: &[PendingOperation]) -> (PendingQueue, Arc<MemoryKeyValueStore>) {
    let store = Arc::new(MemoryKeyValueStore::new());
    let queue = PendingQueue::open(UserFixtures::alice(), store.clone()).await.unwrap();
    for op in ops {
        queue.enqueue(op.clone()).await.unwrap();
    }
    (queue, store)
}

fn ids(ops: &[PendingOperation]) -> Vec<OperationId> {
    ops.iter().map(|op| op.id).collect()
}

// ============================================================================
// Ordering
// ============================================================================

mod ordering_tests {
    use super::*;

    #[tokio::test]
    async fn test_failing_head_blocks_everything_behind_it() {
        let ops = vec![create_op(), create_op(), create_op()];
        let (queue, _) = queue_with(&ops).await;
        let target = ScriptedTarget::default();
        target.fail(ops[0].id, offline);

        let report = queue.drain(&target).await.unwrap();
        assert!(report.halted);
        assert_eq!(report.applied, 0);
        assert_eq!(report.remaining, 3);
        assert!(target.applied().is_empty());
        assert_eq!(ids(&queue.pending().await), ids(&ops));

        target.heal(ops[0].id);
        let report = queue.drain(&target).await.unwrap();
        assert!(!report.halted);
        assert_eq!(report.applied, 3);
        assert_eq!(target.applied(), ids(&ops));
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_fx_failure_halts_like_transport() {
        let ops = vec![create_op(), create_op()];
        let (queue, _) = queue_with(&ops).await;
        let target = ScriptedTarget::default();
        target.fail(ops[1].id, || {
            LedgerError::FxUnavailable(domain_fx::FxError::Unavailable("rates down".into()))
        });

        let report = queue.drain(&target).await.unwrap();
        assert_eq!(report.applied, 1);
        assert!(report.halted);
        assert_eq!(ids(&queue.pending().await), vec![ops[1].id]);
    }

    #[tokio::test]
    async fn test_duplicate_enqueue_is_ignored() {
        let op = create_op();
        let (queue, _) = queue_with(&[op.clone(), op]).await;
        assert_eq!(queue.len().await, 1);
    }
}

// ============================================================================
// Terminal failures
// ============================================================================

mod terminal_failure_tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_operation_dropped_and_rejected() {
        let ops = vec![create_op(), create_op()];
        let (queue, _) = queue_with(&ops).await;
        let mut events = queue.subscribe();
        let target = ScriptedTarget::default();
        target.fail(ops[0].id, invalid);

        let report = queue.drain(&target).await.unwrap();
        assert_eq!(report.dropped, 1);
        assert_eq!(report.applied, 1);
        assert_eq!(report.remaining, 0);

        let first = events.recv().await.unwrap();
        assert_eq!(first.operation_id, ops[0].id);
        assert!(matches!(first.status, CommitStatus::Rejected { .. }));
        let second = events.recv().await.unwrap();
        assert_eq!(second.operation_id, ops[1].id);
        assert_eq!(second.status, CommitStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_missing_delete_counts_as_applied() {
        let op = delete_op();
        let (queue, _) = queue_with(&[op.clone()]).await;
        let mut events = queue.subscribe();
        let target = ScriptedTarget::default();
        target.fail(op.id, missing);

        let report = queue.drain(&target).await.unwrap();
        assert_eq!(report.applied, 1);
        assert_eq!(report.dropped, 0);
        assert_eq!(events.recv().await.unwrap().status, CommitStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_other_not_found_is_dropped() {
        let op = create_op();
        let (queue, _) = queue_with(&[op.clone()]).await;
        let target = ScriptedTarget::default();
        target.fail(op.id, missing);

        let report = queue.drain(&target).await.unwrap();
        assert_eq!(report.dropped, 1);
        assert!(queue.is_empty().await);
    }
}

// ============================================================================
// Persistence
// ============================================================================

mod persistence_tests {
    use super::*;

    #[tokio::test]
    async fn test_reopened_queue_keeps_order() {
        let ops = vec![create_op(), delete_op()];
        let (_, store) = queue_with(&ops).await;

        let reopened = PendingQueue::open(UserFixtures::alice(), store).await.unwrap();
        assert_eq!(reopened.pending().await, ops);
    }

    #[tokio::test]
    async fn test_queues_are_per_user() {
        let (_, store) = queue_with(&[create_op()]).await;
        let bob = PendingQueue::open(UserFixtures::bob(), store.clone()).await.unwrap();

        assert!(bob.is_empty().await);
        assert!(store.get("pending_ops_alice").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_drained_queue_removes_key() {
        let (queue, store) = queue_with(&[create_op()]).await;
        queue.drain(&ScriptedTarget::default()).await.unwrap();

        assert!(store.get(&queue_key(&UserFixtures::alice())).await.unwrap().is_none());
        assert_eq!(queue.state(), QueueState::Idle);
    }

    #[tokio::test]
    async fn test_corrupt_queue_is_an_error() {
        let store = Arc::new(MemoryKeyValueStore::new());
        store.set("pending_ops_alice", "{not json".into()).await.unwrap();

        let err = PendingQueue::open(UserId::new("alice"), store).await.unwrap_err();
        assert!(matches!(err, SyncError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn test_enqueue_fails_when_storage_offline() {
        let (queue, store) = queue_with(&[]).await;
        store.set_online(false);

        let err = queue.enqueue(create_op()).await.unwrap_err();
        assert!(err.is_transient());
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_state_returns_to_idle() {
        let (queue, _) = queue_with(&[create_op()]).await;
        let mut state = queue.watch_state();

        queue.drain(&ScriptedTarget::default()).await.unwrap();
        assert!(state.has_changed().unwrap());
        assert_eq!(*state.borrow_and_update(), QueueState::Idle);
    }
}

// ============================================================================
// Replay through the ledger store
// ============================================================================

mod ledger_replay_tests {
    use super::*;

    #[tokio::test]
    async fn test_offline_create_replays_once() {
        let h = LedgerHarness::new();
        let group = h.trio_group().await;
        let (queue, _) = queue_with(&[]).await;
        let id = OperationId::new_v7();
        let op = PendingOperation::new(
            id,
            UserFixtures::alice(),
            OperationPayload::CreateExpense {
                draft: TestExpenseBuilder::new().in_group(group.id).draft(),
            },
            TemporalFixtures::start(),
        );

        h.documents.set_online(false);
        let OperationPayload::CreateExpense { draft } = &op.payload else {
            unreachable!()
        };
        assert!(h.store.create_expense(draft.clone()).await.unwrap_err().is_retryable());
        queue.enqueue(op.clone()).await.unwrap();

        let report = queue.drain(h.store.as_ref()).await.unwrap();
        assert!(report.halted);

        h.documents.set_online(true);
        let report = queue.drain(h.store.as_ref()).await.unwrap();
        assert_eq!(report.applied, 1);

        let expenses = h.store.list_group_expenses(group.id).await.unwrap();
        assert_eq!(expenses.len(), 1);
        assert_eq!(expenses[0].operation_id, Some(id));
    }

    #[tokio::test]
    async fn test_lost_response_not_applied_twice() {
        let h = LedgerHarness::new();
        let group = h.trio_group().await;
        let (queue, _) = queue_with(&[]).await;
        let op = PendingOperation::new(
            OperationId::new_v7(),
            UserFixtures::alice(),
            OperationPayload::CreateExpense {
                draft: TestExpenseBuilder::new().in_group(group.id).draft(),
            },
            TemporalFixtures::start(),
        );
        let OperationPayload::CreateExpense { draft } = &op.payload else {
            unreachable!()
        };

        h.documents.lose_next_responses(1);
        assert!(h.store.create_expense(draft.clone()).await.is_err());
        queue.enqueue(op.clone()).await.unwrap();
        queue.drain(h.store.as_ref()).await.unwrap();

        assert_eq!(h.documents.count("expenses").await, 1);
        let created = h
            .store
            .list_activity(&UserFixtures::bob())
            .await
            .unwrap()
            .into_iter()
            .filter(|a| a.kind == ActivityKind::ExpenseCreated)
            .count();
        assert_eq!(created, 1);
    }

    #[tokio::test]
    async fn test_delete_replayed_after_it_landed() {
        let h = LedgerHarness::new();
        let group = h.trio_group().await;
        let expense = h
            .store
            .create_expense(TestExpenseBuilder::new().in_group(group.id).draft())
            .await
            .unwrap();
        h.store.delete_expense(expense.id).await.unwrap();

        let op = PendingOperation::new(
            OperationId::new_v7(),
            UserFixtures::alice(),
            OperationPayload::DeleteExpense {
                expense_id: expense.id,
            },
            TemporalFixtures::start(),
        );
        let (queue, _) = queue_with(&[op]).await;

        let report = queue.drain(h.store.as_ref()).await.unwrap();
        assert_eq!(report.applied, 1);
        assert_eq!(report.dropped, 0);
    }

    #[tokio::test]
    async fn test_operation_for_deleted_group_dropped() {
        let h = LedgerHarness::new();
        let group = h.trio_group().await;
        let op = PendingOperation::new(
            OperationId::new_v7(),
            UserFixtures::alice(),
            OperationPayload::CreateExpense {
                draft: TestExpenseBuilder::new().in_group(group.id).draft(),
            },
            TemporalFixtures::start(),
        );
        let (queue, _) = queue_with(&[op]).await;
        h.store.delete_group(group.id, &UserFixtures::alice()).await.unwrap();

        let report = queue.drain(h.store.as_ref()).await.unwrap();
        assert_eq!(report.dropped, 1);
        assert_eq!(h.documents.count("expenses").await, 0);
    }
}
