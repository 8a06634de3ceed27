//! Replay seam between the queue and the ledger store

use async_trait::async_trait;

use core_kernel::GroupId;
use domain_ledger::{LedgerError, LedgerStore};

use crate::operation::{OperationPayload, PendingOperation};

/// What a successful replay touched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Replayed {
    /// Groups whose balances the operation changed
    pub groups: Vec<GroupId>,
}

/// Something a queued operation can be replayed against
#[async_trait]
pub trait ReplayTarget: Send + Sync {
    async fn replay(&self, operation: &PendingOperation) -> Result<Replayed, LedgerError>;
}

/// Replays through the same store methods used for direct calls, so
/// validation and activity entries are identical for both paths
#[async_trait]
impl ReplayTarget for LedgerStore {
    async fn replay(&self, operation: &PendingOperation) -> Result<Replayed, LedgerError> {
        let groups = match &operation.payload {
            OperationPayload::CreateExpense { draft } => {
                self.create_expense(draft.clone()).await?.group_id.into_iter().collect()
            }
            OperationPayload::UpdateExpense { expense_id, patch } => self
                .revise_expense(*expense_id, patch.clone())
                .await?
                .touched_groups(),
            OperationPayload::DeleteExpense { expense_id } => {
                self.delete_expense(*expense_id).await?.group_id.into_iter().collect()
            }
            OperationPayload::CreateSettlement { draft } => {
                self.create_settlement(draft.clone()).await?.group_id.into_iter().collect()
            }
        };
        Ok(Replayed { groups })
    }
}
