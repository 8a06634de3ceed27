//! Pending operations
//!
//! An operation holds exactly what is needed to call the ledger store again.
//! Its id doubles as the idempotency key stamped on the draft, so a replay
//! after a lost response finds the record the first attempt wrote.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::{ExpenseId, OperationId, UserId};
use domain_ledger::{ExpenseDraft, ExpensePatch, SettlementDraft};

/// A mutation waiting to reach the document store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationPayload {
    CreateExpense { draft: ExpenseDraft },
    UpdateExpense { expense_id: ExpenseId, patch: ExpensePatch },
    DeleteExpense { expense_id: ExpenseId },
    CreateSettlement { draft: SettlementDraft },
}

impl OperationPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            OperationPayload::CreateExpense { .. } => "create_expense",
            OperationPayload::UpdateExpense { .. } => "update_expense",
            OperationPayload::DeleteExpense { .. } => "delete_expense",
            OperationPayload::CreateSettlement { .. } => "create_settlement",
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, OperationPayload::DeleteExpense { .. })
    }

    /// Sets `operation_id` on the carried draft or patch unless one is already set
    fn stamp(&mut self, operation_id: OperationId) {
        match self {
            OperationPayload::CreateExpense { draft } => {
                draft.operation_id.get_or_insert(operation_id);
            }
            OperationPayload::UpdateExpense { patch, .. } => {
                patch.operation_id.get_or_insert(operation_id);
            }
            OperationPayload::CreateSettlement { draft } => {
                draft.operation_id.get_or_insert(operation_id);
            }
            OperationPayload::DeleteExpense { .. } => {}
        }
    }
}

/// One queued mutation owned by one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOperation {
    pub id: OperationId,
    pub created_at: DateTime<Utc>,
    pub user_id: UserId,
    pub payload: OperationPayload,
}

impl PendingOperation {
    /// Creates an operation, stamping `id` onto the payload as its idempotency key
    pub fn new(
        id: OperationId,
        user_id: UserId,
        mut payload: OperationPayload,
        created_at: DateTime<Utc>,
    ) -> Self {
        payload.stamp(id);
        Self {
            id,
            created_at,
            user_id,
            payload,
        }
    }
}

impl fmt::Display for PendingOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.payload.kind(), self.id)
    }
}
