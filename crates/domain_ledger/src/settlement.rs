//! Settlements
//!
//! A settlement is a direct payment from one person to another. It lowers
//! what the sender owes and what the recipient is owed by the same amount.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{GroupId, Money, OperationId, SettlementId, UserId};

use crate::error::ValidationError;
use crate::expense::FxSnapshot;
use crate::validation;

/// A stored settlement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    pub id: SettlementId,
    pub group_id: Option<GroupId>,
    pub from: UserId,
    pub to: UserId,
    pub amount: Money,
    pub date: NaiveDate,
    pub notes: Option<String>,
    pub created_by: UserId,
    pub fx: Option<FxSnapshot>,
    pub operation_id: Option<OperationId>,
    pub created_at: DateTime<Utc>,
}

impl Settlement {
    pub fn involves(&self, user: &UserId) -> bool {
        &self.from == user || &self.to == user
    }
}

/// Input for recording a settlement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementDraft {
    pub group_id: Option<GroupId>,
    pub from: UserId,
    pub to: UserId,
    pub amount: Money,
    pub date: NaiveDate,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_by: UserId,
    #[serde(default)]
    pub operation_id: Option<OperationId>,
}

impl SettlementDraft {
    /// Starts a draft recorded by the sender
    pub fn new(
        from: impl Into<UserId>,
        to: impl Into<UserId>,
        amount: Money,
        date: NaiveDate,
    ) -> Self {
        let from = from.into();
        Self {
            group_id: None,
            created_by: from.clone(),
            from,
            to: to.into(),
            amount,
            date,
            notes: None,
            operation_id: None,
        }
    }

    pub fn in_group(mut self, group_id: GroupId) -> Self {
        self.group_id = Some(group_id);
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn recorded_by(mut self, user: impl Into<UserId>) -> Self {
        self.created_by = user.into();
        self
    }

    pub fn with_operation_id(mut self, operation_id: OperationId) -> Self {
        self.operation_id = Some(operation_id);
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate_settlement(&self.from, &self.to, self.amount)
    }
}
