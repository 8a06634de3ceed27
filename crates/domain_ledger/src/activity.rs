//! Activity log entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{ActivityId, ExpenseId, GroupId, Money, OperationId, SettlementId, UserId};

use crate::expense::Expense;
use crate::group::Group;
use crate::kinds::ActivityKind;
use crate::settlement::Settlement;

/// One entry in a user's activity feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: ActivityId,
    pub kind: ActivityKind,
    pub actor: UserId,
    pub group_id: Option<GroupId>,
    pub expense_id: Option<ExpenseId>,
    pub settlement_id: Option<SettlementId>,
    pub description: String,
    pub amount: Option<Money>,
    /// Users whose feed shows this entry
    pub participants: Vec<UserId>,
    /// Write that produced the entry, used to skip duplicates on replay
    pub operation_id: Option<OperationId>,
    pub created_at: DateTime<Utc>,
}

/// An activity entry before it is stored
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct NewActivity {
    pub kind: ActivityKind,
    pub actor: UserId,
    pub group_id: Option<GroupId>,
    pub expense_id: Option<ExpenseId>,
    pub settlement_id: Option<SettlementId>,
    pub description: String,
    pub amount: Option<Money>,
    pub participants: Vec<UserId>,
    pub operation_id: Option<OperationId>,
}

impl NewActivity {
    pub fn for_expense(kind: ActivityKind, actor: &UserId, expense: &Expense) -> Self {
        Self {
            kind,
            actor: actor.clone(),
            group_id: expense.group_id,
            expense_id: Some(expense.id),
            settlement_id: None,
            description: expense.description.clone(),
            amount: Some(expense.amount),
            participants: with_actor(actor, expense.participants()),
            operation_id: None,
        }
    }

    pub fn for_settlement(settlement: &Settlement) -> Self {
        Self {
            kind: ActivityKind::SettlementCreated,
            actor: settlement.created_by.clone(),
            group_id: settlement.group_id,
            expense_id: None,
            settlement_id: Some(settlement.id),
            description: format!("{} paid {}", settlement.from, settlement.to),
            amount: Some(settlement.amount),
            participants: with_actor(
                &settlement.created_by,
                vec![settlement.from.clone(), settlement.to.clone()],
            ),
            operation_id: settlement.operation_id,
        }
    }

    pub fn for_group(kind: ActivityKind, actor: &UserId, group: &Group) -> Self {
        Self {
            kind,
            actor: actor.clone(),
            group_id: Some(group.id),
            expense_id: None,
            settlement_id: None,
            description: group.name.clone(),
            amount: None,
            participants: with_actor(actor, group.members.clone()),
            operation_id: None,
        }
    }

    pub fn with_operation_id(mut self, operation_id: Option<OperationId>) -> Self {
        self.operation_id = operation_id;
        self
    }
}

fn with_actor(actor: &UserId, mut users: Vec<UserId>) -> Vec<UserId> {
    if !users.contains(actor) {
        users.push(actor.clone());
    }
    users
}
