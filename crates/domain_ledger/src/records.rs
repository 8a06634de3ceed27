//! Document mapping
//!
//! Stored bodies never contain the record id; the document store assigns
//! it. `participants` is denormalised onto every body so per-user feeds can
//! be answered with a single array-membership query.

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

use core_kernel::{
    Currency, Document, ExpenseId, GroupId, Money, OperationId, PortError, SettlementId, UserId,
};

use crate::activity::{Activity, NewActivity};
use crate::expense::{Expense, FxSnapshot, Payer, Split};
use crate::group::Group;
use crate::kinds::{ActivityKind, ExpenseCategory, SplitMethod};
use crate::recurrence::Recurrence;
use crate::settlement::Settlement;

pub(crate) const EXPENSES: &str = "expenses";
pub(crate) const SETTLEMENTS: &str = "settlements";
pub(crate) const GROUPS: &str = "groups";
pub(crate) const ACTIVITIES: &str = "activities";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ExpenseRecord {
    pub group_id: Option<GroupId>,
    pub description: String,
    pub amount: Money,
    pub category: ExpenseCategory,
    pub paid_by: Vec<Payer>,
    pub split_between: Vec<Split>,
    pub split_method: SplitMethod,
    pub date: NaiveDate,
    pub created_by: UserId,
    pub recurrence: Option<Recurrence>,
    pub fx: Option<FxSnapshot>,
    pub occurrence_of: Option<String>,
    pub operation_id: Option<OperationId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub participants: Vec<UserId>,
}

impl ExpenseRecord {
    pub fn into_expense(self, id: ExpenseId) -> Expense {
        Expense {
            id,
            group_id: self.group_id,
            description: self.description,
            amount: self.amount,
            category: self.category,
            paid_by: self.paid_by,
            split_between: self.split_between,
            split_method: self.split_method,
            date: self.date,
            created_by: self.created_by,
            recurrence: self.recurrence,
            fx: self.fx,
            occurrence_of: self.occurrence_of,
            operation_id: self.operation_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl From<&Expense> for ExpenseRecord {
    fn from(expense: &Expense) -> Self {
        Self {
            group_id: expense.group_id,
            description: expense.description.clone(),
            amount: expense.amount,
            category: expense.category.clone(),
            paid_by: expense.paid_by.clone(),
            split_between: expense.split_between.clone(),
            split_method: expense.split_method.clone(),
            date: expense.date,
            created_by: expense.created_by.clone(),
            recurrence: expense.recurrence,
            fx: expense.fx,
            occurrence_of: expense.occurrence_of.clone(),
            operation_id: expense.operation_id,
            created_at: expense.created_at,
            updated_at: expense.updated_at,
            participants: expense.participants(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct SettlementRecord {
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
    #[serde(default)]
    pub participants: Vec<UserId>,
}

impl SettlementRecord {
    pub fn into_settlement(self, id: SettlementId) -> Settlement {
        Settlement {
            id,
            group_id: self.group_id,
            from: self.from,
            to: self.to,
            amount: self.amount,
            date: self.date,
            notes: self.notes,
            created_by: self.created_by,
            fx: self.fx,
            operation_id: self.operation_id,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct GroupRecord {
    pub name: String,
    pub members: Vec<UserId>,
    pub currency: Currency,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

impl GroupRecord {
    pub fn into_group(self, id: GroupId) -> Group {
        Group {
            id,
            name: self.name,
            members: self.members,
            currency: self.currency,
            created_by: self.created_by,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ActivityRecord {
    pub kind: ActivityKind,
    pub actor: UserId,
    pub group_id: Option<GroupId>,
    pub expense_id: Option<ExpenseId>,
    pub settlement_id: Option<SettlementId>,
    pub description: String,
    pub amount: Option<Money>,
    pub participants: Vec<UserId>,
    pub operation_id: Option<OperationId>,
    pub created_at: DateTime<Utc>,
}

impl ActivityRecord {
    pub fn new(entry: NewActivity, created_at: DateTime<Utc>) -> Self {
        Self {
            kind: entry.kind,
            actor: entry.actor,
            group_id: entry.group_id,
            expense_id: entry.expense_id,
            settlement_id: entry.settlement_id,
            description: entry.description,
            amount: entry.amount,
            participants: entry.participants,
            operation_id: entry.operation_id,
            created_at,
        }
    }

    pub fn into_activity(self, id: core_kernel::ActivityId) -> Activity {
        Activity {
            id,
            kind: self.kind,
            actor: self.actor,
            group_id: self.group_id,
            expense_id: self.expense_id,
            settlement_id: self.settlement_id,
            description: self.description,
            amount: self.amount,
            participants: self.participants,
            operation_id: self.operation_id,
            created_at: self.created_at,
        }
    }
}

pub(crate) fn encode<T: Serialize>(record: &T) -> Result<Value, PortError> {
    serde_json::to_value(record).map_err(PortError::transformation)
}

pub(crate) fn decode<T: DeserializeOwned>(doc: Document) -> Result<(String, T), PortError> {
    let body = serde_json::from_value(doc.data)
        .map_err(|err| PortError::transformation(format!("document {}: {err}", doc.id)))?;
    Ok((doc.id, body))
}

pub(crate) fn parse_id<T>(raw: &str) -> Result<T, PortError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|err| PortError::transformation(format!("invalid document id '{raw}': {err}")))
}

/// Document id for a typed identifier (the bare UUID)
pub(crate) fn doc_id(uuid: &uuid::Uuid) -> String {
    uuid.to_string()
}
