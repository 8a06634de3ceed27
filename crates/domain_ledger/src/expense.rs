//! Expense records, drafts and patches
//!
//! An expense is replaced as a whole on update. Payer and split lines are
//! amounts in the expense's own currency; conversion into the group's
//! settlement currency happens only through the [`FxSnapshot`] captured when
//! the record was written.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use core_kernel::{Currency, ExpenseId, GroupId, Money, MoneyError, OperationId, UserId};

use crate::error::ValidationError;
use crate::kinds::{ExpenseCategory, SplitMethod};
use crate::recurrence::{Recurrence, RecurrenceInterval};
use crate::split::SplitPlan;
use crate::validation;

/// A member's contribution to paying an expense
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payer {
    pub user_id: UserId,
    pub amount: Decimal,
}

impl Payer {
    pub fn new(user_id: impl Into<UserId>, amount: Decimal) -> Self {
        Self {
            user_id: user_id.into(),
            amount,
        }
    }
}

/// A member's owed share of an expense
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Split {
    pub user_id: UserId,
    pub amount: Decimal,
    #[serde(default)]
    pub percentage: Option<Decimal>,
    #[serde(default)]
    pub shares: Option<Decimal>,
}

impl Split {
    pub fn new(user_id: impl Into<UserId>, amount: Decimal) -> Self {
        Self {
            user_id: user_id.into(),
            amount,
            percentage: None,
            shares: None,
        }
    }
}

/// Conversion rate frozen onto a record at write time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FxSnapshot {
    /// Currency the rate converts into (the group's settlement currency)
    pub currency: Currency,
    pub rate: Decimal,
    pub fetched_at: DateTime<Utc>,
}

impl FxSnapshot {
    /// Converts `amount` into the snapshot currency, rounding once
    pub fn convert(&self, amount: Money) -> Result<Money, MoneyError> {
        amount.convert(self.rate, self.currency)
    }
}

/// A stored expense
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: ExpenseId,
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
    /// Set on expenses materialised from a recurring template
    pub occurrence_of: Option<String>,
    /// Idempotency key of the write that created this record
    pub operation_id: Option<OperationId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Expense {
    /// Everyone who paid or owes, in first-seen order
    pub fn participants(&self) -> Vec<UserId> {
        participants(&self.paid_by, &self.split_between)
    }

    pub fn involves(&self, user: &UserId) -> bool {
        self.paid_by.iter().any(|p| &p.user_id == user)
            || self.split_between.iter().any(|s| &s.user_id == user)
    }

    pub fn is_recurring(&self) -> bool {
        self.recurrence.is_some()
    }

    /// Re-checks the amount and line invariants
    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate_expense(
            &self.description,
            self.amount,
            &self.split_method,
            &self.paid_by,
            &self.split_between,
        )
    }
}

/// An expense before and after an update
#[derive(Debug, Clone, PartialEq)]
pub struct ExpenseRevision {
    pub before: Expense,
    pub after: Expense,
}

impl ExpenseRevision {
    /// Groups whose balances the update changed, old group first
    pub fn touched_groups(&self) -> Vec<GroupId> {
        let mut groups: Vec<GroupId> = self.before.group_id.into_iter().collect();
        if let Some(group_id) = self.after.group_id {
            if !groups.contains(&group_id) {
                groups.push(group_id);
            }
        }
        groups
    }
}

pub(crate) fn participants(payers: &[Payer], splits: &[Split]) -> Vec<UserId> {
    let mut seen: Vec<UserId> = Vec::new();
    let users = payers
        .iter()
        .map(|p| &p.user_id)
        .chain(splits.iter().map(|s| &s.user_id));
    for user in users {
        if !seen.contains(user) {
            seen.push(user.clone());
        }
    }
    seen
}

/// Input for creating an expense
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseDraft {
    pub group_id: Option<GroupId>,
    pub description: String,
    pub amount: Money,
    #[serde(default)]
    pub category: ExpenseCategory,
    pub paid_by: Vec<Payer>,
    pub split_between: Vec<Split>,
    #[serde(default)]
    pub split_method: SplitMethod,
    pub date: NaiveDate,
    pub created_by: UserId,
    #[serde(default)]
    pub recurrence: Option<Recurrence>,
    #[serde(default)]
    pub operation_id: Option<OperationId>,
}

impl ExpenseDraft {
    /// Starts a draft with no payers or splits
    pub fn new(
        description: impl Into<String>,
        amount: Money,
        date: NaiveDate,
        created_by: impl Into<UserId>,
    ) -> Self {
        Self {
            group_id: None,
            description: description.into(),
            amount,
            category: ExpenseCategory::default(),
            paid_by: Vec::new(),
            split_between: Vec::new(),
            split_method: SplitMethod::default(),
            date,
            created_by: created_by.into(),
            recurrence: None,
            operation_id: None,
        }
    }

    pub fn in_group(mut self, group_id: GroupId) -> Self {
        self.group_id = Some(group_id);
        self
    }

    pub fn category(mut self, category: ExpenseCategory) -> Self {
        self.category = category;
        self
    }

    /// Adds a payer line
    pub fn paid_by(mut self, user: impl Into<UserId>, amount: Decimal) -> Self {
        self.paid_by.push(Payer::new(user, amount));
        self
    }

    /// Makes `user` the sole payer of the full amount
    pub fn paid_in_full_by(mut self, user: impl Into<UserId>) -> Self {
        self.paid_by = vec![Payer::new(user, self.amount.amount())];
        self
    }

    /// Replaces the split lines with those generated by `plan`
    pub fn split(mut self, plan: SplitPlan) -> Result<Self, ValidationError> {
        self.split_between = plan.splits(self.amount)?;
        self.split_method = plan.method();
        Ok(self)
    }

    /// Makes this expense a template repeating every `interval` from its date
    pub fn recurring(mut self, interval: RecurrenceInterval) -> Self {
        self.recurrence = Some(Recurrence::new(interval, self.date));
        self
    }

    pub fn with_operation_id(mut self, operation_id: OperationId) -> Self {
        self.operation_id = Some(operation_id);
        self
    }

    pub fn participants(&self) -> Vec<UserId> {
        participants(&self.paid_by, &self.split_between)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate_expense(
            &self.description,
            self.amount,
            &self.split_method,
            &self.paid_by,
            &self.split_between,
        )
    }
}

/// Partial replacement of an expense
///
/// `None` leaves a field as stored. For the nullable fields (`group_id`,
/// `recurrence`) `Some(None)` clears the value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpensePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<ExpenseCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_by: Option<Vec<Payer>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split_between: Option<Vec<Split>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split_method: Option<SplitMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub group_id: Option<Option<GroupId>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub recurrence: Option<Option<Recurrence>>,
    /// Must match the stored creator if present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<OperationId>,
}

// A present `null` means "clear", an absent field means "keep"
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl ExpensePatch {
    /// Replaces amount, payers and splits in one go
    pub fn with_lines(
        mut self,
        amount: Money,
        paid_by: Vec<Payer>,
        plan: SplitPlan,
    ) -> Result<Self, ValidationError> {
        self.split_between = Some(plan.splits(amount)?);
        self.split_method = Some(plan.method());
        self.amount = Some(amount);
        self.paid_by = Some(paid_by);
        Ok(self)
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Produces the merged record, without validating line invariants
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::CreatorChanged` if the patch names a
    /// different creator.
    pub fn merge_into(&self, stored: &Expense) -> Result<Expense, ValidationError> {
        if let Some(creator) = &self.created_by {
            if creator != &stored.created_by {
                return Err(ValidationError::CreatorChanged);
            }
        }

        let mut merged = stored.clone();
        if let Some(description) = &self.description {
            merged.description = description.clone();
        }
        if let Some(amount) = self.amount {
            merged.amount = amount;
        }
        if let Some(category) = &self.category {
            merged.category = category.clone();
        }
        if let Some(paid_by) = &self.paid_by {
            merged.paid_by = paid_by.clone();
        }
        if let Some(splits) = &self.split_between {
            merged.split_between = splits.clone();
        }
        if let Some(method) = &self.split_method {
            merged.split_method = method.clone();
        }
        if let Some(date) = self.date {
            merged.date = date;
        }
        if let Some(group_id) = self.group_id {
            merged.group_id = group_id;
        }
        if let Some(recurrence) = self.recurrence {
            merged.recurrence = recurrence;
        }
        Ok(merged)
    }
}
