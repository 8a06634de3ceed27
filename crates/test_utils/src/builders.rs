//! Test Data Builders
//!
//! Provides builder patterns for constructing test data with sensible defaults.
//! These builders allow tests to specify only the relevant fields while using
//! defaults for everything else.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;

use core_kernel::{Currency, ExpenseId, GroupId, Money, OperationId, SettlementId, UserId};
use domain_ledger::{
    Expense, ExpenseCategory, ExpenseDraft, FxSnapshot, Group, Payer, Settlement,
    SettlementDraft, Split, SplitMethod, SplitPlan,
};

use crate::fixtures::{MoneyFixtures, TemporalFixtures, UserFixtures};

/// Builder for expenses, either as drafts for the store or as stored records
/// for pure balance calculations
pub struct TestExpenseBuilder {
    group_id: Option<GroupId>,
    description: String,
    amount: Money,
    paid_by: Vec<Payer>,
    plan: Option<SplitPlan>,
    date: NaiveDate,
    created_by: UserId,
    fx: Option<FxSnapshot>,
    operation_id: Option<OperationId>,
}

impl Default for TestExpenseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestExpenseBuilder {
    /// 90.00 USD paid by alice, split equally between alice, bob and carol
    pub fn new() -> Self {
        Self {
            group_id: None,
            description: "Dinner".to_string(),
            amount: MoneyFixtures::usd_90(),
            paid_by: Vec::new(),
            plan: None,
            date: TemporalFixtures::today(),
            created_by: UserFixtures::alice(),
            fx: None,
            operation_id: None,
        }
    }

    pub fn in_group(mut self, group_id: GroupId) -> Self {
        self.group_id = Some(group_id);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn amount(mut self, amount: Money) -> Self {
        self.amount = amount;
        self
    }

    /// Adds a payer line; without any, the creator pays the whole amount
    pub fn paid_by(mut self, user: impl Into<UserId>, amount: Decimal) -> Self {
        self.paid_by.push(Payer::new(user, amount));
        self
    }

    pub fn split(mut self, plan: SplitPlan) -> Self {
        self.plan = Some(plan);
        self
    }

    pub fn created_by(mut self, user: impl Into<UserId>) -> Self {
        self.created_by = user.into();
        self
    }

    pub fn on(mut self, date: NaiveDate) -> Self {
        self.date = date;
        self
    }

    /// Freezes a rate into `currency` on the built record
    pub fn with_fx(mut self, currency: Currency, rate: Decimal) -> Self {
        self.fx = Some(FxSnapshot {
            currency,
            rate,
            fetched_at: TemporalFixtures::start(),
        });
        self
    }

    pub fn with_operation_id(mut self, operation_id: OperationId) -> Self {
        self.operation_id = Some(operation_id);
        self
    }

    fn payers(&self) -> Vec<Payer> {
        if self.paid_by.is_empty() {
            vec![Payer::new(self.created_by.clone(), self.amount.amount())]
        } else {
            self.paid_by.clone()
        }
    }

    fn plan(&self) -> SplitPlan {
        self.plan
            .clone()
            .unwrap_or_else(|| SplitPlan::equal(UserFixtures::trio()))
    }

    /// Builds a draft for `LedgerStore::create_expense`
    pub fn draft(self) -> ExpenseDraft {
        let mut draft = ExpenseDraft::new(
            self.description.clone(),
            self.amount,
            self.date,
            self.created_by.clone(),
        );
        draft.group_id = self.group_id;
        draft.paid_by = self.payers();
        draft.operation_id = self.operation_id;
        draft.split(self.plan()).expect("builder split plan is valid")
    }

    /// Builds a stored record without going through the store
    pub fn build(self) -> Expense {
        let plan = self.plan();
        let split_between: Vec<Split> =
            plan.splits(self.amount).expect("builder split plan is valid");
        let now = TemporalFixtures::start();
        Expense {
            id: ExpenseId::new(),
            group_id: self.group_id,
            description: self.description.clone(),
            amount: self.amount,
            category: ExpenseCategory::General,
            paid_by: self.payers(),
            split_between,
            split_method: plan.method(),
            date: self.date,
            created_by: self.created_by,
            recurrence: None,
            fx: self.fx,
            occurrence_of: None,
            operation_id: self.operation_id,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Builder for settlements
pub struct TestSettlementBuilder {
    group_id: Option<GroupId>,
    from: UserId,
    to: UserId,
    amount: Money,
    fx: Option<FxSnapshot>,
    operation_id: Option<OperationId>,
}

impl TestSettlementBuilder {
    pub fn new(from: impl Into<UserId>, to: impl Into<UserId>, amount: Money) -> Self {
        Self {
            group_id: None,
            from: from.into(),
            to: to.into(),
            amount,
            fx: None,
            operation_id: None,
        }
    }

    pub fn in_group(mut self, group_id: GroupId) -> Self {
        self.group_id = Some(group_id);
        self
    }

    pub fn with_fx(mut self, currency: Currency, rate: Decimal) -> Self {
        self.fx = Some(FxSnapshot {
            currency,
            rate,
            fetched_at: TemporalFixtures::start(),
        });
        self
    }

    pub fn with_operation_id(mut self, operation_id: OperationId) -> Self {
        self.operation_id = Some(operation_id);
        self
    }

    pub fn draft(self) -> SettlementDraft {
        let mut draft =
            SettlementDraft::new(self.from, self.to, self.amount, TemporalFixtures::today());
        draft.group_id = self.group_id;
        draft.operation_id = self.operation_id;
        draft
    }

    pub fn build(self) -> Settlement {
        Settlement {
            id: SettlementId::new(),
            group_id: self.group_id,
            created_by: self.from.clone(),
            from: self.from,
            to: self.to,
            amount: self.amount,
            date: TemporalFixtures::today(),
            notes: None,
            fx: self.fx,
            operation_id: self.operation_id,
            created_at: TemporalFixtures::start(),
        }
    }
}

/// Builder for stored groups
pub struct TestGroupBuilder {
    name: String,
    members: Vec<UserId>,
    currency: Currency,
}

impl Default for TestGroupBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestGroupBuilder {
    /// A USD group of alice, bob and carol
    pub fn new() -> Self {
        Self {
            name: "Trip".to_string(),
            members: UserFixtures::trio(),
            currency: Currency::USD,
        }
    }

    pub fn members<U: Into<UserId>>(mut self, members: impl IntoIterator<Item = U>) -> Self {
        self.members = members.into_iter().map(Into::into).collect();
        self
    }

    pub fn currency(mut self, currency: Currency) -> Self {
        self.currency = currency;
        self
    }

    pub fn build(self) -> Group {
        Group {
            id: GroupId::new(),
            name: self.name,
            created_by: self.members.first().cloned().unwrap_or_else(UserFixtures::alice),
            members: self.members,
            currency: self.currency,
            created_at: Utc::now(),
        }
    }
}
