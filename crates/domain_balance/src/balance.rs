//! Net balances derived from ledger records
//!
//! Balances are never stored. Every call re-derives them from the expenses
//! and settlements it is given, so a recomputation after any write converges
//! on the same answer.
//!
//! # Sign convention
//!
//! A positive amount means the person is owed money, a negative amount means
//! they owe. Paying for an expense or paying someone back raises a balance;
//! owing a split or receiving a settlement lowers it.
//!
//! # Rounding
//!
//! Lines in the group currency are used as stored. A foreign-currency expense
//! is converted once at its frozen rate and the converted total is spread
//! across its lines by ratio, so each converted line is rounded exactly once
//! and the expense still nets to zero.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

use core_kernel::{Currency, Money, UserId};
use domain_ledger::{Expense, FxSnapshot, Group, Settlement};

use crate::error::BalanceError;
use crate::rates::RateTable;

/// One person's net position in a single currency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub user_id: UserId,
    pub amount: Money,
}

impl Balance {
    pub fn new(user_id: impl Into<UserId>, amount: Money) -> Self {
        Self {
            user_id: user_id.into(),
            amount,
        }
    }

    pub fn zero(user_id: impl Into<UserId>, currency: Currency) -> Self {
        Self::new(user_id, Money::zero(currency))
    }

    /// True if the balance is within one minor unit of zero
    pub fn is_settled(&self) -> bool {
        self.amount.abs().amount() <= self.amount.currency().minor_unit()
    }

    pub fn is_owed(&self) -> bool {
        !self.is_settled() && self.amount.is_positive()
    }

    pub fn owes(&self) -> bool {
        !self.is_settled() && self.amount.is_negative()
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.user_id, self.amount)
    }
}

/// Running totals keyed by user, in first-seen order
struct Tally {
    currency: Currency,
    entries: Vec<Balance>,
    index: HashMap<UserId, usize>,
}

impl Tally {
    fn new(currency: Currency, members: &[UserId]) -> Self {
        let mut tally = Self {
            currency,
            entries: Vec::with_capacity(members.len()),
            index: HashMap::with_capacity(members.len()),
        };
        for member in members {
            tally.slot(member);
        }
        tally
    }

    fn slot(&mut self, user: &UserId) -> usize {
        if let Some(&i) = self.index.get(user) {
            return i;
        }
        self.entries.push(Balance::zero(user.clone(), self.currency));
        self.index.insert(user.clone(), self.entries.len() - 1);
        self.entries.len() - 1
    }

    fn post(&mut self, user: &UserId, amount: Money) -> Result<(), BalanceError> {
        let i = self.slot(user);
        let entry = &mut self.entries[i];
        entry.amount = entry.amount.checked_add(&amount)?;
        Ok(())
    }

    fn into_balances(self) -> Vec<Balance> {
        self.entries
    }
}

/// Computes every member's balance in a group's settlement currency
///
/// Records belonging to other groups (or to no group) are ignored. Users who
/// appear on a record but are not listed members are appended after the
/// members so the result still sums to zero.
///
/// # Errors
///
/// - `MissingRate` if a foreign-currency record has no rate into the group currency
/// - `InvalidLines` if a converted expense has no positive lines to spread over
pub fn compute_group_balances(
    group: &Group,
    expenses: &[Expense],
    settlements: &[Settlement],
) -> Result<Vec<Balance>, BalanceError> {
    let mut tally = Tally::new(group.currency, &group.members);
    let mut records = 0usize;

    for expense in expenses.iter().filter(|e| e.group_id == Some(group.id)) {
        let (paid, owed) = expense_lines(expense, group.currency, None)?;
        for (user, amount) in paid {
            tally.post(&user, amount)?;
        }
        for (user, amount) in owed {
            tally.post(&user, -amount)?;
        }
        records += 1;
    }

    for settlement in settlements.iter().filter(|s| s.group_id == Some(group.id)) {
        let amount = settlement_amount(settlement, group.currency, None)?;
        tally.post(&settlement.from, amount)?;
        tally.post(&settlement.to, -amount)?;
        records += 1;
    }

    debug!(group_id = %group.id, records, "group balances computed");
    Ok(tally.into_balances())
}

/// True if the balances share one currency and sum to zero within one minor unit
pub fn is_closed(balances: &[Balance]) -> bool {
    let Some(first) = balances.first() else {
        return true;
    };
    let currency = first.amount.currency();
    match Money::sum(currency, balances.iter().map(|b| &b.amount)) {
        Ok(total) => total.abs().amount() <= currency.minor_unit(),
        Err(_) => false,
    }
}

/// Net position between `user` and `friend` across everything they share
///
/// Covers every expense both appear on, grouped or not, and settlements made
/// directly between them. Within one expense, what a debtor owes is attributed
/// to the creditors in proportion to how much each is owed. Amounts are
/// converted into `currency` with the record's frozen rate when it is in that
/// currency, otherwise with `rates`.
///
/// The returned balance belongs to `user`: positive means `friend` owes `user`.
pub fn compute_friend_balance(
    user: &UserId,
    friend: &UserId,
    currency: Currency,
    expenses: &[Expense],
    settlements: &[Settlement],
    rates: &RateTable,
) -> Result<Balance, BalanceError> {
    let mut total = Money::zero(currency);

    for expense in expenses.iter().filter(|e| e.involves(user) && e.involves(friend)) {
        let owed = pairwise_debt(expense, user, friend);
        if owed.is_zero() {
            continue;
        }
        let rate = conversion_rate(
            expense.id,
            expense.amount.currency(),
            expense.fx.as_ref(),
            currency,
            Some(rates),
        )?;
        total = total.checked_add(&Money::new(owed * rate, currency))?;
    }

    for settlement in settlements {
        let sign = if settlement.from == *user && settlement.to == *friend {
            Decimal::ONE
        } else if settlement.from == *friend && settlement.to == *user {
            Decimal::NEGATIVE_ONE
        } else {
            continue;
        };
        let amount = settlement_amount(settlement, currency, Some(rates))?;
        total = total.checked_add(&Money::new(amount.amount() * sign, currency))?;
    }

    Ok(Balance::new(user.clone(), total))
}

/// What `friend` owes `user` on one expense, in the expense currency
fn pairwise_debt(expense: &Expense, user: &UserId, friend: &UserId) -> Decimal {
    let mut net: HashMap<&UserId, Decimal> = HashMap::new();
    for payer in &expense.paid_by {
        *net.entry(&payer.user_id).or_default() += payer.amount;
    }
    for split in &expense.split_between {
        *net.entry(&split.user_id).or_default() -= split.amount;
    }

    let credit: Decimal = net.values().filter(|v| v.is_sign_positive()).sum();
    if credit.is_zero() {
        return Decimal::ZERO;
    }
    let mine = net.get(user).copied().unwrap_or_default();
    let theirs = net.get(friend).copied().unwrap_or_default();

    if mine > Decimal::ZERO && theirs < Decimal::ZERO {
        -theirs * mine / credit
    } else if mine < Decimal::ZERO && theirs > Decimal::ZERO {
        -(-mine * theirs / credit)
    } else {
        Decimal::ZERO
    }
}

type Lines = Vec<(UserId, Money)>;

/// Payer and split lines of `expense` in `currency`
fn expense_lines(
    expense: &Expense,
    currency: Currency,
    fallback: Option<&RateTable>,
) -> Result<(Lines, Lines), BalanceError> {
    if expense.amount.currency() == currency {
        let paid = expense
            .paid_by
            .iter()
            .map(|p| (p.user_id.clone(), Money::new(p.amount, currency)))
            .collect();
        let owed = expense
            .split_between
            .iter()
            .map(|s| (s.user_id.clone(), Money::new(s.amount, currency)))
            .collect();
        return Ok((paid, owed));
    }

    let rate = conversion_rate(
        expense.id,
        expense.amount.currency(),
        expense.fx.as_ref(),
        currency,
        fallback,
    )?;
    let total = expense.amount.convert(rate, currency)?;
    let paid = spread(
        expense,
        total,
        expense.paid_by.iter().map(|p| (&p.user_id, p.amount)),
    )?;
    let owed = spread(
        expense,
        total,
        expense.split_between.iter().map(|s| (&s.user_id, s.amount)),
    )?;
    Ok((paid, owed))
}

fn spread<'a>(
    expense: &Expense,
    total: Money,
    lines: impl Iterator<Item = (&'a UserId, Decimal)>,
) -> Result<Lines, BalanceError> {
    let (users, ratios): (Vec<&UserId>, Vec<Decimal>) = lines.unzip();
    let amounts = total
        .allocate_by_ratios(&ratios)
        .map_err(|err| BalanceError::InvalidLines {
            record: expense.id.to_string(),
            reason: err.to_string(),
        })?;
    Ok(users.into_iter().cloned().zip(amounts).collect())
}

fn settlement_amount(
    settlement: &Settlement,
    currency: Currency,
    fallback: Option<&RateTable>,
) -> Result<Money, BalanceError> {
    let rate = conversion_rate(
        settlement.id,
        settlement.amount.currency(),
        settlement.fx.as_ref(),
        currency,
        fallback,
    )?;
    Ok(settlement.amount.convert(rate, currency)?)
}

fn conversion_rate(
    record: impl fmt::Display,
    from: Currency,
    snapshot: Option<&FxSnapshot>,
    to: Currency,
    fallback: Option<&RateTable>,
) -> Result<Decimal, BalanceError> {
    if from == to {
        return Ok(Decimal::ONE);
    }
    snapshot
        .filter(|fx| fx.currency == to)
        .map(|fx| fx.rate)
        .or_else(|| fallback.and_then(|table| table.rate(from, to)))
        .ok_or_else(|| BalanceError::MissingRate {
            record: record.to_string(),
            from,
            to,
        })
}
