//! Debt simplification
//!
//! Reduces a balance vector to a short list of direct payments using a
//! greedy pairing: the largest creditor is paid by the largest debtor, one
//! transfer at a time, until every balance is within one minor unit of zero.
//! Each transfer clears at least one side, so `n` non-zero balances produce
//! at most `n - 1` transfers.
//!
//! The greedy result is not always the smallest possible transfer set for
//! four or more people. It is kept because it is deterministic: ties go to
//! whoever appears first in the input.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

use core_kernel::{Currency, Money, UserId};

use crate::balance::Balance;
use crate::error::BalanceError;

/// A payment of `amount` from `from` to `to`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub from: UserId,
    pub to: UserId,
    pub amount: Money,
}

impl Transfer {
    pub fn new(from: impl Into<UserId>, to: impl Into<UserId>, amount: Money) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            amount,
        }
    }
}

impl fmt::Display for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} pays {} {}", self.from, self.to, self.amount)
    }
}

/// Currency shared by every balance, or `None` for an empty vector
fn common_currency(balances: &[Balance]) -> Result<Option<Currency>, BalanceError> {
    let Some(first) = balances.first() else {
        return Ok(None);
    };
    let currency = first.amount.currency();
    if let Some(other) = balances.iter().find(|b| b.amount.currency() != currency) {
        return Err(BalanceError::MixedCurrencies(currency, other.amount.currency()));
    }
    Ok(Some(currency))
}

/// Computes the transfers that settle `balances`
///
/// # Errors
///
/// Returns `MixedCurrencies` if the balances are not all in one currency.
pub fn simplify_debts(balances: &[Balance]) -> Result<Vec<Transfer>, BalanceError> {
    let Some(currency) = common_currency(balances)? else {
        return Ok(Vec::new());
    };
    let tolerance = currency.minor_unit();
    let mut working: Vec<Decimal> = balances.iter().map(|b| b.amount.amount()).collect();
    let mut transfers = Vec::new();

    loop {
        if working.iter().all(|v| v.abs() <= tolerance) {
            break;
        }

        let mut creditor: Option<usize> = None;
        let mut debtor: Option<usize> = None;
        for (i, value) in working.iter().enumerate() {
            if *value > Decimal::ZERO && creditor.map_or(true, |c| *value > working[c]) {
                creditor = Some(i);
            }
            if *value < Decimal::ZERO && debtor.map_or(true, |d| *value < working[d]) {
                debtor = Some(i);
            }
        }
        let (Some(c), Some(d)) = (creditor, debtor) else {
            break;
        };

        let amount = working[c].min(-working[d]);
        working[c] -= amount;
        working[d] += amount;
        transfers.push(Transfer::new(
            balances[d].user_id.clone(),
            balances[c].user_id.clone(),
            Money::new(amount, currency),
        ));
    }

    debug!(balances = balances.len(), transfers = transfers.len(), "debts simplified");
    Ok(transfers)
}

/// Applies `transfers` to `balances` as if each payment had been made
///
/// Paying raises the payer's balance and lowers the recipient's. People named
/// only in a transfer are appended.
pub fn apply_transfers(
    balances: &[Balance],
    transfers: &[Transfer],
) -> Result<Vec<Balance>, BalanceError> {
    let mut result = balances.to_vec();
    let mut index: HashMap<UserId, usize> = result
        .iter()
        .enumerate()
        .map(|(i, b)| (b.user_id.clone(), i))
        .collect();

    for transfer in transfers {
        for (user, delta) in [(&transfer.from, transfer.amount), (&transfer.to, -transfer.amount)] {
            let i = *index.entry(user.clone()).or_insert_with(|| {
                result.push(Balance::zero(user.clone(), delta.currency()));
                result.len() - 1
            });
            result[i].amount = result[i].amount.checked_add(&delta)?;
        }
    }
    Ok(result)
}
