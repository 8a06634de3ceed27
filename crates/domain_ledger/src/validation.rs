//! Write-time invariants
//!
//! Tolerance is one minor unit of the record's currency: payer and split
//! totals may differ from the amount by at most that much.

use rust_decimal::Decimal;
use std::collections::HashSet;

use core_kernel::{Money, UserId};

use crate::error::ValidationError;
use crate::expense::{Payer, Split};
use crate::group::Group;
use crate::kinds::SplitMethod;

/// Checks an expense's amount, lines and split method
pub fn validate_expense(
    description: &str,
    amount: Money,
    method: &SplitMethod,
    payers: &[Payer],
    splits: &[Split],
) -> Result<(), ValidationError> {
    if description.trim().is_empty() {
        return Err(ValidationError::EmptyDescription);
    }
    if !amount.is_positive() {
        return Err(ValidationError::NonPositiveAmount(amount.amount()));
    }
    if splits.is_empty() {
        return Err(ValidationError::EmptySplits);
    }
    if payers.is_empty() {
        return Err(ValidationError::EmptyPayers);
    }

    let negative = payers
        .iter()
        .map(|p| (&p.user_id, p.amount))
        .chain(splits.iter().map(|s| (&s.user_id, s.amount)))
        .find(|(_, a)| a.is_sign_negative() && !a.is_zero());
    if let Some((user, _)) = negative {
        return Err(ValidationError::NegativeLine(user.clone()));
    }

    let currency = amount.currency();
    let too_fine = payers
        .iter()
        .map(|p| (&p.user_id, p.amount))
        .chain(splits.iter().map(|s| (&s.user_id, s.amount)))
        .find(|(_, a)| currency.round(*a) != *a);
    if let Some((user, line)) = too_fine {
        return Err(ValidationError::SubMinorUnit(user.clone(), line));
    }

    let mut seen = HashSet::new();
    if let Some(dup) = splits.iter().find(|s| !seen.insert(&s.user_id)) {
        return Err(ValidationError::DuplicateSplitUser(dup.user_id.clone()));
    }

    let tolerance = currency.minor_unit();
    let payer_sum: Decimal = payers.iter().map(|p| p.amount).sum();
    if (payer_sum - amount.amount()).abs() > tolerance {
        return Err(ValidationError::PayerSumMismatch {
            expected: amount.amount(),
            actual: payer_sum,
        });
    }
    let split_sum: Decimal = splits.iter().map(|s| s.amount).sum();
    if (split_sum - amount.amount()).abs() > tolerance {
        return Err(ValidationError::SplitSumMismatch {
            expected: amount.amount(),
            actual: split_sum,
        });
    }

    validate_method(method, splits)
}

fn validate_method(method: &SplitMethod, splits: &[Split]) -> Result<(), ValidationError> {
    match method {
        SplitMethod::Equal | SplitMethod::Exact => Ok(()),
        SplitMethod::Percentage => {
            let mut sum = Decimal::ZERO;
            for split in splits {
                match split.percentage {
                    Some(p) => sum += p,
                    None => return Err(ValidationError::PercentageSum(sum)),
                }
            }
            if sum != Decimal::ONE_HUNDRED {
                return Err(ValidationError::PercentageSum(sum));
            }
            Ok(())
        }
        SplitMethod::Shares => {
            match splits.iter().find(|s| s.shares.map_or(true, |n| n <= Decimal::ZERO)) {
                Some(bad) => Err(ValidationError::InvalidShares(bad.user_id.clone())),
                None => Ok(()),
            }
        }
        SplitMethod::Unknown(raw) => Err(ValidationError::UnsupportedSplitMethod(raw.clone())),
    }
}

/// Checks a settlement's amount and parties
pub fn validate_settlement(
    from: &UserId,
    to: &UserId,
    amount: Money,
) -> Result<(), ValidationError> {
    if !amount.is_positive() {
        return Err(ValidationError::NonPositiveAmount(amount.amount()));
    }
    if from == to {
        return Err(ValidationError::SelfSettlement);
    }
    Ok(())
}

/// Checks that every named user belongs to `group`
pub fn ensure_members<'a>(
    group: &Group,
    users: impl IntoIterator<Item = &'a UserId>,
) -> Result<(), ValidationError> {
    match users.into_iter().find(|u| !group.is_member(u)) {
        Some(outsider) => Err(ValidationError::NotAMember(outsider.clone())),
        None => Ok(()),
    }
}
