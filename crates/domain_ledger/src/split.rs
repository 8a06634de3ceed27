//! Split generation
//!
//! A [`SplitPlan`] names the participants and the rule for dividing a total.
//! Generated lines always sum to the total exactly: remainders left by
//! rounding to the minor unit are handed out by allocation, never dropped.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::{Money, UserId};

use crate::error::ValidationError;
use crate::expense::Split;
use crate::kinds::SplitMethod;

/// Participants and the rule for dividing an expense between them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "lines", rename_all = "snake_case")]
pub enum SplitPlan {
    /// Same share for everyone; earlier participants absorb the remainder
    Equal(Vec<UserId>),
    /// Amounts given explicitly
    Exact(Vec<(UserId, Decimal)>),
    /// Percentages that must sum to 100
    Percentage(Vec<(UserId, Decimal)>),
    /// Positive share counts
    Shares(Vec<(UserId, Decimal)>),
}

impl SplitPlan {
    pub fn equal<U: Into<UserId>>(users: impl IntoIterator<Item = U>) -> Self {
        SplitPlan::Equal(users.into_iter().map(Into::into).collect())
    }

    pub fn exact<U: Into<UserId>>(lines: impl IntoIterator<Item = (U, Decimal)>) -> Self {
        SplitPlan::Exact(lines.into_iter().map(|(u, a)| (u.into(), a)).collect())
    }

    pub fn percentage<U: Into<UserId>>(lines: impl IntoIterator<Item = (U, Decimal)>) -> Self {
        SplitPlan::Percentage(lines.into_iter().map(|(u, p)| (u.into(), p)).collect())
    }

    pub fn shares<U: Into<UserId>>(lines: impl IntoIterator<Item = (U, Decimal)>) -> Self {
        SplitPlan::Shares(lines.into_iter().map(|(u, s)| (u.into(), s)).collect())
    }

    pub fn method(&self) -> SplitMethod {
        match self {
            SplitPlan::Equal(_) => SplitMethod::Equal,
            SplitPlan::Exact(_) => SplitMethod::Exact,
            SplitPlan::Percentage(_) => SplitMethod::Percentage,
            SplitPlan::Shares(_) => SplitMethod::Shares,
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            SplitPlan::Equal(users) => users.is_empty(),
            SplitPlan::Exact(lines) | SplitPlan::Percentage(lines) | SplitPlan::Shares(lines) => {
                lines.is_empty()
            }
        }
    }

    /// Generates split lines for `total`
    ///
    /// # Errors
    ///
    /// - `EmptySplits` if the plan names nobody
    /// - `PercentageSum` if percentages do not add up to 100
    /// - `InvalidShares` for a zero or negative share count
    pub fn splits(&self, total: Money) -> Result<Vec<Split>, ValidationError> {
        if self.is_empty() {
            return Err(ValidationError::EmptySplits);
        }

        match self {
            SplitPlan::Equal(users) => {
                let parts = total.allocate(users.len() as u32)?;
                Ok(users
                    .iter()
                    .zip(parts)
                    .map(|(user, part)| Split::new(user.clone(), part.amount()))
                    .collect())
            }
            SplitPlan::Exact(lines) => Ok(lines
                .iter()
                .map(|(user, amount)| Split::new(user.clone(), *amount))
                .collect()),
            SplitPlan::Percentage(lines) => {
                let sum: Decimal = lines.iter().map(|(_, p)| *p).sum();
                if sum != Decimal::ONE_HUNDRED {
                    return Err(ValidationError::PercentageSum(sum));
                }
                if let Some((user, _)) = lines.iter().find(|(_, p)| p.is_sign_negative()) {
                    return Err(ValidationError::NegativeLine(user.clone()));
                }
                let ratios: Vec<Decimal> = lines.iter().map(|(_, p)| *p).collect();
                let parts = total.allocate_by_ratios(&ratios)?;
                Ok(lines
                    .iter()
                    .zip(parts)
                    .map(|((user, pct), part)| Split {
                        percentage: Some(*pct),
                        ..Split::new(user.clone(), part.amount())
                    })
                    .collect())
            }
            SplitPlan::Shares(lines) => {
                if let Some((user, _)) = lines.iter().find(|(_, s)| *s <= Decimal::ZERO) {
                    return Err(ValidationError::InvalidShares(user.clone()));
                }
                let ratios: Vec<Decimal> = lines.iter().map(|(_, s)| *s).collect();
                let parts = total.allocate_by_ratios(&ratios)?;
                Ok(lines
                    .iter()
                    .zip(parts)
                    .map(|((user, shares), part)| Split {
                        shares: Some(*shares),
                        ..Split::new(user.clone(), part.amount())
                    })
                    .collect())
            }
        }
    }
}
