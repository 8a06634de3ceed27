//! Balance domain errors

use core_kernel::{Currency, MoneyError};
use thiserror::Error;

/// Errors that can occur while deriving balances or transfers
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BalanceError {
    /// A record in a foreign currency has no usable conversion rate
    #[error("No {from}/{to} rate for {record}")]
    MissingRate {
        record: String,
        from: Currency,
        to: Currency,
    },

    #[error("Balances mix currencies {0} and {1}")]
    MixedCurrencies(Currency, Currency),

    #[error("Invalid lines on {record}: {reason}")]
    InvalidLines { record: String, reason: String },

    #[error(transparent)]
    Money(#[from] MoneyError),
}
