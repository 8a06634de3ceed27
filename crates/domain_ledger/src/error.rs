//! Ledger domain errors
//!
//! Every failure surfaced by the ledger store is classified into exactly one
//! [`ErrorKind`]. Callers use the kind to decide between showing an error and
//! keeping the write as pending.

use rust_decimal::Decimal;
use thiserror::Error;

use core_kernel::{MoneyError, PortError, UserId};
use domain_fx::FxError;

/// Invariant violations on a draft or merged record
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Expense or settlement amount is zero or negative
    #[error("Amount must be positive, got {0}")]
    NonPositiveAmount(Decimal),

    /// No split lines
    #[error("Expense must be split between at least one person")]
    EmptySplits,

    /// No payer lines
    #[error("Expense must have at least one payer")]
    EmptyPayers,

    /// A payer or split line carries a negative amount
    #[error("Line for {0} has a negative amount")]
    NegativeLine(UserId),

    /// A payer or split line is finer than the currency's minor unit
    #[error("Line for {0} has {1}, which is finer than the currency allows")]
    SubMinorUnit(UserId, Decimal),

    #[error("Payers sum to {actual}, expected {expected}")]
    PayerSumMismatch { expected: Decimal, actual: Decimal },

    #[error("Splits sum to {actual}, expected {expected}")]
    SplitSumMismatch { expected: Decimal, actual: Decimal },

    #[error("{0} appears more than once in the split")]
    DuplicateSplitUser(UserId),

    #[error("Percentages sum to {0}, expected 100")]
    PercentageSum(Decimal),

    /// Missing or non-positive share count
    #[error("Split for {0} needs a positive share count")]
    InvalidShares(UserId),

    #[error("Unsupported split method: {0}")]
    UnsupportedSplitMethod(String),

    #[error("Description must not be empty")]
    EmptyDescription,

    #[error("Group name must not be empty")]
    EmptyName,

    #[error("Group must have at least one member")]
    EmptyMembers,

    /// A line names someone outside the referenced group
    #[error("{0} is not a member of the group")]
    NotAMember(UserId),

    #[error("Settlement sender and recipient are the same person")]
    SelfSettlement,

    /// An update tried to reassign the record's creator
    #[error("Creator of a record cannot be changed")]
    CreatorChanged,

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid recurrence: {0}")]
    InvalidRecurrence(String),
}

impl From<MoneyError> for ValidationError {
    fn from(err: MoneyError) -> Self {
        ValidationError::InvalidAmount(err.to_string())
    }
}

/// Coarse classification of a ledger failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Transport,
    FxUnavailable,
}

/// Errors returned by the ledger store
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Rejected before any write, never queued
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The document store failed or was unreachable
    #[error("Transport error: {0}")]
    Transport(PortError),

    /// A required conversion rate could not be obtained
    #[error("FX rate unavailable: {0}")]
    FxUnavailable(#[from] FxError),
}

impl LedgerError {
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        LedgerError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Validation(_) => ErrorKind::Validation,
            LedgerError::NotFound { .. } => ErrorKind::NotFound,
            LedgerError::Transport(_) => ErrorKind::Transport,
            LedgerError::FxUnavailable(_) => ErrorKind::FxUnavailable,
        }
    }

    /// True for failures a later replay may fix
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transport | ErrorKind::FxUnavailable)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

impl From<PortError> for LedgerError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound { entity_type, id } => LedgerError::NotFound {
                entity: entity_label(&entity_type),
                id,
            },
            other => LedgerError::Transport(other),
        }
    }
}

fn entity_label(collection: &str) -> &'static str {
    match collection {
        "expenses" => "Expense",
        "settlements" => "Settlement",
        "groups" => "Group",
        "activities" => "Activity",
        _ => "Record",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::Currency;

    #[test]
    fn test_every_error_has_one_kind() {
        let validation: LedgerError = ValidationError::EmptySplits.into();
        assert_eq!(validation.kind(), ErrorKind::Validation);
        assert!(!validation.is_retryable());

        let missing = LedgerError::not_found("Expense", "abc");
        assert_eq!(missing.kind(), ErrorKind::NotFound);
        assert!(!missing.is_retryable());

        let transport: LedgerError = PortError::connection("offline").into();
        assert_eq!(transport.kind(), ErrorKind::Transport);
        assert!(transport.is_retryable());

        let fx: LedgerError = FxError::Timeout {
            base: Currency::EUR,
            quote: Currency::USD,
            duration_ms: 10,
        }
        .into();
        assert_eq!(fx.kind(), ErrorKind::FxUnavailable);
        assert!(fx.is_retryable());
    }

    #[test]
    fn test_port_not_found_becomes_not_found() {
        let err: LedgerError = PortError::not_found("expenses", "42").into();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Expense not found: 42");
    }
}
