//! Engine error handling

use thiserror::Error;

use domain_balance::BalanceError;
use domain_fx::FxError;
use domain_ledger::{ErrorKind, LedgerError};
use domain_sync::SyncError;
use infra_store::StoreError;

/// Engine error types
#[derive(Debug, Error)]
pub enum EngineError {
    /// Rejected by the ledger; never queued
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Balance error: {0}")]
    Balance(#[from] BalanceError),

    #[error("Pending queue error: {0}")]
    Sync(#[from] SyncError),

    #[error("FX error: {0}")]
    Fx(#[from] FxError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// A background task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Task(String),
}

impl EngineError {
    /// The ledger classification, for errors raised by the ledger store
    pub fn ledger_kind(&self) -> Option<ErrorKind> {
        match self {
            EngineError::Ledger(err) => Some(err.kind()),
            _ => None,
        }
    }

    pub fn is_validation(&self) -> bool {
        self.ledger_kind() == Some(ErrorKind::Validation)
    }

    pub fn is_not_found(&self) -> bool {
        self.ledger_kind() == Some(ErrorKind::NotFound)
    }
}

impl From<tokio::task::JoinError> for EngineError {
    fn from(err: tokio::task::JoinError) -> Self {
        EngineError::Task(err.to_string())
    }
}
