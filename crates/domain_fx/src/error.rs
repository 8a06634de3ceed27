//! FX domain errors

use core_kernel::Currency;
use thiserror::Error;

/// Errors raised while obtaining a conversion rate
///
/// Every variant is recoverable: a later attempt may succeed once the
/// rate source is reachable again.
#[derive(Debug, Error)]
pub enum FxError {
    /// The rate source did not answer in time
    #[error("Rate lookup for {base}/{quote} timed out after {duration_ms}ms")]
    Timeout {
        base: Currency,
        quote: Currency,
        duration_ms: u64,
    },

    /// The rate source could not be reached
    #[error("Rate source unavailable: {0}")]
    Unavailable(String),

    /// The rate source answered with a non-success status
    #[error("Rate source returned HTTP {status} for {base}/{quote}")]
    Upstream {
        base: Currency,
        quote: Currency,
        status: u16,
    },

    /// The rate source answered with a body we could not use
    #[error("Invalid rate response: {0}")]
    InvalidResponse(String),
}

impl FxError {
    /// Returns true if this error was caused by a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, FxError::Timeout { .. })
    }
}
