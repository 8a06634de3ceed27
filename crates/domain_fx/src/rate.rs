//! Rate value types

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::Currency;

/// Cache key: a currency pair on a calendar day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RateKey {
    pub base: Currency,
    pub quote: Currency,
    pub date: NaiveDate,
}

impl RateKey {
    pub fn new(base: Currency, quote: Currency, date: NaiveDate) -> Self {
        Self { base, quote, date }
    }

    /// Key used in the persisted tier
    pub fn storage_key(&self) -> String {
        format!("fx_rate_{}_{}_{}", self.base, self.quote, self.date.format("%Y-%m-%d"))
    }
}

impl fmt::Display for RateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.base, self.quote, self.date)
    }
}

/// A rate as returned by the external source
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FetchedRate {
    pub rate: Decimal,
    /// Calendar date the source says the rate applies to
    pub date: NaiveDate,
}

/// A cached conversion rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedRate {
    pub base: Currency,
    pub quote: Currency,
    pub rate: Decimal,
    pub rate_date: NaiveDate,
    pub fetched_at: DateTime<Utc>,
}

impl CachedRate {
    /// True while `now` is strictly less than `ttl` after the fetch
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now.signed_duration_since(self.fetched_at) < ttl
    }

    pub fn quote(&self) -> RateQuote {
        RateQuote {
            base: self.base,
            quote: self.quote,
            rate: self.rate,
            fetched_at: self.fetched_at,
        }
    }
}

/// A rate ready to be stamped on a ledger record
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateQuote {
    pub base: Currency,
    pub quote: Currency,
    pub rate: Decimal,
    pub fetched_at: DateTime<Utc>,
}
