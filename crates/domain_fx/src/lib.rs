//! FX Domain - Cached currency conversion rates
//!
//! Expenses recorded in a currency other than their group's settlement
//! currency are converted at write time. The rate used is captured on the
//! record, so this crate only has to answer "what is the rate today".
//!
//! # Lookup order
//!
//! 1. Identity: `from == to` is always `1` with no I/O
//! 2. In-memory tier keyed by `(from, to, today)`
//! 3. Persisted tier in a [`KeyValueStore`](core_kernel::KeyValueStore)
//! 4. One call to the external [`RateSource`]
//!
//! Both tiers expire entries 24 hours after `fetched_at`. A stale rate is
//! never returned.

pub mod error;
pub mod rate;
pub mod source;
pub mod cache;

pub use error::FxError;
pub use rate::{CachedRate, RateKey, RateQuote, FetchedRate};
pub use source::{RateSource, HttpRateSource, HttpRateSourceConfig};
pub use cache::{RateCache, RateLookup, DEFAULT_RATE_TTL_HOURS};
