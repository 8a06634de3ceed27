//! Two-tier rate cache
//!
//! The cache sits in front of a [`RateSource`] and keeps rates for 24 hours
//! in memory and in a durable [`KeyValueStore`], so an offline device can
//! keep converting with rates it already fetched today.

use async_trait::async_trait;
use chrono::Duration;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use core_kernel::{Clock, Currency, KeyValueStore, Money, Timezone};

use crate::error::FxError;
use crate::rate::{CachedRate, RateKey, RateQuote};
use crate::source::RateSource;

/// Default freshness window
pub const DEFAULT_RATE_TTL_HOURS: i64 = 24;

/// Read side of the cache as seen by the ledger
#[async_trait]
pub trait RateLookup: Send + Sync {
    /// Returns the `from -> to` rate with the instant it was fetched
    async fn quote(&self, from: Currency, to: Currency) -> Result<RateQuote, FxError>;
}

/// Time-boxed cache of currency-pair conversion rates
pub struct RateCache {
    source: Arc<dyn RateSource>,
    persisted: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    timezone: Timezone,
    ttl: Duration,
    memory: RwLock<HashMap<RateKey, CachedRate>>,
    // Serialises network fetches so concurrent misses hit the source once
    fetch_lock: Mutex<()>,
}

impl std::fmt::Debug for RateCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateCache")
            .field("timezone", &self.timezone)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl RateCache {
    /// Creates a cache with the default 24h TTL
    pub fn new(
        source: Arc<dyn RateSource>,
        persisted: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        timezone: Timezone,
    ) -> Self {
        Self {
            source,
            persisted,
            clock,
            timezone,
            ttl: Duration::hours(DEFAULT_RATE_TTL_HOURS),
            memory: RwLock::new(HashMap::new()),
            fetch_lock: Mutex::new(()),
        }
    }

    /// Overrides the freshness window
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the `from -> to` conversion rate
    ///
    /// # Errors
    ///
    /// Returns an `FxError` if the rate is not cached (or is stale) and the
    /// external source cannot provide it.
    pub async fn get_rate(&self, from: Currency, to: Currency) -> Result<Decimal, FxError> {
        Ok(self.quote(from, to).await?.rate)
    }

    /// Converts `amount` into `to`, rounding once to the target minor unit
    pub async fn convert(&self, amount: Money, to: Currency) -> Result<Money, FxError> {
        let rate = self.get_rate(amount.currency(), to).await?;
        amount
            .convert(rate, to)
            .map_err(|err| FxError::InvalidResponse(err.to_string()))
    }

    /// Returns every fresh rate currently held in memory
    pub async fn fresh_rates(&self) -> Vec<CachedRate> {
        let now = self.clock.now();
        self.memory
            .read()
            .await
            .values()
            .filter(|r| r.is_fresh(now, self.ttl))
            .cloned()
            .collect()
    }

    fn key_for_today(&self, from: Currency, to: Currency) -> RateKey {
        RateKey::new(from, to, self.timezone.date_of(self.clock.now()))
    }

    async fn from_memory(&self, key: &RateKey) -> Option<CachedRate> {
        let now = self.clock.now();
        self.memory
            .read()
            .await
            .get(key)
            .filter(|r| r.is_fresh(now, self.ttl))
            .cloned()
    }

    async fn from_persisted(&self, key: &RateKey) -> Option<CachedRate> {
        let raw = match self.persisted.get(&key.storage_key()).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn!(key = %key, error = %err, "persisted rate cache unreadable, treating as miss");
                return None;
            }
        };

        let cached: CachedRate = match serde_json::from_str(&raw) {
            Ok(cached) => cached,
            Err(err) => {
                warn!(key = %key, error = %err, "discarding corrupt persisted rate");
                return None;
            }
        };

        if !cached.is_fresh(self.clock.now(), self.ttl) {
            debug!(key = %key, fetched_at = %cached.fetched_at, "persisted rate expired");
            return None;
        }

        self.memory.write().await.insert(*key, cached.clone());
        Some(cached)
    }

    async fn fetch_and_store(&self, key: RateKey) -> Result<CachedRate, FxError> {
        let fetched = self.source.fetch_rate(key.base, key.quote).await?;
        let cached = CachedRate {
            base: key.base,
            quote: key.quote,
            rate: fetched.rate,
            rate_date: fetched.date,
            fetched_at: self.clock.now(),
        };

        self.memory.write().await.insert(key, cached.clone());

        match serde_json::to_string(&cached) {
            Ok(raw) => {
                if let Err(err) = self.persisted.set(&key.storage_key(), raw).await {
                    warn!(key = %key, error = %err, "failed to persist fetched rate");
                }
            }
            Err(err) => warn!(key = %key, error = %err, "failed to encode fetched rate"),
        }

        info!(key = %key, rate = %cached.rate, "rate fetched from source");
        Ok(cached)
    }
}

#[async_trait]
impl RateLookup for RateCache {
    #[instrument(skip(self), fields(from = %from, to = %to))]
    async fn quote(&self, from: Currency, to: Currency) -> Result<RateQuote, FxError> {
        if from == to {
            return Ok(RateQuote {
                base: from,
                quote: to,
                rate: Decimal::ONE,
                fetched_at: self.clock.now(),
            });
        }

        let key = self.key_for_today(from, to);
        if let Some(hit) = self.from_memory(&key).await {
            return Ok(hit.quote());
        }
        if let Some(hit) = self.from_persisted(&key).await {
            return Ok(hit.quote());
        }

        let _guard = self.fetch_lock.lock().await;
        // Another task may have filled the slot while we waited
        if let Some(hit) = self.from_memory(&key).await {
            return Ok(hit.quote());
        }
        Ok(self.fetch_and_store(key).await?.quote())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate::FetchedRate;
    use chrono::{NaiveDate, TimeZone, Utc};
    use core_kernel::{DomainPort, ManualClock};
    use infra_store::MemoryKeyValueStore;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSource {
        calls: AtomicUsize,
    }

    impl DomainPort for CountingSource {}

    #[async_trait]
    impl RateSource for CountingSource {
        async fn fetch_rate(
            &self,
            base: Currency,
            quote: Currency,
        ) -> Result<FetchedRate, FxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let rate = match (base, quote) {
                (Currency::EUR, Currency::USD) => dec!(1.10),
                _ => dec!(2),
            };
            Ok(FetchedRate {
                rate,
                date: NaiveDate::from_ymd_opt(2024, 7, 4).unwrap(),
            })
        }
    }

    fn cache() -> (RateCache, Arc<CountingSource>, Arc<ManualClock>) {
        let source = Arc::new(CountingSource::default());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 7, 4, 0, 30, 0).unwrap(),
        ));
        let cache = RateCache::new(
            source.clone(),
            Arc::new(MemoryKeyValueStore::new()),
            clock.clone(),
            Timezone::default(),
        );
        (cache, source, clock)
    }

    #[tokio::test]
    async fn test_identity_rate_skips_source() {
        let (cache, source, _) = cache();
        assert_eq!(cache.get_rate(Currency::USD, Currency::USD).await.unwrap(), Decimal::ONE);
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_memory_hit_within_ttl() {
        let (cache, source, clock) = cache();
        cache.get_rate(Currency::EUR, Currency::USD).await.unwrap();
        clock.advance(Duration::hours(23));
        cache.get_rate(Currency::EUR, Currency::USD).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_convert_rounds_to_target() {
        let (cache, _, _) = cache();
        let converted = cache
            .convert(Money::new(dec!(10.05), Currency::EUR), Currency::USD)
            .await
            .unwrap();
        assert_eq!(converted.amount(), dec!(11.06));
        assert_eq!(converted.currency(), Currency::USD);
    }
}
