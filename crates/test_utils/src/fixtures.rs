//! Pre-built Test Fixtures
//!
//! Provides ready-to-use test data and in-process collaborators for the
//! ledger engine. These fixtures are designed to be consistent and
//! predictable for unit tests.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use core_kernel::{Clock, Currency, GroupId, ManualClock, Money, UserId};
use core_kernel::DomainPort;
use domain_fx::{FetchedRate, FxError, RateLookup, RateQuote, RateSource};
use domain_ledger::{Group, GroupDraft, LedgerStore};
use infra_store::MemoryDocumentStore;

/// Fixture for Money test data
pub struct MoneyFixtures;

impl MoneyFixtures {
    /// The dinner every scenario splits three ways
    pub fn usd_90() -> Money {
        Money::new(dec!(90.00), Currency::USD)
    }

    /// Creates a standard USD amount for testing
    pub fn usd_100() -> Money {
        Money::new(dec!(100.00), Currency::USD)
    }

    /// Creates a zero amount
    pub fn usd_zero() -> Money {
        Money::zero(Currency::USD)
    }

    /// Creates a EUR amount for conversion tests
    pub fn eur_100() -> Money {
        Money::new(dec!(100.00), Currency::EUR)
    }

    /// Creates a JPY amount (zero decimal places)
    pub fn jpy_1000() -> Money {
        Money::new(dec!(1000), Currency::JPY)
    }
}

/// Fixture for temporal test data
pub struct TemporalFixtures;

impl TemporalFixtures {
    /// Instant every test clock starts at (Mar 20, 2024 09:00 UTC)
    pub fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 20, 9, 0, 0).unwrap()
    }

    /// Calendar day of [`TemporalFixtures::start`]
    pub fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 20).unwrap()
    }

    /// Anchor for monthly recurring expenses
    pub fn rent_day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    pub fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(Self::start()))
    }
}

/// Fixture for user identities
pub struct UserFixtures;

impl UserFixtures {
    pub fn alice() -> UserId {
        UserId::new("alice")
    }

    pub fn bob() -> UserId {
        UserId::new("bob")
    }

    pub fn carol() -> UserId {
        UserId::new("carol")
    }

    /// A user outside every fixture group
    pub fn mallory() -> UserId {
        UserId::new("mallory")
    }

    pub fn trio() -> Vec<UserId> {
        vec![Self::alice(), Self::bob(), Self::carol()]
    }
}

/// Fixture for identifier test data
pub struct IdFixtures;

impl IdFixtures {
    /// Creates a deterministic group ID for testing
    pub fn group_id() -> GroupId {
        GroupId::from_uuid(Uuid::parse_str("550e8400-e29b-41d4-a716-446655440001").unwrap())
    }
}

/// Rates every [`FixedRates`] starts with
pub struct RateFixtures;

impl RateFixtures {
    pub fn eur_usd() -> Decimal {
        dec!(1.10)
    }

    pub fn gbp_usd() -> Decimal {
        dec!(1.25)
    }
}

/// A [`RateLookup`] answering from a fixed table
///
/// Can be switched offline to make every non-identity lookup time out.
pub struct FixedRates {
    rates: HashMap<(Currency, Currency), Decimal>,
    online: AtomicBool,
    calls: AtomicUsize,
    clock: Arc<dyn Clock>,
}

impl FixedRates {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            rates: HashMap::from([
                ((Currency::EUR, Currency::USD), RateFixtures::eur_usd()),
                ((Currency::GBP, Currency::USD), RateFixtures::gbp_usd()),
            ]),
            online: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
            clock,
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Number of lookups that needed a rate
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RateLookup for FixedRates {
    async fn quote(&self, from: Currency, to: Currency) -> Result<RateQuote, FxError> {
        let rate = if from == to {
            Decimal::ONE
        } else {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.online.load(Ordering::SeqCst) {
                return Err(FxError::Timeout {
                    base: from,
                    quote: to,
                    duration_ms: 10_000,
                });
            }
            *self
                .rates
                .get(&(from, to))
                .ok_or_else(|| FxError::Unavailable(format!("no fixture rate for {from}/{to}")))?
        };
        Ok(RateQuote {
            base: from,
            quote: to,
            rate,
            fetched_at: self.clock.now(),
        })
    }
}

/// A [`RateSource`] serving the [`RateFixtures`] table
///
/// Stands in for the HTTP rate API behind a real `RateCache`.
pub struct StubRateSource {
    rates: HashMap<(Currency, Currency), Decimal>,
    online: AtomicBool,
    fetches: AtomicUsize,
    clock: Arc<dyn Clock>,
}

impl StubRateSource {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            rates: HashMap::from([
                ((Currency::EUR, Currency::USD), RateFixtures::eur_usd()),
                ((Currency::GBP, Currency::USD), RateFixtures::gbp_usd()),
            ]),
            online: AtomicBool::new(true),
            fetches: AtomicUsize::new(0),
            clock,
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Number of fetches that reached the source
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl DomainPort for StubRateSource {}

#[async_trait]
impl RateSource for StubRateSource {
    async fn fetch_rate(&self, base: Currency, quote: Currency) -> Result<FetchedRate, FxError> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(FxError::Unavailable("rate source is offline".to_string()));
        }
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let rate = *self
            .rates
            .get(&(base, quote))
            .ok_or(FxError::Upstream {
                base,
                quote,
                status: 404,
            })?;
        Ok(FetchedRate {
            rate,
            date: self.clock.now().date_naive(),
        })
    }
}

/// A ledger store wired to in-memory collaborators
pub struct LedgerHarness {
    pub store: Arc<LedgerStore>,
    pub documents: Arc<MemoryDocumentStore>,
    pub rates: Arc<FixedRates>,
    pub clock: Arc<ManualClock>,
}

impl Default for LedgerHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerHarness {
    pub fn new() -> Self {
        let clock = TemporalFixtures::clock();
        let documents = Arc::new(MemoryDocumentStore::new());
        let rates = Arc::new(FixedRates::new(clock.clone()));
        let store = Arc::new(LedgerStore::new(
            documents.clone(),
            rates.clone(),
            clock.clone(),
        ));
        Self {
            store,
            documents,
            rates,
            clock,
        }
    }

    /// Creates a USD group of alice, bob and carol
    pub async fn trio_group(&self) -> Group {
        self.store
            .create_group(
                GroupDraft::new("Trip", Currency::USD, UserFixtures::alice())
                    .member(UserFixtures::bob())
                    .member(UserFixtures::carol()),
            )
            .await
            .expect("fixture group is valid")
    }
}
