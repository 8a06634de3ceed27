//! Point-in-time conversion rates for cross-currency views

use rust_decimal::Decimal;
use std::collections::HashMap;

use core_kernel::Currency;
use domain_fx::CachedRate;

/// A fixed set of rates used when a record carries no snapshot in the
/// currency a view is denominated in
///
/// Lookups try the direct pair, then the inverse of the reverse pair.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateTable {
    rates: HashMap<(Currency, Currency), Decimal>,
}

impl RateTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rate(mut self, from: Currency, to: Currency, rate: Decimal) -> Self {
        self.insert(from, to, rate);
        self
    }

    /// Non-positive rates are ignored
    pub fn insert(&mut self, from: Currency, to: Currency, rate: Decimal) {
        if rate > Decimal::ZERO {
            self.rates.insert((from, to), rate);
        }
    }

    pub fn rate(&self, from: Currency, to: Currency) -> Option<Decimal> {
        if from == to {
            return Some(Decimal::ONE);
        }
        if let Some(rate) = self.rates.get(&(from, to)) {
            return Some(*rate);
        }
        self.rates
            .get(&(to, from))
            .and_then(|rate| Decimal::ONE.checked_div(*rate))
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

impl FromIterator<CachedRate> for RateTable {
    fn from_iter<I: IntoIterator<Item = CachedRate>>(iter: I) -> Self {
        let mut table = RateTable::new();
        for cached in iter {
            table.insert(cached.base, cached.quote, cached.rate);
        }
        table
    }
}
