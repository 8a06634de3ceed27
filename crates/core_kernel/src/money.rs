//! Money types with precise decimal arithmetic
//!
//! This module provides a type-safe representation of monetary values
//! using rust_decimal for precise calculations without floating-point errors.
//!
//! # Rounding
//!
//! Every amount that leaves a calculation is rounded exactly once to the
//! currency's minor unit using banker's rounding (round half to even).
//! The ledger, the FX conversion and the balance calculator all route
//! through [`Money::round_to_currency`] so they agree on the same cent.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Neg, Sub};
use std::str::FromStr;
use thiserror::Error;

/// Rounding strategy shared by every component that produces money amounts
pub const ROUNDING: RoundingStrategy = RoundingStrategy::MidpointNearestEven;

/// Currency codes following ISO 4217
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    USD,
    EUR,
    GBP,
    JPY,
    CHF,
    INR,
    AUD,
    CAD,
    SGD,
    HKD,
    CNY,
    KRW,
    MXN,
    BRL,
    SEK,
    NZD,
}

impl Currency {
    /// All supported currencies
    pub const ALL: [Currency; 16] = [
        Currency::USD,
        Currency::EUR,
        Currency::GBP,
        Currency::JPY,
        Currency::CHF,
        Currency::INR,
        Currency::AUD,
        Currency::CAD,
        Currency::SGD,
        Currency::HKD,
        Currency::CNY,
        Currency::KRW,
        Currency::MXN,
        Currency::BRL,
        Currency::SEK,
        Currency::NZD,
    ];

    /// Returns the number of decimal places for this currency
    pub fn decimal_places(&self) -> u32 {
        match self {
            Currency::JPY | Currency::KRW => 0,
            _ => 2,
        }
    }

    /// Returns the smallest representable amount (one minor unit)
    ///
    /// This is also the rounding tolerance used when checking that split
    /// and payer lines add up to an expense total.
    pub fn minor_unit(&self) -> Decimal {
        Decimal::new(1, self.decimal_places())
    }

    /// Returns the ISO 4217 code
    pub fn code(&self) -> &'static str {
        match self {
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
            Currency::JPY => "JPY",
            Currency::CHF => "CHF",
            Currency::INR => "INR",
            Currency::AUD => "AUD",
            Currency::CAD => "CAD",
            Currency::SGD => "SGD",
            Currency::HKD => "HKD",
            Currency::CNY => "CNY",
            Currency::KRW => "KRW",
            Currency::MXN => "MXN",
            Currency::BRL => "BRL",
            Currency::SEK => "SEK",
            Currency::NZD => "NZD",
        }
    }

    /// Rounds a raw decimal to this currency's minor unit
    pub fn round(&self, amount: Decimal) -> Decimal {
        amount.round_dp_with_strategy(self.decimal_places(), ROUNDING)
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Currency {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_uppercase();
        Currency::ALL
            .iter()
            .copied()
            .find(|c| c.code() == code)
            .ok_or_else(|| MoneyError::UnknownCurrency(s.to_string()))
    }
}

/// Errors that can occur during money operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Currency mismatch: cannot operate on {0} and {1}")]
    CurrencyMismatch(String, String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Unknown currency code: {0}")]
    UnknownCurrency(String),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Overflow during calculation")]
    Overflow,
}

/// A monetary amount with associated currency
///
/// Amounts are kept at the currency's minor-unit precision. Intermediate
/// products (for example `amount * rate`) are computed on raw `Decimal`s and
/// rounded once when a new `Money` is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawMoney")]
pub struct Money {
    amount: Decimal,
    currency: Currency,
}

/// Wire shape of [`Money`]; decoded amounts are rounded like [`Money::new`]
#[derive(Deserialize)]
struct RawMoney {
    amount: Decimal,
    currency: Currency,
}

impl From<RawMoney> for Money {
    fn from(raw: RawMoney) -> Self {
        Money::new(raw.amount, raw.currency)
    }
}

impl Money {
    /// Creates a new Money value, rounded to the currency's minor unit
    pub fn new(amount: Decimal, currency: Currency) -> Self {
        Self {
            amount: currency.round(amount),
            currency,
        }
    }

    /// Creates Money from an integer amount in minor units (e.g., cents)
    pub fn from_minor(minor_units: i64, currency: Currency) -> Self {
        Self {
            amount: Decimal::new(minor_units, currency.decimal_places()),
            currency,
        }
    }

    /// Creates a zero amount in the specified currency
    pub fn zero(currency: Currency) -> Self {
        Self {
            amount: dec!(0),
            currency,
        }
    }

    /// Returns the amount
    pub fn amount(&self) -> Decimal {
        self.amount
    }

    /// Returns the currency
    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// Returns the amount expressed in minor units
    pub fn to_minor(&self) -> Result<i64, MoneyError> {
        let scaled = self.amount * Decimal::new(10_i64.pow(self.currency.decimal_places()), 0);
        i64::try_from(scaled.round().mantissa()).map_err(|_| MoneyError::Overflow)
    }

    /// Returns true if the amount is zero
    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    /// Returns true if the amount is positive
    pub fn is_positive(&self) -> bool {
        self.amount.is_sign_positive() && !self.amount.is_zero()
    }

    /// Returns true if the amount is negative
    pub fn is_negative(&self) -> bool {
        self.amount.is_sign_negative() && !self.amount.is_zero()
    }

    /// Returns the absolute value
    pub fn abs(&self) -> Self {
        Self {
            amount: self.amount.abs(),
            currency: self.currency,
        }
    }

    /// Rounds to the currency's standard decimal places
    pub fn round_to_currency(&self) -> Self {
        Self {
            amount: self.currency.round(self.amount),
            currency: self.currency,
        }
    }

    /// Returns true if this amount is less than one minor unit away from zero
    pub fn is_negligible(&self) -> bool {
        self.amount.abs() < self.currency.minor_unit()
    }

    /// Returns true if `other` differs from this amount by at most one minor unit
    pub fn within_tolerance(&self, other: &Money) -> bool {
        self.currency == other.currency
            && (self.amount - other.amount).abs() <= self.currency.minor_unit()
    }

    /// Checked addition that returns an error on currency mismatch
    pub fn checked_add(&self, other: &Money) -> Result<Money, MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch(
                self.currency.to_string(),
                other.currency.to_string(),
            ));
        }
        let amount = self
            .amount
            .checked_add(other.amount)
            .ok_or(MoneyError::Overflow)?;
        Ok(Self::new(amount, self.currency))
    }

    /// Checked subtraction that returns an error on currency mismatch
    pub fn checked_sub(&self, other: &Money) -> Result<Money, MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch(
                self.currency.to_string(),
                other.currency.to_string(),
            ));
        }
        let amount = self
            .amount
            .checked_sub(other.amount)
            .ok_or(MoneyError::Overflow)?;
        Ok(Self::new(amount, self.currency))
    }

    /// Returns the smaller of two amounts in the same currency
    pub fn min(self, other: Money) -> Result<Money, MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch(
                self.currency.to_string(),
                other.currency.to_string(),
            ));
        }
        Ok(if self.amount <= other.amount { self } else { other })
    }

    /// Converts into another currency at `rate`, rounding once to the target minor unit
    pub fn convert(&self, rate: Decimal, target: Currency) -> Result<Money, MoneyError> {
        if rate <= Decimal::ZERO {
            return Err(MoneyError::InvalidAmount(format!(
                "Exchange rate must be positive, got {}",
                rate
            )));
        }
        let raw = self.amount.checked_mul(rate).ok_or(MoneyError::Overflow)?;
        Ok(Money::new(raw, target))
    }

    /// Sums an iterator of amounts, all of which must be in `currency`
    pub fn sum<'a>(
        currency: Currency,
        items: impl IntoIterator<Item = &'a Money>,
    ) -> Result<Money, MoneyError> {
        items
            .into_iter()
            .try_fold(Money::zero(currency), |acc, m| acc.checked_add(m))
    }

    /// Allocates the money into n equal parts, handling remainders
    /// The remainder is distributed among the first allocations
    pub fn allocate(&self, n: u32) -> Result<Vec<Money>, MoneyError> {
        if n == 0 {
            return Err(MoneyError::InvalidAmount("Cannot allocate to zero parts".to_string()));
        }

        let total_minor = self.to_minor()? as i128;
        let base_amount = total_minor.div_euclid(n as i128);
        let remainder = total_minor.rem_euclid(n as i128) as u32;

        let mut allocations = Vec::with_capacity(n as usize);
        for i in 0..n {
            let minor = if i < remainder {
                base_amount + 1
            } else {
                base_amount
            };
            allocations.push(Money::from_minor(minor as i64, self.currency));
        }

        Ok(allocations)
    }

    /// Allocates money according to given ratios
    /// Returns allocations in the same order as the ratios
    pub fn allocate_by_ratios(&self, ratios: &[Decimal]) -> Result<Vec<Money>, MoneyError> {
        if ratios.is_empty() {
            return Err(MoneyError::InvalidAmount("Empty ratios".to_string()));
        }
        if ratios.iter().any(|r| r.is_sign_negative()) {
            return Err(MoneyError::InvalidAmount("Negative ratio".to_string()));
        }

        let total_ratio: Decimal = ratios.iter().sum();
        if total_ratio.is_zero() {
            return Err(MoneyError::InvalidAmount("Total ratio is zero".to_string()));
        }

        let mut allocated = Money::zero(self.currency);
        let mut allocations = Vec::with_capacity(ratios.len());

        for (i, ratio) in ratios.iter().enumerate() {
            if i == ratios.len() - 1 {
                // Last allocation gets the remainder to ensure sum equals original
                let remainder = self.checked_sub(&allocated)?;
                allocations.push(remainder);
            } else {
                let allocation = Self::new(self.amount * *ratio / total_ratio, self.currency);
                allocated = allocated.checked_add(&allocation)?;
                allocations.push(allocation);
            }
        }

        Ok(allocations)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dp = self.currency.decimal_places();
        write!(
            f,
            "{} {:.dp$}",
            self.currency.code(),
            self.amount,
            dp = dp as usize
        )
    }
}

impl Add for Money {
    type Output = Result<Money, MoneyError>;

    fn add(self, other: Self) -> Self::Output {
        self.checked_add(&other)
    }
}

impl Sub for Money {
    type Output = Result<Money, MoneyError>;

    fn sub(self, other: Self) -> Self::Output {
        self.checked_sub(&other)
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self {
        Self {
            amount: -self.amount,
            currency: self.currency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_creation_rounds_to_minor_unit() {
        let m = Money::new(dec!(100.505), Currency::USD);
        assert_eq!(m.amount(), dec!(100.50));
        let m = Money::new(dec!(100.515), Currency::USD);
        assert_eq!(m.amount(), dec!(100.52));
    }

    #[test]
    fn test_money_from_minor() {
        let m = Money::from_minor(10050, Currency::USD);
        assert_eq!(m.amount(), dec!(100.50));
        let y = Money::from_minor(500, Currency::JPY);
        assert_eq!(y.amount(), dec!(500));
    }

    #[test]
    fn test_currency_mismatch() {
        let usd = Money::new(dec!(100.00), Currency::USD);
        let eur = Money::new(dec!(100.00), Currency::EUR);

        let result = usd.checked_add(&eur);
        assert!(matches!(result, Err(MoneyError::CurrencyMismatch(_, _))));
    }

    #[test]
    fn test_currency_parsing() {
        assert_eq!("usd".parse::<Currency>().unwrap(), Currency::USD);
        assert_eq!(" JPY ".parse::<Currency>().unwrap(), Currency::JPY);
        assert!(matches!(
            "XYZ".parse::<Currency>(),
            Err(MoneyError::UnknownCurrency(_))
        ));
    }

    #[test]
    fn test_money_allocation() {
        let m = Money::new(dec!(100.00), Currency::USD);
        let parts = m.allocate(3).unwrap();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].amount(), dec!(33.34));
        assert_eq!(parts[1].amount(), dec!(33.33));
        let total = Money::sum(Currency::USD, &parts).unwrap();
        assert_eq!(total, m);
    }

    #[test]
    fn test_allocate_by_ratios_keeps_total() {
        let m = Money::new(dec!(10.00), Currency::USD);
        let parts = m.allocate_by_ratios(&[dec!(1), dec!(1), dec!(1)]).unwrap();
        assert_eq!(Money::sum(Currency::USD, &parts).unwrap(), m);
    }

    #[test]
    fn test_conversion_rounds_once() {
        let m = Money::new(dec!(10.00), Currency::USD);
        let eur = m.convert(dec!(0.923456), Currency::EUR).unwrap();
        assert_eq!(eur.amount(), dec!(9.23));
        assert_eq!(eur.currency(), Currency::EUR);
        assert!(m.convert(dec!(0), Currency::EUR).is_err());
    }

    #[test]
    fn test_tolerance() {
        let a = Money::new(dec!(10.00), Currency::USD);
        let b = Money::new(dec!(10.01), Currency::USD);
        let c = Money::new(dec!(10.02), Currency::USD);
        assert!(a.within_tolerance(&b));
        assert!(!a.within_tolerance(&c));
        assert!(Money::new(dec!(0.004), Currency::USD).is_negligible());
    }
}
