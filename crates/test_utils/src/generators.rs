//! Property-Based Test Generators
//!
//! Provides proptest strategies for generating random test data
//! that maintains domain invariants.

use proptest::prelude::*;
use rust_decimal::Decimal;

use core_kernel::{Currency, Money};

/// Strategy for generating valid positive amounts in minor units
pub fn positive_amount_minor_strategy() -> impl Strategy<Value = i64> {
    1i64..100_000_000i64
}

/// Strategy for generating valid USD Money values
pub fn usd_money_strategy() -> impl Strategy<Value = Money> {
    positive_amount_minor_strategy().prop_map(|amount| Money::from_minor(amount, Currency::USD))
}

/// Strategy for positive split weights (shares or unnormalised percentages)
pub fn split_weights_strategy(count: usize) -> impl Strategy<Value = Vec<Decimal>> {
    prop::collection::vec(1u32..100, count)
        .prop_map(|weights| weights.into_iter().map(Decimal::from).collect())
}
