//! Custom Test Assertions
//!
//! Provides specialized assertion helpers for domain types that give
//! more meaningful error messages than standard assertions.

use rust_decimal::Decimal;

use core_kernel::{Money, UserId};
use domain_balance::{apply_transfers, Balance, Transfer};

/// Asserts that parts sum to the total within one minor unit
pub fn assert_money_sum_equals(parts: &[Money], total: &Money) {
    let sum = Money::sum(total.currency(), parts).expect("parts share the total's currency");
    assert!(
        sum.within_tolerance(total),
        "Parts sum to {} but total is {}",
        sum,
        total
    );
}

/// Asserts a user's balance, ignoring decimal scale
pub fn assert_balance(balances: &[Balance], user: &UserId, expected: Decimal) {
    let balance = balances
        .iter()
        .find(|b| &b.user_id == user)
        .unwrap_or_else(|| panic!("No balance for {user} in {balances:?}"));
    assert_eq!(
        balance.amount.amount(),
        expected,
        "Balance for {} is {}, expected {}",
        user,
        balance.amount,
        expected
    );
}

/// Asserts that balances sum to zero within one minor unit
pub fn assert_balances_closed(balances: &[Balance]) {
    assert!(
        domain_balance::is_closed(balances),
        "Balances do not sum to zero: {:?}",
        balances
    );
}

/// Asserts that applying `transfers` settles every balance
pub fn assert_transfers_settle(balances: &[Balance], transfers: &[Transfer]) {
    let after =
        apply_transfers(balances, transfers).expect("transfers share the balances' currency");
    let open: Vec<&Balance> = after.iter().filter(|b| !b.is_settled()).collect();
    assert!(open.is_empty(), "Balances left open after transfers: {open:?}");
}
