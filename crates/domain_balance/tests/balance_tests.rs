//! Balance calculator and debt simplifier tests

use chrono::{NaiveDate, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use core_kernel::{Currency, ExpenseId, GroupId, Money, SettlementId, UserId};
use domain_balance::{
    apply_transfers, compute_friend_balance, compute_group_balances, is_closed, simplify_debts,
    Balance, BalanceError, RateTable,
};
use domain_ledger::{
    Expense, ExpenseCategory, FxSnapshot, Group, Payer, Settlement, Split, SplitMethod,
};

fn group(currency: Currency, members: &[&str]) -> Group {
    Group {
        id: GroupId::new(),
        name: "Flat".into(),
        members: members.iter().map(|m| UserId::new(*m)).collect(),
        currency,
        created_by: UserId::new(members[0]),
        created_at: Utc::now(),
    }
}

fn expense(
    group_id: Option<GroupId>,
    amount: Money,
    paid_by: &[(&str, Decimal)],
    split: &[(&str, Decimal)],
) -> Expense {
    let now = Utc::now();
    Expense {
        id: ExpenseId::new(),
        group_id,
        description: "Shared".into(),
        amount,
        category: ExpenseCategory::General,
        paid_by: paid_by.iter().map(|(u, a)| Payer::new(*u, *a)).collect(),
        split_between: split.iter().map(|(u, a)| Split::new(*u, *a)).collect(),
        split_method: SplitMethod::Exact,
        date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
        created_by: UserId::new(paid_by[0].0),
        recurrence: None,
        fx: None,
        occurrence_of: None,
        operation_id: None,
        created_at: now,
        updated_at: now,
    }
}

fn settlement(group_id: Option<GroupId>, from: &str, to: &str, amount: Money) -> Settlement {
    Settlement {
        id: SettlementId::new(),
        group_id,
        from: UserId::new(from),
        to: UserId::new(to),
        amount,
        date: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
        notes: None,
        created_by: UserId::new(from),
        fx: None,
        operation_id: None,
        created_at: Utc::now(),
    }
}

fn snapshot(currency: Currency, rate: Decimal) -> Option<FxSnapshot> {
    Some(FxSnapshot {
        currency,
        rate,
        fetched_at: Utc::now(),
    })
}

fn usd(amount: Decimal) -> Money {
    Money::new(amount, Currency::USD)
}

fn amounts(balances: &[Balance]) -> Vec<Decimal> {
    balances.iter().map(|b| b.amount.amount()).collect()
}

// ============================================================================
// Group balances
// ============================================================================

mod group_balance_tests {
    use super::*;

    #[test]
    fn test_one_payer_equal_split() {
        let g = group(Currency::USD, &["alice", "bob", "carol"]);
        let e = expense(
            Some(g.id),
            usd(dec!(90.00)),
            &[("alice", dec!(90.00))],
            &[("alice", dec!(30.00)), ("bob", dec!(30.00)), ("carol", dec!(30.00))],
        );

        let balances = compute_group_balances(&g, &[e], &[]).unwrap();
        assert_eq!(amounts(&balances), vec![dec!(60.00), dec!(-30.00), dec!(-30.00)]);
        assert!(is_closed(&balances));
    }

    #[test]
    fn test_settlement_offsets_debt() {
        let g = group(Currency::USD, &["alice", "bob", "carol"]);
        let e = expense(
            Some(g.id),
            usd(dec!(90)),
            &[("alice", dec!(90))],
            &[("alice", dec!(30)), ("bob", dec!(30)), ("carol", dec!(30))],
        );
        let s = settlement(Some(g.id), "bob", "alice", usd(dec!(30)));

        let balances = compute_group_balances(&g, &[e], &[s]).unwrap();
        assert_eq!(amounts(&balances), vec![dec!(30), dec!(0), dec!(-30)]);
    }

    #[test]
    fn test_other_groups_and_ungrouped_records_ignored() {
        let g = group(Currency::USD, &["alice", "bob"]);
        let elsewhere = expense(
            Some(GroupId::new()),
            usd(dec!(10)),
            &[("alice", dec!(10))],
            &[("bob", dec!(10))],
        );
        let ungrouped = expense(None, usd(dec!(10)), &[("bob", dec!(10))], &[("alice", dec!(10))]);

        let balances = compute_group_balances(&g, &[elsewhere, ungrouped], &[]).unwrap();
        assert!(balances.iter().all(|b| b.amount.is_zero()));
    }

    #[test]
    fn test_non_member_appended() {
        let g = group(Currency::USD, &["alice", "bob"]);
        let e = expense(
            Some(g.id),
            usd(dec!(20)),
            &[("alice", dec!(20))],
            &[("bob", dec!(10)), ("dave", dec!(10))],
        );

        let balances = compute_group_balances(&g, &[e], &[]).unwrap();
        let users: Vec<&str> = balances.iter().map(|b| b.user_id.as_str()).collect();
        assert_eq!(users, vec!["alice", "bob", "dave"]);
        assert!(is_closed(&balances));
    }

    #[test]
    fn test_foreign_expense_uses_frozen_rate_and_nets_to_zero() {
        let g = group(Currency::USD, &["alice", "bob", "carol"]);
        let mut e = expense(
            Some(g.id),
            Money::new(dec!(100.00), Currency::EUR),
            &[("alice", dec!(100.00))],
            &[("alice", dec!(33.34)), ("bob", dec!(33.33)), ("carol", dec!(33.33))],
        );
        e.fx = snapshot(Currency::USD, dec!(1.0837));

        let balances = compute_group_balances(&g, &[e], &[]).unwrap();
        let total: Decimal = amounts(&balances).iter().sum();
        assert_eq!(total, Decimal::ZERO);
        // 100 EUR -> 108.37 USD, alice owes 36.13 of it
        assert_eq!(balances[0].amount.amount(), dec!(72.24));
    }

    #[test]
    fn test_foreign_expense_without_rate_fails() {
        let g = group(Currency::USD, &["alice", "bob"]);
        let e = expense(
            Some(g.id),
            Money::new(dec!(10), Currency::GBP),
            &[("alice", dec!(10))],
            &[("bob", dec!(10))],
        );

        let err = compute_group_balances(&g, &[e], &[]).unwrap_err();
        assert!(matches!(
            err,
            BalanceError::MissingRate {
                from: Currency::GBP,
                to: Currency::USD,
                ..
            }
        ));
    }

    #[test]
    fn test_foreign_settlement_converted() {
        let g = group(Currency::USD, &["alice", "bob"]);
        let mut s = settlement(Some(g.id), "bob", "alice", Money::new(dec!(10), Currency::EUR));
        s.fx = snapshot(Currency::USD, dec!(1.10));

        let balances = compute_group_balances(&g, &[], &[s]).unwrap();
        assert_eq!(amounts(&balances), vec![dec!(-11.00), dec!(11.00)]);
    }
}

// ============================================================================
// Friend balances
// ============================================================================

mod friend_balance_tests {
    use super::*;

    #[test]
    fn test_aggregates_groups_and_ungrouped() {
        let alice = UserId::new("alice");
        let bob = UserId::new("bob");
        let trip = expense(
            Some(GroupId::new()),
            usd(dec!(90)),
            &[("alice", dec!(90))],
            &[("alice", dec!(30)), ("bob", dec!(30)), ("carol", dec!(30))],
        );
        let coffee = expense(None, usd(dec!(8)), &[("bob", dec!(8))], &[("alice", dec!(4)), ("bob", dec!(4))]);
        let unrelated = expense(None, usd(dec!(50)), &[("carol", dec!(50))], &[("alice", dec!(50))]);

        let balance = compute_friend_balance(
            &alice,
            &bob,
            Currency::USD,
            &[trip, coffee, unrelated],
            &[settlement(None, "bob", "alice", usd(dec!(6)))],
            &RateTable::new(),
        )
        .unwrap();

        // bob owes 30 on the trip, alice owes 4 for coffee, bob paid back 6
        assert_eq!(balance.user_id, alice);
        assert_eq!(balance.amount, usd(dec!(20)));
    }

    #[test]
    fn test_debt_split_pro_rata_between_creditors() {
        let alice = UserId::new("alice");
        let carol = UserId::new("carol");
        let e = expense(
            None,
            usd(dec!(90)),
            &[("alice", dec!(60)), ("bob", dec!(30))],
            &[("alice", dec!(30)), ("bob", dec!(30)), ("carol", dec!(30))],
        );

        let balance =
            compute_friend_balance(&alice, &carol, Currency::USD, &[e], &[], &RateTable::new())
                .unwrap();
        assert_eq!(balance.amount, usd(dec!(30)));
    }

    #[test]
    fn test_converts_with_rate_table() {
        let alice = UserId::new("alice");
        let bob = UserId::new("bob");
        let e = expense(
            None,
            Money::new(dec!(20), Currency::EUR),
            &[("bob", dec!(20))],
            &[("alice", dec!(10)), ("bob", dec!(10))],
        );
        let rates = RateTable::new().with_rate(Currency::EUR, Currency::USD, dec!(1.10));

        let balance = compute_friend_balance(&alice, &bob, Currency::USD, &[e.clone()], &[], &rates).unwrap();
        assert_eq!(balance.amount, usd(dec!(-11.00)));

        let missing = compute_friend_balance(&alice, &bob, Currency::GBP, &[e], &[], &rates);
        assert!(missing.is_err());
    }
}

// ============================================================================
// Debt simplification
// ============================================================================

mod simplify_tests {
    use super::*;

    #[test]
    fn test_group_to_settle_up_plan() {
        let g = group(Currency::USD, &["alice", "bob", "carol"]);
        let e = expense(
            Some(g.id),
            usd(dec!(90.00)),
            &[("alice", dec!(90.00))],
            &[("alice", dec!(30.00)), ("bob", dec!(30.00)), ("carol", dec!(30.00))],
        );
        let balances = compute_group_balances(&g, &[e], &[]).unwrap();
        let transfers = simplify_debts(&balances).unwrap();

        assert_eq!(transfers.len(), 2);
        assert!(transfers.iter().all(|t| t.to.as_str() == "alice"));
        let after = apply_transfers(&balances, &transfers).unwrap();
        assert!(after.iter().all(Balance::is_settled));
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

mod property_tests {
    use super::*;

    fn cents() -> impl Strategy<Value = Vec<i64>> {
        prop::collection::vec(-100_000i64..100_000, 1..9)
    }

    /// A closed balance vector: the last member absorbs the remainder
    fn closed(raw: Vec<i64>) -> Vec<Balance> {
        let remainder: i64 = raw.iter().sum();
        raw.iter()
            .chain(std::iter::once(&-remainder))
            .enumerate()
            .map(|(i, c)| Balance::new(format!("user-{i}"), Money::from_minor(*c, Currency::USD)))
            .collect()
    }

    proptest! {
        #[test]
        fn simplified_transfers_settle_everyone(raw in cents()) {
            let balances = closed(raw);
            let transfers = simplify_debts(&balances).unwrap();
            let after = apply_transfers(&balances, &transfers).unwrap();

            prop_assert!(after.iter().all(Balance::is_settled));
            prop_assert!(transfers.len() < balances.len());
            prop_assert!(transfers.iter().all(|t| t.amount.is_positive()));
        }

        #[test]
        fn group_balances_are_closed(
            total in 1i64..1_000_000,
            payer in 0usize..4,
            weights in prop::collection::vec(1u32..10, 4),
        ) {
            let members = ["a", "b", "c", "d"];
            let g = group(Currency::USD, &members);
            let amount = Money::from_minor(total, Currency::USD);
            let ratios: Vec<Decimal> = weights.iter().map(|w| Decimal::from(*w)).collect();
            let shares = amount.allocate_by_ratios(&ratios).unwrap();
            let split: Vec<(&str, Decimal)> = members
                .iter()
                .zip(&shares)
                .map(|(m, s)| (*m, s.amount()))
                .collect();
            let e = expense(Some(g.id), amount, &[(members[payer], amount.amount())], &split);

            let balances = compute_group_balances(&g, &[e], &[]).unwrap();
            prop_assert!(is_closed(&balances));
        }
    }
}
