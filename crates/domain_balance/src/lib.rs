//! Balance Domain - Who owes whom
//!
//! Pure derivations over ledger records. Nothing here performs I/O or keeps
//! state between calls.
//!
//! # Key Concepts
//!
//! - **Balance**: a person's net position, positive when they are owed
//! - **Group balances**: every member's balance in the group's settlement currency
//! - **Friend balance**: the net position between two people across all they share
//! - **Transfer**: one payment in a simplified settle-up plan
//!
//! # Invariants
//!
//! Group balances sum to zero within one minor unit of the group currency.
//! Applying the output of [`simplify_debts`] to its input leaves every balance
//! within one minor unit of zero.

pub mod balance;
pub mod error;
pub mod rates;
pub mod simplify;

pub use balance::{compute_friend_balance, compute_group_balances, is_closed, Balance};
pub use error::BalanceError;
pub use rates::RateTable;
pub use simplify::{apply_transfers, simplify_debts, Transfer};
