//! Ledger Domain - Shared expenses and settlements
//!
//! This crate owns the money-moving records of the system and the rules they
//! must satisfy before they are stored.
//!
//! # Records
//!
//! - **Expense**: a payment split between people. Payers and splits must each
//!   sum to the amount within one minor unit.
//! - **Settlement**: a direct payment from one person to another.
//! - **Group**: members sharing expenses in one settlement currency.
//! - **Activity**: an append-only feed entry for every successful write.
//!
//! # Currency
//!
//! When a record's currency differs from its group's, the store obtains a
//! rate through [`RateLookup`](domain_fx::RateLookup) and freezes it on the
//! record. The rate is never recomputed afterwards. If no rate can be had the
//! write fails with a retryable error.
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_ledger::{LedgerStore, ExpenseDraft, SplitPlan};
//!
//! let store = LedgerStore::new(documents, rates, clock);
//! let draft = ExpenseDraft::new("Dinner", Money::new(dec!(90), Currency::USD), today, "alice")
//!     .in_group(group.id)
//!     .paid_in_full_by("alice")
//!     .split(SplitPlan::equal(["alice", "bob", "carol"]))?;
//! let expense = store.create_expense(draft).await?;
//! ```

pub mod activity;
pub mod error;
pub mod expense;
pub mod group;
pub mod kinds;
pub mod recurrence;
mod records;
pub mod settlement;
pub mod split;
pub mod store;
pub mod validation;

pub use activity::Activity;
pub use error::{ErrorKind, LedgerError, ValidationError};
pub use expense::{
    Expense, ExpenseDraft, ExpensePatch, ExpenseRevision, FxSnapshot, Payer, Split,
};
pub use group::{Group, GroupDraft};
pub use kinds::{ActivityKind, ExpenseCategory, SplitMethod};
pub use recurrence::{occurrence_key, Recurrence, RecurrenceInterval};
pub use settlement::{Settlement, SettlementDraft};
pub use split::SplitPlan;
pub use store::LedgerStore;
