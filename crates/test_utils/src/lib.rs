//! Test Utilities Crate
//!
//! Provides shared test infrastructure, fixtures, and helpers for the
//! ledger engine test suite.
//!
//! # Modules
//!
//! - `fixtures`: Pre-built test data, a fixed rate table and a wired ledger store
//! - `builders`: Builder patterns for expenses, settlements and groups
//! - `assertions`: Custom assertion helpers for money and balances
//! - `generators`: Property-based test data generators

pub mod fixtures;
pub mod builders;
pub mod assertions;
pub mod generators;

pub use fixtures::*;
pub use builders::*;
pub use assertions::*;
pub use generators::*;
