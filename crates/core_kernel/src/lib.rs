//! Core Kernel - Foundational types shared by the ledger engine
//!
//! This crate provides the fundamental building blocks used across all domain modules:
//! - Money types with precise decimal arithmetic and a single rounding rule
//! - Clocks and calendar-day helpers
//! - Typed identifiers
//! - Port traits for the external document and key-value stores

pub mod money;
pub mod temporal;
pub mod identifiers;
pub mod ports;

pub use money::{Money, Currency, MoneyError, ROUNDING};
pub use temporal::{Clock, SystemClock, ManualClock, Timezone, TemporalError};
pub use identifiers::{
    ExpenseId, SettlementId, GroupId, ActivityId, OperationId, UserId,
};
pub use ports::{
    PortError, DomainPort, Document, Predicate, DocumentStore, KeyValueStore,
    AdapterHealth, HealthCheckResult, HealthCheckable,
};
