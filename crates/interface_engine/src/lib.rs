//! Engine Interface Layer
//!
//! This crate is the entry point an application embeds. It wires the ledger
//! store, the pending operation queue and the FX cache together for one
//! user and exposes the result as a [`LedgerEngine`].
//!
//! # Architecture
//!
//! - **Engine**: writes with offline fallback, balance views, recurring job
//! - **State**: a `watch` channel of immutable [`LedgerSnapshot`]s
//! - **Config**: `LEDGER_*` environment variables, `.env` aware
//! - **Telemetry**: `tracing-subscriber` setup
//!
//! # Example
//!
//! ```rust,ignore
//! use interface_engine::{EngineConfig, LedgerEngine, WriteOutcome, telemetry};
//!
//! let config = EngineConfig::load()?;
//! telemetry::init_tracing(&config);
//!
//! let engine = LedgerEngine::connect(UserId::new("alice"), &config, documents).await?;
//! engine.start().await?;
//!
//! match engine.create_expense(draft).await? {
//!     WriteOutcome::Committed(expense) => println!("saved {}", expense.id),
//!     WriteOutcome::Pending { operation_id, .. } => println!("queued {operation_id}"),
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod state;
pub mod telemetry;

pub use config::{EngineConfig, LogFormat};
pub use engine::{EngineParts, LedgerEngine, WriteOutcome};
pub use error::EngineError;
pub use state::{LedgerSnapshot, LedgerState};
