//! Execution and reconciliation core for the Optioneer trading system.
//!
//! Turns approved trade decisions into durable, idempotent, money-safe state
//! transitions against the brokerage, and continuously reconciles local
//! bookkeeping against the broker's ground truth.
//!
//! # Architecture
//!
//! - [`safety`]: the non-overridable pre-trade gate and the three loss
//!   circuit breakers derived from the trade ledger
//! - [`engine`]: entry/exit execution with idempotency keys, one transaction
//!   per attempt and bounded fill confirmation
//! - [`reconcile`]: periodic repair of divergence between the store and the
//!   broker (orphans, phantoms, drift, late fills)
//! - [`store`]: SQLite persistence for positions, intents, orders and the
//!   immutable trade ledger
//! - [`broker`]: the [`broker::BrokerPort`] seam and the Alpaca REST adapter
//! - [`notify`]: best-effort operator notifications
//!
//! The decision layer (signal scoring, LLM, operator chat) lives outside
//! this crate and talks to [`engine::ExecutionEngine`] through the tagged
//! request types in [`models`].

pub mod broker;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod notify;
pub mod reconcile;
pub mod safety;
pub mod store;

pub use config::Config;
pub use engine::ExecutionEngine;
pub use error::EngineError;
pub use reconcile::Reconciler;
pub use safety::{SafetyGate, TradingCircuitBreakers};
pub use store::Store;
