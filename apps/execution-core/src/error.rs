//! Top-level error type for engine and reconciler flows.
//!
//! Only infrastructure failures travel as errors. Domain outcomes the caller
//! must handle (gate rejections, duplicate intents, broker order rejections)
//! are values on [`crate::models::EntryOutcome`] / [`crate::models::ExitOutcome`].

use crate::broker::BrokerApiError;
use crate::config::ConfigError;
use crate::store::StoreError;

/// Errors surfaced by the execution engine and reconciler.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Persistence failure. Any in-flight transaction was rolled back.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Broker API failure in a context with no domain-level fallback.
    #[error("broker error: {0}")]
    Broker(#[from] BrokerApiError),

    /// Configuration failure at startup.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}
