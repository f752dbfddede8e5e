//! Pre-trade safety: the gate and the loss circuit breakers.
//!
//! Nothing in this module can be overridden by the decision layer. The gate
//! runs before every entry; the breakers derive entirely from the trade
//! ledger, so they hold across restarts.

mod breakers;
mod gate;
pub mod hours;

pub use breakers::{BreakerState, TradingCircuitBreakers};
pub use gate::{GateDecision, SafetyGate};
