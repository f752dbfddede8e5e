//! Requests from the decision layer and the outcomes returned to it.
//!
//! Outcomes are plain values: a blocked gate, a duplicate idempotency key,
//! or a rejected broker order all come back as `success: false` with a
//! reason. Only infrastructure failures (store, config) surface as errors.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::enums::OrderStatus;
use super::position::GreeksSnapshot;

/// An approved entry decision, ready for execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryRequest {
    /// Signal that produced this decision; drives the idempotency key.
    pub signal_id: String,
    /// Underlying ticker.
    pub ticker: String,
    /// Full OCC option symbol to buy.
    pub option_symbol: String,
    /// Contracts requested (clamped down by position sizing).
    pub quantity: i64,
    /// Requested limit price per contract.
    pub limit_price: Decimal,
    /// Why the decision layer wants this trade.
    pub thesis: String,
    /// Conviction score from the decision layer.
    pub conviction: i32,
    /// Greeks at decision time, recorded onto the position.
    #[serde(default)]
    pub greeks: GreeksSnapshot,
    /// IV rank at decision time, when known.
    pub iv_rank: Option<Decimal>,
    /// Best bid at decision time, when known.
    pub bid: Option<Decimal>,
    /// Best ask at decision time, when known.
    pub ask: Option<Decimal>,
    /// Next earnings date for the underlying, when known.
    pub next_earnings_date: Option<NaiveDate>,
}

/// A close decision for an open position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitRequest {
    /// Position to close; drives the idempotency key.
    pub position_id: String,
    /// Why the position is being closed.
    pub reason: String,
    /// Force a market order regardless of the auto-selection heuristics.
    #[serde(default)]
    pub force_market: bool,
}

/// Result of an entry attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryOutcome {
    /// Whether the attempt was accepted and submitted without error.
    pub success: bool,
    /// Human-readable disposition.
    pub message: String,
    /// Broker order id when an order was placed.
    pub broker_order_id: Option<String>,
    /// New position id when any quantity filled.
    pub position_id: Option<String>,
    /// Contracts filled within the confirmation window.
    pub filled_qty: i64,
    /// Average fill price, when filled.
    pub filled_price: Option<Decimal>,
    /// Final observed order state, when an order was placed.
    pub order_status: Option<OrderStatus>,
}

impl EntryOutcome {
    /// Attempt stopped before any order was placed.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            broker_order_id: None,
            position_id: None,
            filled_qty: 0,
            filled_price: None,
            order_status: None,
        }
    }
}

/// Result of an exit attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitOutcome {
    /// Whether the attempt was accepted and submitted without error.
    pub success: bool,
    /// Human-readable disposition.
    pub message: String,
    /// Broker order id when an order was placed.
    pub broker_order_id: Option<String>,
    /// Contracts filled within the confirmation window.
    pub filled_qty: i64,
    /// Average fill price, when filled.
    pub filled_price: Option<Decimal>,
    /// Realized P&L in dollars, once the position closed.
    pub pnl_dollars: Option<Decimal>,
    /// Realized P&L fraction, once the position closed.
    pub pnl_pct: Option<Decimal>,
}

impl ExitOutcome {
    /// Attempt stopped before any order was placed.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            broker_order_id: None,
            filled_qty: 0,
            filled_price: None,
            pnl_dollars: None,
            pnl_pct: None,
        }
    }
}
