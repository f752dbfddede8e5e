//! Trade ledger: immutable round-trip records.
//!
//! One row per completed position. The circuit breakers derive all of their
//! state from these rows, so they are written exactly once, inside the same
//! transaction that closes the position, and never updated afterwards.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::enums::OptionSide;

/// A completed round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeLedgerEntry {
    /// Position this entry records.
    pub position_id: String,
    /// Underlying ticker.
    pub ticker: String,
    /// Call or put.
    pub side: OptionSide,
    /// Average entry fill per contract.
    pub entry_price: Decimal,
    /// Average exit fill per contract.
    pub exit_price: Decimal,
    /// Contracts traded.
    pub quantity: i64,
    /// Realized P&L in dollars.
    pub pnl_dollars: Decimal,
    /// Realized P&L as a fraction of entry notional.
    pub pnl_pct: Decimal,
    /// Hours the position was held.
    pub hold_duration_hours: f64,
    /// Why the position was opened.
    pub entry_thesis: String,
    /// Why the position was closed.
    pub exit_reason: String,
    /// When the position opened.
    pub opened_at: DateTime<Utc>,
    /// When the position closed.
    pub closed_at: DateTime<Utc>,
}

impl TradeLedgerEntry {
    /// True when the round trip lost money.
    #[must_use]
    pub fn is_loss(&self) -> bool {
        self.pnl_dollars < Decimal::ZERO
    }
}
