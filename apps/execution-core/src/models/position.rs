//! Position record: one option holding from entry to close.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::enums::{OptionSide, PositionStatus};
use super::{contract_notional, occ};

/// Point-in-time Greeks captured at entry (all optional, data feeds permitting).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GreeksSnapshot {
    /// Delta at entry.
    pub delta: Option<Decimal>,
    /// Gamma at entry.
    pub gamma: Option<Decimal>,
    /// Theta at entry.
    pub theta: Option<Decimal>,
    /// Vega at entry.
    pub vega: Option<Decimal>,
    /// Implied volatility at entry.
    pub iv: Option<Decimal>,
}

/// A tracked option position.
///
/// Created by the execution engine on a confirmed entry fill, or by the
/// reconciler when adopting a position found only at the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Unique position id.
    pub position_id: String,
    /// Signal that originated this position (synthetic for adopted rows).
    pub signal_id: String,
    /// Underlying ticker.
    pub ticker: String,
    /// Full OCC option symbol.
    pub option_symbol: String,
    /// Call or put.
    pub side: OptionSide,
    /// Strike price.
    pub strike: Decimal,
    /// Contract expiration date.
    pub expiration: NaiveDate,
    /// Number of contracts held.
    pub quantity: i64,
    /// Average fill price per contract at entry.
    pub entry_price: Decimal,
    /// Entry notional (`entry_price * quantity * 100`).
    pub entry_notional: Decimal,
    /// Latest observed mark per contract.
    pub current_price: Option<Decimal>,
    /// Latest observed notional.
    pub current_notional: Option<Decimal>,
    /// Unrealized P&L as a fraction of entry notional.
    pub pnl_pct: Decimal,
    /// Unrealized P&L in dollars.
    pub pnl_dollars: Decimal,
    /// Lifecycle state.
    pub status: PositionStatus,
    /// Greeks captured at entry.
    pub greeks: GreeksSnapshot,
    /// Why the position was opened.
    pub entry_thesis: String,
    /// Decision-layer conviction score.
    pub conviction: i32,
    /// True when the reconciler created this row from broker state.
    pub adopted: bool,
    /// When the position was opened.
    pub opened_at: DateTime<Utc>,
    /// When the position was closed, if it has been.
    pub closed_at: Option<DateTime<Utc>>,
    /// Last time the reconciler refreshed market data on this row.
    pub last_checked: Option<DateTime<Utc>>,
}

impl Position {
    /// Days remaining until expiration as of `today`.
    #[must_use]
    pub fn dte(&self, today: NaiveDate) -> i64 {
        occ::days_to_expiration(self.expiration, today)
    }

    /// Recompute unrealized P&L fields from a fresh mark.
    ///
    /// Returns `(current_notional, pnl_dollars, pnl_pct)` without mutating;
    /// callers decide what to persist.
    #[must_use]
    pub fn mark_to_market(&self, mark: Decimal) -> (Decimal, Decimal, Decimal) {
        let current_notional = contract_notional(mark, self.quantity);
        let pnl_dollars = current_notional - self.entry_notional;
        let pnl_pct = if self.entry_notional.is_zero() {
            Decimal::ZERO
        } else {
            pnl_dollars / self.entry_notional
        };
        (current_notional, pnl_dollars, pnl_pct)
    }

    /// Realized P&L for a close at `exit_price` per contract.
    #[must_use]
    pub fn realized_pnl(&self, exit_price: Decimal) -> (Decimal, Decimal) {
        let exit_notional = contract_notional(exit_price, self.quantity);
        let pnl_dollars = exit_notional - self.entry_notional;
        let pnl_pct = if self.entry_notional.is_zero() {
            Decimal::ZERO
        } else {
            pnl_dollars / self.entry_notional
        };
        (pnl_dollars, pnl_pct)
    }
}
