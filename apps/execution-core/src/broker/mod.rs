//! Broker integration: the [`BrokerPort`] seam, retry policy and the Alpaca
//! REST adapter.
//!
//! Everything above this module talks to the trait object, never to HTTP.
//! Tests substitute scripted fakes.

pub mod alpaca;
pub mod retry;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::OrderSide;

/// Broker API errors, categorized for retry decisions.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BrokerApiError {
    /// Credentials rejected. Never retried.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The broker refused the order itself (validation, buying power).
    #[error("order rejected: {0}")]
    OrderRejected(String),

    /// Requested entity does not exist at the broker.
    #[error("not found: {0}")]
    NotFound(String),

    /// Rate limited; honor `retry_after_secs` when present.
    #[error("rate limited")]
    RateLimited {
        /// Parsed Retry-After header, seconds.
        retry_after_secs: Option<u64>,
    },

    /// Non-2xx response outside the cases above.
    #[error("api error (status {status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error body message.
        message: String,
    },

    /// Transport-level failure (connect, timeout, TLS).
    #[error("network error: {0}")]
    Network(String),

    /// Response body did not match the expected shape.
    #[error("decode error: {0}")]
    Decode(String),

    /// Retry budget exhausted; wraps the last error's description.
    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Attempts made.
        attempts: u32,
        /// Description of the final failure.
        last: String,
    },
}

impl BrokerApiError {
    /// True when another attempt could plausibly succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Network(_) => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Order state as reported by the broker, normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BrokerOrderState {
    /// Accepted but not yet working.
    New,
    /// Working at the exchange.
    Accepted,
    /// Some quantity filled.
    PartiallyFilled,
    /// Completely filled.
    Filled,
    /// Cancelled.
    Cancelled,
    /// Expired unfilled.
    Expired,
    /// Rejected by the broker or exchange.
    Rejected,
    /// Anything unrecognized; treated as still working.
    Unknown,
}

impl BrokerOrderState {
    /// Normalize a raw Alpaca-style status string.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "new" | "pending_new" => Self::New,
            "accepted" | "accepted_for_bidding" | "replaced" | "pending_replace" => Self::Accepted,
            "partially_filled" => Self::PartiallyFilled,
            "filled" => Self::Filled,
            "canceled" | "cancelled" | "pending_cancel" => Self::Cancelled,
            "expired" | "done_for_day" => Self::Expired,
            "rejected" => Self::Rejected,
            _ => Self::Unknown,
        }
    }

    /// Terminal without a complete fill.
    #[must_use]
    pub const fn is_dead(self) -> bool {
        matches!(self, Self::Cancelled | Self::Expired | Self::Rejected)
    }
}

/// Snapshot of one order's progress at the broker.
#[derive(Debug, Clone)]
pub struct OrderStatusReport {
    /// Broker order id.
    pub order_id: String,
    /// Normalized state.
    pub state: BrokerOrderState,
    /// Contracts filled so far.
    pub filled_qty: i64,
    /// Average fill price, once any fill exists.
    pub filled_avg_price: Option<Decimal>,
}

impl OrderStatusReport {
    /// Completely filled.
    #[must_use]
    pub fn is_filled(&self) -> bool {
        self.state == BrokerOrderState::Filled
    }
}

/// Account balances.
#[derive(Debug, Clone)]
pub struct AccountSnapshot {
    /// Total account equity.
    pub equity: Decimal,
    /// Settled cash.
    pub cash: Decimal,
    /// Available buying power.
    pub buying_power: Decimal,
}

/// One position as the broker sees it.
#[derive(Debug, Clone)]
pub struct BrokerPosition {
    /// Full OCC option symbol.
    pub option_symbol: String,
    /// Contracts held (positive for long).
    pub quantity: i64,
    /// Average entry price per contract.
    pub avg_entry_price: Decimal,
    /// Current mark per contract, when the broker supplies one.
    pub current_price: Option<Decimal>,
    /// Current market value, when supplied.
    pub market_value: Option<Decimal>,
}

/// NBBO quote for one option contract.
#[derive(Debug, Clone, Copy, Default)]
pub struct OptionQuote {
    /// Best bid.
    pub bid: Option<Decimal>,
    /// Best ask.
    pub ask: Option<Decimal>,
}

impl OptionQuote {
    /// Midpoint when both sides quote, otherwise whichever side exists.
    #[must_use]
    pub fn mark(&self) -> Option<Decimal> {
        match (self.bid, self.ask) {
            (Some(b), Some(a)) => Some((b + a) / Decimal::TWO),
            (Some(b), None) => Some(b),
            (None, Some(a)) => Some(a),
            (None, None) => None,
        }
    }

    /// Spread as a percent of the midpoint.
    #[must_use]
    pub fn spread_pct(&self) -> Option<Decimal> {
        let (b, a) = (self.bid?, self.ask?);
        let mid = (b + a) / Decimal::TWO;
        if mid <= Decimal::ZERO {
            return None;
        }
        Some((a - b) / mid * Decimal::ONE_HUNDRED)
    }
}

/// The brokerage seam. One implementation talks to Alpaca; tests script fakes.
#[async_trait]
pub trait BrokerPort: Send + Sync {
    /// Submit a day limit order; returns the broker order id.
    async fn submit_limit_order(
        &self,
        option_symbol: &str,
        side: OrderSide,
        quantity: i64,
        limit_price: Decimal,
    ) -> Result<String, BrokerApiError>;

    /// Submit a day market order; returns the broker order id.
    async fn submit_market_order(
        &self,
        option_symbol: &str,
        side: OrderSide,
        quantity: i64,
    ) -> Result<String, BrokerApiError>;

    /// Poll one order's state.
    async fn get_order_status(&self, order_id: &str) -> Result<OrderStatusReport, BrokerApiError>;

    /// Request cancellation of a working order.
    async fn cancel_order(&self, order_id: &str) -> Result<(), BrokerApiError>;

    /// Current account balances.
    async fn get_account(&self) -> Result<AccountSnapshot, BrokerApiError>;

    /// All open option positions at the broker.
    async fn get_open_positions(&self) -> Result<Vec<BrokerPosition>, BrokerApiError>;

    /// Latest NBBO for one option contract.
    async fn get_option_quote(&self, option_symbol: &str) -> Result<OptionQuote, BrokerApiError>;

    /// Whether the exchange has a session today.
    async fn is_market_open_today(&self) -> Result<bool, BrokerApiError>;
}
