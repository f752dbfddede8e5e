//! Order intents and broker order mirrors.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::enums::{IntentStatus, OrderSide, OrderStatus, OrderType};

/// Idempotency record for one attempted trade action.
///
/// Written before any broker call; a pre-existing intent for the same key is
/// the engine's sole duplicate-submission defense. Keys are deterministic:
/// `entry-<signal_id>` and `exit-<position_id>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderIntent {
    /// Deterministic idempotency key, unique in the store.
    pub idempotency_key: String,
    /// Originating signal id (for exits, the position's signal).
    pub signal_id: String,
    /// Underlying ticker.
    pub ticker: String,
    /// Full OCC option symbol.
    pub option_symbol: String,
    /// Buy or sell.
    pub side: OrderSide,
    /// Contracts requested.
    pub quantity: i64,
    /// Limit price, when the action is a limit order.
    pub limit_price: Option<Decimal>,
    /// Intent lifecycle state.
    pub status: IntentStatus,
    /// Broker order id once one exists.
    pub broker_order_id: Option<String>,
    /// Human-readable context (thesis on entry, exit reason on exit).
    pub reason: String,
    /// When the intent row was written.
    pub created_at: DateTime<Utc>,
    /// When the intent reached a terminal state.
    pub executed_at: Option<DateTime<Utc>>,
}

impl OrderIntent {
    /// Idempotency key for an entry attempt on `signal_id`.
    #[must_use]
    pub fn entry_key(signal_id: &str) -> String {
        format!("entry-{signal_id}")
    }

    /// Idempotency key for an exit attempt on `position_id`.
    #[must_use]
    pub fn exit_key(position_id: &str) -> String {
        format!("exit-{position_id}")
    }

    /// Age of a still-pending intent relative to `now`.
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.created_at
    }
}

/// Local mirror of an order living at the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerOrder {
    /// Broker-assigned order id, unique in the store.
    pub broker_order_id: String,
    /// Owning intent's idempotency key.
    pub intent_key: String,
    /// Underlying ticker.
    pub ticker: String,
    /// Full OCC option symbol.
    pub option_symbol: String,
    /// Buy or sell.
    pub side: OrderSide,
    /// Contracts requested.
    pub quantity: i64,
    /// Limit or market.
    pub order_type: OrderType,
    /// Limit price when applicable.
    pub limit_price: Option<Decimal>,
    /// Contracts filled so far.
    pub filled_qty: i64,
    /// Average fill price, once any fill exists.
    pub filled_price: Option<Decimal>,
    /// Mirrored order state.
    pub status: OrderStatus,
    /// When the order was submitted to the broker.
    pub submitted_at: DateTime<Utc>,
    /// When the order fully filled.
    pub filled_at: Option<DateTime<Utc>>,
    /// Terminal error detail, if any.
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotency_keys_are_deterministic() {
        assert_eq!(OrderIntent::entry_key("sig-42"), "entry-sig-42");
        assert_eq!(OrderIntent::exit_key("pos-7"), "exit-pos-7");
    }
}
