//! Domain records and enums shared across the execution core.
//!
//! Four persisted record kinds back the whole system:
//!
//! - [`Position`]: an open or closed option holding
//! - [`OrderIntent`]: the idempotency record for one attempted trade action
//! - [`BrokerOrder`]: the local mirror of a broker order
//! - [`TradeLedgerEntry`]: an immutable record of a completed round trip
//!
//! Plus the tagged request/outcome types exchanged with the decision layer.

mod enums;
mod ledger;
mod occ;
mod order;
mod position;
mod request;

pub use enums::{
    IntentStatus, OptionSide, OrderSide, OrderStatus, OrderType, ParseEnumError, PositionStatus,
};
pub use ledger::TradeLedgerEntry;
pub use occ::{days_to_expiration, parse_occ_symbol, OccSymbol};
pub use order::{BrokerOrder, OrderIntent};
pub use position::{GreeksSnapshot, Position};
pub use request::{EntryOutcome, EntryRequest, ExitOutcome, ExitRequest};

use rust_decimal::Decimal;

/// Standard US equity option contract multiplier.
pub const CONTRACT_MULTIPLIER: Decimal = Decimal::ONE_HUNDRED;

/// Notional value of `quantity` contracts at `price` per contract.
#[must_use]
pub fn contract_notional(price: Decimal, quantity: i64) -> Decimal {
    price * Decimal::from(quantity) * CONTRACT_MULTIPLIER
}
