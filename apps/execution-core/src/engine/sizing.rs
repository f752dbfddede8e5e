//! Position sizing.
//!
//! Contracts are capped by the tightest of three budgets: per-trade percent
//! of equity, the absolute per-position dollar cap, and remaining headroom
//! under the total exposure cap. Pure arithmetic; the engine supplies the
//! live inputs.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::config::TradingConfig;
use crate::models::CONTRACT_MULTIPLIER;

/// How a size was arrived at, for logging and operator tooling.
#[derive(Debug, Clone)]
pub struct SizingBreakdown {
    /// Final contract cap. Zero means the trade cannot be sized.
    pub max_contracts: i64,
    /// Dollar cost of one contract at the proposed price.
    pub cost_per_contract: Decimal,
    /// Dollar budget that bound the size.
    pub binding_budget: Decimal,
    /// Which budget bound: "per_trade", "position_value" or "exposure".
    pub limiting_factor: &'static str,
}

/// Compute the maximum contracts for a trade at `price` per contract.
#[must_use]
pub fn max_contracts(
    equity: Decimal,
    current_exposure: Decimal,
    price: Decimal,
    config: &TradingConfig,
) -> SizingBreakdown {
    let cost_per_contract = price * CONTRACT_MULTIPLIER;

    let per_trade = equity * config.max_per_trade_pct;
    let headroom = (equity * config.max_total_exposure_pct - current_exposure).max(Decimal::ZERO);

    let (binding_budget, limiting_factor) = [
        (per_trade, "per_trade"),
        (config.max_position_value, "position_value"),
        (headroom, "exposure"),
    ]
    .into_iter()
    .min_by(|a, b| a.0.cmp(&b.0))
    .unwrap_or((Decimal::ZERO, "per_trade"));

    let max_contracts = if cost_per_contract <= Decimal::ZERO {
        0
    } else {
        (binding_budget / cost_per_contract)
            .floor()
            .to_i64()
            .unwrap_or(0)
    };

    SizingBreakdown {
        max_contracts,
        cost_per_contract,
        binding_budget,
        limiting_factor,
    }
}
