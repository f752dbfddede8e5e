//! Position and exposure limits enforced by the safety gate.

use rust_decimal::Decimal;
use serde::Deserialize;

/// Hard trading limits. The gate reads these; nothing overrides them.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TradingConfig {
    /// Maximum simultaneously open positions.
    #[serde(default = "default_max_positions")]
    pub max_positions: u32,

    /// Absolute dollar cap on a single position's entry notional.
    #[serde(default = "default_max_position_value")]
    pub max_position_value: Decimal,

    /// Per-trade notional cap as a fraction of account equity.
    #[serde(default = "default_max_per_trade_pct")]
    pub max_per_trade_pct: Decimal,

    /// Total open entry notional cap as a fraction of account equity.
    #[serde(default = "default_max_total_exposure_pct")]
    pub max_total_exposure_pct: Decimal,

    /// Maximum executed entries per calendar day.
    #[serde(default = "default_max_executions_per_day")]
    pub max_executions_per_day: u32,

    /// IV rank ceiling for new entries.
    #[serde(default = "default_max_iv_rank")]
    pub max_iv_rank: Decimal,

    /// Minimum days to expiration for new entries.
    #[serde(default = "default_min_dte")]
    pub min_dte: i64,

    /// Bid/ask spread ceiling, percent of mid.
    #[serde(default = "default_max_spread_pct")]
    pub max_spread_pct: Decimal,

    /// Entries blocked within this many days before earnings.
    #[serde(default = "default_earnings_blackout_days")]
    pub earnings_blackout_days: i64,

    /// Tickers never traded.
    #[serde(default = "default_excluded_tickers")]
    pub excluded_tickers: Vec<String>,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            max_positions: default_max_positions(),
            max_position_value: default_max_position_value(),
            max_per_trade_pct: default_max_per_trade_pct(),
            max_total_exposure_pct: default_max_total_exposure_pct(),
            max_executions_per_day: default_max_executions_per_day(),
            max_iv_rank: default_max_iv_rank(),
            min_dte: default_min_dte(),
            max_spread_pct: default_max_spread_pct(),
            earnings_blackout_days: default_earnings_blackout_days(),
            excluded_tickers: default_excluded_tickers(),
        }
    }
}

impl TradingConfig {
    /// Case-insensitive exclusion list membership.
    #[must_use]
    pub fn is_excluded(&self, ticker: &str) -> bool {
        self.excluded_tickers
            .iter()
            .any(|t| t.eq_ignore_ascii_case(ticker))
    }
}

const fn default_max_positions() -> u32 {
    3
}

fn default_max_position_value() -> Decimal {
    Decimal::new(1000, 0)
}

fn default_max_per_trade_pct() -> Decimal {
    Decimal::new(20, 2) // 0.20
}

fn default_max_total_exposure_pct() -> Decimal {
    Decimal::new(25, 2) // 0.25
}

const fn default_max_executions_per_day() -> u32 {
    2
}

fn default_max_iv_rank() -> Decimal {
    Decimal::new(70, 0)
}

const fn default_min_dte() -> i64 {
    14
}

fn default_max_spread_pct() -> Decimal {
    Decimal::new(15, 0)
}

const fn default_earnings_blackout_days() -> i64 {
    2
}

fn default_excluded_tickers() -> Vec<String> {
    ["GME", "AMC", "BBBY", "DJT", "MSTR"]
        .into_iter()
        .map(String::from)
        .collect()
}
