//! Fill confirmation and exit order selection knobs.

use rust_decimal::Decimal;
use serde::Deserialize;

/// Execution engine behavior not covered by the safety limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutionConfig {
    /// Total seconds to poll for a fill before leaving the order open.
    #[serde(default = "default_fill_timeout_secs")]
    pub fill_timeout_secs: u64,

    /// Seconds between fill polls.
    #[serde(default = "default_fill_poll_interval_secs")]
    pub fill_poll_interval_secs: u64,

    /// Entry limit prices are clamped to live price plus this percent.
    #[serde(default = "default_entry_clamp_pct")]
    pub entry_clamp_pct: Decimal,

    /// Exit limit orders priced at current mark minus this percent.
    #[serde(default = "default_exit_limit_discount_pct")]
    pub exit_limit_discount_pct: Decimal,

    /// Below this mark, exits go straight to market.
    #[serde(default = "default_near_worthless_price")]
    pub near_worthless_price: Decimal,

    /// At or beyond this unrealized loss fraction, exits go to market.
    #[serde(default = "default_deep_loss_pct")]
    pub deep_loss_pct: Decimal,

    /// At or below this many days to expiration, exits go to market.
    #[serde(default = "default_expiry_exit_dte")]
    pub expiry_exit_dte: i64,

    /// PENDING exit intents older than this are deleted and retried.
    #[serde(default = "default_stale_exit_intent_secs")]
    pub stale_exit_intent_secs: i64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            fill_timeout_secs: default_fill_timeout_secs(),
            fill_poll_interval_secs: default_fill_poll_interval_secs(),
            entry_clamp_pct: default_entry_clamp_pct(),
            exit_limit_discount_pct: default_exit_limit_discount_pct(),
            near_worthless_price: default_near_worthless_price(),
            deep_loss_pct: default_deep_loss_pct(),
            expiry_exit_dte: default_expiry_exit_dte(),
            stale_exit_intent_secs: default_stale_exit_intent_secs(),
        }
    }
}

const fn default_fill_timeout_secs() -> u64 {
    30
}

const fn default_fill_poll_interval_secs() -> u64 {
    3
}

fn default_entry_clamp_pct() -> Decimal {
    Decimal::new(5, 0)
}

fn default_exit_limit_discount_pct() -> Decimal {
    Decimal::new(5, 0)
}

fn default_near_worthless_price() -> Decimal {
    Decimal::new(10, 2) // 0.10
}

fn default_deep_loss_pct() -> Decimal {
    Decimal::new(50, 2) // 0.50
}

const fn default_expiry_exit_dte() -> i64 {
    3
}

const fn default_stale_exit_intent_secs() -> i64 {
    14_400 // 4 hours
}
