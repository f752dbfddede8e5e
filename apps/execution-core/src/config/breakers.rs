//! Loss circuit breaker thresholds.

use rust_decimal::Decimal;
use serde::Deserialize;

/// Thresholds for the three loss breakers. All state derives from the trade
/// ledger at check time; these only set the trip points.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BreakerConfig {
    /// Daily realized loss trip point, fraction of equity.
    #[serde(default = "default_max_daily_loss_pct")]
    pub max_daily_loss_pct: Decimal,

    /// Weekly realized loss trip point, fraction of equity.
    #[serde(default = "default_max_weekly_loss_pct")]
    pub max_weekly_loss_pct: Decimal,

    /// Consecutive losing round trips that trigger the cooldown.
    #[serde(default = "default_max_consecutive_losses")]
    pub max_consecutive_losses: u32,

    /// Cooldown length after a consecutive-loss trip, minutes from the most
    /// recent loss's close time.
    #[serde(default = "default_loss_cooldown_minutes")]
    pub loss_cooldown_minutes: i64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            max_daily_loss_pct: default_max_daily_loss_pct(),
            max_weekly_loss_pct: default_max_weekly_loss_pct(),
            max_consecutive_losses: default_max_consecutive_losses(),
            loss_cooldown_minutes: default_loss_cooldown_minutes(),
        }
    }
}

fn default_max_daily_loss_pct() -> Decimal {
    Decimal::new(5, 2) // 0.05
}

fn default_max_weekly_loss_pct() -> Decimal {
    Decimal::new(10, 2) // 0.10
}

const fn default_max_consecutive_losses() -> u32 {
    3
}

const fn default_loss_cooldown_minutes() -> i64 {
    120
}
