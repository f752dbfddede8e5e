//! Reconciler cadence and drift threshold.

use rust_decimal::Decimal;
use serde::Deserialize;

/// Reconciliation loop configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconcileConfig {
    /// Seconds between reconciliation passes.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Relative entry-price disagreement above which the broker's value
    /// overwrites the local one.
    #[serde(default = "default_price_drift_threshold")]
    pub price_drift_threshold: Decimal,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            price_drift_threshold: default_price_drift_threshold(),
        }
    }
}

const fn default_interval_secs() -> u64 {
    300
}

fn default_price_drift_threshold() -> Decimal {
    Decimal::new(10, 2) // 0.10
}
