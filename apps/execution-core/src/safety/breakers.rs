//! Loss circuit breakers.
//!
//! Three independent trips, all derived from the trade ledger at check time:
//! daily realized loss, weekly realized loss, and N consecutive losing round
//! trips. No counters are cached anywhere, so a restart cannot reset a
//! breaker early.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tracing::warn;

use super::hours;
use crate::config::{BreakerConfig, MarketHoursConfig};
use crate::models::TradeLedgerEntry;
use crate::store::{ledger, Store, StoreError};

/// Result of a breaker evaluation.
#[derive(Debug, Clone)]
pub struct BreakerState {
    /// Whether trading is halted.
    pub tripped: bool,
    /// Why, when tripped.
    pub reason: String,
    /// When trading resumes, when known.
    pub resumes_at: Option<DateTime<Utc>>,
}

impl BreakerState {
    fn clear() -> Self {
        Self {
            tripped: false,
            reason: String::new(),
            resumes_at: None,
        }
    }

    fn tripped(reason: String, resumes_at: Option<DateTime<Utc>>) -> Self {
        Self {
            tripped: true,
            reason,
            resumes_at,
        }
    }
}

/// The three loss breakers, evaluated daily → weekly → consecutive with the
/// first trip winning.
#[derive(Debug, Clone)]
pub struct TradingCircuitBreakers {
    store: Store,
    config: BreakerConfig,
    market: MarketHoursConfig,
}

impl TradingCircuitBreakers {
    /// Wire the breakers to the store.
    #[must_use]
    pub fn new(store: Store, config: BreakerConfig, market: MarketHoursConfig) -> Self {
        Self {
            store,
            config,
            market,
        }
    }

    /// Evaluate all breakers now against `equity`.
    pub async fn check(&self, equity: Decimal) -> Result<BreakerState, StoreError> {
        self.check_at(equity, Utc::now()).await
    }

    /// Evaluate all breakers at a given instant. Tests drive the clock.
    pub async fn check_at(
        &self,
        equity: Decimal,
        now: DateTime<Utc>,
    ) -> Result<BreakerState, StoreError> {
        let state = self.daily(equity, now).await?;
        if state.tripped {
            return Ok(state);
        }
        let state = self.weekly(equity, now).await?;
        if state.tripped {
            return Ok(state);
        }
        self.consecutive(now).await
    }

    async fn daily(&self, equity: Decimal, now: DateTime<Utc>) -> Result<BreakerState, StoreError> {
        let cutoff = hours::trading_day_start(now, &self.market);
        let loss = realized_loss(&ledger::closed_since(self.store.pool(), cutoff).await?);
        let limit = equity * self.config.max_daily_loss_pct;
        if loss > Decimal::ZERO && loss >= limit {
            let reason = format!(
                "Daily loss ${loss} at or over limit ${limit} ({}% of equity)",
                self.config.max_daily_loss_pct * Decimal::ONE_HUNDRED
            );
            warn!(loss = %loss, limit = %limit, "daily loss breaker tripped");
            return Ok(BreakerState::tripped(
                reason,
                Some(hours::next_trading_day_open(now, &self.market)),
            ));
        }
        Ok(BreakerState::clear())
    }

    async fn weekly(
        &self,
        equity: Decimal,
        now: DateTime<Utc>,
    ) -> Result<BreakerState, StoreError> {
        let cutoff = hours::week_start(now, &self.market);
        let loss = realized_loss(&ledger::closed_since(self.store.pool(), cutoff).await?);
        let limit = equity * self.config.max_weekly_loss_pct;
        if loss > Decimal::ZERO && loss >= limit {
            let reason = format!(
                "Weekly loss ${loss} at or over limit ${limit} ({}% of equity)",
                self.config.max_weekly_loss_pct * Decimal::ONE_HUNDRED
            );
            warn!(loss = %loss, limit = %limit, "weekly loss breaker tripped");
            return Ok(BreakerState::tripped(
                reason,
                Some(hours::next_week_open(now, &self.market)),
            ));
        }
        Ok(BreakerState::clear())
    }

    /// The consecutive-loss cooldown, also consulted directly by the gate.
    pub async fn consecutive(&self, now: DateTime<Utc>) -> Result<BreakerState, StoreError> {
        let n = self.config.max_consecutive_losses;
        if n == 0 {
            return Ok(BreakerState::clear());
        }
        let recent = ledger::recent(self.store.pool(), n).await?;
        if recent.len() < n as usize || !recent.iter().all(TradeLedgerEntry::is_loss) {
            return Ok(BreakerState::clear());
        }

        // recent is newest-first; the cooldown runs from the latest loss.
        let cooldown_end =
            recent[0].closed_at + Duration::minutes(self.config.loss_cooldown_minutes);
        if now < cooldown_end {
            let reason = format!(
                "{n} consecutive losses; cooling down until {}",
                cooldown_end.to_rfc3339()
            );
            warn!(losses = n, until = %cooldown_end, "consecutive loss breaker tripped");
            return Ok(BreakerState::tripped(reason, Some(cooldown_end)));
        }
        Ok(BreakerState::clear())
    }
}

fn realized_loss(entries: &[TradeLedgerEntry]) -> Decimal {
    entries
        .iter()
        .filter(|e| e.is_loss())
        .map(|e| -e.pnl_dollars)
        .sum()
}
