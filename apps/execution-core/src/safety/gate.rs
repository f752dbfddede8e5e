//! The pre-trade safety gate.
//!
//! Thirteen ordered checks; the first failure wins and comes back as a
//! value, never an error. The only live read is one account-equity fetch,
//! reused by the exposure and loss checks; if it fails, the gate fails
//! closed. Quote-dependent checks (spread, earnings) fail open when the
//! data is absent.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::warn;

use super::hours;
use super::TradingCircuitBreakers;
use crate::broker::{BrokerPort, OptionQuote};
use crate::config::{MarketHoursConfig, TradingConfig};
use crate::models::{contract_notional, days_to_expiration, parse_occ_symbol, EntryRequest};
use crate::store::{intents, positions, Store, StoreError};

/// Gate verdict.
#[derive(Debug, Clone)]
pub struct GateDecision {
    /// Whether the entry may proceed.
    pub allowed: bool,
    /// First failing check's reason, or a pass note.
    pub reason: String,
}

impl GateDecision {
    fn blocked(check: &'static str, reason: String) -> Self {
        warn!(check, reason = %reason, "safety gate blocked entry");
        Self {
            allowed: false,
            reason,
        }
    }

    fn allowed() -> Self {
        Self {
            allowed: true,
            reason: "All safety checks passed".to_string(),
        }
    }
}

/// Ordered pre-trade checks. Constructed once and shared.
pub struct SafetyGate {
    store: Store,
    broker: Arc<dyn BrokerPort>,
    breakers: TradingCircuitBreakers,
    trading: TradingConfig,
    market: MarketHoursConfig,
}

impl SafetyGate {
    /// Wire the gate to its collaborators.
    #[must_use]
    pub fn new(
        store: Store,
        broker: Arc<dyn BrokerPort>,
        breakers: TradingCircuitBreakers,
        trading: TradingConfig,
        market: MarketHoursConfig,
    ) -> Self {
        Self {
            store,
            broker,
            breakers,
            trading,
            market,
        }
    }

    /// Run every check against `request` now.
    pub async fn check_entry(&self, request: &EntryRequest) -> Result<GateDecision, StoreError> {
        self.check_entry_at(request, Utc::now()).await
    }

    /// Run every check at a given instant. Tests drive the clock.
    pub async fn check_entry_at(
        &self,
        request: &EntryRequest,
        now: DateTime<Utc>,
    ) -> Result<GateDecision, StoreError> {
        // 1. Exclusion list.
        if self.trading.is_excluded(&request.ticker) {
            return Ok(GateDecision::blocked(
                "exclusion_list",
                format!("Ticker {} is on the exclusion list", request.ticker),
            ));
        }

        // 2. Position count.
        let open_count = positions::open_count(self.store.pool()).await?;
        if open_count >= i64::from(self.trading.max_positions) {
            return Ok(GateDecision::blocked(
                "max_positions",
                format!(
                    "Max positions reached ({open_count}/{})",
                    self.trading.max_positions
                ),
            ));
        }

        // One equity read for checks 3, 6 and 7. Unreadable or non-positive
        // equity fails closed.
        let equity = match self.broker.get_account().await {
            Ok(account) if account.equity > Decimal::ZERO => account.equity,
            Ok(account) => {
                return Ok(GateDecision::blocked(
                    "equity",
                    format!("Account equity {} is not positive", account.equity),
                ));
            }
            Err(e) => {
                return Ok(GateDecision::blocked(
                    "equity",
                    format!("Cannot read account equity ({e}); failing closed"),
                ));
            }
        };

        // 3. Total exposure.
        let proposed = contract_notional(request.limit_price, request.quantity);
        let current_exposure: Decimal = positions::open_all(self.store.pool())
            .await?
            .iter()
            .map(|p| p.entry_notional)
            .sum();
        let exposure_cap = equity * self.trading.max_total_exposure_pct;
        if current_exposure + proposed > exposure_cap {
            return Ok(GateDecision::blocked(
                "total_exposure",
                format!(
                    "Total exposure ${} would exceed cap ${exposure_cap} ({}% of equity)",
                    current_exposure + proposed,
                    self.trading.max_total_exposure_pct * Decimal::ONE_HUNDRED
                ),
            ));
        }

        // 4. Single-trade notional.
        if proposed > self.trading.max_position_value {
            return Ok(GateDecision::blocked(
                "position_value",
                format!(
                    "Trade notional ${proposed} exceeds per-position cap ${}",
                    self.trading.max_position_value
                ),
            ));
        }

        // 5. Daily execution cap.
        let day_start = hours::trading_day_start(now, &self.market);
        let executed_today = intents::executed_entries_since(self.store.pool(), day_start).await?;
        if executed_today >= i64::from(self.trading.max_executions_per_day) {
            return Ok(GateDecision::blocked(
                "daily_executions",
                format!(
                    "Daily execution limit reached ({executed_today}/{})",
                    self.trading.max_executions_per_day
                ),
            ));
        }

        // 6-8. Loss breakers (daily, weekly, consecutive) in order.
        let breaker = self.breakers.check_at(equity, now).await?;
        if breaker.tripped {
            return Ok(GateDecision::blocked("circuit_breaker", breaker.reason));
        }

        // 9. IV rank ceiling.
        if let Some(iv_rank) = request.iv_rank {
            if iv_rank > self.trading.max_iv_rank {
                return Ok(GateDecision::blocked(
                    "iv_rank",
                    format!(
                        "IV rank {iv_rank} above ceiling {}",
                        self.trading.max_iv_rank
                    ),
                ));
            }
        }

        // 10. DTE floor. An unparseable symbol cannot be priced or tracked,
        // so it is blocked here rather than discovered post-fill.
        let Some(occ) = parse_occ_symbol(&request.option_symbol) else {
            return Ok(GateDecision::blocked(
                "option_symbol",
                format!("Unparseable option symbol {}", request.option_symbol),
            ));
        };
        let dte = days_to_expiration(occ.expiration, now.date_naive());
        if dte < self.trading.min_dte {
            return Ok(GateDecision::blocked(
                "dte",
                format!("DTE {dte} below minimum {}", self.trading.min_dte),
            ));
        }

        // 11. Spread ceiling; fail-open when either side is missing.
        let quote = OptionQuote {
            bid: request.bid,
            ask: request.ask,
        };
        if let Some(spread_pct) = quote.spread_pct() {
            if spread_pct > self.trading.max_spread_pct {
                return Ok(GateDecision::blocked(
                    "spread",
                    format!(
                        "Spread {spread_pct:.1}% exceeds ceiling {}%",
                        self.trading.max_spread_pct
                    ),
                ));
            }
        }

        // 12. Earnings blackout; fail-open when the date is unknown.
        if let Some(earnings) = request.next_earnings_date {
            let days_until = (earnings - now.date_naive()).num_days();
            if (0..=self.trading.earnings_blackout_days).contains(&days_until) {
                return Ok(GateDecision::blocked(
                    "earnings",
                    format!(
                        "Earnings on {earnings} within {}-day blackout window",
                        self.trading.earnings_blackout_days
                    ),
                ));
            }
        }

        // 13. Market timing.
        if let Some(reason) = hours::entry_timing_block(now, &self.market) {
            return Ok(GateDecision::blocked("market_timing", reason));
        }

        Ok(GateDecision::allowed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{
        AccountSnapshot, BrokerApiError, BrokerOrderState, BrokerPosition, OptionQuote,
        OrderStatusReport,
    };
    use crate::config::BreakerConfig;
    use crate::models::{GreeksSnapshot, OrderSide};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    struct EquityBroker {
        equity: Option<Decimal>,
    }

    #[async_trait]
    impl BrokerPort for EquityBroker {
        async fn submit_limit_order(
            &self,
            _: &str,
            _: OrderSide,
            _: i64,
            _: Decimal,
        ) -> Result<String, BrokerApiError> {
            unimplemented!("gate never submits")
        }
        async fn submit_market_order(
            &self,
            _: &str,
            _: OrderSide,
            _: i64,
        ) -> Result<String, BrokerApiError> {
            unimplemented!("gate never submits")
        }
        async fn get_order_status(&self, _: &str) -> Result<OrderStatusReport, BrokerApiError> {
            Ok(OrderStatusReport {
                order_id: String::new(),
                state: BrokerOrderState::New,
                filled_qty: 0,
                filled_avg_price: None,
            })
        }
        async fn cancel_order(&self, _: &str) -> Result<(), BrokerApiError> {
            Ok(())
        }
        async fn get_account(&self) -> Result<AccountSnapshot, BrokerApiError> {
            match self.equity {
                Some(equity) => Ok(AccountSnapshot {
                    equity,
                    cash: equity,
                    buying_power: equity,
                }),
                None => Err(BrokerApiError::Network("account unavailable".into())),
            }
        }
        async fn get_open_positions(&self) -> Result<Vec<BrokerPosition>, BrokerApiError> {
            Ok(vec![])
        }
        async fn get_option_quote(&self, _: &str) -> Result<OptionQuote, BrokerApiError> {
            Ok(OptionQuote::default())
        }
        async fn is_market_open_today(&self) -> Result<bool, BrokerApiError> {
            Ok(true)
        }
    }

    async fn gate_with(equity: Option<Decimal>) -> SafetyGate {
        let store = Store::in_memory().await.unwrap();
        let breakers = TradingCircuitBreakers::new(
            store.clone(),
            BreakerConfig::default(),
            MarketHoursConfig::default(),
        );
        SafetyGate::new(
            store,
            Arc::new(EquityBroker { equity }),
            breakers,
            TradingConfig::default(),
            MarketHoursConfig::default(),
        )
    }

    fn request() -> EntryRequest {
        EntryRequest {
            signal_id: "sig-1".into(),
            ticker: "AAPL".into(),
            // Expires 2027, far beyond the DTE floor for any test clock here.
            option_symbol: "AAPL270115C00150000".into(),
            quantity: 2,
            limit_price: dec!(2.50),
            thesis: "breakout".into(),
            conviction: 7,
            greeks: GreeksSnapshot::default(),
            iv_rank: Some(dec!(40)),
            bid: Some(dec!(2.40)),
            ask: Some(dec!(2.60)),
            next_earnings_date: None,
        }
    }

    fn mid_session() -> DateTime<Utc> {
        // Wednesday 2025-01-08 11:00 ET
        Utc.with_ymd_and_hms(2025, 1, 8, 16, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn clean_request_passes() {
        let gate = gate_with(Some(dec!(10_000))).await;
        let decision = gate.check_entry_at(&request(), mid_session()).await.unwrap();
        assert!(decision.allowed, "blocked: {}", decision.reason);
    }

    #[tokio::test]
    async fn excluded_ticker_blocks_first() {
        let gate = gate_with(Some(dec!(10_000))).await;
        let mut req = request();
        req.ticker = "GME".into();
        let decision = gate.check_entry_at(&req, mid_session()).await.unwrap();
        assert!(!decision.allowed);
        assert!(decision.reason.contains("exclusion"));
    }

    #[tokio::test]
    async fn equity_read_failure_fails_closed() {
        let gate = gate_with(None).await;
        let decision = gate.check_entry_at(&request(), mid_session()).await.unwrap();
        assert!(!decision.allowed);
        assert!(decision.reason.contains("equity"));
    }

    #[tokio::test]
    async fn oversized_trade_hits_exposure_cap() {
        let gate = gate_with(Some(dec!(10_000))).await;
        let mut req = request();
        // 15 contracts at $2.50 = $3,750 > 25% of $10,000
        req.quantity = 15;
        let decision = gate.check_entry_at(&req, mid_session()).await.unwrap();
        assert!(!decision.allowed);
        assert!(decision.reason.contains("exposure"));
    }

    #[tokio::test]
    async fn per_position_cap_applies_after_exposure() {
        // Large equity so the exposure cap passes but the $1,000 absolute
        // per-position cap does not.
        let gate = gate_with(Some(dec!(1_000_000))).await;
        let mut req = request();
        req.quantity = 5; // $1,250
        let decision = gate.check_entry_at(&req, mid_session()).await.unwrap();
        assert!(!decision.allowed);
        assert!(decision.reason.contains("per-position cap"));
    }

    #[tokio::test]
    async fn iv_rank_ceiling_blocks() {
        let gate = gate_with(Some(dec!(10_000))).await;
        let mut req = request();
        req.iv_rank = Some(dec!(85));
        let decision = gate.check_entry_at(&req, mid_session()).await.unwrap();
        assert!(!decision.allowed);
        assert!(decision.reason.contains("IV rank"));
    }

    #[tokio::test]
    async fn short_dte_blocks() {
        let gate = gate_with(Some(dec!(10_000))).await;
        let mut req = request();
        req.option_symbol = "AAPL250110C00150000".into(); // 2 days out
        let decision = gate.check_entry_at(&req, mid_session()).await.unwrap();
        assert!(!decision.allowed);
        assert!(decision.reason.contains("DTE"));
    }

    #[tokio::test]
    async fn wide_spread_blocks_but_missing_quote_passes() {
        let gate = gate_with(Some(dec!(10_000))).await;

        let mut req = request();
        req.bid = Some(dec!(2.00));
        req.ask = Some(dec!(3.00));
        let decision = gate.check_entry_at(&req, mid_session()).await.unwrap();
        assert!(!decision.allowed);
        assert!(decision.reason.contains("Spread"));

        let mut req = request();
        req.bid = None;
        req.ask = None;
        let decision = gate.check_entry_at(&req, mid_session()).await.unwrap();
        assert!(decision.allowed);
    }

    #[tokio::test]
    async fn earnings_blackout_blocks_imminent_earnings_only() {
        let gate = gate_with(Some(dec!(10_000))).await;

        let mut req = request();
        req.next_earnings_date = chrono::NaiveDate::from_ymd_opt(2025, 1, 9);
        let decision = gate.check_entry_at(&req, mid_session()).await.unwrap();
        assert!(!decision.allowed);
        assert!(decision.reason.contains("Earnings"));

        req.next_earnings_date = chrono::NaiveDate::from_ymd_opt(2025, 1, 20);
        let decision = gate.check_entry_at(&req, mid_session()).await.unwrap();
        assert!(decision.allowed);
    }

    #[tokio::test]
    async fn market_timing_blocks_near_close() {
        let gate = gate_with(Some(dec!(10_000))).await;
        // 15:55 ET
        let late = Utc.with_ymd_and_hms(2025, 1, 8, 20, 55, 0).unwrap();
        let decision = gate.check_entry_at(&request(), late).await.unwrap();
        assert!(!decision.allowed);
        assert!(decision.reason.contains("close"));
    }
}
