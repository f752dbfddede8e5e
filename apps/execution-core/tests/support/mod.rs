//! Shared test fixtures: a scripted fake broker, a capturing notifier and a
//! fully wired engine over an in-memory store.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use execution_core::broker::{
    AccountSnapshot, BrokerApiError, BrokerOrderState, BrokerPort, BrokerPosition, OptionQuote,
    OrderStatusReport,
};
use execution_core::config::{
    BreakerConfig, ExecutionConfig, MarketHoursConfig, ReconcileConfig, TradingConfig,
};
use execution_core::models::{EntryRequest, GreeksSnapshot, OrderSide};
use execution_core::notify::NotifierPort;
use execution_core::safety::SafetyGate;
use execution_core::{ExecutionEngine, Reconciler, Store, TradingCircuitBreakers};

/// Wednesday 2025-01-08 11:00 ET, comfortably inside the session.
pub fn mid_session() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 8, 16, 0, 0).unwrap()
}

/// Far-dated OCC symbol so DTE checks never interfere.
pub const FAR_SYMBOL: &str = "AAPL300118C00150000";

/// How the fake broker resolves fill polls.
#[derive(Debug, Clone)]
pub enum FillBehavior {
    /// Fill completely on the first poll, at the submitted limit price (or
    /// the given price for market orders).
    Immediate(Decimal),
    /// Stay working forever.
    Never,
    /// Die in the given terminal state without filling.
    Dies(BrokerOrderState),
    /// Report a partial fill and then stall.
    Partial { qty: i64, price: Decimal },
}

/// One order as the fake broker received it.
#[derive(Debug, Clone)]
pub struct SubmittedOrder {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: i64,
    pub order_type: &'static str,
    pub limit_price: Option<Decimal>,
}

/// Scriptable in-memory broker.
pub struct FakeBroker {
    pub equity: Mutex<Option<Decimal>>,
    pub submit_error: Mutex<Option<BrokerApiError>>,
    pub fill: Mutex<FillBehavior>,
    pub submitted: Mutex<Vec<SubmittedOrder>>,
    pub positions: Mutex<Vec<BrokerPosition>>,
    pub quote: Mutex<OptionQuote>,
    /// Per-order status overrides, consulted before `fill`. Reconciler tests
    /// script these for orders seeded directly into the store.
    pub status_overrides: Mutex<HashMap<String, OrderStatusReport>>,
    counter: AtomicU64,
}

impl Default for FakeBroker {
    fn default() -> Self {
        Self {
            equity: Mutex::new(Some(dec!(10_000))),
            submit_error: Mutex::new(None),
            fill: Mutex::new(FillBehavior::Immediate(dec!(2.50))),
            submitted: Mutex::new(Vec::new()),
            positions: Mutex::new(Vec::new()),
            quote: Mutex::new(OptionQuote {
                bid: Some(dec!(2.40)),
                ask: Some(dec!(2.60)),
            }),
            status_overrides: Mutex::new(HashMap::new()),
            counter: AtomicU64::new(0),
        }
    }
}

impl FakeBroker {
    pub fn override_status(&self, order_id: &str, report: OrderStatusReport) {
        self.status_overrides
            .lock()
            .unwrap()
            .insert(order_id.to_string(), report);
    }

    fn record(&self, order: SubmittedOrder) -> Result<String, BrokerApiError> {
        if let Some(e) = self.submit_error.lock().unwrap().clone() {
            return Err(e);
        }
        self.submitted.lock().unwrap().push(order);
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("fake-{n}"))
    }

    fn last_submitted(&self) -> Option<SubmittedOrder> {
        self.submitted.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl BrokerPort for FakeBroker {
    async fn submit_limit_order(
        &self,
        option_symbol: &str,
        side: OrderSide,
        quantity: i64,
        limit_price: Decimal,
    ) -> Result<String, BrokerApiError> {
        self.record(SubmittedOrder {
            symbol: option_symbol.to_string(),
            side,
            quantity,
            order_type: "limit",
            limit_price: Some(limit_price),
        })
    }

    async fn submit_market_order(
        &self,
        option_symbol: &str,
        side: OrderSide,
        quantity: i64,
    ) -> Result<String, BrokerApiError> {
        self.record(SubmittedOrder {
            symbol: option_symbol.to_string(),
            side,
            quantity,
            order_type: "market",
            limit_price: None,
        })
    }

    async fn get_order_status(&self, order_id: &str) -> Result<OrderStatusReport, BrokerApiError> {
        if let Some(report) = self.status_overrides.lock().unwrap().get(order_id) {
            return Ok(report.clone());
        }
        let last = self.last_submitted();
        let behavior = self.fill.lock().unwrap().clone();
        let report = match behavior {
            FillBehavior::Immediate(default_price) => {
                let (qty, price) = last
                    .map(|o| (o.quantity, o.limit_price.unwrap_or(default_price)))
                    .unwrap_or((0, default_price));
                OrderStatusReport {
                    order_id: order_id.to_string(),
                    state: BrokerOrderState::Filled,
                    filled_qty: qty,
                    filled_avg_price: Some(price),
                }
            }
            FillBehavior::Never => OrderStatusReport {
                order_id: order_id.to_string(),
                state: BrokerOrderState::Accepted,
                filled_qty: 0,
                filled_avg_price: None,
            },
            FillBehavior::Dies(state) => OrderStatusReport {
                order_id: order_id.to_string(),
                state,
                filled_qty: 0,
                filled_avg_price: None,
            },
            FillBehavior::Partial { qty, price } => OrderStatusReport {
                order_id: order_id.to_string(),
                state: BrokerOrderState::PartiallyFilled,
                filled_qty: qty,
                filled_avg_price: Some(price),
            },
        };
        Ok(report)
    }

    async fn cancel_order(&self, _order_id: &str) -> Result<(), BrokerApiError> {
        Ok(())
    }

    async fn get_account(&self) -> Result<AccountSnapshot, BrokerApiError> {
        match *self.equity.lock().unwrap() {
            Some(equity) => Ok(AccountSnapshot {
                equity,
                cash: equity,
                buying_power: equity,
            }),
            None => Err(BrokerApiError::Network("account endpoint down".into())),
        }
    }

    async fn get_open_positions(&self) -> Result<Vec<BrokerPosition>, BrokerApiError> {
        Ok(self.positions.lock().unwrap().clone())
    }

    async fn get_option_quote(&self, _: &str) -> Result<OptionQuote, BrokerApiError> {
        Ok(*self.quote.lock().unwrap())
    }

    async fn is_market_open_today(&self) -> Result<bool, BrokerApiError> {
        Ok(true)
    }
}

/// Notifier that records every message.
#[derive(Default)]
pub struct CaptureNotifier {
    pub sent: Mutex<Vec<String>>,
}

#[async_trait]
impl NotifierPort for CaptureNotifier {
    async fn send(&self, text: &str) -> bool {
        self.sent.lock().unwrap().push(text.to_string());
        true
    }
}

/// Everything wired together over an in-memory store.
pub struct Harness {
    pub store: Store,
    pub broker: Arc<FakeBroker>,
    pub notifier: Arc<CaptureNotifier>,
    pub engine: ExecutionEngine,
    pub reconciler: Reconciler,
}

pub async fn harness() -> Harness {
    let store = Store::in_memory().await.expect("in-memory store");
    let broker = Arc::new(FakeBroker::default());
    let notifier = Arc::new(CaptureNotifier::default());

    let trading = TradingConfig::default();
    let market = MarketHoursConfig::default();
    let breakers =
        TradingCircuitBreakers::new(store.clone(), BreakerConfig::default(), market.clone());
    let gate = SafetyGate::new(
        store.clone(),
        broker.clone() as Arc<dyn BrokerPort>,
        breakers.clone(),
        trading.clone(),
        market,
    );
    // Zero-length fill window: one poll per attempt, no sleeping.
    let execution = ExecutionConfig {
        fill_timeout_secs: 0,
        fill_poll_interval_secs: 0,
        ..ExecutionConfig::default()
    };
    let engine = ExecutionEngine::new(
        store.clone(),
        broker.clone() as Arc<dyn BrokerPort>,
        notifier.clone() as Arc<dyn NotifierPort>,
        gate,
        breakers,
        trading,
        execution,
    );
    let reconciler = Reconciler::new(
        store.clone(),
        broker.clone() as Arc<dyn BrokerPort>,
        notifier.clone() as Arc<dyn NotifierPort>,
        ReconcileConfig::default(),
    );

    Harness {
        store,
        broker,
        notifier,
        engine,
        reconciler,
    }
}

/// A valid entry request that passes every gate check at `mid_session()`.
pub fn entry_request(signal_id: &str) -> EntryRequest {
    EntryRequest {
        signal_id: signal_id.to_string(),
        ticker: "AAPL".to_string(),
        option_symbol: FAR_SYMBOL.to_string(),
        quantity: 2,
        limit_price: dec!(2.50),
        thesis: "momentum breakout".to_string(),
        conviction: 7,
        greeks: GreeksSnapshot::default(),
        iv_rank: Some(dec!(40)),
        bid: Some(dec!(2.40)),
        ask: Some(dec!(2.60)),
        next_earnings_date: None,
    }
}
