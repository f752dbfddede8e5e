//! The execution engine: turns approved decisions into durable, idempotent
//! state transitions against the broker.
//!
//! Every flow is: check, write intent, submit, confirm, record. All store
//! mutations for one attempt share a single transaction committed once; a
//! persistence failure mid-flow rolls the whole attempt back and surfaces as
//! an error. Domain stops (gate, duplicate key, broker rejection) come back
//! as outcomes, and the caller decides what to do next.

mod fill;
pub mod sizing;

pub use fill::wait_for_fill;
pub use sizing::SizingBreakdown;

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::broker::{AccountSnapshot, BrokerPort, OrderStatusReport};
use crate::config::{ExecutionConfig, TradingConfig};
use crate::error::EngineError;
use crate::models::{
    contract_notional, parse_occ_symbol, BrokerOrder, EntryOutcome, EntryRequest, ExitOutcome,
    ExitRequest, IntentStatus, OrderIntent, OrderSide, OrderStatus, OrderType, Position,
    PositionStatus, TradeLedgerEntry,
};
use crate::notify::NotifierPort;
use crate::safety::{BreakerState, SafetyGate, TradingCircuitBreakers};
use crate::store::{intents, ledger, orders, positions, Store, StoreError};

/// Executes entries and exits. One instance serves the whole process.
pub struct ExecutionEngine {
    store: Store,
    broker: Arc<dyn BrokerPort>,
    notifier: Arc<dyn NotifierPort>,
    gate: SafetyGate,
    breakers: TradingCircuitBreakers,
    trading: TradingConfig,
    execution: ExecutionConfig,
}

impl ExecutionEngine {
    /// Wire the engine to its collaborators.
    #[must_use]
    pub fn new(
        store: Store,
        broker: Arc<dyn BrokerPort>,
        notifier: Arc<dyn NotifierPort>,
        gate: SafetyGate,
        breakers: TradingCircuitBreakers,
        trading: TradingConfig,
        execution: ExecutionConfig,
    ) -> Self {
        Self {
            store,
            broker,
            notifier,
            gate,
            breakers,
            trading,
            execution,
        }
    }

    /// The safety gate, for operator status queries.
    #[must_use]
    pub fn gate(&self) -> &SafetyGate {
        &self.gate
    }

    /// Current breaker state against live equity.
    pub async fn breaker_status(&self) -> Result<BreakerState, EngineError> {
        let account = self.broker.get_account().await?;
        Ok(self.breakers.check(account.equity).await?)
    }

    /// Live account balances.
    pub async fn account(&self) -> Result<AccountSnapshot, EngineError> {
        Ok(self.broker.get_account().await?)
    }

    // ========================================================================
    // Entry
    // ========================================================================

    /// Execute an approved entry decision.
    pub async fn execute_entry(
        &self,
        request: EntryRequest,
    ) -> Result<EntryOutcome, EngineError> {
        self.execute_entry_at(request, Utc::now()).await
    }

    /// Entry execution with an explicit clock for the time-sensitive safety
    /// checks. Tests drive this directly.
    pub async fn execute_entry_at(
        &self,
        request: EntryRequest,
        now: chrono::DateTime<Utc>,
    ) -> Result<EntryOutcome, EngineError> {
        let mut request = request;
        info!(
            signal_id = %request.signal_id,
            ticker = %request.ticker,
            option_symbol = %request.option_symbol,
            quantity = request.quantity,
            limit_price = %request.limit_price,
            "entry requested"
        );

        // Sizing first: a zero cap means there is nothing to gate.
        let account = match self.broker.get_account().await {
            Ok(a) => a,
            Err(e) => {
                return Ok(EntryOutcome::rejected(format!(
                    "Cannot read account equity: {e}"
                )));
            }
        };
        let current_exposure: Decimal = positions::open_all(self.store.pool())
            .await
            .map_err(EngineError::from)?
            .iter()
            .map(|p| p.entry_notional)
            .sum();
        let size = sizing::max_contracts(
            account.equity,
            current_exposure,
            request.limit_price,
            &self.trading,
        );
        if size.max_contracts <= 0 {
            return Ok(EntryOutcome::rejected(format!(
                "Position sizing yields zero contracts (binding budget ${} via {})",
                size.binding_budget, size.limiting_factor
            )));
        }
        if request.quantity > size.max_contracts {
            info!(
                requested = request.quantity,
                sized = size.max_contracts,
                limiting_factor = size.limiting_factor,
                "clamping quantity to sizing cap"
            );
            request.quantity = size.max_contracts;
        }

        // Non-overridable safety gate.
        let decision = self.gate.check_entry_at(&request, now).await?;
        if !decision.allowed {
            return Ok(EntryOutcome::rejected(format!(
                "Safety gate: {}",
                decision.reason
            )));
        }

        // The gate validated the symbol.
        let Some(occ) = parse_occ_symbol(&request.option_symbol) else {
            return Ok(EntryOutcome::rejected(format!(
                "Unparseable option symbol {}",
                request.option_symbol
            )));
        };

        // Clamp the limit to the live market so a stale decision cannot
        // overpay. Quote failures fall back to the requested price.
        let mut limit_price = request.limit_price;
        match self.broker.get_option_quote(&request.option_symbol).await {
            Ok(quote) => {
                if let Some(mark) = quote.mark() {
                    let cap = (mark
                        * (Decimal::ONE + self.execution.entry_clamp_pct / Decimal::ONE_HUNDRED))
                        .round_dp(2);
                    if limit_price > cap {
                        warn!(
                            requested = %limit_price,
                            clamped = %cap,
                            mark = %mark,
                            "clamping entry limit to live market"
                        );
                        limit_price = cap;
                    }
                }
            }
            Err(e) => debug!(error = %e, "quote unavailable; using requested limit"),
        }

        // Everything from here mutates state: one transaction, one commit.
        let key = OrderIntent::entry_key(&request.signal_id);
        let mut tx = self.store.begin().await?;

        if let Some(existing) = intents::get(&mut *tx, &key).await? {
            return Ok(EntryOutcome::rejected(format!(
                "Duplicate entry for signal {}: intent is {}",
                request.signal_id, existing.status
            )));
        }

        let intent = OrderIntent {
            idempotency_key: key.clone(),
            signal_id: request.signal_id.clone(),
            ticker: request.ticker.clone(),
            option_symbol: request.option_symbol.clone(),
            side: OrderSide::Buy,
            quantity: request.quantity,
            limit_price: Some(limit_price),
            status: IntentStatus::Pending,
            broker_order_id: None,
            reason: request.thesis.clone(),
            created_at: now,
            executed_at: None,
        };
        intents::insert(&mut *tx, &intent).await?;

        let order_id = match self
            .broker
            .submit_limit_order(
                &request.option_symbol,
                OrderSide::Buy,
                request.quantity,
                limit_price,
            )
            .await
        {
            Ok(id) => id,
            Err(e) => {
                intents::mark_failed(&mut *tx, &key, &format!("submit failed: {e}"), Utc::now())
                    .await?;
                tx.commit().await.map_err(StoreError::from)?;
                warn!(signal_id = %request.signal_id, error = %e, "entry submit failed");
                self.notifier
                    .notify_error("entry submit", &format!("{}: {e}", request.option_symbol))
                    .await;
                return Ok(EntryOutcome::rejected(format!("Broker refused order: {e}")));
            }
        };

        intents::set_broker_order(&mut *tx, &key, &order_id).await?;
        orders::insert(
            &mut *tx,
            &BrokerOrder {
                broker_order_id: order_id.clone(),
                intent_key: key.clone(),
                ticker: request.ticker.clone(),
                option_symbol: request.option_symbol.clone(),
                side: OrderSide::Buy,
                quantity: request.quantity,
                order_type: OrderType::Limit,
                limit_price: Some(limit_price),
                filled_qty: 0,
                filled_price: None,
                status: OrderStatus::Submitted,
                submitted_at: now,
                filled_at: None,
                error: None,
            },
        )
        .await?;

        let report = wait_for_fill(
            self.broker.as_ref(),
            &order_id,
            Duration::from_secs(self.execution.fill_timeout_secs),
            Duration::from_secs(self.execution.fill_poll_interval_secs),
        )
        .await;

        let outcome = if report.filled_qty > 0 {
            let observed_at = Utc::now();
            let fill_price = report.filled_avg_price.unwrap_or(limit_price);
            let status = if report.is_filled() {
                OrderStatus::Filled
            } else {
                OrderStatus::Partial
            };
            orders::update_fill(
                &mut *tx,
                &order_id,
                status,
                report.filled_qty,
                Some(fill_price),
                report.is_filled().then_some(observed_at),
            )
            .await?;
            intents::set_status(&mut *tx, &key, IntentStatus::Executed, observed_at).await?;

            let position = Position {
                position_id: new_position_id("pos"),
                signal_id: request.signal_id.clone(),
                ticker: request.ticker.clone(),
                option_symbol: request.option_symbol.clone(),
                side: occ.side,
                strike: occ.strike,
                expiration: occ.expiration,
                quantity: report.filled_qty,
                entry_price: fill_price,
                entry_notional: contract_notional(fill_price, report.filled_qty),
                current_price: Some(fill_price),
                current_notional: Some(contract_notional(fill_price, report.filled_qty)),
                pnl_pct: Decimal::ZERO,
                pnl_dollars: Decimal::ZERO,
                status: PositionStatus::Open,
                greeks: request.greeks.clone(),
                entry_thesis: request.thesis.clone(),
                conviction: request.conviction,
                adopted: false,
                opened_at: observed_at,
                closed_at: None,
                last_checked: None,
            };
            positions::insert(&mut *tx, &position).await?;

            info!(
                position_id = %position.position_id,
                broker_order_id = %order_id,
                filled_qty = report.filled_qty,
                fill_price = %fill_price,
                "entry filled"
            );
            EntryOutcome {
                success: true,
                message: format!("Filled {} contracts @ {fill_price}", report.filled_qty),
                broker_order_id: Some(order_id),
                position_id: Some(position.position_id),
                filled_qty: report.filled_qty,
                filled_price: Some(fill_price),
                order_status: Some(status),
            }
        } else if report.state.is_dead() {
            let detail = format!("order {:?} at broker before any fill", report.state);
            orders::mark_cancelled(&mut *tx, &order_id, &detail).await?;
            intents::mark_failed(&mut *tx, &key, &detail, Utc::now()).await?;
            warn!(broker_order_id = %order_id, state = ?report.state, "entry order died unfilled");
            EntryOutcome {
                success: false,
                message: format!("Order died unfilled ({:?})", report.state),
                broker_order_id: Some(order_id),
                position_id: None,
                filled_qty: 0,
                filled_price: None,
                order_status: Some(OrderStatus::Cancelled),
            }
        } else {
            // Fill window elapsed with the order still working. Leave the
            // intent PENDING and the order SUBMITTED; the reconciler finishes
            // whichever way the order resolves.
            info!(broker_order_id = %order_id, "no fill within window; leaving order open");
            EntryOutcome {
                success: true,
                message: "Order submitted; not filled within confirmation window".to_string(),
                broker_order_id: Some(order_id),
                position_id: None,
                filled_qty: 0,
                filled_price: None,
                order_status: Some(OrderStatus::Submitted),
            }
        };

        tx.commit().await.map_err(StoreError::from)?;

        if outcome.filled_qty > 0 {
            self.notifier
                .notify_entry(
                    &request.ticker,
                    &request.option_symbol,
                    outcome.filled_qty,
                    outcome.filled_price.unwrap_or(limit_price),
                    &request.thesis,
                )
                .await;
        }
        Ok(outcome)
    }

    // ========================================================================
    // Exit
    // ========================================================================

    /// Execute a close decision for an open position.
    pub async fn execute_exit(&self, request: ExitRequest) -> Result<ExitOutcome, EngineError> {
        let now = Utc::now();
        let Some(position) = positions::get(self.store.pool(), &request.position_id).await? else {
            return Ok(ExitOutcome::rejected(format!(
                "Position {} not found",
                request.position_id
            )));
        };
        if position.status != PositionStatus::Open {
            return Ok(ExitOutcome::rejected(format!(
                "Position {} is {}, not OPEN",
                position.position_id, position.status
            )));
        }
        info!(
            position_id = %position.position_id,
            option_symbol = %position.option_symbol,
            reason = %request.reason,
            "exit requested"
        );

        // Fresh mark if available; stored mark otherwise.
        let quote = self
            .broker
            .get_option_quote(&position.option_symbol)
            .await
            .ok();
        let mark = quote.and_then(|q| q.mark()).or(position.current_price);

        let (order_type, limit_price) = self.select_exit_order(&position, mark, &request);

        let key = OrderIntent::exit_key(&position.position_id);
        let mut tx = self.store.begin().await?;

        // Idempotency with retry rules: EXECUTED and SKIPPED are final;
        // FAILED retries immediately; PENDING retries only once stale.
        if let Some(existing) = intents::get(&mut *tx, &key).await? {
            match existing.status {
                IntentStatus::Executed | IntentStatus::Skipped => {
                    return Ok(ExitOutcome::rejected(format!(
                        "Exit for {} already {}",
                        position.position_id, existing.status
                    )));
                }
                IntentStatus::Failed => {
                    info!(key = %key, "retrying previously failed exit");
                    intents::delete(&mut *tx, &key).await?;
                }
                IntentStatus::Pending => {
                    let stale =
                        existing.age(now).num_seconds() > self.execution.stale_exit_intent_secs;
                    if stale {
                        warn!(key = %key, "stale pending exit intent; retrying");
                        intents::delete(&mut *tx, &key).await?;
                    } else {
                        return Ok(ExitOutcome::rejected(format!(
                            "Exit for {} already in flight",
                            position.position_id
                        )));
                    }
                }
            }
        }

        let intent = OrderIntent {
            idempotency_key: key.clone(),
            signal_id: position.signal_id.clone(),
            ticker: position.ticker.clone(),
            option_symbol: position.option_symbol.clone(),
            side: OrderSide::Sell,
            quantity: position.quantity,
            limit_price,
            status: IntentStatus::Pending,
            broker_order_id: None,
            reason: request.reason.clone(),
            created_at: now,
            executed_at: None,
        };
        intents::insert(&mut *tx, &intent).await?;

        let submit = match (order_type, limit_price) {
            (OrderType::Limit, Some(price)) => {
                self.broker
                    .submit_limit_order(
                        &position.option_symbol,
                        OrderSide::Sell,
                        position.quantity,
                        price,
                    )
                    .await
            }
            _ => {
                self.broker
                    .submit_market_order(
                        &position.option_symbol,
                        OrderSide::Sell,
                        position.quantity,
                    )
                    .await
            }
        };
        let order_id = match submit {
            Ok(id) => id,
            Err(e) => {
                intents::mark_failed(&mut *tx, &key, &format!("submit failed: {e}"), Utc::now())
                    .await?;
                tx.commit().await.map_err(StoreError::from)?;
                warn!(position_id = %position.position_id, error = %e, "exit submit failed");
                self.notifier
                    .notify_error("exit submit", &format!("{}: {e}", position.option_symbol))
                    .await;
                return Ok(ExitOutcome::rejected(format!("Broker refused order: {e}")));
            }
        };

        intents::set_broker_order(&mut *tx, &key, &order_id).await?;
        orders::insert(
            &mut *tx,
            &BrokerOrder {
                broker_order_id: order_id.clone(),
                intent_key: key.clone(),
                ticker: position.ticker.clone(),
                option_symbol: position.option_symbol.clone(),
                side: OrderSide::Sell,
                quantity: position.quantity,
                order_type,
                limit_price,
                filled_qty: 0,
                filled_price: None,
                status: OrderStatus::Submitted,
                submitted_at: now,
                filled_at: None,
                error: None,
            },
        )
        .await?;

        let report = wait_for_fill(
            self.broker.as_ref(),
            &order_id,
            Duration::from_secs(self.execution.fill_timeout_secs),
            Duration::from_secs(self.execution.fill_poll_interval_secs),
        )
        .await;

        let outcome = if report.is_filled() {
            let closed_at = Utc::now();
            let exit_price = report
                .filled_avg_price
                .or(limit_price)
                .or(mark)
                .unwrap_or(Decimal::ZERO);
            let (pnl_dollars, pnl_pct) = position.realized_pnl(exit_price);

            orders::update_fill(
                &mut *tx,
                &order_id,
                OrderStatus::Filled,
                report.filled_qty,
                Some(exit_price),
                Some(closed_at),
            )
            .await?;
            intents::set_status(&mut *tx, &key, IntentStatus::Executed, closed_at).await?;
            positions::mark_closed(
                &mut *tx,
                &position.position_id,
                PositionStatus::Closed,
                closed_at,
            )
            .await?;
            ledger::insert(
                &mut *tx,
                &TradeLedgerEntry {
                    position_id: position.position_id.clone(),
                    ticker: position.ticker.clone(),
                    side: position.side,
                    entry_price: position.entry_price,
                    exit_price,
                    quantity: position.quantity,
                    pnl_dollars,
                    pnl_pct,
                    hold_duration_hours: hold_hours(position.opened_at, closed_at),
                    entry_thesis: position.entry_thesis.clone(),
                    exit_reason: request.reason.clone(),
                    opened_at: position.opened_at,
                    closed_at,
                },
            )
            .await?;

            info!(
                position_id = %position.position_id,
                exit_price = %exit_price,
                pnl_dollars = %pnl_dollars,
                "exit filled, position closed"
            );
            ExitOutcome {
                success: true,
                message: format!("Closed @ {exit_price}, P&L ${pnl_dollars}"),
                broker_order_id: Some(order_id),
                filled_qty: report.filled_qty,
                filled_price: Some(exit_price),
                pnl_dollars: Some(pnl_dollars),
                pnl_pct: Some(pnl_pct),
            }
        } else if report.state.is_dead() && report.filled_qty == 0 {
            let detail = format!("order {:?} at broker before any fill", report.state);
            orders::mark_cancelled(&mut *tx, &order_id, &detail).await?;
            intents::mark_failed(&mut *tx, &key, &detail, Utc::now()).await?;
            warn!(broker_order_id = %order_id, state = ?report.state, "exit order died unfilled");
            ExitOutcome {
                success: false,
                message: format!("Order died unfilled ({:?})", report.state),
                broker_order_id: Some(order_id),
                filled_qty: 0,
                filled_price: None,
                pnl_dollars: None,
                pnl_pct: None,
            }
        } else {
            // Still working (or partially filled) when the window closed.
            // Position stays OPEN; the reconciler completes the close when
            // the fill lands.
            if report.filled_qty > 0 {
                orders::update_fill(
                    &mut *tx,
                    &order_id,
                    OrderStatus::Partial,
                    report.filled_qty,
                    report.filled_avg_price,
                    None,
                )
                .await?;
            }
            info!(broker_order_id = %order_id, "no full fill within window; leaving order open");
            ExitOutcome {
                success: true,
                message: "Order submitted; not filled within confirmation window".to_string(),
                broker_order_id: Some(order_id),
                filled_qty: report.filled_qty,
                filled_price: report.filled_avg_price,
                pnl_dollars: None,
                pnl_pct: None,
            }
        };

        tx.commit().await.map_err(StoreError::from)?;

        if let (Some(pnl_dollars), Some(pnl_pct)) = (outcome.pnl_dollars, outcome.pnl_pct) {
            self.notifier
                .notify_exit(
                    &position.ticker,
                    &position.option_symbol,
                    position.quantity,
                    outcome.filled_price.unwrap_or(Decimal::ZERO),
                    pnl_dollars,
                    pnl_pct,
                    &request.reason,
                )
                .await;
        }
        Ok(outcome)
    }

    /// Market order when the position is near-worthless, deep underwater or
    /// about to expire; otherwise a limit slightly under the mark.
    fn select_exit_order(
        &self,
        position: &Position,
        mark: Option<Decimal>,
        request: &ExitRequest,
    ) -> (OrderType, Option<Decimal>) {
        if request.force_market {
            return (OrderType::Market, None);
        }
        let Some(mark) = mark else {
            // No price to hang a limit on.
            return (OrderType::Market, None);
        };

        let (_, _, live_pnl_pct) = position.mark_to_market(mark);
        let dte = position.dte(Utc::now().date_naive());
        let near_worthless = mark < self.execution.near_worthless_price;
        let deep_loss = live_pnl_pct <= -self.execution.deep_loss_pct;
        let near_expiry = dte <= self.execution.expiry_exit_dte;

        if near_worthless || deep_loss || near_expiry {
            debug!(
                position_id = %position.position_id,
                near_worthless,
                deep_loss,
                near_expiry,
                "auto-selecting market exit"
            );
            return (OrderType::Market, None);
        }

        let price = (mark
            * (Decimal::ONE - self.execution.exit_limit_discount_pct / Decimal::ONE_HUNDRED))
            .round_dp(2);
        (OrderType::Limit, Some(price))
    }
}

fn hold_hours(opened_at: chrono::DateTime<Utc>, closed_at: chrono::DateTime<Utc>) -> f64 {
    (closed_at - opened_at).num_seconds() as f64 / 3600.0
}

fn new_position_id(prefix: &str) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", &hex[..12])
}
