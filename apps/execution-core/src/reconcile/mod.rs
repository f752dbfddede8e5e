//! Reconciliation against broker ground truth.
//!
//! Two passes. The positions pass treats the broker as authoritative for
//! instruments, quantities and marks: orphans are adopted, phantoms closed
//! (without inventing ledger history), current-price drift beyond the
//! threshold counted and overwritten, and market data refreshed on everything
//! matched. The orders pass finishes what the
//! engine's fill window could not observe: late fills, cancellations and
//! expirations on orders left SUBMITTED.
//!
//! Notifications are collected during the pass and sent only after the
//! transaction commits.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::broker::{BrokerPort, BrokerPosition};
use crate::config::ReconcileConfig;
use crate::error::EngineError;
use crate::models::{
    contract_notional, parse_occ_symbol, IntentStatus, OrderStatus, Position, PositionStatus,
    TradeLedgerEntry,
};
use crate::notify::NotifierPort;
use crate::store::{intents, ledger, orders, positions, Store, StoreError};

/// Outcome of one positions pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PositionReconcileReport {
    /// Option positions open at the broker.
    pub broker_open: usize,
    /// Positions open locally before the pass.
    pub local_open: usize,
    /// Broker-only positions adopted into the store.
    pub orphans_adopted: u32,
    /// Local-only positions closed as phantoms.
    pub phantoms_closed: u32,
    /// Price/quantity disagreements corrected on matched instruments.
    pub drift_corrections: u32,
    /// Matched positions with refreshed market data.
    pub refreshed: u32,
}

/// Outcome of one orders pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OrderReconcileReport {
    /// Non-terminal orders polled.
    pub checked: u32,
    /// Late fills applied (positions created, updated or closed).
    pub fills_applied: u32,
    /// Orders marked cancelled with intents flipped to FAILED.
    pub cancellations_applied: u32,
}

/// Periodic reconciler. Also runnable on demand.
pub struct Reconciler {
    store: Store,
    broker: Arc<dyn BrokerPort>,
    notifier: Arc<dyn NotifierPort>,
    config: ReconcileConfig,
}

impl Reconciler {
    /// Wire the reconciler to its collaborators.
    #[must_use]
    pub fn new(
        store: Store,
        broker: Arc<dyn BrokerPort>,
        notifier: Arc<dyn NotifierPort>,
        config: ReconcileConfig,
    ) -> Self {
        Self {
            store,
            broker,
            notifier,
            config,
        }
    }

    /// Run the orders pass then the positions pass once.
    pub async fn run_once(
        &self,
    ) -> Result<(OrderReconcileReport, PositionReconcileReport), EngineError> {
        let order_report = self.reconcile_orders().await?;
        let position_report = self.reconcile_positions().await?;
        Ok((order_report, position_report))
    }

    // ========================================================================
    // Positions
    // ========================================================================

    /// Compare local OPEN positions against the broker and repair divergence.
    pub async fn reconcile_positions(&self) -> Result<PositionReconcileReport, EngineError> {
        let now = Utc::now();
        let broker_positions: Vec<BrokerPosition> = self
            .broker
            .get_open_positions()
            .await?
            .into_iter()
            .filter(|p| p.quantity > 0)
            .collect();
        let local = positions::open_all(self.store.pool()).await?;

        let mut report = PositionReconcileReport {
            broker_open: broker_positions.len(),
            local_open: local.len(),
            ..PositionReconcileReport::default()
        };
        let mut notes: Vec<String> = Vec::new();

        let local_symbols: HashMap<&str, &Position> = local
            .iter()
            .map(|p| (p.option_symbol.as_str(), p))
            .collect();
        let broker_by_symbol: HashMap<&str, &BrokerPosition> = broker_positions
            .iter()
            .map(|p| (p.option_symbol.as_str(), p))
            .collect();

        let mut tx = self.store.begin().await?;

        // Broker-only positions: adopt, tagged so the exit logic knows the
        // thesis is synthetic.
        for bp in &broker_positions {
            if local_symbols.contains_key(bp.option_symbol.as_str()) {
                continue;
            }
            let Some(occ) = parse_occ_symbol(&bp.option_symbol) else {
                warn!(symbol = %bp.option_symbol, "unparseable broker symbol; skipping");
                continue;
            };
            let entry_notional = contract_notional(bp.avg_entry_price, bp.quantity);
            let mark = broker_mark(bp);
            let current_notional = mark.map(|m| contract_notional(m, bp.quantity));
            let pnl_dollars = current_notional
                .map_or(Decimal::ZERO, |cn| cn - entry_notional);
            let pnl_pct = if entry_notional.is_zero() {
                Decimal::ZERO
            } else {
                pnl_dollars / entry_notional
            };

            let position = Position {
                position_id: orphan_id(),
                signal_id: format!("orphan-{}", bp.option_symbol),
                ticker: occ.ticker.clone(),
                option_symbol: bp.option_symbol.clone(),
                side: occ.side,
                strike: occ.strike,
                expiration: occ.expiration,
                quantity: bp.quantity,
                entry_price: bp.avg_entry_price,
                entry_notional,
                current_price: mark,
                current_notional,
                pnl_pct,
                pnl_dollars,
                status: PositionStatus::Open,
                greeks: crate::models::GreeksSnapshot::default(),
                entry_thesis: "Adopted from broker: position not tracked locally".to_string(),
                conviction: 0,
                adopted: true,
                opened_at: now,
                closed_at: None,
                last_checked: Some(now),
            };
            positions::insert(&mut *tx, &position).await?;
            report.orphans_adopted += 1;
            warn!(
                position_id = %position.position_id,
                symbol = %bp.option_symbol,
                quantity = bp.quantity,
                "adopted orphan position from broker"
            );
            notes.push(format!(
                "Adopted orphan position {} ({} contracts) from broker",
                bp.option_symbol, bp.quantity
            ));
        }

        // Local positions: phantom closure, drift correction, refresh.
        for lp in &local {
            let Some(bp) = broker_by_symbol.get(lp.option_symbol.as_str()) else {
                positions::mark_closed(&mut *tx, &lp.position_id, PositionStatus::Closed, now)
                    .await?;
                report.phantoms_closed += 1;
                // No ledger entry: there is no trustworthy exit price for a
                // position the broker no longer knows about.
                warn!(
                    position_id = %lp.position_id,
                    symbol = %lp.option_symbol,
                    "phantom position closed; not found at broker"
                );
                notes.push(format!(
                    "Closed phantom position {} (not found at broker)",
                    lp.option_symbol
                ));
                continue;
            };

            // Quantity: the broker is authoritative; a mismatch is adopted
            // outright with entry notional recomputed at the local price.
            let mut quantity = lp.quantity;
            if lp.quantity != bp.quantity {
                warn!(
                    position_id = %lp.position_id,
                    local_qty = lp.quantity,
                    broker_qty = bp.quantity,
                    "quantity mismatch; adopting broker quantity"
                );
                quantity = bp.quantity;
                positions::update_entry_fill(
                    &mut *tx,
                    &lp.position_id,
                    lp.entry_price,
                    quantity,
                    contract_notional(lp.entry_price, quantity),
                )
                .await?;
                report.drift_corrections += 1;
            }

            // Current-price drift: a large disagreement between the locally
            // recorded mark and the broker's counts as a correction. The
            // refresh below overwrites the local value either way.
            let broker_price = broker_mark(bp);
            if let (Some(local_price), Some(live_price)) = (lp.current_price, broker_price) {
                if local_price > Decimal::ZERO {
                    let drift = ((live_price - local_price) / local_price).abs();
                    if drift > self.config.price_drift_threshold {
                        warn!(
                            position_id = %lp.position_id,
                            local_price = %local_price,
                            broker_price = %live_price,
                            drift = %drift,
                            "price drift beyond threshold; adopting broker price"
                        );
                        report.drift_corrections += 1;
                    }
                }
            }

            // Unconditional market data refresh on matched instruments.
            let entry_notional = contract_notional(lp.entry_price, quantity);
            let mark = broker_price
                .or(lp.current_price)
                .unwrap_or(lp.entry_price);
            let current_notional = contract_notional(mark, quantity);
            let pnl_dollars = current_notional - entry_notional;
            let pnl_pct = if entry_notional.is_zero() {
                Decimal::ZERO
            } else {
                pnl_dollars / entry_notional
            };
            positions::update_market_data(
                &mut *tx,
                &lp.position_id,
                mark,
                current_notional,
                pnl_pct,
                pnl_dollars,
                now,
            )
            .await?;
            report.refreshed += 1;
        }

        tx.commit().await.map_err(StoreError::from)?;

        for note in notes {
            self.notifier.send(&note).await;
        }
        info!(
            broker_open = report.broker_open,
            local_open = report.local_open,
            orphans_adopted = report.orphans_adopted,
            phantoms_closed = report.phantoms_closed,
            drift_corrections = report.drift_corrections,
            "positions reconciled"
        );
        Ok(report)
    }

    // ========================================================================
    // Orders
    // ========================================================================

    /// Re-poll non-terminal orders and apply whatever the broker settled on.
    pub async fn reconcile_orders(&self) -> Result<OrderReconcileReport, EngineError> {
        let open_orders = orders::active(self.store.pool()).await?;
        let mut report = OrderReconcileReport::default();
        let mut notes: Vec<String> = Vec::new();

        for order in open_orders {
            report.checked += 1;
            let status = match self.broker.get_order_status(&order.broker_order_id).await {
                Ok(s) => s,
                Err(e) => {
                    // One unpollable order must not stall the sweep.
                    warn!(broker_order_id = %order.broker_order_id, error = %e, "order poll failed");
                    continue;
                }
            };

            let mut tx = self.store.begin().await?;
            let now = Utc::now();

            if status.is_filled() {
                let fill_price = status
                    .filled_avg_price
                    .or(order.limit_price)
                    .unwrap_or(Decimal::ZERO);
                orders::update_fill(
                    &mut *tx,
                    &order.broker_order_id,
                    OrderStatus::Filled,
                    status.filled_qty,
                    Some(fill_price),
                    Some(now),
                )
                .await?;
                intents::set_status(&mut *tx, &order.intent_key, IntentStatus::Executed, now)
                    .await?;

                if let Some(position_id) = order.intent_key.strip_prefix("exit-") {
                    self.apply_exit_fill(&mut tx, position_id, &order, fill_price, &mut notes)
                        .await?;
                } else {
                    self.apply_entry_fill(&mut tx, &order, fill_price, status.filled_qty, &mut notes)
                        .await?;
                }
                report.fills_applied += 1;
            } else if status.state.is_dead() {
                let detail = format!("resolved {:?} by reconciler", status.state);
                orders::mark_cancelled(&mut *tx, &order.broker_order_id, &detail).await?;
                if let Some(intent) = intents::get(&mut *tx, &order.intent_key).await? {
                    if intent.status == IntentStatus::Pending {
                        // FAILED keeps the attempt retry-eligible.
                        intents::mark_failed(&mut *tx, &order.intent_key, &detail, now).await?;
                    }
                }
                warn!(
                    broker_order_id = %order.broker_order_id,
                    state = ?status.state,
                    "order resolved dead by reconciler"
                );
                report.cancellations_applied += 1;
            } else if status.filled_qty > order.filled_qty {
                orders::update_fill(
                    &mut *tx,
                    &order.broker_order_id,
                    OrderStatus::Partial,
                    status.filled_qty,
                    status.filled_avg_price,
                    None,
                )
                .await?;
            }

            tx.commit().await.map_err(StoreError::from)?;
        }

        for note in notes {
            self.notifier.send(&note).await;
        }
        info!(
            checked = report.checked,
            fills_applied = report.fills_applied,
            cancellations_applied = report.cancellations_applied,
            "orders reconciled"
        );
        Ok(report)
    }

    /// A late entry fill: create the position, or correct it if the engine
    /// already created one from a partial fill.
    async fn apply_entry_fill(
        &self,
        tx: &mut sqlx::Transaction<'static, sqlx::Sqlite>,
        order: &crate::models::BrokerOrder,
        fill_price: Decimal,
        filled_qty: i64,
        notes: &mut Vec<String>,
    ) -> Result<(), EngineError> {
        let entry_notional = contract_notional(fill_price, filled_qty);
        if let Some(existing) = positions::open_by_symbol(&mut **tx, &order.option_symbol).await? {
            positions::update_entry_fill(
                &mut **tx,
                &existing.position_id,
                fill_price,
                filled_qty,
                entry_notional,
            )
            .await?;
            info!(
                position_id = %existing.position_id,
                "entry fill completed by reconciler on existing position"
            );
            return Ok(());
        }

        let Some(occ) = parse_occ_symbol(&order.option_symbol) else {
            warn!(symbol = %order.option_symbol, "unparseable symbol on filled entry order");
            return Ok(());
        };
        let intent = intents::get(&mut **tx, &order.intent_key).await?;
        let now = Utc::now();
        let position = Position {
            position_id: reconcile_position_id(),
            signal_id: intent
                .as_ref()
                .map_or_else(|| order.intent_key.clone(), |i| i.signal_id.clone()),
            ticker: occ.ticker.clone(),
            option_symbol: order.option_symbol.clone(),
            side: occ.side,
            strike: occ.strike,
            expiration: occ.expiration,
            quantity: filled_qty,
            entry_price: fill_price,
            entry_notional,
            current_price: Some(fill_price),
            current_notional: Some(entry_notional),
            pnl_pct: Decimal::ZERO,
            pnl_dollars: Decimal::ZERO,
            status: PositionStatus::Open,
            greeks: crate::models::GreeksSnapshot::default(),
            entry_thesis: intent.map_or_else(String::new, |i| i.reason),
            conviction: 0,
            adopted: false,
            opened_at: now,
            closed_at: None,
            last_checked: Some(now),
        };
        positions::insert(&mut **tx, &position).await?;
        info!(
            position_id = %position.position_id,
            broker_order_id = %order.broker_order_id,
            "position created from late entry fill"
        );
        notes.push(format!(
            "Late entry fill: {} {} contracts @ {fill_price}",
            order.option_symbol, filled_qty
        ));
        Ok(())
    }

    /// A late exit fill: close the position and write the round trip.
    async fn apply_exit_fill(
        &self,
        tx: &mut sqlx::Transaction<'static, sqlx::Sqlite>,
        position_id: &str,
        order: &crate::models::BrokerOrder,
        fill_price: Decimal,
        notes: &mut Vec<String>,
    ) -> Result<(), EngineError> {
        let Some(position) = positions::get(&mut **tx, position_id).await? else {
            warn!(position_id, "filled exit order references unknown position");
            return Ok(());
        };
        if position.status != PositionStatus::Open {
            return Ok(());
        }
        if ledger::exists_for_position(&mut **tx, position_id).await? {
            return Ok(());
        }

        let now = Utc::now();
        let (pnl_dollars, pnl_pct) = position.realized_pnl(fill_price);
        positions::mark_closed(&mut **tx, position_id, PositionStatus::Closed, now).await?;
        ledger::insert(
            &mut **tx,
            &TradeLedgerEntry {
                position_id: position.position_id.clone(),
                ticker: position.ticker.clone(),
                side: position.side,
                entry_price: position.entry_price,
                exit_price: fill_price,
                quantity: position.quantity,
                pnl_dollars,
                pnl_pct,
                hold_duration_hours: (now - position.opened_at).num_seconds() as f64 / 3600.0,
                entry_thesis: position.entry_thesis.clone(),
                exit_reason: "Exit completed by reconciler".to_string(),
                opened_at: position.opened_at,
                closed_at: now,
            },
        )
        .await?;
        info!(
            position_id,
            exit_price = %fill_price,
            pnl_dollars = %pnl_dollars,
            "position closed from late exit fill"
        );
        notes.push(format!(
            "Late exit fill: {} closed @ {fill_price}, P&L ${pnl_dollars}",
            order.option_symbol
        ));
        Ok(())
    }
}

fn broker_mark(bp: &BrokerPosition) -> Option<Decimal> {
    bp.current_price.or_else(|| {
        bp.market_value.and_then(|mv| {
            if bp.quantity > 0 {
                Some(mv / (Decimal::from(bp.quantity) * crate::models::CONTRACT_MULTIPLIER))
            } else {
                None
            }
        })
    })
}

fn orphan_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("orphan-{}", &hex[..12])
}

fn reconcile_position_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("pos-{}", &hex[..12])
}
