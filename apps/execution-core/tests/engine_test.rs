//! End-to-end engine flows against an in-memory store and a scripted broker.

mod support;

use chrono::{Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use execution_core::broker::{BrokerApiError, BrokerOrderState, OptionQuote};
use execution_core::models::{
    ExitRequest, IntentStatus, OptionSide, OrderIntent, OrderSide, OrderStatus, PositionStatus,
    TradeLedgerEntry,
};
use execution_core::store::{intents, ledger, orders, positions};

use support::{entry_request, harness, mid_session, FillBehavior, FAR_SYMBOL};

fn loss_entry(position_id: &str, pnl_dollars: Decimal, closed_at: chrono::DateTime<Utc>) -> TradeLedgerEntry {
    TradeLedgerEntry {
        position_id: position_id.to_string(),
        ticker: "AAPL".to_string(),
        side: OptionSide::Call,
        entry_price: dec!(2.50),
        exit_price: dec!(1.50),
        quantity: 2,
        pnl_dollars,
        pnl_pct: pnl_dollars / dec!(500),
        hold_duration_hours: 4.0,
        entry_thesis: "momentum breakout".to_string(),
        exit_reason: "stop".to_string(),
        opened_at: closed_at - Duration::hours(4),
        closed_at,
    }
}

#[tokio::test]
async fn entry_fills_and_creates_position() {
    let h = harness().await;
    let outcome = h
        .engine
        .execute_entry_at(entry_request("sig-1"), mid_session())
        .await
        .unwrap();

    assert!(outcome.success, "{}", outcome.message);
    assert_eq!(outcome.filled_qty, 2);
    assert_eq!(outcome.filled_price, Some(dec!(2.50)));
    let position_id = outcome.position_id.expect("position created");

    let position = positions::get(h.store.pool(), &position_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(position.status, PositionStatus::Open);
    assert_eq!(position.entry_notional, dec!(500));
    assert!(!position.adopted);

    let intent = intents::get(h.store.pool(), "entry-sig-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(intent.status, IntentStatus::Executed);
    assert!(intent.executed_at.is_some());

    let order = orders::get(h.store.pool(), &outcome.broker_order_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, OrderStatus::Filled);
    assert_eq!(order.filled_qty, 2);

    let sent = h.notifier.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("AAPL"));
}

#[tokio::test]
async fn duplicate_signal_is_rejected_without_resubmitting() {
    let h = harness().await;
    let first = h
        .engine
        .execute_entry_at(entry_request("sig-dup"), mid_session())
        .await
        .unwrap();
    assert!(first.success);

    let second = h
        .engine
        .execute_entry_at(entry_request("sig-dup"), mid_session())
        .await
        .unwrap();
    assert!(!second.success);
    assert!(second.message.contains("Duplicate"), "{}", second.message);

    assert_eq!(h.broker.submitted.lock().unwrap().len(), 1);
    assert_eq!(positions::open_count(h.store.pool()).await.unwrap(), 1);
}

#[tokio::test]
async fn gate_block_leaves_no_state_behind() {
    let h = harness().await;
    let mut request = entry_request("sig-gme");
    request.ticker = "GME".to_string();
    request.option_symbol = "GME300118C00150000".to_string();

    let outcome = h
        .engine
        .execute_entry_at(request, mid_session())
        .await
        .unwrap();
    assert!(!outcome.success);
    assert!(outcome.message.contains("Safety gate"), "{}", outcome.message);

    assert!(h.broker.submitted.lock().unwrap().is_empty());
    assert!(intents::get(h.store.pool(), "entry-sig-gme")
        .await
        .unwrap()
        .is_none());
    assert_eq!(positions::open_count(h.store.pool()).await.unwrap(), 0);
}

#[tokio::test]
async fn oversized_request_is_clamped_to_sizing_cap() {
    let h = harness().await;
    let mut request = entry_request("sig-big");
    request.quantity = 100;

    let outcome = h
        .engine
        .execute_entry_at(request, mid_session())
        .await
        .unwrap();
    assert!(outcome.success, "{}", outcome.message);
    // $10k equity: 20% per-trade allows $2000, the $1000 absolute cap binds.
    // floor(1000 / (2.50 * 100)) = 4 contracts.
    assert_eq!(outcome.filled_qty, 4);
    let submitted = h.broker.submitted.lock().unwrap();
    assert_eq!(submitted[0].quantity, 4);
}

#[tokio::test]
async fn unreadable_equity_fails_closed() {
    let h = harness().await;
    *h.broker.equity.lock().unwrap() = None;

    let outcome = h
        .engine
        .execute_entry_at(entry_request("sig-eq"), mid_session())
        .await
        .unwrap();
    assert!(!outcome.success);
    assert!(outcome.message.contains("equity"), "{}", outcome.message);
    assert!(h.broker.submitted.lock().unwrap().is_empty());
    assert!(intents::get(h.store.pool(), "entry-sig-eq")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn submit_failure_persists_failed_intent() {
    let h = harness().await;
    *h.broker.submit_error.lock().unwrap() =
        Some(BrokerApiError::OrderRejected("insufficient buying power".into()));

    let outcome = h
        .engine
        .execute_entry_at(entry_request("sig-fail"), mid_session())
        .await
        .unwrap();
    assert!(!outcome.success);
    assert!(outcome.message.contains("Broker refused"), "{}", outcome.message);

    let intent = intents::get(h.store.pool(), "entry-sig-fail")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(intent.status, IntentStatus::Failed);
    assert!(intent.reason.contains("submit failed"));

    // Entry keys are final once written: even after the broker recovers,
    // the same signal cannot fire twice.
    *h.broker.submit_error.lock().unwrap() = None;
    let retry = h
        .engine
        .execute_entry_at(entry_request("sig-fail"), mid_session())
        .await
        .unwrap();
    assert!(!retry.success);
    assert!(retry.message.contains("Duplicate"));
}

#[tokio::test]
async fn fill_timeout_leaves_order_working() {
    let h = harness().await;
    *h.broker.fill.lock().unwrap() = FillBehavior::Never;

    let outcome = h
        .engine
        .execute_entry_at(entry_request("sig-slow"), mid_session())
        .await
        .unwrap();
    // Submission succeeded; the fill just has not landed yet.
    assert!(outcome.success);
    assert_eq!(outcome.filled_qty, 0);
    assert!(outcome.position_id.is_none());

    let intent = intents::get(h.store.pool(), "entry-sig-slow")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(intent.status, IntentStatus::Pending);
    let order = orders::get(h.store.pool(), &outcome.broker_order_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, OrderStatus::Submitted);
    assert_eq!(positions::open_count(h.store.pool()).await.unwrap(), 0);
}

#[tokio::test]
async fn dead_entry_order_fails_the_intent() {
    let h = harness().await;
    *h.broker.fill.lock().unwrap() = FillBehavior::Dies(BrokerOrderState::Rejected);

    let outcome = h
        .engine
        .execute_entry_at(entry_request("sig-dead"), mid_session())
        .await
        .unwrap();
    assert!(!outcome.success);

    let intent = intents::get(h.store.pool(), "entry-sig-dead")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(intent.status, IntentStatus::Failed);
    let order = orders::get(h.store.pool(), &outcome.broker_order_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, OrderStatus::Cancelled);
}

#[tokio::test]
async fn exit_closes_position_and_writes_ledger() {
    let h = harness().await;
    let entry = h
        .engine
        .execute_entry_at(entry_request("sig-exit"), mid_session())
        .await
        .unwrap();
    let position_id = entry.position_id.unwrap();

    // Mark moved to 4.00; the engine should work a limit 5% under it.
    *h.broker.quote.lock().unwrap() = OptionQuote {
        bid: Some(dec!(3.90)),
        ask: Some(dec!(4.10)),
    };
    let outcome = h
        .engine
        .execute_exit(ExitRequest {
            position_id: position_id.clone(),
            reason: "profit target".to_string(),
            force_market: false,
        })
        .await
        .unwrap();
    assert!(outcome.success, "{}", outcome.message);
    assert_eq!(outcome.filled_price, Some(dec!(3.80)));
    assert_eq!(outcome.pnl_dollars, Some(dec!(260)));

    let submitted = h.broker.submitted.lock().unwrap();
    let exit_order = submitted.last().unwrap();
    assert_eq!(exit_order.order_type, "limit");
    assert_eq!(exit_order.side, OrderSide::Sell);
    assert_eq!(exit_order.limit_price, Some(dec!(3.80)));
    drop(submitted);

    let position = positions::get(h.store.pool(), &position_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(position.status, PositionStatus::Closed);
    assert!(position.closed_at.is_some());

    let rows = ledger::recent(h.store.pool(), 10).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].pnl_dollars, dec!(260));
    assert_eq!(rows[0].exit_reason, "profit target");
    assert!(!rows[0].is_loss());

    // A second exit for the same position is a no-op.
    let again = h
        .engine
        .execute_exit(ExitRequest {
            position_id,
            reason: "profit target".to_string(),
            force_market: false,
        })
        .await
        .unwrap();
    assert!(!again.success);
    assert_eq!(ledger::recent(h.store.pool(), 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn near_worthless_exit_goes_to_market() {
    let h = harness().await;
    let entry = h
        .engine
        .execute_entry_at(entry_request("sig-dust"), mid_session())
        .await
        .unwrap();
    let position_id = entry.position_id.unwrap();

    *h.broker.quote.lock().unwrap() = OptionQuote {
        bid: Some(dec!(0.04)),
        ask: Some(dec!(0.06)),
    };
    *h.broker.fill.lock().unwrap() = FillBehavior::Immediate(dec!(0.05));

    let outcome = h
        .engine
        .execute_exit(ExitRequest {
            position_id,
            reason: "near worthless".to_string(),
            force_market: false,
        })
        .await
        .unwrap();
    assert!(outcome.success, "{}", outcome.message);

    let submitted = h.broker.submitted.lock().unwrap();
    assert_eq!(submitted.last().unwrap().order_type, "market");
    drop(submitted);

    let rows = ledger::recent(h.store.pool(), 10).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].is_loss());
    assert_eq!(rows[0].pnl_dollars, dec!(-490));
}

#[tokio::test]
async fn pending_exit_intent_blocks_until_stale() {
    let h = harness().await;
    let entry = h
        .engine
        .execute_entry_at(entry_request("sig-pend"), mid_session())
        .await
        .unwrap();
    let position_id = entry.position_id.unwrap();

    // A fresh in-flight exit attempt blocks a second one.
    let fresh = OrderIntent {
        idempotency_key: format!("exit-{position_id}"),
        signal_id: "sig-pend".to_string(),
        ticker: "AAPL".to_string(),
        option_symbol: FAR_SYMBOL.to_string(),
        side: OrderSide::Sell,
        quantity: 2,
        limit_price: Some(dec!(2.40)),
        status: IntentStatus::Pending,
        broker_order_id: None,
        reason: "stop".to_string(),
        created_at: Utc::now() - Duration::hours(1),
        executed_at: None,
    };
    intents::insert(h.store.pool(), &fresh).await.unwrap();

    let blocked = h
        .engine
        .execute_exit(ExitRequest {
            position_id: position_id.clone(),
            reason: "stop".to_string(),
            force_market: false,
        })
        .await
        .unwrap();
    assert!(!blocked.success);
    assert!(blocked.message.contains("in flight"), "{}", blocked.message);

    // Backdate past the staleness horizon (4h default) and retry.
    intents::delete(h.store.pool(), &fresh.idempotency_key)
        .await
        .unwrap();
    let stale = OrderIntent {
        created_at: Utc::now() - Duration::hours(5),
        ..fresh
    };
    intents::insert(h.store.pool(), &stale).await.unwrap();

    let retried = h
        .engine
        .execute_exit(ExitRequest {
            position_id: position_id.clone(),
            reason: "stop".to_string(),
            force_market: false,
        })
        .await
        .unwrap();
    assert!(retried.success, "{}", retried.message);

    let position = positions::get(h.store.pool(), &position_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(position.status, PositionStatus::Closed);
}

#[tokio::test]
async fn failed_exit_intent_retries_immediately() {
    let h = harness().await;
    let entry = h
        .engine
        .execute_entry_at(entry_request("sig-refail"), mid_session())
        .await
        .unwrap();
    let position_id = entry.position_id.unwrap();

    let failed = OrderIntent {
        idempotency_key: format!("exit-{position_id}"),
        signal_id: "sig-refail".to_string(),
        ticker: "AAPL".to_string(),
        option_symbol: FAR_SYMBOL.to_string(),
        side: OrderSide::Sell,
        quantity: 2,
        limit_price: Some(dec!(2.40)),
        status: IntentStatus::Failed,
        broker_order_id: None,
        reason: "stop | submit failed: network".to_string(),
        created_at: Utc::now() - Duration::minutes(5),
        executed_at: None,
    };
    intents::insert(h.store.pool(), &failed).await.unwrap();

    let outcome = h
        .engine
        .execute_exit(ExitRequest {
            position_id: position_id.clone(),
            reason: "stop".to_string(),
            force_market: false,
        })
        .await
        .unwrap();
    assert!(outcome.success, "{}", outcome.message);
    let intent = intents::get(h.store.pool(), &failed.idempotency_key)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(intent.status, IntentStatus::Executed);
}

#[tokio::test]
async fn consecutive_loss_breaker_blocks_then_clears() {
    let h = harness().await;
    // Three small losses this morning (ET), newest at 10:20.
    for (i, minute) in [0u32, 10, 20].iter().enumerate() {
        let closed_at = Utc.with_ymd_and_hms(2025, 1, 8, 15, *minute, 0).unwrap();
        ledger::insert(
            h.store.pool(),
            &loss_entry(&format!("pos-loss-{i}"), dec!(-50), closed_at),
        )
        .await
        .unwrap();
    }

    let blocked = h
        .engine
        .execute_entry_at(entry_request("sig-streak"), mid_session())
        .await
        .unwrap();
    assert!(!blocked.success);
    assert!(
        blocked.message.contains("consecutive losses"),
        "{}",
        blocked.message
    );

    // 13:00 ET: the 120-minute cooldown from the newest loss has elapsed.
    let later = Utc.with_ymd_and_hms(2025, 1, 8, 18, 0, 0).unwrap();
    let allowed = h
        .engine
        .execute_entry_at(entry_request("sig-streak"), later)
        .await
        .unwrap();
    assert!(allowed.success, "{}", allowed.message);
}

#[tokio::test]
async fn daily_loss_breaker_blocks_entries() {
    let h = harness().await;
    // -$600 on $10k equity breaches the 5% daily limit.
    let closed_at = Utc.with_ymd_and_hms(2025, 1, 8, 15, 0, 0).unwrap();
    ledger::insert(h.store.pool(), &loss_entry("pos-big-loss", dec!(-600), closed_at))
        .await
        .unwrap();

    let outcome = h
        .engine
        .execute_entry_at(entry_request("sig-daily"), mid_session())
        .await
        .unwrap();
    assert!(!outcome.success);
    assert!(outcome.message.contains("Daily loss"), "{}", outcome.message);
    assert!(h.broker.submitted.lock().unwrap().is_empty());
}
