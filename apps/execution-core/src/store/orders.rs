//! Broker order mirror table queries.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteExecutor};

use super::{enum_col, opt_decimal_col, opt_text, StoreError};
use crate::models::{BrokerOrder, OrderStatus};

fn from_row(row: &SqliteRow) -> Result<BrokerOrder, StoreError> {
    Ok(BrokerOrder {
        broker_order_id: row.try_get("broker_order_id")?,
        intent_key: row.try_get("intent_key")?,
        ticker: row.try_get("ticker")?,
        option_symbol: row.try_get("option_symbol")?,
        side: enum_col(row, "side")?,
        quantity: row.try_get("quantity")?,
        order_type: enum_col(row, "order_type")?,
        limit_price: opt_decimal_col(row, "limit_price")?,
        filled_qty: row.try_get("filled_qty")?,
        filled_price: opt_decimal_col(row, "filled_price")?,
        status: enum_col(row, "status")?,
        submitted_at: row.try_get("submitted_at")?,
        filled_at: row.try_get("filled_at")?,
        error: row.try_get("error")?,
    })
}

/// Insert a new order mirror row.
pub async fn insert(exec: impl SqliteExecutor<'_>, o: &BrokerOrder) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO broker_orders (
            broker_order_id, intent_key, ticker, option_symbol, side, quantity,
            order_type, limit_price, filled_qty, filled_price, status,
            submitted_at, filled_at, error
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&o.broker_order_id)
    .bind(&o.intent_key)
    .bind(&o.ticker)
    .bind(&o.option_symbol)
    .bind(o.side.as_str())
    .bind(o.quantity)
    .bind(o.order_type.as_str())
    .bind(opt_text(o.limit_price))
    .bind(o.filled_qty)
    .bind(opt_text(o.filled_price))
    .bind(o.status.as_str())
    .bind(o.submitted_at)
    .bind(o.filled_at)
    .bind(&o.error)
    .execute(exec)
    .await?;
    Ok(())
}

/// Fetch one order by broker id.
pub async fn get(
    exec: impl SqliteExecutor<'_>,
    broker_order_id: &str,
) -> Result<Option<BrokerOrder>, StoreError> {
    let row = sqlx::query("SELECT * FROM broker_orders WHERE broker_order_id = ?")
        .bind(broker_order_id)
        .fetch_optional(exec)
        .await?;
    row.as_ref().map(from_row).transpose()
}

/// Orders still live at the broker (PENDING, SUBMITTED or PARTIAL).
pub async fn active(exec: impl SqliteExecutor<'_>) -> Result<Vec<BrokerOrder>, StoreError> {
    let rows = sqlx::query(
        "SELECT * FROM broker_orders
         WHERE status IN ('PENDING', 'SUBMITTED', 'PARTIAL')
         ORDER BY submitted_at",
    )
    .fetch_all(exec)
    .await?;
    rows.iter().map(from_row).collect()
}

/// Record observed fill progress and state.
pub async fn update_fill(
    exec: impl SqliteExecutor<'_>,
    broker_order_id: &str,
    status: OrderStatus,
    filled_qty: i64,
    filled_price: Option<Decimal>,
    filled_at: Option<DateTime<Utc>>,
) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE broker_orders
         SET status = ?, filled_qty = ?, filled_price = ?, filled_at = ?
         WHERE broker_order_id = ?",
    )
    .bind(status.as_str())
    .bind(filled_qty)
    .bind(opt_text(filled_price))
    .bind(filled_at)
    .bind(broker_order_id)
    .execute(exec)
    .await?;
    Ok(())
}

/// Mark an order dead at the broker (cancelled, expired or rejected).
pub async fn mark_cancelled(
    exec: impl SqliteExecutor<'_>,
    broker_order_id: &str,
    detail: &str,
) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE broker_orders SET status = 'CANCELLED', error = ? WHERE broker_order_id = ?",
    )
    .bind(detail)
    .bind(broker_order_id)
    .execute(exec)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderSide, OrderType};
    use crate::store::Store;
    use rust_decimal_macros::dec;

    fn sample(id: &str, status: OrderStatus) -> BrokerOrder {
        BrokerOrder {
            broker_order_id: id.to_string(),
            intent_key: "entry-sig-1".into(),
            ticker: "AAPL".into(),
            option_symbol: "AAPL250117C00150000".into(),
            side: OrderSide::Buy,
            quantity: 2,
            order_type: OrderType::Limit,
            limit_price: Some(dec!(2.50)),
            filled_qty: 0,
            filled_price: None,
            status,
            submitted_at: Utc::now(),
            filled_at: None,
            error: None,
        }
    }

    #[tokio::test]
    async fn active_filter_excludes_terminal_orders() {
        let store = Store::in_memory().await.unwrap();
        insert(store.pool(), &sample("bo-1", OrderStatus::Submitted))
            .await
            .unwrap();
        insert(store.pool(), &sample("bo-2", OrderStatus::Partial))
            .await
            .unwrap();
        insert(store.pool(), &sample("bo-3", OrderStatus::Filled))
            .await
            .unwrap();
        insert(store.pool(), &sample("bo-4", OrderStatus::Cancelled))
            .await
            .unwrap();

        let live = active(store.pool()).await.unwrap();
        let ids: Vec<&str> = live.iter().map(|o| o.broker_order_id.as_str()).collect();
        assert_eq!(ids, vec!["bo-1", "bo-2"]);
    }

    #[tokio::test]
    async fn fill_update_round_trips() {
        let store = Store::in_memory().await.unwrap();
        insert(store.pool(), &sample("bo-1", OrderStatus::Submitted))
            .await
            .unwrap();
        update_fill(
            store.pool(),
            "bo-1",
            OrderStatus::Filled,
            2,
            Some(dec!(2.45)),
            Some(Utc::now()),
        )
        .await
        .unwrap();

        let got = get(store.pool(), "bo-1").await.unwrap().unwrap();
        assert_eq!(got.status, OrderStatus::Filled);
        assert_eq!(got.filled_qty, 2);
        assert_eq!(got.filled_price, Some(dec!(2.45)));
    }

    #[tokio::test]
    async fn cancelled_orders_keep_the_detail() {
        let store = Store::in_memory().await.unwrap();
        insert(store.pool(), &sample("bo-1", OrderStatus::Submitted))
            .await
            .unwrap();
        mark_cancelled(store.pool(), "bo-1", "expired at broker")
            .await
            .unwrap();

        let got = get(store.pool(), "bo-1").await.unwrap().unwrap();
        assert_eq!(got.status, OrderStatus::Cancelled);
        assert_eq!(got.error.as_deref(), Some("expired at broker"));
    }
}
