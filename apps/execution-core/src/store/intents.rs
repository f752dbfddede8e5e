//! Order intent table queries (the idempotency ledger).

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteExecutor};

use super::{enum_col, opt_decimal_col, opt_text, StoreError};
use crate::models::{IntentStatus, OrderIntent};

fn from_row(row: &SqliteRow) -> Result<OrderIntent, StoreError> {
    Ok(OrderIntent {
        idempotency_key: row.try_get("idempotency_key")?,
        signal_id: row.try_get("signal_id")?,
        ticker: row.try_get("ticker")?,
        option_symbol: row.try_get("option_symbol")?,
        side: enum_col(row, "side")?,
        quantity: row.try_get("quantity")?,
        limit_price: opt_decimal_col(row, "limit_price")?,
        status: enum_col(row, "status")?,
        broker_order_id: row.try_get("broker_order_id")?,
        reason: row.try_get("reason")?,
        created_at: row.try_get("created_at")?,
        executed_at: row.try_get("executed_at")?,
    })
}

/// Insert a fresh intent. Fails on a duplicate idempotency key.
pub async fn insert(exec: impl SqliteExecutor<'_>, i: &OrderIntent) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO order_intents (
            idempotency_key, signal_id, ticker, option_symbol, side, quantity,
            limit_price, status, broker_order_id, reason, created_at, executed_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&i.idempotency_key)
    .bind(&i.signal_id)
    .bind(&i.ticker)
    .bind(&i.option_symbol)
    .bind(i.side.as_str())
    .bind(i.quantity)
    .bind(opt_text(i.limit_price))
    .bind(i.status.as_str())
    .bind(&i.broker_order_id)
    .bind(&i.reason)
    .bind(i.created_at)
    .bind(i.executed_at)
    .execute(exec)
    .await?;
    Ok(())
}

/// Fetch an intent by key.
pub async fn get(
    exec: impl SqliteExecutor<'_>,
    key: &str,
) -> Result<Option<OrderIntent>, StoreError> {
    let row = sqlx::query("SELECT * FROM order_intents WHERE idempotency_key = ?")
        .bind(key)
        .fetch_optional(exec)
        .await?;
    row.as_ref().map(from_row).transpose()
}

/// Delete an intent row, freeing its key for a retry.
pub async fn delete(exec: impl SqliteExecutor<'_>, key: &str) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM order_intents WHERE idempotency_key = ?")
        .bind(key)
        .execute(exec)
        .await?;
    Ok(())
}

/// Record the broker order id on a PENDING intent.
pub async fn set_broker_order(
    exec: impl SqliteExecutor<'_>,
    key: &str,
    broker_order_id: &str,
) -> Result<(), StoreError> {
    sqlx::query("UPDATE order_intents SET broker_order_id = ? WHERE idempotency_key = ?")
        .bind(broker_order_id)
        .bind(key)
        .execute(exec)
        .await?;
    Ok(())
}

/// Move an intent to a new status, stamping `executed_at` for terminal states.
pub async fn set_status(
    exec: impl SqliteExecutor<'_>,
    key: &str,
    status: IntentStatus,
    at: DateTime<Utc>,
) -> Result<(), StoreError> {
    let executed_at = (status != IntentStatus::Pending).then_some(at);
    sqlx::query("UPDATE order_intents SET status = ?, executed_at = ? WHERE idempotency_key = ?")
        .bind(status.as_str())
        .bind(executed_at)
        .bind(key)
        .execute(exec)
        .await?;
    Ok(())
}

/// Mark an intent FAILED with a reason appended for the operator.
pub async fn mark_failed(
    exec: impl SqliteExecutor<'_>,
    key: &str,
    detail: &str,
    at: DateTime<Utc>,
) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE order_intents
         SET status = 'FAILED', reason = reason || ' | ' || ?, executed_at = ?
         WHERE idempotency_key = ?",
    )
    .bind(detail)
    .bind(at)
    .bind(key)
    .execute(exec)
    .await?;
    Ok(())
}

/// Count of EXECUTED entry intents since `cutoff` (the daily execution cap).
pub async fn executed_entries_since(
    exec: impl SqliteExecutor<'_>,
    cutoff: DateTime<Utc>,
) -> Result<i64, StoreError> {
    Ok(sqlx::query_scalar(
        "SELECT COUNT(*) FROM order_intents
         WHERE idempotency_key LIKE 'entry-%'
           AND status = 'EXECUTED'
           AND executed_at >= ?",
    )
    .bind(cutoff)
    .fetch_one(exec)
    .await?)
}
