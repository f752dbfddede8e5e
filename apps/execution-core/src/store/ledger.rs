//! Trade ledger queries. Rows are insert-only.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteExecutor};

use super::{decimal_col, enum_col, text, StoreError};
use crate::models::TradeLedgerEntry;

fn from_row(row: &SqliteRow) -> Result<TradeLedgerEntry, StoreError> {
    Ok(TradeLedgerEntry {
        position_id: row.try_get("position_id")?,
        ticker: row.try_get("ticker")?,
        side: enum_col(row, "side")?,
        entry_price: decimal_col(row, "entry_price")?,
        exit_price: decimal_col(row, "exit_price")?,
        quantity: row.try_get("quantity")?,
        pnl_dollars: decimal_col(row, "pnl_dollars")?,
        pnl_pct: decimal_col(row, "pnl_pct")?,
        hold_duration_hours: row.try_get("hold_duration_hours")?,
        entry_thesis: row.try_get("entry_thesis")?,
        exit_reason: row.try_get("exit_reason")?,
        opened_at: row.try_get("opened_at")?,
        closed_at: row.try_get("closed_at")?,
    })
}

/// Append a round-trip record.
pub async fn insert(
    exec: impl SqliteExecutor<'_>,
    e: &TradeLedgerEntry,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO trade_ledger (
            position_id, ticker, side, entry_price, exit_price, quantity,
            pnl_dollars, pnl_pct, hold_duration_hours, entry_thesis,
            exit_reason, opened_at, closed_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&e.position_id)
    .bind(&e.ticker)
    .bind(e.side.as_str())
    .bind(text(e.entry_price))
    .bind(text(e.exit_price))
    .bind(e.quantity)
    .bind(text(e.pnl_dollars))
    .bind(text(e.pnl_pct))
    .bind(e.hold_duration_hours)
    .bind(&e.entry_thesis)
    .bind(&e.exit_reason)
    .bind(e.opened_at)
    .bind(e.closed_at)
    .execute(exec)
    .await?;
    Ok(())
}

/// All round trips closed at or after `cutoff`.
pub async fn closed_since(
    exec: impl SqliteExecutor<'_>,
    cutoff: DateTime<Utc>,
) -> Result<Vec<TradeLedgerEntry>, StoreError> {
    let rows = sqlx::query("SELECT * FROM trade_ledger WHERE closed_at >= ? ORDER BY closed_at")
        .bind(cutoff)
        .fetch_all(exec)
        .await?;
    rows.iter().map(from_row).collect()
}

/// Most recent round trips, newest first.
pub async fn recent(
    exec: impl SqliteExecutor<'_>,
    limit: u32,
) -> Result<Vec<TradeLedgerEntry>, StoreError> {
    let rows = sqlx::query("SELECT * FROM trade_ledger ORDER BY closed_at DESC LIMIT ?")
        .bind(limit)
        .fetch_all(exec)
        .await?;
    rows.iter().map(from_row).collect()
}

/// Whether any ledger row exists for `position_id`.
pub async fn exists_for_position(
    exec: impl SqliteExecutor<'_>,
    position_id: &str,
) -> Result<bool, StoreError> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM trade_ledger WHERE position_id = ?")
            .bind(position_id)
            .fetch_one(exec)
            .await?;
    Ok(count > 0)
}
