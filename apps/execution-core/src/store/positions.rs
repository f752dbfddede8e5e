//! Position table queries.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteExecutor};

use super::{decimal_col, enum_col, opt_decimal_col, opt_text, text, StoreError};
use crate::models::{GreeksSnapshot, Position, PositionStatus};

fn from_row(row: &SqliteRow) -> Result<Position, StoreError> {
    Ok(Position {
        position_id: row.try_get("position_id")?,
        signal_id: row.try_get("signal_id")?,
        ticker: row.try_get("ticker")?,
        option_symbol: row.try_get("option_symbol")?,
        side: enum_col(row, "side")?,
        strike: decimal_col(row, "strike")?,
        expiration: row.try_get("expiration")?,
        quantity: row.try_get("quantity")?,
        entry_price: decimal_col(row, "entry_price")?,
        entry_notional: decimal_col(row, "entry_notional")?,
        current_price: opt_decimal_col(row, "current_price")?,
        current_notional: opt_decimal_col(row, "current_notional")?,
        pnl_pct: decimal_col(row, "pnl_pct")?,
        pnl_dollars: decimal_col(row, "pnl_dollars")?,
        status: enum_col(row, "status")?,
        greeks: GreeksSnapshot {
            delta: opt_decimal_col(row, "delta")?,
            gamma: opt_decimal_col(row, "gamma")?,
            theta: opt_decimal_col(row, "theta")?,
            vega: opt_decimal_col(row, "vega")?,
            iv: opt_decimal_col(row, "iv")?,
        },
        entry_thesis: row.try_get("entry_thesis")?,
        conviction: row.try_get("conviction")?,
        adopted: row.try_get("adopted")?,
        opened_at: row.try_get("opened_at")?,
        closed_at: row.try_get("closed_at")?,
        last_checked: row.try_get("last_checked")?,
    })
}

/// Insert a new position row.
pub async fn insert(exec: impl SqliteExecutor<'_>, p: &Position) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO positions (
            position_id, signal_id, ticker, option_symbol, side, strike,
            expiration, quantity, entry_price, entry_notional, current_price,
            current_notional, pnl_pct, pnl_dollars, status, delta, gamma,
            theta, vega, iv, entry_thesis, conviction, adopted, opened_at,
            closed_at, last_checked
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&p.position_id)
    .bind(&p.signal_id)
    .bind(&p.ticker)
    .bind(&p.option_symbol)
    .bind(p.side.as_str())
    .bind(text(p.strike))
    .bind(p.expiration)
    .bind(p.quantity)
    .bind(text(p.entry_price))
    .bind(text(p.entry_notional))
    .bind(opt_text(p.current_price))
    .bind(opt_text(p.current_notional))
    .bind(text(p.pnl_pct))
    .bind(text(p.pnl_dollars))
    .bind(p.status.as_str())
    .bind(opt_text(p.greeks.delta))
    .bind(opt_text(p.greeks.gamma))
    .bind(opt_text(p.greeks.theta))
    .bind(opt_text(p.greeks.vega))
    .bind(opt_text(p.greeks.iv))
    .bind(&p.entry_thesis)
    .bind(p.conviction)
    .bind(p.adopted)
    .bind(p.opened_at)
    .bind(p.closed_at)
    .bind(p.last_checked)
    .execute(exec)
    .await?;
    Ok(())
}

/// Fetch one position by id.
pub async fn get(
    exec: impl SqliteExecutor<'_>,
    position_id: &str,
) -> Result<Option<Position>, StoreError> {
    let row = sqlx::query("SELECT * FROM positions WHERE position_id = ?")
        .bind(position_id)
        .fetch_optional(exec)
        .await?;
    row.as_ref().map(from_row).transpose()
}

/// All OPEN positions.
pub async fn open_all(exec: impl SqliteExecutor<'_>) -> Result<Vec<Position>, StoreError> {
    let rows = sqlx::query("SELECT * FROM positions WHERE status = 'OPEN' ORDER BY opened_at")
        .fetch_all(exec)
        .await?;
    rows.iter().map(from_row).collect()
}

/// OPEN position holding `option_symbol`, if any.
pub async fn open_by_symbol(
    exec: impl SqliteExecutor<'_>,
    option_symbol: &str,
) -> Result<Option<Position>, StoreError> {
    let row = sqlx::query("SELECT * FROM positions WHERE status = 'OPEN' AND option_symbol = ?")
        .bind(option_symbol)
        .fetch_optional(exec)
        .await?;
    row.as_ref().map(from_row).transpose()
}

/// Count of OPEN positions.
pub async fn open_count(exec: impl SqliteExecutor<'_>) -> Result<i64, StoreError> {
    Ok(
        sqlx::query_scalar("SELECT COUNT(*) FROM positions WHERE status = 'OPEN'")
            .fetch_one(exec)
            .await?,
    )
}

/// Flip a position to CLOSED.
pub async fn mark_closed(
    exec: impl SqliteExecutor<'_>,
    position_id: &str,
    status: PositionStatus,
    closed_at: DateTime<Utc>,
) -> Result<(), StoreError> {
    sqlx::query("UPDATE positions SET status = ?, closed_at = ? WHERE position_id = ?")
        .bind(status.as_str())
        .bind(closed_at)
        .bind(position_id)
        .execute(exec)
        .await?;
    Ok(())
}

/// Refresh mark-to-market fields on a position.
pub async fn update_market_data(
    exec: impl SqliteExecutor<'_>,
    position_id: &str,
    current_price: Decimal,
    current_notional: Decimal,
    pnl_pct: Decimal,
    pnl_dollars: Decimal,
    checked_at: DateTime<Utc>,
) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE positions
         SET current_price = ?, current_notional = ?, pnl_pct = ?,
             pnl_dollars = ?, last_checked = ?
         WHERE position_id = ?",
    )
    .bind(text(current_price))
    .bind(text(current_notional))
    .bind(text(pnl_pct))
    .bind(text(pnl_dollars))
    .bind(checked_at)
    .bind(position_id)
    .execute(exec)
    .await?;
    Ok(())
}

/// Overwrite entry economics from broker ground truth (drift correction or a
/// late-observed fill).
pub async fn update_entry_fill(
    exec: impl SqliteExecutor<'_>,
    position_id: &str,
    entry_price: Decimal,
    quantity: i64,
    entry_notional: Decimal,
) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE positions
         SET entry_price = ?, quantity = ?, entry_notional = ?
         WHERE position_id = ?",
    )
    .bind(text(entry_price))
    .bind(quantity)
    .bind(text(entry_notional))
    .bind(position_id)
    .execute(exec)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OptionSide;
    use crate::store::Store;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn sample(id: &str) -> Position {
        Position {
            position_id: id.to_string(),
            signal_id: format!("sig-{id}"),
            ticker: "AAPL".into(),
            option_symbol: "AAPL250117C00150000".into(),
            side: OptionSide::Call,
            strike: dec!(150),
            expiration: NaiveDate::from_ymd_opt(2025, 1, 17).unwrap(),
            quantity: 2,
            entry_price: dec!(2.50),
            entry_notional: dec!(500),
            current_price: None,
            current_notional: None,
            pnl_pct: Decimal::ZERO,
            pnl_dollars: Decimal::ZERO,
            status: PositionStatus::Open,
            greeks: GreeksSnapshot {
                delta: Some(dec!(0.45)),
                ..GreeksSnapshot::default()
            },
            entry_thesis: "breakout".into(),
            conviction: 7,
            adopted: false,
            opened_at: Utc::now(),
            closed_at: None,
            last_checked: None,
        }
    }

    #[tokio::test]
    async fn insert_and_read_back() {
        let store = Store::in_memory().await.unwrap();
        insert(store.pool(), &sample("p1")).await.unwrap();

        let got = get(store.pool(), "p1").await.unwrap().unwrap();
        assert_eq!(got.ticker, "AAPL");
        assert_eq!(got.entry_price, dec!(2.50));
        assert_eq!(got.greeks.delta, Some(dec!(0.45)));
        assert_eq!(got.status, PositionStatus::Open);
        assert_eq!(open_count(store.pool()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn mark_closed_removes_from_open_set() {
        let store = Store::in_memory().await.unwrap();
        insert(store.pool(), &sample("p1")).await.unwrap();
        mark_closed(store.pool(), "p1", PositionStatus::Closed, Utc::now())
            .await
            .unwrap();

        assert_eq!(open_count(store.pool()).await.unwrap(), 0);
        let got = get(store.pool(), "p1").await.unwrap().unwrap();
        assert_eq!(got.status, PositionStatus::Closed);
        assert!(got.closed_at.is_some());
    }

    #[tokio::test]
    async fn market_data_refresh_round_trips() {
        let store = Store::in_memory().await.unwrap();
        insert(store.pool(), &sample("p1")).await.unwrap();
        update_market_data(
            store.pool(),
            "p1",
            dec!(3.00),
            dec!(600),
            dec!(0.2),
            dec!(100),
            Utc::now(),
        )
        .await
        .unwrap();

        let got = get(store.pool(), "p1").await.unwrap().unwrap();
        assert_eq!(got.current_price, Some(dec!(3.00)));
        assert_eq!(got.pnl_dollars, dec!(100));
        assert!(got.last_checked.is_some());
    }

    #[tokio::test]
    async fn lookup_by_symbol_only_sees_open() {
        let store = Store::in_memory().await.unwrap();
        insert(store.pool(), &sample("p1")).await.unwrap();
        assert!(open_by_symbol(store.pool(), "AAPL250117C00150000")
            .await
            .unwrap()
            .is_some());
        mark_closed(store.pool(), "p1", PositionStatus::Closed, Utc::now())
            .await
            .unwrap();
        assert!(open_by_symbol(store.pool(), "AAPL250117C00150000")
            .await
            .unwrap()
            .is_none());
    }
}
