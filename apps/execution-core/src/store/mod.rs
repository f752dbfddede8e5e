//! SQLite persistence for positions, intents, orders and the trade ledger.
//!
//! The [`Store`] owns a connection pool and the schema. Query functions live
//! in per-table submodules and take any [`sqlx::SqliteExecutor`], so the same
//! function runs against the pool for standalone reads and against an open
//! transaction when it is part of a multi-step flow:
//!
//! ```ignore
//! let open = store::positions::open_all(store.pool()).await?;
//! let mut tx = store.begin().await?;
//! store::intents::insert(&mut *tx, &intent).await?;
//! tx.commit().await?;
//! ```
//!
//! Money and price columns are TEXT holding canonical `rust_decimal`
//! renderings; timestamps are RFC 3339 TEXT via sqlx's chrono support.

pub mod intents;
pub mod ledger;
pub mod orders;
pub mod positions;

use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, Transaction};
use std::str::FromStr;

use crate::models::ParseEnumError;

/// Persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying database failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored value could not be interpreted (bad enum string, bad decimal).
    #[error("integrity error: {0}")]
    Integrity(String),
}

impl From<ParseEnumError> for StoreError {
    fn from(e: ParseEnumError) -> Self {
        Self::Integrity(e.to_string())
    }
}

/// Handle to the SQLite store.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if missing) the database at `path` and apply the schema.
    ///
    /// `:memory:` opens an ephemeral single-connection store, used by tests.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let pool = if path == ":memory:" {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?)
                .await?
        } else {
            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .foreign_keys(true);
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Ephemeral in-memory store.
    pub async fn in_memory() -> Result<Self, StoreError> {
        Self::open(":memory:").await
    }

    /// Pool handle for standalone queries.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Begin a transaction. All multi-step mutations run inside one and
    /// commit exactly once at the end of the flow.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, StoreError> {
        Ok(self.pool.begin().await?)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        // Multi-statement DDL; raw_sql runs it unprepared.
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }
}

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS positions (
    position_id     TEXT PRIMARY KEY,
    signal_id       TEXT NOT NULL,
    ticker          TEXT NOT NULL,
    option_symbol   TEXT NOT NULL,
    side            TEXT NOT NULL,
    strike          TEXT NOT NULL,
    expiration      TEXT NOT NULL,
    quantity        INTEGER NOT NULL,
    entry_price     TEXT NOT NULL,
    entry_notional  TEXT NOT NULL,
    current_price   TEXT,
    current_notional TEXT,
    pnl_pct         TEXT NOT NULL,
    pnl_dollars     TEXT NOT NULL,
    status          TEXT NOT NULL,
    delta           TEXT,
    gamma           TEXT,
    theta           TEXT,
    vega            TEXT,
    iv              TEXT,
    entry_thesis    TEXT NOT NULL,
    conviction      INTEGER NOT NULL,
    adopted         INTEGER NOT NULL DEFAULT 0,
    opened_at       TEXT NOT NULL,
    closed_at       TEXT,
    last_checked    TEXT
);
CREATE INDEX IF NOT EXISTS idx_positions_status ON positions(status);
CREATE INDEX IF NOT EXISTS idx_positions_ticker ON positions(ticker);

CREATE TABLE IF NOT EXISTS order_intents (
    idempotency_key TEXT PRIMARY KEY,
    signal_id       TEXT NOT NULL,
    ticker          TEXT NOT NULL,
    option_symbol   TEXT NOT NULL,
    side            TEXT NOT NULL,
    quantity        INTEGER NOT NULL,
    limit_price     TEXT,
    status          TEXT NOT NULL,
    broker_order_id TEXT,
    reason          TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    executed_at     TEXT
);
CREATE INDEX IF NOT EXISTS idx_intents_status ON order_intents(status);

CREATE TABLE IF NOT EXISTS broker_orders (
    broker_order_id TEXT PRIMARY KEY,
    intent_key      TEXT NOT NULL,
    ticker          TEXT NOT NULL,
    option_symbol   TEXT NOT NULL,
    side            TEXT NOT NULL,
    quantity        INTEGER NOT NULL,
    order_type      TEXT NOT NULL,
    limit_price     TEXT,
    filled_qty      INTEGER NOT NULL DEFAULT 0,
    filled_price    TEXT,
    status          TEXT NOT NULL,
    submitted_at    TEXT NOT NULL,
    filled_at       TEXT,
    error           TEXT
);
CREATE INDEX IF NOT EXISTS idx_broker_orders_status ON broker_orders(status);

CREATE TABLE IF NOT EXISTS trade_ledger (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    position_id     TEXT NOT NULL,
    ticker          TEXT NOT NULL,
    side            TEXT NOT NULL,
    entry_price     TEXT NOT NULL,
    exit_price      TEXT NOT NULL,
    quantity        INTEGER NOT NULL,
    pnl_dollars     TEXT NOT NULL,
    pnl_pct         TEXT NOT NULL,
    hold_duration_hours REAL NOT NULL,
    entry_thesis    TEXT NOT NULL,
    exit_reason     TEXT NOT NULL,
    opened_at       TEXT NOT NULL,
    closed_at       TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_ledger_closed_at ON trade_ledger(closed_at);
";

// ============================================================================
// Row conversion helpers
// ============================================================================

pub(crate) fn decimal_col(row: &SqliteRow, col: &str) -> Result<Decimal, StoreError> {
    let raw: String = row.try_get(col)?;
    Decimal::from_str(&raw)
        .map_err(|e| StoreError::Integrity(format!("column {col}: bad decimal {raw:?}: {e}")))
}

pub(crate) fn opt_decimal_col(row: &SqliteRow, col: &str) -> Result<Option<Decimal>, StoreError> {
    let raw: Option<String> = row.try_get(col)?;
    raw.map(|s| {
        Decimal::from_str(&s)
            .map_err(|e| StoreError::Integrity(format!("column {col}: bad decimal {s:?}: {e}")))
    })
    .transpose()
}

pub(crate) fn enum_col<T>(row: &SqliteRow, col: &str) -> Result<T, StoreError>
where
    T: FromStr<Err = ParseEnumError>,
{
    let raw: String = row.try_get(col)?;
    Ok(raw.parse()?)
}

pub(crate) fn text(d: Decimal) -> String {
    d.to_string()
}

pub(crate) fn opt_text(d: Option<Decimal>) -> Option<String> {
    d.map(|v| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrate_is_idempotent() {
        let store = Store::in_memory().await.unwrap();
        store.migrate().await.unwrap();
        store.migrate().await.unwrap();
    }

    #[tokio::test]
    async fn file_backed_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let path = path.to_str().unwrap();

        let store = Store::open(path).await.unwrap();
        sqlx::query("INSERT INTO order_intents (
                idempotency_key, signal_id, ticker, option_symbol, side,
                quantity, status, reason, created_at
            ) VALUES ('entry-x', 's', 'AAPL', 'AAPL250117C00150000', 'BUY',
                1, 'PENDING', 'r', '2025-01-08T16:00:00Z')")
            .execute(store.pool())
            .await
            .unwrap();
        drop(store);

        let reopened = Store::open(path).await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM order_intents")
            .fetch_one(reopened.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
