//! Operator notifications. Strictly best-effort: a failed send is logged
//! and forgotten, never an error, and always happens after the trade's
//! transaction has committed.

mod telegram;

pub use telegram::TelegramNotifier;

use async_trait::async_trait;
use rust_decimal::Decimal;

/// Notification seam. `send` returns whether delivery succeeded; callers
/// ignore the result beyond logging.
#[async_trait]
pub trait NotifierPort: Send + Sync {
    /// Deliver one message.
    async fn send(&self, text: &str) -> bool;

    /// Announce a confirmed entry fill.
    async fn notify_entry(
        &self,
        ticker: &str,
        option_symbol: &str,
        quantity: i64,
        fill_price: Decimal,
        thesis: &str,
    ) -> bool {
        let text = format!(
            "ENTRY {ticker} {option_symbol}\n{quantity} contracts @ {fill_price}\n{thesis}"
        );
        self.send(&text).await
    }

    /// Announce a confirmed exit fill with realized P&L.
    async fn notify_exit(
        &self,
        ticker: &str,
        option_symbol: &str,
        quantity: i64,
        fill_price: Decimal,
        pnl_dollars: Decimal,
        pnl_pct: Decimal,
        reason: &str,
    ) -> bool {
        let pct = pnl_pct * Decimal::ONE_HUNDRED;
        let text = format!(
            "EXIT {ticker} {option_symbol}\n{quantity} contracts @ {fill_price}\nP&L: ${pnl_dollars} ({pct:.1}%)\n{reason}"
        );
        self.send(&text).await
    }

    /// Announce an operational problem needing operator eyes.
    async fn notify_error(&self, context: &str, detail: &str) -> bool {
        let text = format!("ERROR {context}\n{detail}");
        self.send(&text).await
    }
}

/// Discards everything. Used when notifications are unconfigured and in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpNotifier;

#[async_trait]
impl NotifierPort for NoOpNotifier {
    async fn send(&self, _text: &str) -> bool {
        true
    }
}
