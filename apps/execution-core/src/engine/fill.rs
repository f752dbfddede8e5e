//! Fill confirmation polling.
//!
//! Polls one order until it fills, dies, or the window elapses. On timeout
//! the last observed report is returned unchanged; the order is deliberately
//! NOT cancelled, since a cancel can race an in-flight fill at the exchange.
//! The reconciler owns whatever happens after the window.

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::broker::{BrokerOrderState, BrokerPort, OrderStatusReport};

/// Poll `order_id` every `interval` until terminal or `timeout` elapses.
pub async fn wait_for_fill(
    broker: &dyn BrokerPort,
    order_id: &str,
    timeout: Duration,
    interval: Duration,
) -> OrderStatusReport {
    let deadline = Instant::now() + timeout;
    let mut last = OrderStatusReport {
        order_id: order_id.to_string(),
        state: BrokerOrderState::Unknown,
        filled_qty: 0,
        filled_avg_price: None,
    };

    loop {
        match broker.get_order_status(order_id).await {
            Ok(report) => {
                debug!(
                    order_id,
                    state = ?report.state,
                    filled_qty = report.filled_qty,
                    "fill poll"
                );
                if report.is_filled() || report.state.is_dead() {
                    return report;
                }
                last = report;
            }
            // Transient poll failures keep the last known state; the window
            // still bounds total wait time.
            Err(e) => warn!(order_id, error = %e, "fill poll failed"),
        }

        if Instant::now() + interval > deadline {
            debug!(order_id, state = ?last.state, "fill window elapsed");
            return last;
        }
        tokio::time::sleep(interval).await;
    }
}
