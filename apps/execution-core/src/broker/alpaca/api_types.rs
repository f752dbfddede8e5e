//! Alpaca REST API request and response shapes.
//!
//! These map the wire format only; conversion to domain types happens in the
//! adapter. Alpaca encodes most numbers as strings on the trading API and as
//! JSON numbers on the data API.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Order creation request body (`POST /v2/orders`).
#[derive(Debug, Clone, Serialize)]
pub struct AlpacaOrderRequest {
    /// OCC option symbol.
    pub symbol: String,
    /// Quantity as a string.
    pub qty: String,
    /// "buy" or "sell".
    pub side: String,
    /// "limit" or "market".
    #[serde(rename = "type")]
    pub order_type: String,
    /// Always "day" for options.
    pub time_in_force: String,
    /// Limit price as a string, for limit orders.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<String>,
}

/// Order response (`POST /v2/orders`, `GET /v2/orders/{id}`).
#[derive(Debug, Clone, Deserialize)]
pub struct AlpacaOrderResponse {
    /// Broker order id.
    pub id: String,
    /// Raw status string.
    pub status: String,
    /// Filled quantity as a string.
    #[serde(default)]
    pub filled_qty: Option<String>,
    /// Average fill price as a string.
    #[serde(default)]
    pub filled_avg_price: Option<String>,
}

/// Account response (`GET /v2/account`).
#[derive(Debug, Clone, Deserialize)]
pub struct AlpacaAccountResponse {
    /// Equity as a string.
    pub equity: String,
    /// Cash as a string.
    pub cash: String,
    /// Buying power as a string.
    pub buying_power: String,
}

/// Position response (`GET /v2/positions`).
#[derive(Debug, Clone, Deserialize)]
pub struct AlpacaPositionResponse {
    /// Symbol (OCC format for options).
    pub symbol: String,
    /// Quantity as a string.
    pub qty: String,
    /// Asset class; options report `us_option`.
    #[serde(default)]
    pub asset_class: Option<String>,
    /// Average entry price as a string.
    pub avg_entry_price: String,
    /// Current price as a string, when available.
    #[serde(default)]
    pub current_price: Option<String>,
    /// Market value as a string, when available.
    #[serde(default)]
    pub market_value: Option<String>,
}

/// One trading day (`GET /v2/calendar`).
#[derive(Debug, Clone, Deserialize)]
pub struct AlpacaCalendarDay {
    /// Session date, `YYYY-MM-DD`.
    pub date: String,
    /// Session open, `HH:MM`.
    pub open: String,
    /// Session close, `HH:MM`.
    pub close: String,
}

/// Latest option quotes (`GET /v1beta1/options/quotes/latest`).
#[derive(Debug, Clone, Deserialize)]
pub struct AlpacaLatestQuotesResponse {
    /// Quotes keyed by symbol.
    #[serde(default)]
    pub quotes: HashMap<String, AlpacaOptionQuote>,
}

/// One option NBBO quote. The data API uses JSON numbers here.
#[derive(Debug, Clone, Deserialize)]
pub struct AlpacaOptionQuote {
    /// Bid price.
    #[serde(default, rename = "bp")]
    pub bid_price: Option<Decimal>,
    /// Ask price.
    #[serde(default, rename = "ap")]
    pub ask_price: Option<Decimal>,
}

/// Error body returned on non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct AlpacaErrorResponse {
    /// Alpaca error code.
    #[serde(default)]
    pub code: Option<i64>,
    /// Error message.
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn order_request_omits_absent_limit_price() {
        let req = AlpacaOrderRequest {
            symbol: "AAPL250117C00150000".into(),
            qty: "2".into(),
            side: "buy".into(),
            order_type: "market".into(),
            time_in_force: "day".into(),
            limit_price: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("limit_price").is_none());
        assert_eq!(json["type"], "market");
    }

    #[test]
    fn quote_response_parses_numeric_prices() {
        let raw = r#"{"quotes":{"AAPL250117C00150000":{"bp":1.2,"ap":1.3,"bs":10}}}"#;
        let parsed: AlpacaLatestQuotesResponse = serde_json::from_str(raw).unwrap();
        let q = &parsed.quotes["AAPL250117C00150000"];
        assert_eq!(q.bid_price, Some(dec!(1.2)));
        assert_eq!(q.ask_price, Some(dec!(1.3)));
    }

    #[test]
    fn order_response_tolerates_missing_fill_fields() {
        let raw = r#"{"id":"bo-1","status":"new"}"#;
        let parsed: AlpacaOrderResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.id, "bo-1");
        assert!(parsed.filled_avg_price.is_none());
    }
}
