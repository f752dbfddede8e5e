//! Alpaca implementation of [`BrokerPort`].

mod api_types;
mod http_client;

pub use http_client::AlpacaHttpClient;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::debug;

use api_types::{
    AlpacaAccountResponse, AlpacaCalendarDay, AlpacaLatestQuotesResponse, AlpacaOrderRequest,
    AlpacaOrderResponse, AlpacaPositionResponse,
};

use super::{
    AccountSnapshot, BrokerApiError, BrokerOrderState, BrokerPort, BrokerPosition, OptionQuote,
    OrderStatusReport,
};
use crate::config::AlpacaConfig;
use crate::models::{parse_occ_symbol, OrderSide};

/// Alpaca REST broker adapter.
#[derive(Debug, Clone)]
pub struct AlpacaBroker {
    client: AlpacaHttpClient,
}

impl AlpacaBroker {
    /// Build an adapter from broker config.
    pub fn new(config: AlpacaConfig) -> Result<Self, BrokerApiError> {
        Ok(Self {
            client: AlpacaHttpClient::new(config)?,
        })
    }

    async fn submit(&self, request: &AlpacaOrderRequest) -> Result<String, BrokerApiError> {
        debug!(
            symbol = %request.symbol,
            side = %request.side,
            qty = %request.qty,
            order_type = %request.order_type,
            "submitting order"
        );
        let resp: AlpacaOrderResponse = self.client.post_trading("/v2/orders", request).await?;
        Ok(resp.id)
    }
}

fn parse_decimal(raw: &str, field: &str) -> Result<Decimal, BrokerApiError> {
    Decimal::from_str(raw)
        .map_err(|e| BrokerApiError::Decode(format!("{field}: bad decimal {raw:?}: {e}")))
}

fn to_status_report(resp: &AlpacaOrderResponse) -> Result<OrderStatusReport, BrokerApiError> {
    let filled_qty = match resp.filled_qty.as_deref() {
        Some(raw) => parse_decimal(raw, "filled_qty")?
            .trunc()
            .to_i64()
            .ok_or_else(|| BrokerApiError::Decode(format!("filled_qty out of range: {raw}")))?,
        None => 0,
    };
    let filled_avg_price = resp
        .filled_avg_price
        .as_deref()
        .map(|raw| parse_decimal(raw, "filled_avg_price"))
        .transpose()?;
    Ok(OrderStatusReport {
        order_id: resp.id.clone(),
        state: BrokerOrderState::parse(&resp.status),
        filled_qty,
        filled_avg_price,
    })
}

#[async_trait]
impl BrokerPort for AlpacaBroker {
    async fn submit_limit_order(
        &self,
        option_symbol: &str,
        side: OrderSide,
        quantity: i64,
        limit_price: Decimal,
    ) -> Result<String, BrokerApiError> {
        self.submit(&AlpacaOrderRequest {
            symbol: option_symbol.to_string(),
            qty: quantity.to_string(),
            side: side.as_str().to_ascii_lowercase(),
            order_type: "limit".to_string(),
            time_in_force: "day".to_string(),
            limit_price: Some(limit_price.to_string()),
        })
        .await
    }

    async fn submit_market_order(
        &self,
        option_symbol: &str,
        side: OrderSide,
        quantity: i64,
    ) -> Result<String, BrokerApiError> {
        self.submit(&AlpacaOrderRequest {
            symbol: option_symbol.to_string(),
            qty: quantity.to_string(),
            side: side.as_str().to_ascii_lowercase(),
            order_type: "market".to_string(),
            time_in_force: "day".to_string(),
            limit_price: None,
        })
        .await
    }

    async fn get_order_status(&self, order_id: &str) -> Result<OrderStatusReport, BrokerApiError> {
        let resp: AlpacaOrderResponse = self
            .client
            .get_trading(&format!("/v2/orders/{order_id}"))
            .await?;
        to_status_report(&resp)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), BrokerApiError> {
        self.client
            .delete_trading(&format!("/v2/orders/{order_id}"))
            .await
    }

    async fn get_account(&self) -> Result<AccountSnapshot, BrokerApiError> {
        let resp: AlpacaAccountResponse = self.client.get_trading("/v2/account").await?;
        Ok(AccountSnapshot {
            equity: parse_decimal(&resp.equity, "equity")?,
            cash: parse_decimal(&resp.cash, "cash")?,
            buying_power: parse_decimal(&resp.buying_power, "buying_power")?,
        })
    }

    async fn get_open_positions(&self) -> Result<Vec<BrokerPosition>, BrokerApiError> {
        let resp: Vec<AlpacaPositionResponse> = self.client.get_trading("/v2/positions").await?;
        let mut positions = Vec::new();
        for p in resp {
            // Options only; equity legs and unparseable symbols are skipped.
            let is_option = p.asset_class.as_deref() == Some("us_option")
                || parse_occ_symbol(&p.symbol).is_some();
            if !is_option {
                continue;
            }
            let quantity = parse_decimal(&p.qty, "qty")?
                .trunc()
                .to_i64()
                .ok_or_else(|| BrokerApiError::Decode(format!("qty out of range: {}", p.qty)))?;
            positions.push(BrokerPosition {
                option_symbol: p.symbol.clone(),
                quantity,
                avg_entry_price: parse_decimal(&p.avg_entry_price, "avg_entry_price")?,
                current_price: p
                    .current_price
                    .as_deref()
                    .map(|raw| parse_decimal(raw, "current_price"))
                    .transpose()?,
                market_value: p
                    .market_value
                    .as_deref()
                    .map(|raw| parse_decimal(raw, "market_value"))
                    .transpose()?,
            });
        }
        Ok(positions)
    }

    async fn get_option_quote(&self, option_symbol: &str) -> Result<OptionQuote, BrokerApiError> {
        let resp: AlpacaLatestQuotesResponse = self
            .client
            .get_data(&format!(
                "/v1beta1/options/quotes/latest?symbols={option_symbol}"
            ))
            .await?;
        let Some(q) = resp.quotes.get(option_symbol) else {
            return Ok(OptionQuote::default());
        };
        Ok(OptionQuote {
            bid: q.bid_price,
            ask: q.ask_price,
        })
    }

    async fn is_market_open_today(&self) -> Result<bool, BrokerApiError> {
        let today = Utc::now().date_naive();
        let days: Vec<AlpacaCalendarDay> = self
            .client
            .get_trading(&format!("/v2/calendar?start={today}&end={today}"))
            .await?;
        Ok(days.iter().any(|d| d.date == today.to_string()))
    }
}
