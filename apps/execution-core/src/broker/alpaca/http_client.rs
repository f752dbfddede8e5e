//! HTTP transport for the Alpaca REST APIs.
//!
//! One retry loop covers every call: rate limits honor Retry-After, 5xx and
//! transport errors back off exponentially, everything else returns
//! immediately. Callers see typed [`BrokerApiError`] values only.

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::api_types::AlpacaErrorResponse;
use crate::broker::retry::delay_for_attempt;
use crate::broker::BrokerApiError;
use crate::config::AlpacaConfig;

const KEY_HEADER: &str = "APCA-API-KEY-ID";
const SECRET_HEADER: &str = "APCA-API-SECRET-KEY";

/// Thin authenticated client over the trading and data hosts.
#[derive(Debug, Clone)]
pub struct AlpacaHttpClient {
    http: reqwest::Client,
    config: AlpacaConfig,
}

impl AlpacaHttpClient {
    /// Build a client from config. Fails only if the TLS backend cannot load.
    pub fn new(config: AlpacaConfig) -> Result<Self, BrokerApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BrokerApiError::Network(e.to_string()))?;
        Ok(Self { http, config })
    }

    /// GET against the trading host.
    pub async fn get_trading<T: DeserializeOwned>(&self, path: &str) -> Result<T, BrokerApiError> {
        let url = format!("{}{path}", self.config.trading_url);
        let body = self.request_raw(Method::GET, &url, None).await?;
        decode(&body)
    }

    /// GET against the market data host.
    pub async fn get_data<T: DeserializeOwned>(&self, path: &str) -> Result<T, BrokerApiError> {
        let url = format!("{}{path}", self.config.data_url);
        let body = self.request_raw(Method::GET, &url, None).await?;
        decode(&body)
    }

    /// POST a JSON body to the trading host.
    pub async fn post_trading<T: DeserializeOwned>(
        &self,
        path: &str,
        request: &impl Serialize,
    ) -> Result<T, BrokerApiError> {
        let url = format!("{}{path}", self.config.trading_url);
        let payload = serde_json::to_value(request)
            .map_err(|e| BrokerApiError::Decode(e.to_string()))?;
        let body = self.request_raw(Method::POST, &url, Some(payload)).await?;
        decode(&body)
    }

    /// DELETE against the trading host; the response body is ignored.
    pub async fn delete_trading(&self, path: &str) -> Result<(), BrokerApiError> {
        let url = format!("{}{path}", self.config.trading_url);
        self.request_raw(Method::DELETE, &url, None).await?;
        Ok(())
    }

    async fn request_raw(
        &self,
        method: Method,
        url: &str,
        body: Option<serde_json::Value>,
    ) -> Result<String, BrokerApiError> {
        let max_attempts = self.config.retry.max_attempts.max(1);
        let mut last: Option<BrokerApiError> = None;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                let delay = match &last {
                    Some(BrokerApiError::RateLimited {
                        retry_after_secs: Some(secs),
                    }) => Duration::from_secs(*secs),
                    _ => delay_for_attempt(&self.config.retry, attempt - 1),
                };
                warn!(
                    url,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %last.as_ref().map(ToString::to_string).unwrap_or_default(),
                    "retrying broker request"
                );
                tokio::time::sleep(delay).await;
            }

            debug!(%method, url, attempt, "broker request");
            match self.send(method.clone(), url, body.as_ref()).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt < max_attempts => last = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(BrokerApiError::RetriesExhausted {
            attempts: max_attempts,
            last: last.map(|e| e.to_string()).unwrap_or_default(),
        })
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<String, BrokerApiError> {
        let is_post = method == Method::POST;
        let mut req = self
            .http
            .request(method, url)
            .header(KEY_HEADER, &self.config.api_key)
            .header(SECRET_HEADER, &self.config.api_secret);
        if let Some(json) = body {
            req = req.json(json);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| BrokerApiError::Network(e.to_string()))?;
        let status = resp.status();
        let retry_after = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let text = resp
            .text()
            .await
            .map_err(|e| BrokerApiError::Network(e.to_string()))?;

        if status.is_success() {
            return Ok(text);
        }
        Err(categorize(status, retry_after, &text, is_post))
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, BrokerApiError> {
    serde_json::from_str(body).map_err(|e| BrokerApiError::Decode(e.to_string()))
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<AlpacaErrorResponse>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| body.chars().take(200).collect())
}

fn categorize(
    status: StatusCode,
    retry_after_secs: Option<u64>,
    body: &str,
    is_post: bool,
) -> BrokerApiError {
    let message = error_message(body);
    match status {
        StatusCode::UNAUTHORIZED => BrokerApiError::Authentication(message),
        StatusCode::FORBIDDEN if is_post => BrokerApiError::OrderRejected(message),
        StatusCode::FORBIDDEN => BrokerApiError::Authentication(message),
        StatusCode::NOT_FOUND => BrokerApiError::NotFound(message),
        StatusCode::UNPROCESSABLE_ENTITY => BrokerApiError::OrderRejected(message),
        StatusCode::TOO_MANY_REQUESTS => BrokerApiError::RateLimited { retry_after_secs },
        _ => BrokerApiError::Api {
            status: status.as_u16(),
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categorize_maps_statuses() {
        let e = categorize(StatusCode::UNAUTHORIZED, None, r#"{"message":"bad key"}"#, false);
        assert!(matches!(e, BrokerApiError::Authentication(m) if m == "bad key"));

        let e = categorize(
            StatusCode::FORBIDDEN,
            None,
            r#"{"message":"insufficient buying power"}"#,
            true,
        );
        assert!(matches!(e, BrokerApiError::OrderRejected(_)));

        let e = categorize(StatusCode::TOO_MANY_REQUESTS, Some(7), "{}", false);
        assert!(matches!(
            e,
            BrokerApiError::RateLimited {
                retry_after_secs: Some(7)
            }
        ));

        let e = categorize(StatusCode::BAD_GATEWAY, None, "upstream", false);
        assert!(e.is_retryable());
    }

    #[test]
    fn error_message_falls_back_to_raw_body() {
        assert_eq!(error_message("not json"), "not json");
        assert_eq!(error_message(r#"{"message":"nope"}"#), "nope");
    }
}
