//! Telegram delivery for operator notifications.

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::warn;

use super::NotifierPort;
use crate::config::NotifyConfig;

/// Posts messages to a Telegram chat via the bot API.
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    http: reqwest::Client,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    /// Build a notifier. Returns `None` when the config is incomplete or
    /// disabled, so callers fall back to the no-op notifier.
    #[must_use]
    pub fn from_config(config: &NotifyConfig) -> Option<Self> {
        if !config.is_configured() {
            return None;
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .ok()?;
        Some(Self {
            http,
            bot_token: config.telegram_bot_token.clone(),
            chat_id: config.telegram_chat_id.clone(),
        })
    }
}

#[async_trait]
impl NotifierPort for TelegramNotifier {
    async fn send(&self, text: &str) -> bool {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        let body = json!({
            "chat_id": self.chat_id,
            "text": text,
        });
        match self.http.post(&url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                warn!(status = %resp.status(), "telegram send failed");
                false
            }
            Err(e) => {
                warn!(error = %e, "telegram send failed");
                false
            }
        }
    }
}
