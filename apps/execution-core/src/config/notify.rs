//! Operator notification settings.

use serde::Deserialize;

/// Telegram notification settings. Disabled (or unconfigured) means the
/// no-op notifier is used; trade flows never depend on delivery.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotifyConfig {
    /// Master switch.
    #[serde(default)]
    pub enabled: bool,

    /// Telegram bot token, usually `${TELEGRAM_BOT_TOKEN}`.
    #[serde(default)]
    pub telegram_bot_token: String,

    /// Telegram chat id to post to.
    #[serde(default)]
    pub telegram_chat_id: String,
}

impl NotifyConfig {
    /// True when Telegram delivery is possible.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.enabled && !self.telegram_bot_token.is_empty() && !self.telegram_chat_id.is_empty()
    }
}
