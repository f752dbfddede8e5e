//! Broker API endpoints, credentials and retry policy.

use serde::Deserialize;
use std::time::Duration;

/// Alpaca REST API settings. Credentials are normally supplied through
/// `${ALPACA_API_KEY}` / `${ALPACA_API_SECRET}` references in the config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlpacaConfig {
    /// API key id.
    #[serde(default)]
    pub api_key: String,

    /// API secret.
    #[serde(default)]
    pub api_secret: String,

    /// Trading API base URL (paper by default).
    #[serde(default = "default_trading_url")]
    pub trading_url: String,

    /// Market data API base URL.
    #[serde(default = "default_data_url")]
    pub data_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retry policy for transient API failures.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for AlpacaConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_secret: String::new(),
            trading_url: default_trading_url(),
            data_url: default_data_url(),
            timeout_secs: default_timeout_secs(),
            retry: RetryConfig::default(),
        }
    }
}

/// Exponential backoff retry policy, applied uniformly to broker HTTP calls.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry, milliseconds.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Backoff ceiling, milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Backoff growth factor per attempt.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Random jitter as a fraction of the computed delay.
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
            jitter_factor: default_jitter_factor(),
        }
    }
}

impl RetryConfig {
    /// Initial backoff as a [`Duration`].
    #[must_use]
    pub const fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    /// Backoff ceiling as a [`Duration`].
    #[must_use]
    pub const fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

fn default_trading_url() -> String {
    "https://paper-api.alpaca.markets".to_string()
}

fn default_data_url() -> String {
    "https://data.alpaca.markets".to_string()
}

const fn default_timeout_secs() -> u64 {
    10
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    500
}

const fn default_max_backoff_ms() -> u64 {
    10_000
}

const fn default_multiplier() -> f64 {
    2.0
}

const fn default_jitter_factor() -> f64 {
    0.1
}
