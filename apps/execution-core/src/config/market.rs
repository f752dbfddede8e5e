//! Exchange session hours and entry timing buffers.

use serde::Deserialize;

/// Regular session definition in the exchange's local timezone.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarketHoursConfig {
    /// IANA timezone of the exchange.
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Session open, local hour.
    #[serde(default = "default_open_hour")]
    pub open_hour: u32,
    /// Session open, local minute.
    #[serde(default = "default_open_minute")]
    pub open_minute: u32,
    /// Session close, local hour.
    #[serde(default = "default_close_hour")]
    pub close_hour: u32,
    /// Session close, local minute.
    #[serde(default = "default_close_minute")]
    pub close_minute: u32,

    /// No entries within this many minutes after the open.
    #[serde(default = "default_open_delay_minutes")]
    pub open_delay_minutes: i64,
    /// No entries within this many minutes before the close.
    #[serde(default = "default_close_buffer_minutes")]
    pub close_buffer_minutes: i64,
}

impl Default for MarketHoursConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            open_hour: default_open_hour(),
            open_minute: default_open_minute(),
            close_hour: default_close_hour(),
            close_minute: default_close_minute(),
            open_delay_minutes: default_open_delay_minutes(),
            close_buffer_minutes: default_close_buffer_minutes(),
        }
    }
}

fn default_timezone() -> String {
    "America/New_York".to_string()
}

const fn default_open_hour() -> u32 {
    9
}

const fn default_open_minute() -> u32 {
    30
}

const fn default_close_hour() -> u32 {
    16
}

const fn default_close_minute() -> u32 {
    0
}

const fn default_open_delay_minutes() -> i64 {
    15
}

const fn default_close_buffer_minutes() -> i64 {
    15
}
