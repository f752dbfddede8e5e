//! Exchange-local session time arithmetic.
//!
//! All functions take the current instant as a parameter so callers and
//! tests control the clock. Weekend handling is calendar-based; holiday
//! closures come from the broker's trading calendar, not from here.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc, Weekday};
use chrono_tz::Tz;

use crate::config::MarketHoursConfig;

fn exchange_tz(config: &MarketHoursConfig) -> Tz {
    config
        .timezone
        .parse()
        .unwrap_or(chrono_tz::America::New_York)
}

fn local_instant(tz: Tz, date: chrono::NaiveDate, hour: u32, minute: u32) -> DateTime<Utc> {
    // DST gaps resolve to the earliest valid instant.
    tz.with_ymd_and_hms(date.year(), date.month(), date.day(), hour, minute, 0)
        .earliest()
        .map_or_else(
            || Utc.from_utc_datetime(&date.and_hms_opt(hour, minute, 0).unwrap_or_default()),
            |dt| dt.with_timezone(&Utc),
        )
}

/// Today's session open and close in UTC.
#[must_use]
pub fn session_bounds(
    now: DateTime<Utc>,
    config: &MarketHoursConfig,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let tz = exchange_tz(config);
    let local_date = now.with_timezone(&tz).date_naive();
    (
        local_instant(tz, local_date, config.open_hour, config.open_minute),
        local_instant(tz, local_date, config.close_hour, config.close_minute),
    )
}

/// Why `now` is unacceptable for a new entry, if it is.
///
/// Blocks weekends, anything outside the session, the first minutes after
/// the open and the last minutes before the close.
#[must_use]
pub fn entry_timing_block(now: DateTime<Utc>, config: &MarketHoursConfig) -> Option<String> {
    let tz = exchange_tz(config);
    let local = now.with_timezone(&tz);
    if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
        return Some("Market closed (weekend)".to_string());
    }

    let (open, close) = session_bounds(now, config);
    if now < open || now >= close {
        return Some("Outside market hours".to_string());
    }
    if now < open + Duration::minutes(config.open_delay_minutes) {
        return Some(format!(
            "Within {} minutes of market open",
            config.open_delay_minutes
        ));
    }
    if now >= close - Duration::minutes(config.close_buffer_minutes) {
        return Some(format!(
            "Within {} minutes of market close",
            config.close_buffer_minutes
        ));
    }
    None
}

/// Midnight of the current exchange-local day, in UTC. The daily loss window
/// starts here.
#[must_use]
pub fn trading_day_start(now: DateTime<Utc>, config: &MarketHoursConfig) -> DateTime<Utc> {
    let tz = exchange_tz(config);
    let local_date = now.with_timezone(&tz).date_naive();
    local_instant(tz, local_date, 0, 0)
}

/// Midnight of the current exchange-local week's Monday, in UTC.
#[must_use]
pub fn week_start(now: DateTime<Utc>, config: &MarketHoursConfig) -> DateTime<Utc> {
    let tz = exchange_tz(config);
    let local = now.with_timezone(&tz);
    let days_from_monday = i64::from(local.weekday().num_days_from_monday());
    let monday = local.date_naive() - Duration::days(days_from_monday);
    local_instant(tz, monday, 0, 0)
}

/// Open of the next weekday session after `now`.
#[must_use]
pub fn next_trading_day_open(now: DateTime<Utc>, config: &MarketHoursConfig) -> DateTime<Utc> {
    let tz = exchange_tz(config);
    let mut date = now.with_timezone(&tz).date_naive() + Duration::days(1);
    while matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
        date += Duration::days(1);
    }
    local_instant(tz, date, config.open_hour, config.open_minute)
}

/// Open of next Monday's session.
#[must_use]
pub fn next_week_open(now: DateTime<Utc>, config: &MarketHoursConfig) -> DateTime<Utc> {
    let tz = exchange_tz(config);
    let local = now.with_timezone(&tz);
    let days_ahead = 7 - i64::from(local.weekday().num_days_from_monday());
    let monday = local.date_naive() + Duration::days(days_ahead);
    local_instant(tz, monday, config.open_hour, config.open_minute)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn cfg() -> MarketHoursConfig {
        MarketHoursConfig::default()
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    // 2025-01-08 is a Wednesday; EST is UTC-5 in January.

    #[test]
    fn mid_session_is_allowed() {
        // 11:00 ET
        assert_eq!(entry_timing_block(utc(2025, 1, 8, 16, 0), &cfg()), None);
    }

    #[test]
    fn open_delay_blocks_first_minutes() {
        // 09:40 ET, within the 15 minute delay
        let reason = entry_timing_block(utc(2025, 1, 8, 14, 40), &cfg()).unwrap();
        assert!(reason.contains("market open"));
    }

    #[test]
    fn close_buffer_blocks_last_minutes() {
        // 15:50 ET, within the 15 minute buffer
        let reason = entry_timing_block(utc(2025, 1, 8, 20, 50), &cfg()).unwrap();
        assert!(reason.contains("market close"));
    }

    #[test]
    fn overnight_and_weekend_are_blocked() {
        // 07:00 ET Wednesday
        let reason = entry_timing_block(utc(2025, 1, 8, 12, 0), &cfg()).unwrap();
        assert!(reason.contains("Outside market hours"));
        // Saturday noon ET
        let reason = entry_timing_block(utc(2025, 1, 11, 17, 0), &cfg()).unwrap();
        assert!(reason.contains("weekend"));
    }

    #[test]
    fn day_and_week_windows_are_exchange_local() {
        let now = utc(2025, 1, 8, 16, 0);
        // Midnight ET on Jan 8 = 05:00 UTC
        assert_eq!(trading_day_start(now, &cfg()), utc(2025, 1, 8, 5, 0));
        // Monday Jan 6 midnight ET
        assert_eq!(week_start(now, &cfg()), utc(2025, 1, 6, 5, 0));
    }

    #[test]
    fn next_opens_skip_weekends() {
        // Friday Jan 10, mid-session
        let friday = utc(2025, 1, 10, 16, 0);
        let next = next_trading_day_open(friday, &cfg());
        assert_eq!(
            next.with_timezone(&chrono_tz::America::New_York).date_naive(),
            NaiveDate::from_ymd_opt(2025, 1, 13).unwrap()
        );

        let next_week = next_week_open(utc(2025, 1, 8, 16, 0), &cfg());
        assert_eq!(
            next_week
                .with_timezone(&chrono_tz::America::New_York)
                .date_naive(),
            NaiveDate::from_ymd_opt(2025, 1, 13).unwrap()
        );
    }
}
