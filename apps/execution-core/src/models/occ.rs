//! OCC option symbol parsing.
//!
//! OCC symbology packs underlying, expiration, right and strike into one
//! string, e.g. `AAPL250117C00150000` = AAPL 2025-01-17 CALL $150.00.
//! Format: 1-6 uppercase letters, 6-digit YYMMDD date, C or P, 8-digit
//! strike in thousandths of a dollar.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::enums::OptionSide;

/// Decomposed OCC option symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccSymbol {
    /// Underlying ticker.
    pub ticker: String,
    /// Contract expiration date.
    pub expiration: NaiveDate,
    /// Call or put.
    pub side: OptionSide,
    /// Strike price in dollars.
    pub strike: Decimal,
}

/// Parse an OCC symbol into its components.
///
/// Returns `None` for anything that does not match the OCC layout; callers
/// treat unparseable symbols as non-option instruments and skip them.
#[must_use]
pub fn parse_occ_symbol(symbol: &str) -> Option<OccSymbol> {
    let s = symbol.trim();
    // Trailing 15 chars are fixed-width: YYMMDD + right + 8-digit strike.
    if s.len() < 16 || !s.is_ascii() {
        return None;
    }
    let (ticker, tail) = s.split_at(s.len() - 15);
    if ticker.is_empty()
        || ticker.len() > 6
        || !ticker.bytes().all(|b| b.is_ascii_uppercase())
    {
        return None;
    }

    let (date_part, rest) = tail.split_at(6);
    let (right_part, strike_part) = rest.split_at(1);
    if !date_part.bytes().all(|b| b.is_ascii_digit())
        || !strike_part.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }

    let side = OptionSide::from_occ_code(right_part.chars().next()?)?;
    let expiration = NaiveDate::parse_from_str(date_part, "%y%m%d").ok()?;
    let thousandths: i64 = strike_part.parse().ok()?;
    let strike = Decimal::new(thousandths, 3).normalize();

    Some(OccSymbol {
        ticker: ticker.to_string(),
        expiration,
        side,
        strike,
    })
}

/// Calendar days from `today` until `expiration`. Negative once expired.
#[must_use]
pub fn days_to_expiration(expiration: NaiveDate, today: NaiveDate) -> i64 {
    (expiration - today).num_days()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_standard_symbol() {
        let parsed = parse_occ_symbol("AAPL250117C00150000").unwrap();
        assert_eq!(parsed.ticker, "AAPL");
        assert_eq!(
            parsed.expiration,
            NaiveDate::from_ymd_opt(2025, 1, 17).unwrap()
        );
        assert_eq!(parsed.side, OptionSide::Call);
        assert_eq!(parsed.strike, dec!(150));
    }

    #[test]
    fn parses_fractional_strike_and_put() {
        let parsed = parse_occ_symbol("SPY260320P00452500").unwrap();
        assert_eq!(parsed.ticker, "SPY");
        assert_eq!(parsed.side, OptionSide::Put);
        assert_eq!(parsed.strike, dec!(452.5));
    }

    #[test]
    fn parses_long_ticker() {
        let parsed = parse_occ_symbol("GOOGL250620C02000000").unwrap();
        assert_eq!(parsed.ticker, "GOOGL");
        assert_eq!(parsed.strike, dec!(2000));
    }

    #[test]
    fn rejects_malformed_symbols() {
        assert!(parse_occ_symbol("AAPL").is_none());
        assert!(parse_occ_symbol("AAPL250117X00150000").is_none());
        assert!(parse_occ_symbol("aapl250117C00150000").is_none());
        assert!(parse_occ_symbol("TOOLONGTICK250117C00150000").is_none());
        assert!(parse_occ_symbol("AAPL2501L7C00150000").is_none());
        assert!(parse_occ_symbol("").is_none());
    }

    #[test]
    fn dte_counts_calendar_days() {
        let today = NaiveDate::from_ymd_opt(2025, 1, 10).unwrap();
        let expiry = NaiveDate::from_ymd_opt(2025, 1, 17).unwrap();
        assert_eq!(days_to_expiration(expiry, today), 7);
        assert_eq!(days_to_expiration(today, expiry), -7);
        assert_eq!(days_to_expiration(today, today), 0);
    }
}
