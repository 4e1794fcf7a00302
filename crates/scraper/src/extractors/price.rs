// ABOUTME: Price normalization from currency-formatted text to a decimal value.
// ABOUTME: Handles thousands/decimal separator ambiguity and currency detection from codes or symbols.

//! Price parsing.
//!
//! Raw price text is always preserved by callers; these helpers only derive
//! the numeric value and currency. Malformed text yields `None`, never an error.

use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;

/// First run of digits with embedded separators, e.g. "1,299.00" in "$1,299.00 - $1,499.00".
static NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d[\d.,]*").unwrap());

static ISO_CURRENCY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(USD|GBP|EUR|CAD|AUD|JPY|CNY|INR)\b").unwrap());

const CURRENCY_SYMBOLS: &[(&str, &str)] = &[
    ("€", "EUR"),
    ("£", "GBP"),
    ("¥", "JPY"),
    ("₹", "INR"),
    ("$", "USD"),
];

/// Parse a currency-formatted price into a decimal.
///
/// When both `,` and `.` appear, whichever comes last is the decimal separator.
/// A lone `,` followed by exactly two digits is a decimal comma ("12,99");
/// otherwise commas are thousands separators. Several dots with no comma
/// ("1.234.567") are thousands separators.
pub fn parse_price(raw: &str) -> Option<Decimal> {
    let token = NUMBER_RE.find(raw)?.as_str();
    let token = token.trim_end_matches(|c| c == '.' || c == ',');
    if token.is_empty() {
        return None;
    }

    let last_comma = token.rfind(',');
    let last_dot = token.rfind('.');

    let normalized = match (last_comma, last_dot) {
        (Some(c), Some(d)) if c > d => token.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => token.replace(',', ""),
        (Some(c), None) => {
            let decimals = token.len() - c - 1;
            if token.matches(',').count() == 1 && decimals == 2 {
                token.replace(',', ".")
            } else {
                token.replace(',', "")
            }
        }
        (None, Some(_)) if token.matches('.').count() > 1 => token.replace('.', ""),
        _ => token.to_string(),
    };

    Decimal::from_str(&normalized).ok()
}

/// Detect an ISO currency code from raw price text.
///
/// Explicit ISO codes win over symbols; a bare `$` is read as USD.
pub fn detect_currency(raw: &str) -> Option<String> {
    if let Some(m) = ISO_CURRENCY_RE.find(raw) {
        return Some(m.as_str().to_uppercase());
    }
    CURRENCY_SYMBOLS
        .iter()
        .find(|(symbol, _)| raw.contains(symbol))
        .map(|(_, code)| code.to_string())
}
