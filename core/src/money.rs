//! Monetary helpers: tolerant amount parsing and persistence rounding.

use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use serde_json::Value;
use std::str::FromStr;

/// Result of reading an amount cell from a raw row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountCell {
    /// Cell absent, null or blank.
    Missing,
    Parsed(Decimal),
    /// Cell present but not a number in any supported locale.
    Invalid,
}

/// Round to cents. Applied once, when a value is persisted.
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

pub fn parse_amount_cell(value: Option<&Value>) -> AmountCell {
    match value {
        None | Some(Value::Null) => AmountCell::Missing,
        Some(Value::Number(n)) => parse_number_literal(&n.to_string())
            .map_or(AmountCell::Invalid, AmountCell::Parsed),
        Some(Value::String(s)) if s.trim().is_empty() => AmountCell::Missing,
        Some(Value::String(s)) => parse_amount(s).map_or(AmountCell::Invalid, AmountCell::Parsed),
        Some(_) => AmountCell::Invalid,
    }
}

/// Parse a human-entered amount such as `"1.234,56"`, `"€ 50"` or `"1,234.56"`.
///
/// Currency symbols, letters and whitespace are stripped. When both
/// separators occur, the last one is the decimal separator. A lone comma is
/// decimal; repeated separators of one kind are thousands grouping.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-'))
        .collect();
    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let negative = cleaned.starts_with('-');
    let unsigned = cleaned.trim_start_matches('-');
    if unsigned.contains('-') {
        return None;
    }

    let commas = unsigned.matches(',').count();
    let dots = unsigned.matches('.').count();

    let normalized = match (commas, dots) {
        (0, 0) => unsigned.to_string(),
        (_, 0) if commas > 1 => unsigned.replace(',', ""),
        (_, 0) => unsigned.replace(',', "."),
        (0, _) if dots > 1 => unsigned.replace('.', ""),
        (0, _) => unsigned.to_string(),
        _ => {
            let last_comma = unsigned.rfind(',').unwrap_or(0);
            let last_dot = unsigned.rfind('.').unwrap_or(0);
            if last_comma > last_dot {
                unsigned.replace('.', "").replace(',', ".")
            } else {
                unsigned.replace(',', "")
            }
        }
    };

    // Only one decimal separator may survive.
    if normalized.matches('.').count() > 1 {
        return None;
    }

    let value = Decimal::from_str(&normalized).ok()?;
    Some(if negative { -value } else { value })
}

fn parse_number_literal(literal: &str) -> Option<Decimal> {
    Decimal::from_str(literal)
        .or_else(|_| Decimal::from_scientific(literal))
        .ok()
}

/// Trip counts: integers, integral floats or numeric strings. Anything else is 0.
pub fn parse_trips(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.trunc() as u64))
            .unwrap_or(0),
        Some(Value::String(s)) => {
            let s = s.trim();
            s.parse::<u64>().ok().unwrap_or_else(|| {
                parse_amount(s)
                    .filter(|d| d.is_sign_positive())
                    .and_then(|d| d.trunc().to_u64())
                    .unwrap_or(0)
            })
        }
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn european_thousands_and_comma_decimal() {
        assert_eq!(parse_amount("1.234,56"), Some(d("1234.56")));
        assert_eq!(parse_amount("12,5"), Some(d("12.5")));
        assert_eq!(parse_amount("1.234.567"), Some(d("1234567")));
    }

    #[test]
    fn dot_decimal_and_comma_thousands() {
        assert_eq!(parse_amount("1234.56"), Some(d("1234.56")));
        assert_eq!(parse_amount("1,234.56"), Some(d("1234.56")));
        assert_eq!(parse_amount("1,234,567"), Some(d("1234567")));
    }

    #[test]
    fn currency_symbols_and_whitespace_are_stripped() {
        assert_eq!(parse_amount("€ 50"), Some(d("50")));
        assert_eq!(parse_amount(" 7,20 EUR "), Some(d("7.20")));
        assert_eq!(parse_amount("-15,00 €"), Some(d("-15.00")));
    }

    #[test]
    fn garbage_is_rejected() {
        assert_eq!(parse_amount("n/a"), None);
        assert_eq!(parse_amount("12-5"), None);
        assert_eq!(parse_amount_cell(Some(&json!("abc"))), AmountCell::Invalid);
        assert_eq!(parse_amount_cell(Some(&json!(true))), AmountCell::Invalid);
    }

    #[test]
    fn json_cells() {
        assert_eq!(parse_amount_cell(Some(&json!(50))), AmountCell::Parsed(d("50")));
        assert_eq!(parse_amount_cell(Some(&json!(12.5))), AmountCell::Parsed(d("12.5")));
        assert_eq!(parse_amount_cell(Some(&json!("  "))), AmountCell::Missing);
        assert_eq!(parse_amount_cell(None), AmountCell::Missing);
    }

    #[test]
    fn trips_fall_back_to_zero() {
        assert_eq!(parse_trips(Some(&json!(12))), 12);
        assert_eq!(parse_trips(Some(&json!("7"))), 7);
        assert_eq!(parse_trips(Some(&json!("4,0"))), 4);
        assert_eq!(parse_trips(Some(&json!("many"))), 0);
        assert_eq!(parse_trips(None), 0);
    }

    #[test]
    fn rounding_is_half_away_from_zero() {
        assert_eq!(round2(d("32.905")), d("32.91"));
        assert_eq!(round2(d("-0.005")), d("-0.01"));
    }
}
