//! Amount text to [`Decimal`].
//!
//! Accepts what bank exports actually contain: currency symbols, thousands
//! separators, a trailing minus, accounting parentheses and a decimal comma.

use rust_decimal::Decimal;
use std::str::FromStr;

use crate::mapping::AmountFormat;

/// Parse an amount; `None` when the text is not a number.
///
/// ```
/// use csv2stmt::mapping::AmountFormat;
/// use csv2stmt::transform::amount::parse_amount;
///
/// assert_eq!(parse_amount("$1,000", AmountFormat::Auto).unwrap().to_string(), "1000");
/// assert_eq!(parse_amount("1.000,00€", AmountFormat::Auto).unwrap().to_string(), "1000.00");
/// ```
pub fn parse_amount(raw: &str, format: AmountFormat) -> Option<Decimal> {
    let mut text: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && !is_currency_symbol(*c) && *c != '+' && *c != '\'')
        .collect();

    let mut negative = false;
    if let Some(inner) = text.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        negative = true;
        text = inner.to_string();
    }
    if let Some(rest) = text.strip_prefix('-') {
        negative = !negative;
        text = rest.to_string();
    } else if let Some(rest) = text.strip_suffix('-') {
        negative = !negative;
        text = rest.to_string();
    }

    if !text.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    if text.chars().any(|c| !(c.is_ascii_digit() || c == '.' || c == ',')) {
        return None;
    }

    let normalized = match resolve_format(&text, format) {
        AmountFormat::Comma => text.replace('.', "").replace(',', "."),
        _ => text.replace(',', ""),
    };

    let value = Decimal::from_str(&normalized).ok()?;
    Some(if negative { -value } else { value })
}

fn resolve_format(text: &str, format: AmountFormat) -> AmountFormat {
    match format {
        AmountFormat::Auto => {
            let tail: String = text.chars().rev().take(3).collect();
            if tail.contains(',') && !tail.contains('.') {
                AmountFormat::Comma
            } else {
                AmountFormat::Dot
            }
        }
        explicit => explicit,
    }
}

fn is_currency_symbol(c: char) -> bool {
    matches!(c, '$' | '€' | '£' | '¥' | '₹' | '₩' | '₽' | '¢' | '₺' | '₪')
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn auto(raw: &str) -> Option<Decimal> {
        parse_amount(raw, AmountFormat::Auto)
    }

    #[test]
    fn test_plain_and_signed() {
        assert_eq!(auto("-50.00"), Some(dec!(-50.00)));
        assert_eq!(auto("+12.5"), Some(dec!(12.5)));
        assert_eq!(auto(" 7 "), Some(dec!(7)));
    }

    #[test]
    fn test_currency_and_thousands() {
        assert_eq!(auto("$1,000"), Some(dec!(1000)));
        assert_eq!(auto("$1,234.56"), Some(dec!(1234.56)));
        assert_eq!(auto("1.000,00€"), Some(dec!(1000.00)));
        assert_eq!(auto("1 234,5"), Some(dec!(1234.5)));
    }

    #[test]
    fn test_accounting_negatives() {
        assert_eq!(auto("(45.10)"), Some(dec!(-45.10)));
        assert_eq!(auto("45.10-"), Some(dec!(-45.10)));
        assert_eq!(auto("-$3.00"), Some(dec!(-3.00)));
    }

    #[test]
    fn test_explicit_formats() {
        assert_eq!(parse_amount("1,234", AmountFormat::Comma), Some(dec!(1.234)));
        assert_eq!(parse_amount("1,234", AmountFormat::Dot), Some(dec!(1234)));
        assert_eq!(parse_amount("1.234,56", AmountFormat::Comma), Some(dec!(1234.56)));
    }

    #[test]
    fn test_rejects_non_numbers() {
        assert_eq!(auto(""), None);
        assert_eq!(auto("N/A"), None);
        assert_eq!(auto("12abc"), None);
        assert_eq!(auto("$"), None);
        assert_eq!(auto("1.2.3"), None);
    }
}
