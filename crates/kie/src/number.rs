use regex::Regex;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

re!(re_signed_decimal, r"-?\d+(?:\.\d+)?");
// Amount-shaped token: optional grouping, exactly two decimals.
re!(re_amount, r"-?\d+(?:[.,]\d{3})*[.,]\d{2}\b");
re!(re_percent, r"(\d{1,2}(?:[.,]\d+)?)\s*%");

/// Letters the receipt fonts confuse with digits, and the digit they stand for.
fn ocr_digit(c: char) -> Option<char> {
    match c {
        'S' | 's' => Some('5'),
        'O' | 'o' => Some('0'),
        _ => None,
    }
}

fn is_separator(c: char) -> bool {
    c == '.' || c == ','
}

/// Parse the last decimal number in `s`, tolerating either decimal convention.
///
/// When both `,` and `.` separate digits, the one appearing last is the decimal
/// point and the others are grouping. A lone `,` is a decimal comma. Currency
/// symbols, apostrophe grouping and non-breaking spaces are ignored, and `S`/`O`
/// next to a digit are read as `5`/`0`.
pub fn parse_number(s: &str) -> Option<f64> {
    let raw: Vec<char> = s
        .trim()
        .chars()
        .filter(|c| !matches!(c, '€' | '$' | '£' | '\'' | '\u{00A0}' | '\u{202F}'))
        .collect();
    if raw.is_empty() {
        return None;
    }

    let digit_at = |i: usize| raw.get(i).is_some_and(|c| c.is_ascii_digit());
    let chars: Vec<char> = raw
        .iter()
        .enumerate()
        .map(|(i, &c)| match ocr_digit(c) {
            Some(d) if digit_at(i.wrapping_sub(1)) || digit_at(i + 1) => d,
            _ => c,
        })
        .collect();

    let is_digit = |i: usize| chars.get(i).is_some_and(|c| c.is_ascii_digit());
    let decimal_at = (1..chars.len())
        .rev()
        .find(|&i| is_separator(chars[i]) && is_digit(i - 1) && is_digit(i + 1));

    let mut cleaned = String::with_capacity(chars.len());
    for (i, &c) in chars.iter().enumerate() {
        if is_separator(c) && i > 0 && is_digit(i - 1) && is_digit(i + 1) {
            if Some(i) == decimal_at {
                cleaned.push('.');
            }
            continue;
        }
        cleaned.push(c);
    }

    let last = re_signed_decimal().find_iter(&cleaned).last()?;
    last.as_str().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// An amount-shaped token (`12,50`, `1.234,56`) located in a line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Amount {
    pub start: usize,
    pub end: usize,
    pub value: f64,
}

/// All monetary amounts on a line, left to right. Percentages are skipped.
pub(crate) fn amounts(text: &str) -> Vec<Amount> {
    re_amount()
        .find_iter(text)
        .filter(|m| !text[m.end()..].trim_start().starts_with('%'))
        .filter_map(|m| {
            parse_number(m.as_str()).map(|value| Amount { start: m.start(), end: m.end(), value })
        })
        .collect()
}

/// Percentage literals (`22%`, `10,5 %`) on a line.
pub(crate) fn percentages(text: &str) -> Vec<f64> {
    re_percent()
        .captures_iter(text)
        .filter_map(|c| parse_number(c.get(1)?.as_str()))
        .collect()
}

/// Round a money value to cents.
pub(crate) fn round_cents(value: f64) -> f64 {
    Decimal::from_f64(value)
        .map(|d| d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|d| d.to_string().parse::<f64>().ok())
        .unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Option<f64>, b: f64) -> bool {
        a.is_some_and(|a| (a - b).abs() < 1e-9)
    }

    #[test]
    fn plain_dot_decimal() {
        assert!(approx(parse_number("49.99"), 49.99));
    }

    #[test]
    fn lone_comma_is_decimal() {
        assert!(approx(parse_number("2,50"), 2.5));
    }

    #[test]
    fn european_grouping() {
        assert!(approx(parse_number("1.234,56"), 1234.56));
        assert!(approx(parse_number("12.345.678,90"), 12345678.90));
    }

    #[test]
    fn us_grouping() {
        assert!(approx(parse_number("1,234.56"), 1234.56));
    }

    #[test]
    fn currency_symbols_stripped() {
        assert!(approx(parse_number("€ 3,60"), 3.6));
        assert!(approx(parse_number("$12.00"), 12.0));
        assert!(approx(parse_number("£0.99"), 0.99));
    }

    #[test]
    fn apostrophe_grouping() {
        assert!(approx(parse_number("1'234.50"), 1234.5));
    }

    #[test]
    fn ocr_letter_next_to_digit() {
        assert!(approx(parse_number("1,S0"), 1.5));
        assert!(approx(parse_number("2O,00"), 20.0));
    }

    #[test]
    fn letters_inside_words_untouched() {
        assert!(parse_number("SUBTOTALE").is_none());
        assert!(approx(parse_number("SUBTOTALE: 4,30"), 4.3));
    }

    #[test]
    fn negative_values() {
        assert!(approx(parse_number("SCONTO -0,50"), -0.5));
    }

    #[test]
    fn takes_last_number_with_leading_residue() {
        assert!(approx(parse_number("LATTE 1.0 2,50"), 2.5));
    }

    #[test]
    fn trailing_punctuation_ignored() {
        assert!(approx(parse_number("4.30."), 4.3));
    }

    #[test]
    fn no_number_is_none() {
        assert!(parse_number("").is_none());
        assert!(parse_number("   ").is_none());
        assert!(parse_number("abc").is_none());
    }

    #[test]
    fn amounts_require_two_decimals() {
        let found: Vec<f64> = amounts("KG 1,200 x 2,99 3,59").iter().map(|a| a.value).collect();
        assert_eq!(found, vec![2.99, 3.59]);
    }

    #[test]
    fn amounts_skip_percentages() {
        let found: Vec<f64> = amounts("IVA 22,00 % 1,64").iter().map(|a| a.value).collect();
        assert_eq!(found, vec![1.64]);
    }

    #[test]
    fn amounts_keep_grouped_values_whole() {
        let found = amounts("TV 1.234,50");
        assert_eq!(found.len(), 1);
        assert!((found[0].value - 1234.5).abs() < 1e-9);
        assert_eq!(&"TV 1.234,50"[found[0].start..found[0].end], "1.234,50");
    }

    #[test]
    fn percentages_found() {
        assert_eq!(percentages("IVA 22% e 10,5 %"), vec![22.0, 10.5]);
    }

    #[test]
    fn round_cents_rounds() {
        assert_eq!(round_cents(2.996), 3.0);
        assert_eq!(round_cents(1.234), 1.23);
    }
}
