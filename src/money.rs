use crate::error::{FulfillmentError, Result};

/// Parse a decimal currency amount ("50", "50.5", "50.00") into integer cents.
/// Negative amounts and more than two fractional digits are rejected.
pub fn parse_amount(raw: &str) -> Result<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(FulfillmentError::Validation("empty amount".to_string()));
    }

    let (whole_part, frac_part) = match trimmed.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (trimmed, ""),
    };

    if whole_part.is_empty() || !whole_part.chars().all(|c| c.is_ascii_digit()) {
        return Err(FulfillmentError::Validation(format!(
            "malformed amount: {trimmed}"
        )));
    }
    if frac_part.len() > 2 || !frac_part.chars().all(|c| c.is_ascii_digit()) {
        return Err(FulfillmentError::Validation(format!(
            "malformed amount: {trimmed}"
        )));
    }

    let whole: i64 = whole_part
        .parse()
        .map_err(|_| FulfillmentError::Validation(format!("amount out of range: {trimmed}")))?;
    let cents = match frac_part.len() {
        0 => 0,
        1 => frac_part.parse::<i64>().unwrap_or(0) * 10,
        _ => frac_part.parse::<i64>().unwrap_or(0),
    };

    whole
        .checked_mul(100)
        .and_then(|w| w.checked_add(cents))
        .ok_or_else(|| FulfillmentError::Validation(format!("amount out of range: {trimmed}")))
}

/// Render integer cents back as a two-decimal currency string.
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}
