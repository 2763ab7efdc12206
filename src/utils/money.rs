//! Money helpers: deterministic 2dp rounding and lenient amount parsing

use bigdecimal::{BigDecimal, RoundingMode};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::str::FromStr;

/// Round to 2 decimal places, half to even
pub fn round2(amount: &BigDecimal) -> BigDecimal {
    amount.with_scale_round(2, RoundingMode::HalfEven)
}

/// Sum a sequence of amounts and round the total to 2 decimal places
pub fn sum_round2<'a, I>(amounts: I) -> BigDecimal
where
    I: IntoIterator<Item = &'a BigDecimal>,
{
    let total: BigDecimal = amounts.into_iter().sum();
    round2(&total)
}

/// `part / whole * 100` rounded to 2dp; 100 when `whole` is zero
pub fn percentage(part: u64, whole: u64) -> BigDecimal {
    if whole == 0 {
        return round2(&BigDecimal::from(100));
    }
    let pct = BigDecimal::from(part) * BigDecimal::from(100) / BigDecimal::from(whole);
    round2(&pct)
}

/// Tolerance under which a tie-out difference is not an exception
pub fn tie_out_tolerance() -> BigDecimal {
    BigDecimal::from(1) / BigDecimal::from(100)
}

/// Parse an amount from a JSON number or string.
///
/// Numbers go through their shortest decimal text so `1500.1` stays exact.
/// Null and empty strings read as zero.
pub fn amount_from_json(value: &Value) -> Result<BigDecimal, String> {
    match value {
        Value::Null => Ok(BigDecimal::from(0)),
        Value::Number(number) => {
            BigDecimal::from_str(&number.to_string()).map_err(|e| format!("amount {number}: {e}"))
        }
        Value::String(text) => parse_amount(text),
        other => Err(format!("amount must be a number or string, got {other}")),
    }
}

/// Parse a textual amount; blank text reads as zero
pub fn parse_amount(text: &str) -> Result<BigDecimal, String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(BigDecimal::from(0));
    }
    BigDecimal::from_str(trimmed).map_err(|e| format!("amount {trimmed:?}: {e}"))
}

/// serde `deserialize_with` adapter over [`amount_from_json`]
pub fn deserialize_amount<'de, D>(deserializer: D) -> Result<BigDecimal, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    amount_from_json(&value).map_err(serde::de::Error::custom)
}
