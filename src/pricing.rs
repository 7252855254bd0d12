use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Substring that marks a cashback offer in scraped discount text.
pub const CASHBACK_MARKER: &str = "cb";

/// Parses scraped price text such as `"₹1,234.50*"`.
///
/// Absent or empty text is unset, as is anything that is not a number once
/// the currency symbol, thousands separators, asterisks and whitespace are gone.
pub fn parse_price(text: Option<&str>) -> Option<f64> {
    let text = text?.trim();
    if text.is_empty() {
        return None;
    }

    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, '₹' | ',' | '*') && !c.is_whitespace())
        .collect();

    match cleaned.parse::<f64>() {
        Ok(value) if value.is_finite() => Some(value),
        _ => {
            log::debug!("Could not parse price: {:?}", text);
            None
        }
    }
}

/// Parses scraped discount text such as `"10% off"`.
///
/// Absent or empty text means no discount and yields `0.0`. Text that still
/// fails to parse after stripping `off`, `%` and whitespace yields `None`,
/// which callers treat as "no discount information".
pub fn parse_discount(text: Option<&str>) -> Option<f64> {
    let Some(text) = text.filter(|t| !t.is_empty()) else {
        return Some(0.0);
    };

    let cleaned: String = text
        .to_lowercase()
        .replace("off", "")
        .chars()
        .filter(|c| *c != '%' && !c.is_whitespace())
        .collect();

    match cleaned.parse::<f64>() {
        Ok(value) if value.is_finite() => Some(value),
        _ => {
            log::debug!("Could not parse discount: {:?}", text);
            None
        }
    }
}

pub fn has_cashback_marker(discount_text: Option<&str>) -> bool {
    discount_text.is_some_and(|t| t.to_lowercase().contains(CASHBACK_MARKER))
}

/// Back-computes the maximum retail price from the selling price and its
/// discount percentage. Only discounts below 100% give a usable MRP.
pub fn compute_mrp(price: f64, discount: Option<f64>) -> Option<f64> {
    let discount = discount.filter(|d| *d < 100.0)?;
    let mrp = price / (1.0 - discount / 100.0);
    (mrp.is_finite() && mrp > 0.0).then_some(mrp)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Fills in whichever half of the `(best_price, best_offer)` pair is missing.
///
/// Exactly one side must be given; with both or neither the pair is returned
/// untouched.
pub fn derive_override(
    mrp: f64,
    best_price: Option<f64>,
    best_offer: Option<f64>,
) -> (Option<f64>, Option<f64>) {
    match (best_price, best_offer) {
        (Some(price), None) => (Some(price), Some(round2((1.0 - price / mrp) * 100.0))),
        (None, Some(offer)) => (Some(round2(mrp * (1.0 - offer / 100.0))), Some(offer)),
        pair => pair,
    }
}

/// Coerces a loosely typed JSON value into a number.
pub fn coerce_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

/// JSON truthiness: `false`, `null`, `0`, `""`, `[]` and `{}` are false.
pub fn coerce_flag(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

pub(crate) fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_number(&value))
}

pub(crate) fn lenient_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_flag(&value))
}
