//! Lenient field decoders for payloads produced by browser clients, which
//! send numeric fields either as JSON numbers or as strings.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    let value = Value::deserialize(d)?;
    scalar_to_string(value).ok_or_else(|| D::Error::custom("expected a non-empty string or number"))
}

pub(crate) fn optional_string_or_number<'de, D: Deserializer<'de>>(
    d: D,
) -> Result<Option<String>, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(scalar_to_string(value))
}

pub(crate) fn i64_from_string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    match Value::deserialize(d)? {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| D::Error::custom(format!("expected an integer, got {n}"))),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| D::Error::custom(format!("expected an integer, got {s:?}"))),
        other => Err(D::Error::custom(format!("expected an integer, got {other}"))),
    }
}

pub(crate) fn u32_from_string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    match Value::deserialize(d)? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.trunc() as u64))
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| D::Error::custom(format!("expected a non-negative integer, got {n}"))),
        Value::String(s) => leading_digits(&s)
            .parse()
            .map_err(|_| D::Error::custom(format!("expected a non-negative integer, got {s:?}"))),
        other => Err(D::Error::custom(format!(
            "expected a non-negative integer, got {other}"
        ))),
    }
}

/// Digits up to the first non-digit, so `"30s"` and `"30.5"` read as 30.
fn leading_digits(s: &str) -> &str {
    let s = s.trim_start();
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    &s[..end]
}
