//! Field accessors for loosely-typed remote JSON.
//!
//! Indexers serialize big integers as strings and small ones as numbers,
//! sometimes both in the same schema. These helpers accept either.

use serde_json::Value;

/// Non-empty string field.
pub fn str_field<'a>(record: &'a Value, key: &str) -> Option<&'a str> {
    record.get(key)?.as_str().map(str::trim).filter(|s| !s.is_empty())
}

/// Unsigned integer from a number or a decimal string.
pub fn u64_field(record: &Value, key: &str) -> Option<u64> {
    match record.get(key)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Signed integer from a number or a decimal string.
pub fn i64_field(record: &Value, key: &str) -> Option<i64> {
    match record.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// 128-bit unsigned integer, normally a decimal string.
pub fn u128_field(record: &Value, key: &str) -> Option<u128> {
    match record.get(key)? {
        Value::Number(n) => n.as_u64().map(u128::from),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Finite float from a number or a decimal string.
pub fn f64_field(record: &Value, key: &str) -> Option<f64> {
    let value = match record.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }?;
    value.is_finite().then_some(value)
}

/// Identifier for log lines: the record's `id`, or `"<unknown>"`.
pub fn record_id(record: &Value) -> String {
    match record.get("id") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => "<unknown>".to_string(),
    }
}
