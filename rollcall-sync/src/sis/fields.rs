//! Lenient field access for upstream JSON records
//!
//! Upstream ids arrive as numbers or numeric strings, labels may be missing or
//! empty. These helpers walk a list of candidate keys and return the first
//! usable value.

use serde_json::Value;

/// First candidate that coerces to an integer (number or numeric string)
pub fn int_field(record: &Value, keys: &[&str]) -> Option<i64> {
    keys.iter().find_map(|key| record.get(*key).and_then(as_int))
}

/// First candidate holding a non-empty string (numbers are rendered)
pub fn text_field(record: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| record.get(*key).and_then(as_text))
}

/// True when any candidate holds something other than null or an empty string
pub fn has_value(record: &Value, keys: &[&str]) -> bool {
    keys.iter().any(|key| match record.get(*key) {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(_) => true,
    })
}

/// Truthy flag: `true`, `"true"`, `"1"` or a non-zero number
pub fn flag(record: &Value, key: &str) -> bool {
    match record.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
        Some(Value::Number(n)) => n.as_f64().map(|v| v != 0.0).unwrap_or(false),
        _ => false,
    }
}

fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
