use serde_json::{Number, Value};
use std::collections::HashMap;

use super::FieldKind;

/// What the user typed or toggled for one field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Flag(bool),
}

/// Only fields the user touched have an entry.
#[derive(Debug, Clone, Default)]
pub struct FormValues {
    values: HashMap<String, FieldValue>,
}

impl FormValues {
    pub fn set(&mut self, key: &str, value: FieldValue) {
        self.values.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.values.get(key)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

/// Turn an edited value into its payload value. `None` leaves the key out.
pub fn serialize_value(kind: &FieldKind, value: Option<&FieldValue>) -> Option<Value> {
    match kind {
        FieldKind::Toggle => Some(Value::Bool(match value {
            Some(FieldValue::Flag(on)) => *on,
            Some(FieldValue::Text(raw)) => parse_flag(raw).unwrap_or(false),
            None => false,
        })),
        FieldKind::Text => match value? {
            FieldValue::Text(raw) => Some(Value::String(raw.clone())),
            FieldValue::Flag(on) => Some(Value::String(on.to_string())),
        },
        FieldKind::Select { .. } | FieldKind::Textarea => {
            let raw = text_of(value?);
            (!raw.is_empty()).then(|| Value::String(raw))
        }
        FieldKind::Number { integer, .. } => {
            parse_number(&text_of(value?), *integer).map(Value::Number)
        }
        FieldKind::List => Some(Value::Array(
            split_lines(&text_of(value?))
                .into_iter()
                .map(Value::String)
                .collect(),
        )),
    }
}

/// Turn a stored payload value back into something editable.
pub fn render_value(kind: &FieldKind, stored: &Value) -> FieldValue {
    match kind {
        FieldKind::Toggle => FieldValue::Flag(match stored {
            Value::Bool(on) => *on,
            Value::String(raw) => parse_flag(raw).unwrap_or(false),
            _ => false,
        }),
        FieldKind::List => FieldValue::Text(match stored {
            Value::Array(items) => items
                .iter()
                .map(scalar_text)
                .collect::<Vec<_>>()
                .join("\n"),
            other => scalar_text(other),
        }),
        FieldKind::Text | FieldKind::Textarea | FieldKind::Select { .. } | FieldKind::Number { .. } => {
            FieldValue::Text(scalar_text(stored))
        }
    }
}

/// One trimmed item per non-blank line, in order.
pub fn split_lines(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Integers accept a fractional input and truncate it; anything that is not
/// a finite number is rejected.
pub fn parse_number(raw: &str, integer: bool) -> Option<Number> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(n) = raw.parse::<i64>() {
        return Some(Number::from(n));
    }
    let parsed = raw.parse::<f64>().ok().filter(|n| n.is_finite())?;
    if integer {
        let truncated = parsed.trunc();
        // i64::MAX rounds up to 2^63 as f64, so the upper check is exclusive.
        if truncated < i64::MIN as f64 || truncated >= i64::MAX as f64 {
            return None;
        }
        return Some(Number::from(truncated as i64));
    }
    if parsed.fract() == 0.0 && parsed.abs() < 9.0e15 {
        return Some(Number::from(parsed as i64));
    }
    Number::from_f64(parsed)
}

/// Bounds check used by interactive controls; serialization never clamps.
pub fn check_bounds(
    raw: &str,
    integer: bool,
    minimum: Option<f64>,
    maximum: Option<f64>,
) -> Result<(), String> {
    let number = parse_number(raw, integer).ok_or_else(|| format!("'{}' is not a number", raw))?;
    let value = number.as_f64().unwrap_or(0.0);
    if let Some(min) = minimum
        && value < min
    {
        return Err(format!("must be at least {}", min));
    }
    if let Some(max) = maximum
        && value > max
    {
        return Err(format!("must be at most {}", max));
    }
    Ok(())
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "1" | "on" => Some(true),
        "false" | "no" | "n" | "0" | "off" | "" => Some(false),
        _ => None,
    }
}

fn text_of(value: &FieldValue) -> String {
    match value {
        FieldValue::Text(raw) => raw.clone(),
        FieldValue::Flag(on) => on.to_string(),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
