//! Per-field type coercions.
//!
//! Coercion is coerce-or-null: a present value that cannot be converted
//! is reported as a [`CoercionFailure`] and the caller stores
//! [`Value::Missing`] in its place. Missing input stays missing without
//! a failure.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::{format_number, Value};

/// Indian and western digit grouping: `1,20,000.50`, `120,000`.
static GROUPED_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^-?\d{1,3}(,\d{2,3})+(\.\d+)?$").expect("Invalid grouped number pattern")
});

/// Target type for a canonical column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Coercion {
    /// Text; numeric cells render as typed (`32.0` → `"32"`).
    Text,

    /// Floating point number.
    Numeric,

    /// Digit string left-padded with zeros to `width`.
    Pincode {
        #[serde(default = "default_pincode_width")]
        width: usize,
    },
}

fn default_pincode_width() -> usize {
    6
}

/// A present value that could not be coerced.
#[derive(Debug, Clone, PartialEq)]
pub struct CoercionFailure {
    /// Raw value as the user sees it.
    pub value: String,
}

impl Coercion {
    /// Apply this coercion to a value.
    pub fn apply(&self, value: &Value) -> Result<Value, CoercionFailure> {
        match value {
            Value::Missing => Ok(Value::Missing),
            _ => match self {
                Coercion::Text => Ok(self.apply_text(value)),
                Coercion::Numeric => self.apply_numeric(value),
                Coercion::Pincode { width } => self.apply_pincode(value, *width),
            },
        }
    }

    fn failure(value: &Value) -> CoercionFailure {
        CoercionFailure {
            value: value.group_key().unwrap_or_default(),
        }
    }

    fn apply_text(&self, value: &Value) -> Value {
        match value {
            Value::Number(n) => Value::Text(format_number(*n)),
            Value::Text(s) => Value::text(s),
            other => other.clone(),
        }
    }

    fn apply_numeric(&self, value: &Value) -> Result<Value, CoercionFailure> {
        match value {
            Value::Number(n) if n.is_finite() => Ok(Value::Number(*n)),
            Value::Text(s) => parse_number(s)
                .map(Value::Number)
                .ok_or_else(|| Self::failure(value)),
            _ => Err(Self::failure(value)),
        }
    }

    fn apply_pincode(&self, value: &Value, width: usize) -> Result<Value, CoercionFailure> {
        let digits = match value {
            Value::Number(n) if *n >= 0.0 && n.fract() == 0.0 => format_number(*n),
            Value::Text(s) => {
                let s = s.trim();
                if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) {
                    s.to_string()
                } else {
                    // "12345.0" from a text export of a numeric column
                    match s.parse::<f64>() {
                        Ok(n) if n >= 0.0 && n.fract() == 0.0 => format_number(n),
                        _ => return Err(Self::failure(value)),
                    }
                }
            }
            _ => return Err(Self::failure(value)),
        };

        if digits.len() > width {
            return Err(Self::failure(value));
        }
        Ok(Value::Text(format!("{:0>width$}", digits, width = width)))
    }
}

/// Parse a numeric string, accepting digit grouping commas.
pub fn parse_number(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(n) = s.parse::<f64>() {
        return n.is_finite().then_some(n);
    }
    if GROUPED_NUMBER.is_match(s) {
        return s.replace(',', "").parse::<f64>().ok();
    }
    None
}
