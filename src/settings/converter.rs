//! Value Converter
//!
//! Maps [`Value`]s to the textual form stored in rows and back. The converter
//! is a pluggable strategy on the [`SettingsManager`](crate::SettingsManager);
//! [`DefaultValueConverter`] handles every scalar kind and falls back to JSON
//! for [`ValueKind::Complex`].

use crate::error::{Error, Result};

use super::value::{format_duration, format_timestamp, parse_duration, parse_timestamp};
use super::{Value, ValueKind};

/// Typed value <-> string conversion.
///
/// Implementations must round-trip every scalar kind and must keep an empty
/// string distinct from an absent (`None`) value.
pub trait ValueConverter: Send + Sync {
    /// Convert a value to its stored text. `Value::Null` maps to `None`.
    fn to_text(&self, value: &Value) -> Result<Option<String>>;

    /// Convert stored text into a value of the requested kind.
    fn from_text(&self, text: Option<&str>, kind: ValueKind) -> Result<Value>;
}

/// Default converter: plain text for scalars, JSON for complex values.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultValueConverter;

impl DefaultValueConverter {
    pub fn new() -> Self {
        Self
    }
}

fn conversion_error(kind: ValueKind, text: &str, reason: impl ToString) -> Error {
    Error::Conversion {
        kind,
        text: text.to_string(),
        reason: reason.to_string(),
    }
}

impl ValueConverter for DefaultValueConverter {
    fn to_text(&self, value: &Value) -> Result<Option<String>> {
        let text = match value {
            Value::Null => return Ok(None),
            Value::Bool(v) => v.to_string(),
            Value::Int(v) => v.to_string(),
            Value::UInt(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Char(v) => v.to_string(),
            Value::Text(v) => v.clone(),
            Value::Timestamp(v) => format_timestamp(v),
            Value::Duration(v) => format_duration(v),
            Value::Complex(v) => serde_json::to_string(v)?,
        };
        Ok(Some(text))
    }

    fn from_text(&self, text: Option<&str>, kind: ValueKind) -> Result<Value> {
        let Some(text) = text else {
            return Ok(Value::Null);
        };

        match kind {
            ValueKind::Text => Ok(Value::Text(text.to_string())),
            ValueKind::Bool => {
                let trimmed = text.trim();
                if trimmed.eq_ignore_ascii_case("true") {
                    Ok(Value::Bool(true))
                } else if trimmed.eq_ignore_ascii_case("false") {
                    Ok(Value::Bool(false))
                } else {
                    Err(conversion_error(kind, text, "expected true or false"))
                }
            }
            ValueKind::Int => text
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|e| conversion_error(kind, text, e)),
            ValueKind::UInt => text
                .trim()
                .parse::<u64>()
                .map(Value::UInt)
                .map_err(|e| conversion_error(kind, text, e)),
            ValueKind::Float => text
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|e| conversion_error(kind, text, e)),
            ValueKind::Char => {
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(Value::Char(c)),
                    _ => Err(conversion_error(kind, text, "expected exactly one character")),
                }
            }
            ValueKind::Timestamp => parse_timestamp(text.trim())
                .map(Value::Timestamp)
                .ok_or_else(|| conversion_error(kind, text, "invalid timestamp")),
            ValueKind::Duration => parse_duration(text.trim())
                .map(Value::Duration)
                .ok_or_else(|| conversion_error(kind, text, "invalid duration")),
            ValueKind::Complex => serde_json::from_str(text)
                .map(Value::Complex)
                .map_err(|e| conversion_error(kind, text, e)),
        }
    }
}
