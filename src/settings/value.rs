//! Dynamic field values
//!
//! A [`Value`] is the type-erased form of a settings field. Fields convert
//! their Rust value into a `Value` for persistence and change notifications,
//! and the [`ValueConverter`](super::ValueConverter) maps values to and from
//! the textual row representation.

use chrono::{DateTime, Datelike, SecondsFormat, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// =============================================================================
// Value Kind
// =============================================================================

/// Type tag of a settings field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Bool,
    Int,
    UInt,
    Float,
    Char,
    Text,
    Timestamp,
    Duration,
    /// Anything the converter cannot coerce directly; stored serialized.
    Complex,
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::UInt => "uint",
            ValueKind::Float => "float",
            ValueKind::Char => "char",
            ValueKind::Text => "text",
            ValueKind::Timestamp => "timestamp",
            ValueKind::Duration => "duration",
            ValueKind::Complex => "complex",
        };
        write!(f, "{}", name)
    }
}

// =============================================================================
// Value
// =============================================================================

/// A type-erased field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Char(char),
    Text(String),
    Timestamp(DateTime<Utc>),
    Duration(#[serde(with = "duration_text")] TimeDelta),
    Complex(serde_json::Value),
}

impl Value {
    /// Kind of this value, `None` for [`Value::Null`].
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(ValueKind::Bool),
            Value::Int(_) => Some(ValueKind::Int),
            Value::UInt(_) => Some(ValueKind::UInt),
            Value::Float(_) => Some(ValueKind::Float),
            Value::Char(_) => Some(ValueKind::Char),
            Value::Text(_) => Some(ValueKind::Text),
            Value::Timestamp(_) => Some(ValueKind::Timestamp),
            Value::Duration(_) => Some(ValueKind::Duration),
            Value::Complex(_) => Some(ValueKind::Complex),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

pub(crate) fn mismatch(expected: &str, found: &Value) -> Error {
    let found = match found.kind() {
        Some(kind) => kind.to_string(),
        None => "null".to_string(),
    };
    Error::TypeMismatch {
        expected: expected.to_string(),
        found,
    }
}

// =============================================================================
// Field Value
// =============================================================================

/// Rust types that map directly onto a [`ValueKind`].
///
/// Equality of the Rust type decides whether a stored value counts as a change.
pub trait FieldValue: PartialEq + Send + Sync + 'static {
    /// Kind used when converting stored text into this type.
    const KIND: ValueKind;

    fn to_value(&self) -> Value;

    fn from_value(value: Value) -> Result<Self>
    where
        Self: Sized;
}

macro_rules! signed_field_value {
    ($($t:ty),*) => {$(
        impl FieldValue for $t {
            const KIND: ValueKind = ValueKind::Int;

            fn to_value(&self) -> Value {
                Value::Int(i64::from(*self))
            }

            fn from_value(value: Value) -> Result<Self> {
                match value {
                    Value::Int(v) => <$t>::try_from(v).map_err(|_| Error::TypeMismatch {
                        expected: stringify!($t).to_string(),
                        found: v.to_string(),
                    }),
                    other => Err(mismatch(stringify!($t), &other)),
                }
            }
        }
    )*};
}

macro_rules! unsigned_field_value {
    ($($t:ty),*) => {$(
        impl FieldValue for $t {
            const KIND: ValueKind = ValueKind::UInt;

            fn to_value(&self) -> Value {
                Value::UInt(u64::from(*self))
            }

            fn from_value(value: Value) -> Result<Self> {
                match value {
                    Value::UInt(v) => <$t>::try_from(v).map_err(|_| Error::TypeMismatch {
                        expected: stringify!($t).to_string(),
                        found: v.to_string(),
                    }),
                    other => Err(mismatch(stringify!($t), &other)),
                }
            }
        }
    )*};
}

signed_field_value!(i8, i16, i32, i64);
unsigned_field_value!(u8, u16, u32, u64);

impl FieldValue for bool {
    const KIND: ValueKind = ValueKind::Bool;

    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Bool(v) => Ok(v),
            other => Err(mismatch("bool", &other)),
        }
    }
}

impl FieldValue for f64 {
    const KIND: ValueKind = ValueKind::Float;

    fn to_value(&self) -> Value {
        Value::Float(*self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Float(v) => Ok(v),
            other => Err(mismatch("f64", &other)),
        }
    }
}

impl FieldValue for f32 {
    const KIND: ValueKind = ValueKind::Float;

    fn to_value(&self) -> Value {
        Value::Float(f64::from(*self))
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            // Values written from an f32 field narrow back exactly.
            Value::Float(v) => {
                let narrowed = v as f32;
                if v.is_finite() && !narrowed.is_finite() {
                    return Err(Error::TypeMismatch {
                        expected: "f32".to_string(),
                        found: v.to_string(),
                    });
                }
                Ok(narrowed)
            }
            other => Err(mismatch("f32", &other)),
        }
    }
}

impl FieldValue for char {
    const KIND: ValueKind = ValueKind::Char;

    fn to_value(&self) -> Value {
        Value::Char(*self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Char(v) => Ok(v),
            other => Err(mismatch("char", &other)),
        }
    }
}

impl FieldValue for String {
    const KIND: ValueKind = ValueKind::Text;

    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Text(v) => Ok(v),
            other => Err(mismatch("String", &other)),
        }
    }
}

impl FieldValue for DateTime<Utc> {
    const KIND: ValueKind = ValueKind::Timestamp;

    fn to_value(&self) -> Value {
        Value::Timestamp(*self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Timestamp(v) => Ok(v),
            other => Err(mismatch("DateTime<Utc>", &other)),
        }
    }
}

impl FieldValue for TimeDelta {
    const KIND: ValueKind = ValueKind::Duration;

    fn to_value(&self) -> Value {
        Value::Duration(*self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Duration(v) => Ok(v),
            other => Err(mismatch("TimeDelta", &other)),
        }
    }
}

impl FieldValue for std::time::Duration {
    const KIND: ValueKind = ValueKind::Duration;

    fn to_value(&self) -> Value {
        // Saturates for durations beyond TimeDelta::MAX
        Value::Duration(TimeDelta::from_std(*self).unwrap_or(TimeDelta::MAX))
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Duration(v) => v.to_std().map_err(|_| Error::TypeMismatch {
                expected: "std::time::Duration".to_string(),
                found: format_duration(&v),
            }),
            other => Err(mismatch("std::time::Duration", &other)),
        }
    }
}

impl<V: FieldValue> FieldValue for Option<V> {
    const KIND: ValueKind = V::KIND;

    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => V::from_value(other).map(Some),
        }
    }
}

// =============================================================================
// Text Formats
// =============================================================================

/// Formats a duration as `[-]<seconds>.<nanoseconds>`.
pub(crate) fn format_duration(delta: &TimeDelta) -> String {
    let (sign, abs) = if *delta < TimeDelta::zero() {
        ("-", -*delta)
    } else {
        ("", *delta)
    };
    format!("{}{}.{:09}", sign, abs.num_seconds(), abs.subsec_nanos())
}

pub(crate) fn parse_duration(text: &str) -> Option<TimeDelta> {
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (secs, nanos) = split_fraction(body)?;
    if secs < 0 {
        return None;
    }
    let delta = TimeDelta::try_seconds(secs)?.checked_add(&TimeDelta::nanoseconds(i64::from(nanos)))?;
    Some(if negative { -delta } else { delta })
}

/// Formats a timestamp as RFC 3339, or as `@<unix seconds>.<nanoseconds>` for
/// years RFC 3339 cannot express.
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    if (0..=9999).contains(&ts.year()) {
        ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    } else {
        format!("@{}.{:09}", ts.timestamp(), ts.timestamp_subsec_nanos())
    }
}

pub(crate) fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    match text.strip_prefix('@') {
        Some(epoch) => {
            let (negative, body) = match epoch.strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, epoch),
            };
            let (secs, nanos) = split_fraction(body)?;
            let secs = if negative { -secs } else { secs };
            DateTime::from_timestamp(secs, nanos)
        }
        None => DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|ts| ts.with_timezone(&Utc)),
    }
}

/// Splits `<int>[.<fraction>]` into whole units and nanoseconds.
fn split_fraction(text: &str) -> Option<(i64, u32)> {
    let (whole, fraction) = text.split_once('.').unwrap_or((text, "0"));
    if whole.is_empty() || fraction.is_empty() || fraction.len() > 9 {
        return None;
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let whole: i64 = whole.parse().ok()?;
    let nanos: u32 = format!("{:0<9}", fraction).parse().ok()?;
    Some((whole, nanos))
}

mod duration_text {
    use chrono::TimeDelta;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(delta: &TimeDelta, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(delta))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<TimeDelta, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::parse_duration(&text)
            .ok_or_else(|| de::Error::custom(format!("invalid duration: {}", text)))
    }
}
