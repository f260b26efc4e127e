//! Settings schema
//!
//! Settings types register an explicit, ordered list of [`Field`]
//! descriptors. Rows are matched to fields by name.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

use super::value::mismatch;
use super::{FieldValue, Value, ValueKind};

type ReadFn<T> = Box<dyn Fn(&T) -> Result<Value> + Send + Sync>;

/// Assigns a converted value. The callback receives `(old, new)` and runs
/// before the assignment, only when the value actually differs.
type WriteFn<T> = Box<dyn Fn(&mut T, Value, &mut dyn FnMut(Value, Value)) -> Result<()> + Send + Sync>;

/// A typed settings object that can be cached by the engine.
///
/// # Example
///
/// ```
/// use settings_sync::settings::{Field, Settings};
///
/// #[derive(Debug, Default)]
/// struct MailSettings {
///     host: String,
///     port: u16,
/// }
///
/// impl Settings for MailSettings {
///     const CATEGORY: &'static str = "Mail";
///
///     fn fields() -> Vec<Field<Self>> {
///         vec![
///             Field::value("Host", |s: &Self| &s.host, |s: &mut Self| &mut s.host),
///             Field::value("Port", |s: &Self| &s.port, |s: &mut Self| &mut s.port),
///         ]
///     }
/// }
/// ```
pub trait Settings: Default + Send + Sync + 'static {
    /// Category under which this type's rows are stored.
    const CATEGORY: &'static str;

    /// Ordered field schema.
    fn fields() -> Vec<Field<Self>>;

    /// When true, the object is never persisted.
    fn read_only(&self) -> bool {
        false
    }
}

/// Descriptor of one named settings field.
pub struct Field<T> {
    name: &'static str,
    kind: ValueKind,
    read: ReadFn<T>,
    write: Option<WriteFn<T>>,
}

impl<T: 'static> Field<T> {
    /// Field of a type with a direct [`ValueKind`] mapping.
    pub fn value<V: FieldValue>(
        name: &'static str,
        get: fn(&T) -> &V,
        get_mut: fn(&mut T) -> &mut V,
    ) -> Self {
        Self::with_codec(
            name,
            V::KIND,
            get,
            get_mut,
            |v: &V| Ok(v.to_value()),
            V::from_value,
        )
    }

    /// Field stored through `Display` / `FromStr`, e.g. a fieldless enum.
    pub fn parsed<V>(name: &'static str, get: fn(&T) -> &V, get_mut: fn(&mut T) -> &mut V) -> Self
    where
        V: FromStr + fmt::Display + PartialEq + Send + Sync + 'static,
        V::Err: fmt::Display,
    {
        Self::with_codec(
            name,
            ValueKind::Text,
            get,
            get_mut,
            |v: &V| Ok(Value::Text(v.to_string())),
            |value: Value| match value {
                Value::Text(text) => text.parse::<V>().map_err(|e| Error::Conversion {
                    kind: ValueKind::Text,
                    text,
                    reason: e.to_string(),
                }),
                other => Err(mismatch(std::any::type_name::<V>(), &other)),
            },
        )
    }

    /// Field stored as serialized JSON. The type's own `PartialEq` decides
    /// whether an incoming value is a change.
    pub fn json<V>(name: &'static str, get: fn(&T) -> &V, get_mut: fn(&mut T) -> &mut V) -> Self
    where
        V: Serialize + DeserializeOwned + PartialEq + Send + Sync + 'static,
    {
        Self::with_codec(
            name,
            ValueKind::Complex,
            get,
            get_mut,
            |v: &V| Ok(Value::Complex(serde_json::to_value(v)?)),
            |value: Value| match value {
                Value::Complex(json) => Ok(serde_json::from_value(json)?),
                Value::Null => Ok(serde_json::from_value(serde_json::Value::Null)?),
                other => Err(mismatch(std::any::type_name::<V>(), &other)),
            },
        )
    }

    /// Readable but not writable field. Skipped by reconciliation and saves.
    pub fn computed(name: &'static str, kind: ValueKind, get: fn(&T) -> Value) -> Self {
        Self {
            name,
            kind,
            read: Box::new(move |target: &T| Ok(get(target))),
            write: None,
        }
    }

    fn with_codec<V>(
        name: &'static str,
        kind: ValueKind,
        get: fn(&T) -> &V,
        get_mut: fn(&mut T) -> &mut V,
        encode: fn(&V) -> Result<Value>,
        decode: fn(Value) -> Result<V>,
    ) -> Self
    where
        V: PartialEq + Send + Sync + 'static,
    {
        Self {
            name,
            kind,
            read: Box::new(move |target: &T| encode(get(target))),
            write: Some(Box::new(
                move |target: &mut T,
                      incoming: Value,
                      notify: &mut dyn FnMut(Value, Value)|
                      -> Result<()> {
                    let decoded = decode(incoming.clone())?;
                    let slot = get_mut(target);
                    if *slot != decoded {
                        notify(encode(slot)?, incoming);
                        *slot = decoded;
                    }
                    Ok(())
                },
            )),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn is_writable(&self) -> bool {
        self.write.is_some()
    }

    /// Current value of this field on `target`.
    pub fn get(&self, target: &T) -> Result<Value> {
        (self.read)(target)
    }

    /// Assign `value`, invoking `on_change(old, new)` first if it differs.
    /// Returns `Ok(false)` without touching `target` for non-writable fields.
    pub fn set(
        &self,
        target: &mut T,
        value: Value,
        on_change: &mut dyn FnMut(Value, Value),
    ) -> Result<bool> {
        match &self.write {
            Some(write) => {
                write(target, value, on_change)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl<T> fmt::Debug for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("writable", &self.write.is_some())
            .finish()
    }
}
