//! Shared settings handles
//!
//! The engine hands out [`SettingsHandle`]s: cheap clones of one live settings
//! object that the background refresh reconciles in place.

use std::any::type_name;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::{Field, Settings, Value};

/// Capacity of the per-object change channel.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// A single field change applied from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub category: String,
    pub settings_type: String,
    pub field: String,
    pub old_value: Value,
    pub new_value: Value,
}

impl FieldChange {
    /// Whether this change is about `field` of settings type `T`.
    pub fn is<T: Settings>(&self, field: &str) -> bool {
        self.settings_type == type_name::<T>() && self.field == field
    }
}

struct Inner<T> {
    value: RwLock<T>,
    schema: Vec<Field<T>>,
    changes: broadcast::Sender<FieldChange>,
}

/// Shared handle to a live settings object.
pub struct SettingsHandle<T: Settings> {
    inner: Arc<Inner<T>>,
}

impl<T: Settings> Clone for SettingsHandle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Settings> SettingsHandle<T> {
    /// Wrap a settings value. The field schema is built once per handle.
    pub fn new(value: T) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                value: RwLock::new(value),
                schema: T::fields(),
                changes,
            }),
        }
    }

    pub fn category(&self) -> &'static str {
        T::CATEGORY
    }

    /// Read access to the fields. Do not hold across an await point.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.inner.value.read()
    }

    /// Direct write access to the fields. Changes are in memory only until saved.
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.inner.value.write()
    }

    /// Clone of the current field values.
    pub fn snapshot(&self) -> T
    where
        T: Clone,
    {
        self.inner.value.read().clone()
    }

    pub fn is_read_only(&self) -> bool {
        self.inner.value.read().read_only()
    }

    /// Subscribe to changes applied to this object by the engine.
    pub fn subscribe(&self) -> broadcast::Receiver<FieldChange> {
        self.inner.changes.subscribe()
    }

    /// Whether both handles point at the same live object.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn fields(&self) -> &[Field<T>] {
        &self.inner.schema
    }

    pub fn field(&self, name: &str) -> Option<&Field<T>> {
        self.inner.schema.iter().find(|field| field.name() == name)
    }

    pub(crate) fn notify(&self, change: FieldChange) {
        // No receivers is not an error
        let _ = self.inner.changes.send(change);
    }
}

impl<T: Settings + std::fmt::Debug> std::fmt::Debug for SettingsHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsHandle")
            .field("category", &T::CATEGORY)
            .field("value", &*self.inner.value.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default)]
    struct Sample {
        text: String,
    }

    impl Settings for Sample {
        const CATEGORY: &'static str = "Sample";

        fn fields() -> Vec<Field<Self>> {
            vec![Field::value("Text", |s: &Self| &s.text, |s: &mut Self| &mut s.text)]
        }
    }

    #[test]
    fn test_clones_share_state() {
        let handle = SettingsHandle::new(Sample::default());
        let other = handle.clone();

        other.write().text = "shared".into();

        assert_eq!(handle.read().text, "shared");
        assert!(handle.ptr_eq(&other));
        assert!(!handle.ptr_eq(&SettingsHandle::new(Sample::default())));
    }

    #[test]
    fn test_schema_lookup() {
        let handle = SettingsHandle::new(Sample::default());

        assert_eq!(handle.category(), "Sample");
        assert_eq!(handle.fields().len(), 1);
        assert!(handle.field("Text").is_some());
        assert!(handle.field("Missing").is_none());
        assert!(!handle.is_read_only());
    }

    #[tokio::test]
    async fn test_subscribe_receives_changes() {
        let handle = SettingsHandle::new(Sample::default());
        let mut rx = handle.subscribe();

        handle.notify(FieldChange {
            category: "Sample".into(),
            settings_type: type_name::<Sample>().into(),
            field: "Text".into(),
            old_value: Value::Text(String::new()),
            new_value: Value::Text("new".into()),
        });

        let change = rx.recv().await.unwrap();
        assert!(change.is::<Sample>("Text"));
        assert!(!change.is::<Sample>("Other"));
        assert_eq!(change.new_value, Value::Text("new".into()));
    }
}
