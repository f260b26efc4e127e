//! Engine Events
//!
//! Immutable records of things the settings engine did. They are handed to
//! the configured [`EventPublisher`](super::ports::EventPublisher) in the
//! order they happened, while the engine lock is still held.
//!
//! # Example
//!
//! ```ignore
//! let event = SettingsEvent::flag_changed("Maintenance", true, clock.now());
//! publisher.publish(event).await?;
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::settings::{FieldChange, Value};

/// Event emitted by the settings engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SettingsEvent {
    // =========================================================================
    // Reconciliation Events
    // =========================================================================
    /// A stored value replaced a field's current value.
    FieldChanged {
        category: String,
        settings_type: String,
        field: String,
        old_value: Value,
        new_value: Value,
        timestamp: DateTime<Utc>,
    },

    /// A stored value could not be applied to a field.
    FieldError {
        category: String,
        field: String,
        error: String,
        error_kind: String,
        is_repeating: bool,
        timestamp: DateTime<Utc>,
    },

    // =========================================================================
    // Refresh Events
    // =========================================================================
    /// A refresh cycle is about to read changed rows.
    RefreshStarting { timestamp: DateTime<Utc> },

    /// A refresh cycle failed.
    RefreshFailed {
        error: String,
        error_kind: String,
        is_repeating: bool,
        timestamp: DateTime<Utc>,
    },

    /// The background refresh loop stopped after cancellation.
    RefreshLoopCanceled { timestamp: DateTime<Utc> },

    // =========================================================================
    // Flag Events
    // =========================================================================
    /// A flag's boolean value changed.
    FlagChanged {
        flag: String,
        value: bool,
        timestamp: DateTime<Utc>,
    },
}

impl SettingsEvent {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            SettingsEvent::FieldChanged { timestamp, .. } => *timestamp,
            SettingsEvent::FieldError { timestamp, .. } => *timestamp,
            SettingsEvent::RefreshStarting { timestamp } => *timestamp,
            SettingsEvent::RefreshFailed { timestamp, .. } => *timestamp,
            SettingsEvent::RefreshLoopCanceled { timestamp } => *timestamp,
            SettingsEvent::FlagChanged { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            SettingsEvent::FieldChanged { .. } => "FieldChanged",
            SettingsEvent::FieldError { .. } => "FieldError",
            SettingsEvent::RefreshStarting { .. } => "RefreshStarting",
            SettingsEvent::RefreshFailed { .. } => "RefreshFailed",
            SettingsEvent::RefreshLoopCanceled { .. } => "RefreshLoopCanceled",
            SettingsEvent::FlagChanged { .. } => "FlagChanged",
        }
    }

    /// Get the settings category if applicable.
    pub fn category(&self) -> Option<&str> {
        match self {
            SettingsEvent::FieldChanged { category, .. } => Some(category),
            SettingsEvent::FieldError { category, .. } => Some(category),
            _ => None,
        }
    }

    /// Whether this event reports a failure already seen in the current window.
    pub fn is_repeating(&self) -> bool {
        match self {
            SettingsEvent::FieldError { is_repeating, .. } => *is_repeating,
            SettingsEvent::RefreshFailed { is_repeating, .. } => *is_repeating,
            _ => false,
        }
    }
}

// =============================================================================
// Event Builders
// =============================================================================

impl SettingsEvent {
    /// Create a FieldChanged event from an applied change.
    pub fn field_changed(change: &FieldChange, at: DateTime<Utc>) -> Self {
        SettingsEvent::FieldChanged {
            category: change.category.clone(),
            settings_type: change.settings_type.clone(),
            field: change.field.clone(),
            old_value: change.old_value.clone(),
            new_value: change.new_value.clone(),
            timestamp: at,
        }
    }

    /// Create a FieldError event. `error` is the unwrapped field failure.
    pub fn field_error(
        category: impl Into<String>,
        field: impl Into<String>,
        error: &Error,
        is_repeating: bool,
        at: DateTime<Utc>,
    ) -> Self {
        SettingsEvent::FieldError {
            category: category.into(),
            field: field.into(),
            error: error.to_string(),
            error_kind: error.kind().to_string(),
            is_repeating,
            timestamp: at,
        }
    }

    /// Create a RefreshStarting event.
    pub fn refresh_starting(at: DateTime<Utc>) -> Self {
        SettingsEvent::RefreshStarting { timestamp: at }
    }

    /// Create a RefreshFailed event.
    pub fn refresh_failed(error: &Error, is_repeating: bool, at: DateTime<Utc>) -> Self {
        SettingsEvent::RefreshFailed {
            error: error.to_string(),
            error_kind: error.kind().to_string(),
            is_repeating,
            timestamp: at,
        }
    }

    /// Create a RefreshLoopCanceled event.
    pub fn refresh_loop_canceled(at: DateTime<Utc>) -> Self {
        SettingsEvent::RefreshLoopCanceled { timestamp: at }
    }

    /// Create a FlagChanged event.
    pub fn flag_changed(flag: impl Into<String>, value: bool, at: DateTime<Utc>) -> Self {
        SettingsEvent::FlagChanged {
            flag: flag.into(),
            value,
            timestamp: at,
        }
    }
}
