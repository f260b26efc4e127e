//! Domain Ports (Port/Adapter Pattern)
//!
//! Core abstractions the settings engine depends on. Infrastructure adapters
//! implement these traits.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Settings Engine                        │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                    Ports (Traits)                    │    │
//! │  │     SettingsStore │ Clock │ EventPublisher           │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Infrastructure Layer                       │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                  Adapters (Impls)                    │    │
//! │  │  MemoryStore │ FileStore │ SystemClock │ Publishers  │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::events::SettingsEvent;
use crate::error::Result;

/// Reserved category holding boolean flags.
pub const FLAGS_CATEGORY: &str = "Flag";

// =============================================================================
// Value Objects
// =============================================================================

/// One stored setting.
///
/// Identity is `(category, name)`. A `None` value and an empty string are
/// distinct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub category: String,
    pub name: String,
    pub value: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Row {
    pub fn new(
        category: impl Into<String>,
        name: impl Into<String>,
        value: Option<String>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            category: category.into(),
            name: name.into(),
            value,
            updated_at,
        }
    }

    /// Whether this row has the same identity as `other`.
    pub fn same_key(&self, other: &Row) -> bool {
        self.category == other.category && self.name == other.name
    }
}

// =============================================================================
// Port Traits
// =============================================================================

/// Durable key-value row store.
///
/// Writes upsert by `(category, name)`. Implementations decide whether
/// `updated_at` is taken from the row or assigned by the store, but must do
/// so consistently.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// All rows of one category.
    async fn read_category(&self, category: &str) -> Result<Vec<Row>> {
        self.read_changed(&[category.to_string()], None).await
    }

    /// Rows of the given categories updated strictly after `since`.
    /// `None` means no lower bound.
    async fn read_changed(
        &self,
        categories: &[String],
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Row>>;

    /// Upsert one row. Returns true when the row was newly inserted.
    async fn write_row(&self, row: Row) -> Result<bool>;

    /// Upsert many rows. Returns how many were newly inserted.
    async fn write_rows(&self, rows: Vec<Row>) -> Result<usize> {
        let mut inserted = 0;
        for row in rows {
            if self.write_row(row).await? {
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}

/// Source of "now" for row stamps, watermark clamping and error windows.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Port for publishing engine events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an event.
    async fn publish(&self, event: SettingsEvent) -> Result<()>;

    /// Publish multiple events in order.
    async fn publish_all(&self, events: Vec<SettingsEvent>) -> Result<()> {
        for event in events {
            self.publish(event).await?;
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
