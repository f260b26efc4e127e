//! settings-sync - Typed, Cached Settings Distribution
//!
//! Application code asks for a strongly-typed settings object; the engine
//! loads it from a backing store on first use, caches it and keeps it fresh
//! by periodically re-reading only the rows that changed. Boolean flags share
//! the same freshness semantics.
//!
//! # Architecture
//!
//! ```text
//! SettingsStore ──rows──▶ SettingsManager ──handles──▶ application
//!       ▲                  │  cache / flags / watermark
//!       └──write_rows──────┘  refresh loop (CancellationToken)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use settings_sync::adapters::MemoryStore;
//! use settings_sync::settings::{Field, Settings};
//! use settings_sync::SettingsManager;
//!
//! #[derive(Debug, Default)]
//! struct Limits {
//!     max_items: u32,
//! }
//!
//! impl Settings for Limits {
//!     const CATEGORY: &'static str = "Limits";
//!
//!     fn fields() -> Vec<Field<Self>> {
//!         vec![Field::value("MaxItems", |s: &Self| &s.max_items, |s: &mut Self| &mut s.max_items)]
//!     }
//! }
//!
//! # async fn run() -> settings_sync::Result<()> {
//! let manager = SettingsManager::new(Arc::new(MemoryStore::new()))?;
//! let limits = manager.get::<Limits>().await?;
//! println!("max items: {}", limits.read().max_items);
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`adapters`] - Store, clock and event publisher implementations
//! - [`domain`] - Ports and engine events
//! - [`engine`] - Cache engine, reconciliation and incremental refresh
//! - [`error`] - Error types
//! - [`settings`] - Settings types, field schema and value conversion

pub mod adapters;
pub mod domain;
pub mod engine;
pub mod error;
pub mod settings;

// Re-export commonly used types
pub use domain::{Row, SettingsEvent, SettingsStore, FLAGS_CATEGORY};
pub use engine::{ManagerConfig, RefreshReport, SettingsManager};
pub use error::{Error, Result};
pub use settings::{Field, FieldChange, Settings, SettingsHandle, Value, ValueKind};
