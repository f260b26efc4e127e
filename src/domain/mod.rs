//! Domain Layer
//!
//! Ports the settings engine depends on and the events it emits.
//!
//! - **Ports** (`ports.rs`) - `SettingsStore`, `Clock` and `EventPublisher`
//! - **Events** (`events.rs`) - `SettingsEvent`, consumed by logging and alerting
//!
//! # Usage
//!
//! ```ignore
//! use settings_sync::domain::ports::SettingsStore;
//!
//! async fn dump<S: SettingsStore>(store: &S) -> Result<()> {
//!     for row in store.read_category("Mail").await? {
//!         println!("{} = {:?}", row.name, row.value);
//!     }
//!     Ok(())
//! }
//! ```

pub mod events;
pub mod ports;

pub use events::SettingsEvent;
pub use ports::{Clock, EventPublisher, Row, SettingsStore, FLAGS_CATEGORY};
