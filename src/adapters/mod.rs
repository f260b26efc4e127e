//! Infrastructure Adapters
//!
//! Adapter implementations for the domain ports, following the
//! Port/Adapter (Hexagonal) architecture pattern.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Domain Layer                              │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │                    Ports (Traits)                           │ │
//! │  │       SettingsStore │ Clock │ EventPublisher                │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Adapters (This Module)                       │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │ MemoryStore │ FileStore │ SystemClock │ ManualClock        │ │
//! │  │ LoggingEventPublisher │ InMemoryEventCollector │ Composite │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use settings_sync::adapters::{FileStore, LoggingEventPublisher};
//! use settings_sync::SettingsManager;
//!
//! let store = Arc::new(FileStore::new("settings.yaml"));
//! let manager = SettingsManager::new(store)?
//!     .with_publisher(Arc::new(LoggingEventPublisher::info_level()));
//! ```

mod clock;
mod event_publisher;
mod file;
mod memory;

pub use clock::{ManualClock, SystemClock};
pub use event_publisher::{CompositeEventPublisher, InMemoryEventCollector, LoggingEventPublisher};
pub use file::{FileFormat, FileStore};
pub use memory::MemoryStore;
