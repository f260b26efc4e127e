//! Settings Engine
//!
//! Cache, reconciliation and incremental refresh.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      SettingsManager                          │
//! │  ┌────────────┐  ┌────────────┐  ┌───────────┐  ┌─────────┐  │
//! │  │   cache    │  │  FlagMap   │  │ watermark │  │ Error   │  │
//! │  │ TypeId ──▶ │  │ name ──▶   │  │           │  │ Window  │  │
//! │  │  handle    │  │  bool      │  │           │  │         │  │
//! │  └────────────┘  └────────────┘  └───────────┘  └─────────┘  │
//! │               all guarded by one async mutex                  │
//! └──────────────────────────────────────────────────────────────┘
//!          │ read_category / read_changed / write_rows
//!          ▼
//!    SettingsStore
//! ```
//!
//! The refresh loop calls [`SettingsManager::refresh_changed`] once per tick,
//! reading only rows newer than the watermark.

mod config;
mod flags;
mod manager;
mod metrics;
mod reconcile;
mod refresh;
mod throttle;

pub use config::ManagerConfig;
pub use flags::{parse_flag, FlagMap};
pub use manager::SettingsManager;
pub use metrics::EngineMetrics;
pub use reconcile::ReconcileStats;
pub use refresh::RefreshReport;
pub use throttle::ErrorWindow;
