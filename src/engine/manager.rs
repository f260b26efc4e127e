//! Settings Manager
//!
//! The cache engine. Settings objects are loaded from the store on first use,
//! cached per type and kept current by [`refresh_changed`].
//!
//! Every operation runs under one engine-wide async lock that is held across
//! the store round-trip, so loads, saves and refresh cycles never interleave.
//!
//! [`refresh_changed`]: SettingsManager::refresh_changed

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::adapters::SystemClock;
use crate::domain::events::SettingsEvent;
use crate::domain::ports::{Clock, EventPublisher, SettingsStore, FLAGS_CATEGORY};
use crate::error::{Error, Result};
use crate::settings::{DefaultValueConverter, Settings, SettingsHandle, ValueConverter};

use super::config::ManagerConfig;
use super::flags::FlagMap;
use super::metrics::EngineMetrics;
use super::reconcile::{self, LiveSettings, ReconcileContext};
use super::throttle::ErrorWindow;

/// State guarded by the engine lock.
pub(super) struct EngineState {
    pub cache: HashMap<TypeId, Box<dyn LiveSettings>>,
    pub flags: FlagMap,
    pub watermark: DateTime<Utc>,
    pub errors: ErrorWindow,
}

impl EngineState {
    fn new(config: &ManagerConfig, now: DateTime<Utc>) -> Self {
        Self {
            cache: HashMap::new(),
            flags: FlagMap::new(),
            watermark: now,
            errors: ErrorWindow::new(config.repeating_error_window, now),
        }
    }

    fn cached<T: Settings>(&self) -> Option<SettingsHandle<T>> {
        self.cache
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.as_any().downcast_ref::<SettingsHandle<T>>())
            .cloned()
    }
}

/// Typed, cached settings engine over a [`SettingsStore`].
pub struct SettingsManager {
    pub(super) store: Arc<dyn SettingsStore>,
    pub(super) converter: Arc<dyn ValueConverter>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) publisher: Option<Arc<dyn EventPublisher>>,
    pub(super) config: ManagerConfig,
    pub(super) metrics: EngineMetrics,
    pub(super) state: Mutex<EngineState>,
}

impl SettingsManager {
    /// Create a manager with the default configuration, converter and clock.
    pub fn new(store: Arc<dyn SettingsStore>) -> Result<Self> {
        let config = ManagerConfig::default();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let now = clock.now();
        let metrics = EngineMetrics::new()?;
        metrics.set_watermark(now);

        Ok(Self {
            store,
            converter: Arc::new(DefaultValueConverter::new()),
            clock,
            publisher: None,
            state: Mutex::new(EngineState::new(&config, now)),
            config,
            metrics,
        })
    }

    pub fn with_config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self.reset_clock_state();
        self
    }

    pub fn with_converter(mut self, converter: Arc<dyn ValueConverter>) -> Self {
        self.converter = converter;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self.reset_clock_state();
        self
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    fn reset_clock_state(&mut self) {
        let now = self.clock.now();
        let state = self.state.get_mut();
        state.errors = ErrorWindow::new(self.config.repeating_error_window, now);
        state.watermark = now;
        self.metrics.set_watermark(now);
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    /// Exclusive lower bound of the next incremental read. Starts at the
    /// engine's creation time, so rows stored before startup are never replayed.
    pub async fn watermark(&self) -> DateTime<Utc> {
        self.state.lock().await.watermark
    }

    /// Categories of all cached settings types.
    pub async fn cached_categories(&self) -> Vec<&'static str> {
        let state = self.state.lock().await;
        let mut categories: Vec<_> = state.cache.values().map(|entry| entry.category()).collect();
        categories.sort_unstable();
        categories
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Cached settings object of type `T`, loading it on first use.
    #[instrument(skip(self), fields(category = T::CATEGORY))]
    pub async fn get<T: Settings>(&self) -> Result<SettingsHandle<T>> {
        self.load(false).await
    }

    /// Load a fresh `T` from the store.
    ///
    /// The first loaded object of a type stays the cached one; a forced load
    /// returns a new, unshared object when the type is already cached.
    #[instrument(skip(self), fields(category = T::CATEGORY))]
    pub async fn get_forced<T: Settings>(&self) -> Result<SettingsHandle<T>> {
        self.load(true).await
    }

    async fn load<T: Settings>(&self, force: bool) -> Result<SettingsHandle<T>> {
        if T::CATEGORY == FLAGS_CATEGORY {
            return Err(Error::ReservedCategory(T::CATEGORY.to_string()));
        }

        let mut guard = self.state.lock().await;
        if !force {
            if let Some(handle) = guard.cached::<T>() {
                return Ok(handle);
            }
        }

        let handle = SettingsHandle::new(T::default());
        let rows = self.store.read_category(T::CATEGORY).await?;
        let now = self.clock.now();

        if rows.is_empty() && self.config.auto_persist_on_create && !handle.is_read_only() {
            let defaults = reconcile::to_rows(&handle, self.converter.as_ref(), now)?;
            let inserted = self.store.write_rows(defaults).await?;
            debug!(category = T::CATEGORY, inserted, "Persisted default settings");
        }

        let state = &mut *guard;
        let mut events = Vec::new();
        let mut ctx = ReconcileContext {
            converter: self.converter.as_ref(),
            errors: &mut state.errors,
            events: &mut events,
            metrics: &self.metrics,
            now,
            strict: self.config.strict_field_errors,
        };
        let applied = reconcile::apply(&handle, &rows, &mut ctx);
        self.publish(events).await;
        let stats = applied?;

        state
            .cache
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(handle.clone()));
        self.metrics.set_cached_types(state.cache.len());

        debug!(
            category = T::CATEGORY,
            rows = rows.len(),
            failed = stats.failed,
            "Loaded settings"
        );
        Ok(handle)
    }

    // =========================================================================
    // Saving
    // =========================================================================

    /// Persist every writable field. Returns the number of newly inserted rows.
    #[instrument(skip(self, handle), fields(category = T::CATEGORY))]
    pub async fn save<T: Settings>(&self, handle: &SettingsHandle<T>) -> Result<usize> {
        let _guard = self.state.lock().await;
        self.write_all(handle).await
    }

    /// Persist one named field. Returns whether its row was newly inserted.
    #[instrument(skip(self, handle), fields(category = T::CATEGORY))]
    pub async fn save_field<T: Settings>(&self, handle: &SettingsHandle<T>, field: &str) -> Result<bool> {
        let _guard = self.state.lock().await;

        let row = reconcile::to_row(handle, field, self.converter.as_ref(), self.clock.now())?;
        if handle.is_read_only() {
            return Ok(false);
        }

        let inserted = self.store.write_row(row).await?;
        debug!(category = T::CATEGORY, field, inserted, "Saved settings field");
        Ok(inserted)
    }

    /// Apply `mutate` and persist the object, atomically with respect to
    /// refresh cycles and other saves.
    #[instrument(skip(self, handle, mutate), fields(category = T::CATEGORY))]
    pub async fn change_and_save<T, F>(&self, handle: &SettingsHandle<T>, mutate: F) -> Result<usize>
    where
        T: Settings,
        F: FnOnce(&mut T) + Send,
    {
        let _guard = self.state.lock().await;
        {
            let mut value = handle.write();
            mutate(&mut *value);
        }
        self.write_all(handle).await
    }

    async fn write_all<T: Settings>(&self, handle: &SettingsHandle<T>) -> Result<usize> {
        if handle.is_read_only() {
            return Ok(0);
        }

        let rows = reconcile::to_rows(handle, self.converter.as_ref(), self.clock.now())?;
        let count = rows.len();
        let inserted = self.store.write_rows(rows).await?;
        debug!(category = T::CATEGORY, rows = count, inserted, "Saved settings");
        Ok(inserted)
    }

    // =========================================================================
    // Flags
    // =========================================================================

    /// Whether the named flag is set. Unknown flags are unset.
    #[instrument(skip(self))]
    pub async fn is_flag_set(&self, name: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        if !state.flags.is_loaded() {
            let rows = self.store.read_category(FLAGS_CATEGORY).await?;
            state.flags.load(&rows);
            info!(count = rows.len(), "Loaded flags");
        }
        Ok(state.flags.is_set(name))
    }

    // =========================================================================
    // Events
    // =========================================================================

    pub(super) async fn publish(&self, events: Vec<SettingsEvent>) {
        if events.is_empty() {
            return;
        }
        if let Some(publisher) = &self.publisher {
            if let Err(e) = publisher.publish_all(events).await {
                warn!(error = %e, "Failed to publish settings events");
            }
        }
    }
}

impl std::fmt::Debug for SettingsManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsManager")
            .field("config", &self.config)
            .field("has_publisher", &self.publisher.is_some())
            .finish()
    }
}
