//! In-memory settings store
//!
//! Keeps rows in a concurrent map. Timestamps are assigned by the store from
//! its clock, and an upsert with an unchanged value leaves the row untouched
//! so it does not show up in the next incremental read.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::trace;

use crate::domain::ports::{Clock, Row, SettingsStore};
use crate::error::{Error, Result};

use super::SystemClock;

/// Settings store backed by process memory.
pub struct MemoryStore {
    rows: DashMap<(String, String), Row>,
    clock: Arc<dyn Clock>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            rows: DashMap::new(),
            clock,
            unavailable: AtomicBool::new(false),
        }
    }

    /// Insert or replace a row verbatim, keeping its `updated_at`.
    pub fn insert_row(&self, row: Row) {
        self.rows
            .insert((row.category.clone(), row.name.clone()), row);
    }

    /// Simulate an outage: every read and write fails while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// All rows, ordered by category and name.
    pub fn rows(&self) -> Vec<Row> {
        let mut rows: Vec<Row> = self.rows.iter().map(|entry| entry.value().clone()).collect();
        rows.sort_by(|a, b| (&a.category, &a.name).cmp(&(&b.category, &b.name)));
        rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::Store("memory store is unavailable".to_string()));
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("rows", &self.rows.len())
            .finish()
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn read_changed(
        &self,
        categories: &[String],
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Row>> {
        self.check_available()?;
        let mut rows: Vec<Row> = self
            .rows
            .iter()
            .filter(|entry| categories.contains(&entry.category))
            .filter(|entry| since.map_or(true, |since| entry.updated_at > since))
            .map(|entry| entry.value().clone())
            .collect();
        rows.sort_by_key(|row| row.updated_at);
        Ok(rows)
    }

    async fn write_row(&self, row: Row) -> Result<bool> {
        self.check_available()?;
        let now = self.clock.now();

        match self.rows.entry((row.category.clone(), row.name.clone())) {
            Entry::Occupied(mut existing) => {
                if existing.get().value != row.value {
                    let stored = existing.get_mut();
                    stored.value = row.value;
                    stored.updated_at = now;
                    trace!(category = %row.category, name = %row.name, "Updated row");
                }
                Ok(false)
            }
            Entry::Vacant(slot) => {
                trace!(category = %row.category, name = %row.name, "Inserted row");
                slot.insert(Row {
                    updated_at: now,
                    ..row
                });
                Ok(true)
            }
        }
    }
}
