//! Repeating-error window
//!
//! Classifies failures as new or repeating so a failure that recurs every
//! refresh tick is reported loudly once per window instead of on every tick.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

/// Rolling set of failure keys seen since the last flush.
#[derive(Debug, Clone)]
pub struct ErrorWindow {
    last_flush: DateTime<Utc>,
    window: TimeDelta,
    seen: HashSet<String>,
}

impl ErrorWindow {
    pub fn new(window: Duration, now: DateTime<Utc>) -> Self {
        Self {
            last_flush: now,
            window: TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX),
            seen: HashSet::new(),
        }
    }

    pub fn window(&self) -> TimeDelta {
        self.window
    }

    pub fn last_flush(&self) -> DateTime<Utc> {
        self.last_flush
    }

    /// Record a failure key.
    pub fn add(&mut self, key: impl Into<String>) {
        self.seen.insert(key.into());
    }

    /// Whether the key was recorded since the last flush.
    pub fn contains(&self, key: &str) -> bool {
        self.seen.contains(key)
    }

    /// Clear the window if more than `window` has elapsed since the last flush.
    /// Returns true when a flush happened.
    pub fn flush_if_expired(&mut self, now: DateTime<Utc>) -> bool {
        let expired = match now.signed_duration_since(self.last_flush).checked_sub(&self.window) {
            Some(over) => over > TimeDelta::zero(),
            None => false,
        };
        if expired {
            self.seen.clear();
            self.last_flush = now;
        }
        expired
    }

    /// Flush if expired, then classify and record `key`.
    /// Returns true when the key was already seen in the current window.
    pub fn observe(&mut self, key: String, now: DateTime<Utc>) -> bool {
        self.flush_if_expired(now);
        let repeating = self.contains(&key);
        self.add(key);
        repeating
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
