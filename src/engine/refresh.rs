//! Incremental refresh
//!
//! Each cycle reads only the rows updated after the watermark, across every
//! cached category plus the flag category, and reconciles them into the live
//! objects. The background loop repeats this until its token is cancelled.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::domain::events::SettingsEvent;
use crate::domain::ports::{Row, FLAGS_CATEGORY};
use crate::error::Result;

use super::manager::{EngineState, SettingsManager};
use super::reconcile::{ReconcileContext, ReconcileStats};

/// Summary of one refresh cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshReport {
    /// Changed rows read from the store
    pub rows_read: usize,
    /// Field-level outcome across all cached objects
    pub fields: ReconcileStats,
    /// Flags whose value changed
    pub flags_changed: usize,
    /// Watermark after the cycle
    pub watermark: DateTime<Utc>,
}

impl SettingsManager {
    /// Run one refresh cycle.
    ///
    /// Failures are reported through a `RefreshFailed` event, classified as
    /// new or repeating, and also returned to the caller. The watermark only
    /// advances when the whole cycle succeeds.
    ///
    /// `RefreshStarting` belongs to the background loop's ticks and is not
    /// published by direct calls.
    #[instrument(skip(self))]
    pub async fn refresh_changed(&self) -> Result<RefreshReport> {
        let mut guard = self.state.lock().await;
        self.metrics.record_refresh_cycle();

        let state = &mut *guard;
        let mut events = Vec::new();
        let result = self.refresh_locked(state, &mut events).await;

        if let Err(e) = &result {
            let now = self.clock.now();
            let repeating = state.errors.observe(e.throttle_key(), now);
            if repeating {
                debug!(error = %e, "Refresh failed again");
            } else {
                error!(error = %e, "Refresh failed");
            }
            self.metrics.record_refresh_failure(repeating);
            events.push(SettingsEvent::refresh_failed(e, repeating, now));
        }

        self.publish(events).await;
        result
    }

    async fn refresh_locked(
        &self,
        state: &mut EngineState,
        events: &mut Vec<SettingsEvent>,
    ) -> Result<RefreshReport> {
        let mut categories: Vec<String> = state
            .cache
            .values()
            .map(|entry| entry.category().to_string())
            .collect();
        categories.push(FLAGS_CATEGORY.to_string());
        categories.sort_unstable();
        categories.dedup();

        let rows = self
            .store
            .read_changed(&categories, Some(state.watermark))
            .await?;
        if rows.is_empty() {
            debug!("No changed settings");
            return Ok(RefreshReport {
                watermark: state.watermark,
                ..Default::default()
            });
        }

        let mut by_category: HashMap<&str, Vec<Row>> = HashMap::new();
        for row in &rows {
            by_category
                .entry(row.category.as_str())
                .or_default()
                .push(row.clone());
        }

        let now = self.clock.now();
        let mut report = RefreshReport {
            rows_read: rows.len(),
            ..Default::default()
        };

        for entry in state.cache.values() {
            let Some(changed) = by_category.get(entry.category()) else {
                continue;
            };
            let mut ctx = ReconcileContext {
                converter: self.converter.as_ref(),
                errors: &mut state.errors,
                events: &mut *events,
                metrics: &self.metrics,
                now,
                strict: self.config.strict_field_errors_on_refresh,
            };
            report.fields += entry.apply_rows(changed, &mut ctx)?;
        }

        if let Some(flag_rows) = by_category.get(FLAGS_CATEGORY) {
            for row in flag_rows {
                if let Some(value) = state.flags.apply(row) {
                    info!(flag = %row.name, value, "Flag changed");
                    self.metrics.record_flag_change();
                    events.push(SettingsEvent::flag_changed(row.name.clone(), value, now));
                    report.flags_changed += 1;
                }
            }
        }

        // Store clocks running ahead must not push the watermark past now
        if let Some(newest) = rows.iter().map(|row| row.updated_at).max() {
            state.watermark = state.watermark.max(newest.min(now));
            self.metrics.set_watermark(state.watermark);
        }
        report.watermark = state.watermark;

        debug!(
            rows = report.rows_read,
            changed = report.fields.changed,
            flags = report.flags_changed,
            "Refreshed settings"
        );
        Ok(report)
    }

    /// Refresh every `interval` until `token` is cancelled.
    ///
    /// Errors never stop the loop. Cancellation interrupts a pending wait but
    /// never a cycle in progress. Publishes `RefreshStarting` before each cycle
    /// and one `RefreshLoopCanceled` on exit.
    pub async fn run_refresh_loop(&self, interval: Duration, token: CancellationToken) {
        info!(?interval, "Starting settings refresh loop");

        loop {
            if token.is_cancelled() {
                break;
            }

            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }

            if token.is_cancelled() {
                break;
            }

            self.publish(vec![SettingsEvent::refresh_starting(self.clock.now())])
                .await;
            // Already reported through events and the error window
            let _ = self.refresh_changed().await;
        }

        info!("Settings refresh loop canceled");
        self.publish(vec![SettingsEvent::refresh_loop_canceled(self.clock.now())])
            .await;
    }

    /// Spawn [`run_refresh_loop`](Self::run_refresh_loop) with the configured
    /// interval. Run at most one loop per manager.
    pub fn spawn_refresh_loop(self: &Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        let interval = self.config.refresh_interval;
        tokio::spawn(async move { manager.run_refresh_loop(interval, token).await })
    }
}
