//! Engine Metrics
//!
//! Prometheus counters and gauges for refresh health. Every engine owns its
//! own [`Registry`] so several engines can live in one process.

use chrono::{DateTime, Utc};
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};

use super::reconcile::ReconcileStats;

const NAMESPACE: &str = "settings_sync";

fn classification(repeating: bool) -> &'static str {
    if repeating {
        "repeating"
    } else {
        "new"
    }
}

/// Metrics collector for one settings engine.
#[derive(Clone)]
pub struct EngineMetrics {
    registry: Registry,
    refresh_cycles: IntCounter,
    refresh_failures: IntCounterVec,
    rows_applied: IntCounter,
    field_changes: IntCounter,
    field_errors: IntCounterVec,
    flag_changes: IntCounter,
    cached_types: IntGauge,
    watermark: IntGauge,
}

impl EngineMetrics {
    pub fn new() -> crate::error::Result<Self> {
        let registry = Registry::new();

        let refresh_cycles = IntCounter::with_opts(
            Opts::new("refresh_cycles_total", "Total number of refresh cycles").namespace(NAMESPACE),
        )?;
        let refresh_failures = IntCounterVec::new(
            Opts::new("refresh_failures_total", "Total number of failed refresh cycles")
                .namespace(NAMESPACE),
            &["classification"],
        )?;
        let rows_applied = IntCounter::with_opts(
            Opts::new("rows_applied_total", "Stored rows matched to a settings field")
                .namespace(NAMESPACE),
        )?;
        let field_changes = IntCounter::with_opts(
            Opts::new("field_changes_total", "Settings fields changed by stored values")
                .namespace(NAMESPACE),
        )?;
        let field_errors = IntCounterVec::new(
            Opts::new("field_errors_total", "Stored values that could not be applied")
                .namespace(NAMESPACE),
            &["classification"],
        )?;
        let flag_changes = IntCounter::with_opts(
            Opts::new("flag_changes_total", "Flags whose value changed").namespace(NAMESPACE),
        )?;
        let cached_types = IntGauge::with_opts(
            Opts::new("cached_types", "Number of cached settings types").namespace(NAMESPACE),
        )?;
        let watermark = IntGauge::with_opts(
            Opts::new("watermark_seconds", "Refresh watermark as unix seconds").namespace(NAMESPACE),
        )?;

        registry.register(Box::new(refresh_cycles.clone()))?;
        registry.register(Box::new(refresh_failures.clone()))?;
        registry.register(Box::new(rows_applied.clone()))?;
        registry.register(Box::new(field_changes.clone()))?;
        registry.register(Box::new(field_errors.clone()))?;
        registry.register(Box::new(flag_changes.clone()))?;
        registry.register(Box::new(cached_types.clone()))?;
        registry.register(Box::new(watermark.clone()))?;

        Ok(Self {
            registry,
            refresh_cycles,
            refresh_failures,
            rows_applied,
            field_changes,
            field_errors,
            flag_changes,
            cached_types,
            watermark,
        })
    }

    /// Registry to gather from, e.g. for a `/metrics` endpoint.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_refresh_cycle(&self) {
        self.refresh_cycles.inc();
    }

    pub fn record_refresh_failure(&self, repeating: bool) {
        self.refresh_failures
            .with_label_values(&[classification(repeating)])
            .inc();
    }

    pub(crate) fn record_reconcile(&self, stats: &ReconcileStats) {
        self.rows_applied.inc_by(stats.matched as u64);
        self.field_changes.inc_by(stats.changed as u64);
    }

    pub fn record_field_error(&self, repeating: bool) {
        self.field_errors
            .with_label_values(&[classification(repeating)])
            .inc();
    }

    pub fn record_flag_change(&self) {
        self.flag_changes.inc();
    }

    pub fn set_cached_types(&self, count: usize) {
        self.cached_types.set(count as i64);
    }

    pub fn set_watermark(&self, watermark: DateTime<Utc>) {
        self.watermark.set(watermark.timestamp());
    }

    pub fn refresh_cycles(&self) -> u64 {
        self.refresh_cycles.get()
    }

    pub fn refresh_failures(&self, repeating: bool) -> u64 {
        self.refresh_failures
            .with_label_values(&[classification(repeating)])
            .get()
    }

    pub fn field_errors(&self, repeating: bool) -> u64 {
        self.field_errors
            .with_label_values(&[classification(repeating)])
            .get()
    }

    pub fn field_changes(&self) -> u64 {
        self.field_changes.get()
    }

    pub fn flag_changes(&self) -> u64 {
        self.flag_changes.get()
    }

    pub fn cached_types(&self) -> i64 {
        self.cached_types.get()
    }
}

impl std::fmt::Debug for EngineMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineMetrics")
            .field("refresh_cycles", &self.refresh_cycles.get())
            .field("cached_types", &self.cached_types.get())
            .finish()
    }
}
