//! Field reconciliation
//!
//! Applies stored rows to a live settings object field by field and converts
//! an object back into rows. A failing row never affects the other rows of
//! the same call unless strict mode is on.

use std::any::{type_name, Any};

use chrono::{DateTime, Utc};
use tracing::{debug, trace, warn};

use crate::domain::events::SettingsEvent;
use crate::domain::ports::Row;
use crate::error::{field_throttle_key, Error, Result};
use crate::settings::{Field, FieldChange, Settings, SettingsHandle, ValueConverter};

use super::metrics::EngineMetrics;
use super::throttle::ErrorWindow;

/// Shared state a reconciliation pass reads and records into.
pub(crate) struct ReconcileContext<'a> {
    pub converter: &'a dyn ValueConverter,
    pub errors: &'a mut ErrorWindow,
    pub events: &'a mut Vec<SettingsEvent>,
    pub metrics: &'a EngineMetrics,
    pub now: DateTime<Utc>,
    pub strict: bool,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Rows that named a writable field
    pub matched: usize,
    /// Fields whose value changed
    pub changed: usize,
    /// Rows that failed and were reported instead of propagated
    pub failed: usize,
}

impl std::ops::AddAssign for ReconcileStats {
    fn add_assign(&mut self, other: Self) {
        self.matched += other.matched;
        self.changed += other.changed;
        self.failed += other.failed;
    }
}

fn writable_field<'h, T: Settings>(handle: &'h SettingsHandle<T>, name: &str) -> Option<&'h Field<T>> {
    handle.field(name).filter(|field| field.is_writable())
}

fn wrap_field_error(category: &str, field: &str, source: Error) -> Error {
    Error::Field {
        category: category.to_string(),
        field: field.to_string(),
        source: Box::new(source),
    }
}

/// Apply `rows` to `handle`.
///
/// Rows naming an unknown or non-writable field are skipped. A changed value
/// is announced to the handle's subscribers before it is assigned.
pub(crate) fn apply<T: Settings>(
    handle: &SettingsHandle<T>,
    rows: &[Row],
    ctx: &mut ReconcileContext<'_>,
) -> Result<ReconcileStats> {
    let category = T::CATEGORY;
    let mut stats = ReconcileStats::default();

    for row in rows {
        let Some(field) = writable_field(handle, &row.name) else {
            trace!(category, field = %row.name, "Skipping row without a writable field");
            continue;
        };
        stats.matched += 1;

        let outcome = ctx
            .converter
            .from_text(row.value.as_deref(), field.kind())
            .and_then(|value| {
                let events = &mut *ctx.events;
                let now = ctx.now;
                let mut guard = handle.write();
                field.set(&mut *guard, value, &mut |old_value, new_value| {
                    let change = FieldChange {
                        category: category.to_string(),
                        settings_type: type_name::<T>().to_string(),
                        field: field.name().to_string(),
                        old_value,
                        new_value,
                    };
                    events.push(SettingsEvent::field_changed(&change, now));
                    handle.notify(change);
                    stats.changed += 1;
                })
            });

        if let Err(source) = outcome {
            if ctx.strict {
                return Err(wrap_field_error(category, field.name(), source));
            }
            stats.failed += 1;
            report_field_error(category, field.name(), &source, ctx);
        }
    }

    ctx.metrics.record_reconcile(&stats);
    Ok(stats)
}

fn report_field_error(category: &str, field: &str, error: &Error, ctx: &mut ReconcileContext<'_>) {
    let key = field_throttle_key(error, category, field);
    let repeating = ctx.errors.observe(key, ctx.now);

    if repeating {
        debug!(category, field, error = %error, "Repeating error applying stored value");
    } else {
        warn!(category, field, error = %error, "Error applying stored value");
    }

    ctx.metrics.record_field_error(repeating);
    ctx.events
        .push(SettingsEvent::field_error(category, field, error, repeating, ctx.now));
}

/// Convert every writable field of `handle` into a row stamped with `now`.
pub(crate) fn to_rows<T: Settings>(
    handle: &SettingsHandle<T>,
    converter: &dyn ValueConverter,
    now: DateTime<Utc>,
) -> Result<Vec<Row>> {
    let guard = handle.read();
    handle
        .fields()
        .iter()
        .filter(|field| field.is_writable())
        .map(|field| field_row(field, &guard, converter, now))
        .collect()
}

/// Convert one named writable field into a row.
pub(crate) fn to_row<T: Settings>(
    handle: &SettingsHandle<T>,
    name: &str,
    converter: &dyn ValueConverter,
    now: DateTime<Utc>,
) -> Result<Row> {
    let field = writable_field(handle, name).ok_or_else(|| Error::UnknownField {
        category: T::CATEGORY.to_string(),
        field: name.to_string(),
    })?;
    let guard = handle.read();
    field_row(field, &guard, converter, now)
}

fn field_row<T: Settings>(
    field: &Field<T>,
    target: &T,
    converter: &dyn ValueConverter,
    now: DateTime<Utc>,
) -> Result<Row> {
    field
        .get(target)
        .and_then(|value| converter.to_text(&value))
        .map(|text| Row::new(T::CATEGORY, field.name(), text, now))
        .map_err(|source| wrap_field_error(T::CATEGORY, field.name(), source))
}

// =============================================================================
// Type-erased cache entries
// =============================================================================

/// A cached settings object of any type.
pub(crate) trait LiveSettings: Send + Sync {
    fn category(&self) -> &'static str;

    fn apply_rows(&self, rows: &[Row], ctx: &mut ReconcileContext<'_>) -> Result<ReconcileStats>;

    fn as_any(&self) -> &dyn Any;
}

impl<T: Settings> LiveSettings for SettingsHandle<T> {
    fn category(&self) -> &'static str {
        T::CATEGORY
    }

    fn apply_rows(&self, rows: &[Row], ctx: &mut ReconcileContext<'_>) -> Result<ReconcileStats> {
        apply(self, rows, ctx)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
