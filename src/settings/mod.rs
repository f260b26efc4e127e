//! Settings Objects
//!
//! Typed settings types, their field schema and the value conversion layer.
//!
//! # Architecture
//!
//! ```text
//! Row { category, name, value } ──ValueConverter──▶ Value ──Field──▶ T.field
//!                                ◀─────────────────       ◀──────
//! ```
//!
//! - [`Settings`] - a type naming its category and registering its fields
//! - [`Field`] - one named, typed field descriptor (getter + setter)
//! - [`Value`] / [`ValueKind`] - type-erased field values and their tags
//! - [`ValueConverter`] - pluggable `Value` <-> text strategy
//! - [`SettingsHandle`] - shared handle to a live, cached settings object

pub mod converter;
mod field;
mod handle;
mod value;

pub use converter::{DefaultValueConverter, ValueConverter};
pub use field::{Field, Settings};
pub use handle::{FieldChange, SettingsHandle};
pub use value::{FieldValue, Value, ValueKind};
