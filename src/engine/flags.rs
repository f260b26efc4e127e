//! Flag map
//!
//! Boolean flags live as rows in the reserved [`FLAGS_CATEGORY`]. A flag that
//! has no row is unset.
//!
//! [`FLAGS_CATEGORY`]: crate::domain::ports::FLAGS_CATEGORY

use std::collections::HashMap;

use crate::domain::ports::Row;

/// Interpret a stored flag value.
///
/// `true`/`false` in any case (surrounding whitespace ignored) or `"1"` are
/// accepted; anything else, including a missing value, reads as unset.
pub fn parse_flag(value: Option<&str>) -> bool {
    match value.map(str::trim) {
        Some(text) => text.eq_ignore_ascii_case("true") || text == "1",
        None => false,
    }
}

/// In-memory view of the flag category.
#[derive(Debug, Clone, Default)]
pub struct FlagMap {
    flags: HashMap<String, bool>,
    loaded: bool,
}

impl FlagMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the initial load from the store happened.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Replace the contents with a full read of the flag category.
    pub fn load(&mut self, rows: &[Row]) {
        self.flags = rows
            .iter()
            .map(|row| (row.name.clone(), parse_flag(row.value.as_deref())))
            .collect();
        self.loaded = true;
    }

    /// Apply one changed row. Returns the new value when it differs from the
    /// previous one, an absent flag counting as false.
    pub fn apply(&mut self, row: &Row) -> Option<bool> {
        let value = parse_flag(row.value.as_deref());
        let previous = self.flags.insert(row.name.clone(), value);
        if previous.unwrap_or(false) != value {
            Some(value)
        } else {
            None
        }
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}
