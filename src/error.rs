//! Error types for the settings engine

use thiserror::Error;

use crate::settings::ValueKind;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading, saving or refreshing settings
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Store Errors
    // =========================================================================
    /// Backing store failure
    #[error("Settings store error: {0}")]
    Store(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML (de)serialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // =========================================================================
    // Field Reconciliation Errors
    // =========================================================================
    /// A stored string could not be converted to the field's kind
    #[error("Cannot convert {text:?} to {kind}: {reason}")]
    Conversion {
        kind: ValueKind,
        text: String,
        reason: String,
    },

    /// A converted value does not fit the field's Rust type
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    /// Setting a single field failed
    #[error("Error setting property {category}.{field}: {source}")]
    Field {
        category: String,
        field: String,
        #[source]
        source: Box<Error>,
    },

    // =========================================================================
    // Caller Contract Errors
    // =========================================================================
    /// The named field is not a registered, writable field of the settings type
    #[error("{category} has no writable field named '{field}'")]
    UnknownField { category: String, field: String },

    /// A settings type declared the reserved flag category
    #[error("Category '{0}' is reserved for flags")]
    ReservedCategory(String),

    // =========================================================================
    // Ambient Errors
    // =========================================================================
    /// Metrics registration error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl Error {
    /// Stable name of the error variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Store(_) => "Store",
            Error::Io(_) => "Io",
            Error::Json(_) => "Json",
            Error::Yaml(_) => "Yaml",
            Error::Conversion { .. } => "Conversion",
            Error::TypeMismatch { .. } => "TypeMismatch",
            Error::Field { .. } => "Field",
            Error::UnknownField { .. } => "UnknownField",
            Error::ReservedCategory(_) => "ReservedCategory",
            Error::Metrics(_) => "Metrics",
        }
    }

    /// Key under which this error is tracked by the repeating-error window.
    ///
    /// Field errors are keyed by the underlying kind plus the field they hit,
    /// so two fields failing the same way are tracked separately.
    pub fn throttle_key(&self) -> String {
        match self {
            Error::Field {
                category,
                field,
                source,
            } => field_throttle_key(source, category, field),
            other => other.kind().to_string(),
        }
    }

    /// Whether this error is a programming error on the caller's side.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Error::UnknownField { .. } | Error::ReservedCategory(_)
        )
    }
}

pub(crate) fn field_throttle_key(error: &Error, category: &str, field: &str) -> String {
    format!("{}-{}.{}", error.kind(), category, field)
}
