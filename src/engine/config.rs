//! Engine configuration

use std::time::Duration;

/// Configuration for a [`SettingsManager`](super::SettingsManager).
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Write the default field values when a category has no rows yet
    pub auto_persist_on_create: bool,

    /// Propagate field errors from `get` instead of reporting them
    pub strict_field_errors: bool,

    /// Propagate field errors from refresh cycles, failing the whole cycle
    pub strict_field_errors_on_refresh: bool,

    /// How long a reported failure is classified as repeating
    pub repeating_error_window: Duration,

    /// Interval between background refresh ticks
    pub refresh_interval: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            auto_persist_on_create: true,
            strict_field_errors: false,
            strict_field_errors_on_refresh: false,
            repeating_error_window: Duration::from_secs(90),
            refresh_interval: Duration::from_secs(30),
        }
    }
}

impl ManagerConfig {
    /// Config that propagates every field error.
    pub fn strict() -> Self {
        Self {
            strict_field_errors: true,
            strict_field_errors_on_refresh: true,
            ..Default::default()
        }
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn with_repeating_error_window(mut self, window: Duration) -> Self {
        self.repeating_error_window = window;
        self
    }

    pub fn with_auto_persist_on_create(mut self, enabled: bool) -> Self {
        self.auto_persist_on_create = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ManagerConfig::default();
        assert!(config.auto_persist_on_create);
        assert!(!config.strict_field_errors);
        assert!(!config.strict_field_errors_on_refresh);
        assert_eq!(config.repeating_error_window, Duration::from_secs(90));
        assert_eq!(config.refresh_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_strict() {
        let config = ManagerConfig::strict().with_refresh_interval(Duration::from_secs(1));
        assert!(config.strict_field_errors);
        assert!(config.strict_field_errors_on_refresh);
        assert_eq!(config.refresh_interval, Duration::from_secs(1));
    }
}
