//! Event Publisher Adapter
//!
//! Implements the `EventPublisher` port with various backends.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::domain::events::SettingsEvent;
use crate::domain::ports::EventPublisher;
use crate::error::Result;

#[async_trait]
impl<P: EventPublisher + ?Sized> EventPublisher for Arc<P> {
    async fn publish(&self, event: SettingsEvent) -> Result<()> {
        (**self).publish(event).await
    }

    async fn publish_all(&self, events: Vec<SettingsEvent>) -> Result<()> {
        (**self).publish_all(events).await
    }
}

/// Logging-based event publisher.
///
/// New failures are logged at warn level. Everything else goes to info or
/// debug depending on how the publisher was built.
#[derive(Debug, Clone, Default)]
pub struct LoggingEventPublisher {
    info_level: bool,
}

impl LoggingEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a publisher that logs at info level.
    pub fn info_level() -> Self {
        Self { info_level: true }
    }

    /// Create a publisher that logs at debug level.
    pub fn debug_level() -> Self {
        Self { info_level: false }
    }
}

#[async_trait]
impl EventPublisher for LoggingEventPublisher {
    async fn publish(&self, event: SettingsEvent) -> Result<()> {
        let event_type = event.event_type();
        let json = serde_json::to_string(&event).unwrap_or_else(|_| format!("{:?}", event));

        let new_failure = matches!(
            event,
            SettingsEvent::FieldError { is_repeating: false, .. }
                | SettingsEvent::RefreshFailed { is_repeating: false, .. }
        );

        if new_failure {
            warn!(event_type = %event_type, event = %json, "Settings event");
        } else if self.info_level {
            info!(event_type = %event_type, event = %json, "Settings event");
        } else {
            debug!(event_type = %event_type, event = %json, "Settings event");
        }

        Ok(())
    }
}

/// In-memory event collector for testing.
#[derive(Debug, Default)]
pub struct InMemoryEventCollector {
    events: parking_lot::RwLock<Vec<SettingsEvent>>,
}

impl InMemoryEventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all collected events.
    pub fn events(&self) -> Vec<SettingsEvent> {
        self.events.read().clone()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Get events of a specific type.
    pub fn events_of_type(&self, event_type: &str) -> Vec<SettingsEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type() == event_type)
            .cloned()
            .collect()
    }

    /// Event type names in the order they were published.
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events.read().iter().map(|e| e.event_type()).collect()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventCollector {
    async fn publish(&self, event: SettingsEvent) -> Result<()> {
        self.events.write().push(event);
        Ok(())
    }

    async fn publish_all(&self, events: Vec<SettingsEvent>) -> Result<()> {
        self.events.write().extend(events);
        Ok(())
    }
}

/// Composite event publisher that publishes to multiple backends.
#[derive(Default)]
pub struct CompositeEventPublisher {
    publishers: Vec<Box<dyn EventPublisher>>,
}

impl CompositeEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a publisher to the composite.
    pub fn with_publisher<P: EventPublisher + 'static>(mut self, publisher: P) -> Self {
        self.publishers.push(Box::new(publisher));
        self
    }

    pub fn len(&self) -> usize {
        self.publishers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.publishers.is_empty()
    }
}

impl std::fmt::Debug for CompositeEventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeEventPublisher")
            .field("publisher_count", &self.publishers.len())
            .finish()
    }
}

#[async_trait]
impl EventPublisher for CompositeEventPublisher {
    async fn publish(&self, event: SettingsEvent) -> Result<()> {
        for publisher in &self.publishers {
            publisher.publish(event.clone()).await?;
        }
        Ok(())
    }

    async fn publish_all(&self, events: Vec<SettingsEvent>) -> Result<()> {
        for publisher in &self.publishers {
            publisher.publish_all(events.clone()).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use chrono::Utc;

    #[tokio::test]
    async fn test_logging_publisher() {
        let publisher = LoggingEventPublisher::new();
        let failure = SettingsEvent::refresh_failed(&Error::Store("down".into()), false, Utc::now());

        publisher.publish(failure).await.unwrap();
        publisher
            .publish(SettingsEvent::refresh_starting(Utc::now()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_in_memory_collector() {
        let collector = InMemoryEventCollector::new();
        assert!(collector.is_empty());

        collector
            .publish_all(vec![
                SettingsEvent::refresh_starting(Utc::now()),
                SettingsEvent::flag_changed("Beta", true, Utc::now()),
            ])
            .await
            .unwrap();

        assert_eq!(collector.len(), 2);
        assert_eq!(collector.event_types(), vec!["RefreshStarting", "FlagChanged"]);
        assert_eq!(collector.events_of_type("FlagChanged").len(), 1);

        collector.clear();
        assert!(collector.is_empty());
    }

    #[tokio::test]
    async fn test_composite_publisher_shares_collector() {
        let collector = Arc::new(InMemoryEventCollector::new());
        let composite = CompositeEventPublisher::new()
            .with_publisher(LoggingEventPublisher::debug_level())
            .with_publisher(collector.clone());

        assert_eq!(composite.len(), 2);
        composite
            .publish(SettingsEvent::refresh_loop_canceled(Utc::now()))
            .await
            .unwrap();

        assert_eq!(collector.event_types(), vec!["RefreshLoopCanceled"]);
    }
}
