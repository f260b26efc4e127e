//! settings-sync Integration Tests
//!
//! - Cache engine: loading, caching, saving, read-only objects
//! - Round trips of boundary values through the default converter
//! - Incremental refresh: watermark, failures, flags, subscriptions
//! - Background loop cancellation
//! - File-backed store end to end

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use settings_sync::adapters::{
    CompositeEventPublisher, FileStore, InMemoryEventCollector, LoggingEventPublisher, ManualClock,
    MemoryStore,
};
use settings_sync::domain::Clock;
use settings_sync::settings::{Field, Settings, Value};
use settings_sync::{Row, SettingsEvent, SettingsManager, SettingsStore, FLAGS_CATEGORY};

// =============================================================================
// Shared settings types
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
struct BasicSettings {
    decimal: f64,
    text: String,
    number: i32,
}

impl Settings for BasicSettings {
    const CATEGORY: &'static str = "Settings";

    fn fields() -> Vec<Field<Self>> {
        vec![
            Field::value("Decimal", |s: &Self| &s.decimal, |s: &mut Self| &mut s.decimal),
            Field::value("Text", |s: &Self| &s.text, |s: &mut Self| &mut s.text),
            Field::value("Number", |s: &Self| &s.number, |s: &mut Self| &mut s.number),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Endpoint {
    text: String,
    inner: Option<Box<Endpoint>>,
}

#[derive(Debug, Clone, PartialEq)]
struct BoundarySettings {
    int: i32,
    big: u64,
    float: f32,
    letter: char,
    flag: bool,
    empty: String,
    missing: Option<String>,
    at: DateTime<Utc>,
    span: TimeDelta,
    endpoint: Endpoint,
}

impl Default for BoundarySettings {
    fn default() -> Self {
        Self {
            int: 0,
            big: 0,
            float: 0.0,
            letter: 'a',
            flag: false,
            empty: "default".into(),
            missing: Some("default".into()),
            at: DateTime::from_timestamp(0, 0).unwrap_or_default(),
            span: TimeDelta::zero(),
            endpoint: Endpoint::default(),
        }
    }
}

impl Settings for BoundarySettings {
    const CATEGORY: &'static str = "Boundary";

    fn fields() -> Vec<Field<Self>> {
        vec![
            Field::value("Int", |s: &Self| &s.int, |s: &mut Self| &mut s.int),
            Field::value("Big", |s: &Self| &s.big, |s: &mut Self| &mut s.big),
            Field::value("Float", |s: &Self| &s.float, |s: &mut Self| &mut s.float),
            Field::value("Letter", |s: &Self| &s.letter, |s: &mut Self| &mut s.letter),
            Field::value("Flag", |s: &Self| &s.flag, |s: &mut Self| &mut s.flag),
            Field::value("Empty", |s: &Self| &s.empty, |s: &mut Self| &mut s.empty),
            Field::value("Missing", |s: &Self| &s.missing, |s: &mut Self| &mut s.missing),
            Field::value("At", |s: &Self| &s.at, |s: &mut Self| &mut s.at),
            Field::value("Span", |s: &Self| &s.span, |s: &mut Self| &mut s.span),
            Field::json("Endpoint", |s: &Self| &s.endpoint, |s: &mut Self| &mut s.endpoint),
        ]
    }
}

#[derive(Debug, Default)]
struct ReadOnlySettings {
    value: String,
}

impl Settings for ReadOnlySettings {
    const CATEGORY: &'static str = "ReadOnly";

    fn fields() -> Vec<Field<Self>> {
        vec![Field::value("Value", |s: &Self| &s.value, |s: &mut Self| &mut s.value)]
    }

    fn read_only(&self) -> bool {
        true
    }
}

fn start() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

struct Fixture {
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
    events: Arc<InMemoryEventCollector>,
    manager: Arc<SettingsManager>,
}

fn fixture() -> Fixture {
    let clock = Arc::new(ManualClock::new(start()));
    let store = Arc::new(MemoryStore::with_clock(clock.clone()));
    let events = Arc::new(InMemoryEventCollector::new());
    let manager = SettingsManager::new(store.clone())
        .unwrap()
        .with_clock(clock.clone())
        .with_publisher(events.clone());
    Fixture {
        store,
        clock,
        events,
        manager: Arc::new(manager),
    }
}

// =============================================================================
// Cache Engine Tests
// =============================================================================

mod cache_tests {
    use super::*;

    #[tokio::test]
    async fn test_basic_reading() {
        let fx = fixture();
        fx.store
            .insert_row(Row::new("Settings", "Decimal", Some("1.5".into()), start()));
        fx.store
            .insert_row(Row::new("Settings", "Text", Some("test".into()), start()));

        let settings = fx.manager.get::<BasicSettings>().await.unwrap();

        assert_eq!(settings.read().decimal, 1.5);
        assert_eq!(settings.read().text, "test");
        assert_eq!(settings.read().number, 0);
        // Existing rows suppress the default write
        assert_eq!(fx.store.len(), 2);
    }

    #[tokio::test]
    async fn test_get_twice_returns_same_object() {
        let fx = fixture();

        let a = fx.manager.get::<BasicSettings>().await.unwrap();
        let b = fx.manager.get::<BasicSettings>().await.unwrap();
        a.write().text = "shared".into();

        assert!(a.ptr_eq(&b));
        assert_eq!(b.read().text, "shared");
    }

    #[tokio::test]
    async fn test_concurrent_first_get_caches_one_object() {
        let fx = fixture();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let manager = fx.manager.clone();
                tokio::spawn(async move { manager.get::<BasicSettings>().await.unwrap() })
            })
            .collect();

        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await.unwrap());
        }

        assert!(handles.iter().all(|h| h.ptr_eq(&handles[0])));
        assert_eq!(fx.store.len(), 3);
    }

    #[tokio::test]
    async fn test_forced_get_rereads_store() {
        let fx = fixture();
        let cached = fx.manager.get::<BasicSettings>().await.unwrap();

        fx.store
            .write_row(Row::new("Settings", "Text", Some("external".into()), start()))
            .await
            .unwrap();
        let forced = fx.manager.get_forced::<BasicSettings>().await.unwrap();

        assert_eq!(forced.read().text, "external");
        assert_eq!(cached.read().text, "");
    }

    #[tokio::test]
    async fn test_read_only_object_is_never_written() {
        let fx = fixture();
        let settings = fx.manager.get::<ReadOnlySettings>().await.unwrap();
        settings.write().value = "changed".into();

        let saved = tokio_test::assert_ok!(fx.manager.save(&settings).await);
        let field_saved = tokio_test::assert_ok!(fx.manager.save_field(&settings, "Value").await);

        assert_eq!(saved, 0);
        assert!(!field_saved);
        assert!(fx.store.read_category("ReadOnly").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_change_and_save_persists_mutation() {
        let fx = fixture();
        let settings = fx.manager.get::<BasicSettings>().await.unwrap();

        let inserted = fx
            .manager
            .change_and_save(&settings, |s| s.number = 42)
            .await
            .unwrap();

        assert_eq!(inserted, 0);
        let rows = fx.store.read_category("Settings").await.unwrap();
        let number = rows.iter().find(|r| r.name == "Number").unwrap();
        assert_eq!(number.value.as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn test_field_errors_are_collected_not_thrown() {
        let fx = fixture();
        fx.store
            .insert_row(Row::new("Settings", "Decimal", Some("test".into()), start()));
        fx.store
            .insert_row(Row::new("Settings", "Text", Some("still applied".into()), start()));

        let settings = fx.manager.get::<BasicSettings>().await.unwrap();

        assert_eq!(settings.read().text, "still applied");
        let errors = fx.events.events_of_type("FieldError");
        assert_eq!(errors.len(), 1);
        match &errors[0] {
            SettingsEvent::FieldError { field, is_repeating, .. } => {
                assert_eq!(field, "Decimal");
                assert!(!is_repeating);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[derive(Debug, Default)]
    struct Ratio {
        value: f32,
    }

    impl Settings for Ratio {
        const CATEGORY: &'static str = "Ratio";

        fn fields() -> Vec<Field<Self>> {
            vec![Field::value("Value", |s: &Self| &s.value, |s: &mut Self| &mut s.value)]
        }
    }

    #[tokio::test]
    async fn test_out_of_range_float_is_a_field_error() {
        let fx = fixture();
        fx.store
            .insert_row(Row::new("Ratio", "Value", Some("1e300".into()), start()));

        let ratio = fx.manager.get::<Ratio>().await.unwrap();

        assert_eq!(ratio.read().value, 0.0);
        let errors = fx.events.events_of_type("FieldError");
        assert_eq!(errors.len(), 1);
        match &errors[0] {
            SettingsEvent::FieldError { field, error_kind, .. } => {
                assert_eq!(field, "Value");
                assert_eq!(error_kind, "TypeMismatch");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}

// =============================================================================
// Round Trip Tests
// =============================================================================

mod round_trip_tests {
    use super::*;

    #[tokio::test]
    async fn test_saving_and_loading_must_be_same() {
        let fx = fixture();
        let settings = fx.manager.get::<BoundarySettings>().await.unwrap();

        let expected = BoundarySettings {
            int: i32::MIN,
            big: u64::MAX,
            float: f32::MAX,
            letter: 'X',
            flag: true,
            empty: String::new(),
            missing: None,
            at: DateTime::<Utc>::MAX_UTC,
            span: TimeDelta::MAX,
            endpoint: Endpoint {
                text: "1".into(),
                inner: Some(Box::new(Endpoint {
                    text: "2".into(),
                    inner: None,
                })),
            },
        };
        *settings.write() = expected.clone();
        fx.manager.save(&settings).await.unwrap();

        let loaded = fx.manager.get_forced::<BoundarySettings>().await.unwrap();

        assert_eq!(*loaded.read(), expected);
    }

    #[tokio::test]
    async fn test_empty_string_and_null_survive_storage() {
        let fx = fixture();
        let settings = fx.manager.get::<BoundarySettings>().await.unwrap();
        {
            let mut value = settings.write();
            value.empty = String::new();
            value.missing = None;
        }
        fx.manager.save(&settings).await.unwrap();

        let rows = fx.store.read_category("Boundary").await.unwrap();
        let empty = rows.iter().find(|r| r.name == "Empty").unwrap();
        let missing = rows.iter().find(|r| r.name == "Missing").unwrap();
        assert_eq!(empty.value.as_deref(), Some(""));
        assert_eq!(missing.value, None);
    }
}

// =============================================================================
// Refresh Tests
// =============================================================================

mod refresh_tests {
    use super::*;

    #[tokio::test]
    async fn test_refresh_updates_cached_object_and_notifies() {
        let fx = fixture();
        let settings = fx.manager.get::<BasicSettings>().await.unwrap();
        let mut changes = settings.subscribe();
        fx.manager.refresh_changed().await.unwrap();

        fx.clock.advance(TimeDelta::seconds(1));
        fx.store
            .write_row(Row::new("Settings", "Text", Some("fresh".into()), start()))
            .await
            .unwrap();
        fx.manager.refresh_changed().await.unwrap();

        assert_eq!(settings.read().text, "fresh");
        let change = changes.recv().await.unwrap();
        assert!(change.is::<BasicSettings>("Text"));
        assert_eq!(change.old_value, Value::Text(String::new()));
        assert_eq!(change.new_value, Value::Text("fresh".into()));
    }

    #[tokio::test]
    async fn test_watermark_is_monotonic_and_clamped() {
        let fx = fixture();
        fx.manager.get::<BasicSettings>().await.unwrap();

        let mut previous = None;
        for step in 1..=5 {
            fx.clock.advance(TimeDelta::seconds(10));
            // Rows stamped ahead of the clock
            fx.store.insert_row(Row::new(
                "Settings",
                "Number",
                Some(step.to_string()),
                fx.clock.now() + TimeDelta::minutes(5),
            ));
            let report = fx.manager.refresh_changed().await.unwrap();

            let watermark = report.watermark;
            assert_eq!(report.rows_read, 1);
            assert!(watermark <= fx.clock.now());
            assert!(previous.map_or(true, |p| watermark >= p));
            previous = Some(watermark);
        }
    }

    #[tokio::test]
    async fn test_repeated_store_failure_becomes_repeating() {
        let fx = fixture();
        fx.store.set_unavailable(true);

        for _ in 0..3 {
            assert!(fx.manager.refresh_changed().await.is_err());
        }

        let repeating: Vec<bool> = fx
            .events
            .events_of_type("RefreshFailed")
            .iter()
            .map(|e| e.is_repeating())
            .collect();
        assert_eq!(repeating, vec![false, true, true]);

        fx.store.set_unavailable(false);
        assert!(fx.manager.refresh_changed().await.is_ok());
    }

    #[tokio::test]
    async fn test_direct_refresh_publishes_only_cycle_events() {
        let fx = fixture();
        fx.clock.advance(TimeDelta::seconds(1));
        fx.store
            .insert_row(Row::new(FLAGS_CATEGORY, "Beta", Some("true".into()), fx.clock.now()));

        fx.manager.refresh_changed().await.unwrap();

        assert_eq!(fx.events.event_types(), vec!["FlagChanged"]);
    }

    #[tokio::test]
    async fn test_history_before_startup_is_not_replayed() {
        let fx = fixture();
        let week_ago = start() - TimeDelta::days(7);
        fx.store
            .insert_row(Row::new(FLAGS_CATEGORY, "Beta", Some("true".into()), week_ago));
        fx.store
            .insert_row(Row::new("Settings", "Decimal", Some("broken".into()), week_ago));
        fx.manager.get::<BasicSettings>().await.unwrap();
        assert_eq!(fx.events.events_of_type("FieldError").len(), 1);

        let report = tokio_test::assert_ok!(fx.manager.refresh_changed().await);

        assert_eq!(report.rows_read, 0);
        assert_eq!(report.watermark, start());
        assert!(fx.events.events_of_type("FlagChanged").is_empty());
        assert_eq!(fx.events.events_of_type("FieldError").len(), 1);
    }
}

// =============================================================================
// Flag Tests
// =============================================================================

mod flag_tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_flag_is_unset() {
        let fx = fixture();
        assert!(!fx.manager.is_flag_set("NotThere").await.unwrap());
    }

    #[tokio::test]
    async fn test_flag_values() {
        let fx = fixture();
        for (name, value) in [("A", "true"), ("B", "1"), ("C", "False"), ("D", "yes")] {
            fx.store
                .insert_row(Row::new(FLAGS_CATEGORY, name, Some(value.into()), start()));
        }

        assert!(fx.manager.is_flag_set("A").await.unwrap());
        assert!(fx.manager.is_flag_set("B").await.unwrap());
        assert!(!fx.manager.is_flag_set("C").await.unwrap());
        assert!(!fx.manager.is_flag_set("D").await.unwrap());
    }

    #[tokio::test]
    async fn test_flag_change_detected_by_refresh() {
        let fx = fixture();
        assert!(!fx.manager.is_flag_set("Maintenance").await.unwrap());
        fx.manager.refresh_changed().await.unwrap();

        fx.clock.advance(TimeDelta::seconds(1));
        fx.store
            .write_row(Row::new(FLAGS_CATEGORY, "Maintenance", Some("true".into()), start()))
            .await
            .unwrap();
        fx.manager.refresh_changed().await.unwrap();

        assert!(fx.manager.is_flag_set("Maintenance").await.unwrap());
        let changed = fx.events.events_of_type("FlagChanged");
        assert_eq!(changed.len(), 1);
        assert_eq!(
            changed[0],
            SettingsEvent::flag_changed("Maintenance", true, fx.clock.now())
        );
    }
}

// =============================================================================
// Background Loop Tests
// =============================================================================

mod loop_tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    fn loop_fixture(interval: Duration) -> Fixture {
        let clock = Arc::new(ManualClock::new(start()));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let events = Arc::new(InMemoryEventCollector::new());
        let publisher = CompositeEventPublisher::new()
            .with_publisher(LoggingEventPublisher::debug_level())
            .with_publisher(events.clone());
        let manager = SettingsManager::new(store.clone())
            .unwrap()
            .with_config(settings_sync::ManagerConfig::default().with_refresh_interval(interval))
            .with_clock(clock.clone())
            .with_publisher(Arc::new(publisher));
        Fixture {
            store,
            clock,
            events,
            manager: Arc::new(manager),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_emits_one_canceled_event() {
        let fx = loop_fixture(Duration::from_secs(10));
        let token = CancellationToken::new();
        let task = fx.manager.spawn_refresh_loop(token.clone());

        tokio::time::sleep(Duration::from_secs(35)).await;
        token.cancel();
        task.await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;

        let types = fx.events.event_types();
        assert_eq!(types.iter().filter(|t| **t == "RefreshStarting").count(), 3);
        assert_eq!(types.iter().filter(|t| **t == "RefreshLoopCanceled").count(), 1);
        assert_eq!(types.last(), Some(&"RefreshLoopCanceled"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_first_tick() {
        let fx = loop_fixture(Duration::from_secs(10));
        let token = CancellationToken::new();
        token.cancel();

        fx.manager.spawn_refresh_loop(token).await.unwrap();

        assert_eq!(fx.events.event_types(), vec!["RefreshLoopCanceled"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_survives_failures() {
        let fx = loop_fixture(Duration::from_secs(10));
        fx.store.set_unavailable(true);
        let token = CancellationToken::new();
        let task = fx.manager.spawn_refresh_loop(token.clone());

        tokio::time::sleep(Duration::from_secs(25)).await;
        fx.store.set_unavailable(false);
        fx.store.insert_row(Row::new(
            FLAGS_CATEGORY,
            "Beta",
            Some("true".into()),
            start() + TimeDelta::seconds(1),
        ));
        tokio::time::sleep(Duration::from_secs(10)).await;
        token.cancel();
        task.await.unwrap();

        assert_eq!(fx.events.events_of_type("RefreshFailed").len(), 2);
        assert_eq!(fx.events.events_of_type("FlagChanged").len(), 1);
        assert!(fx.manager.is_flag_set("Beta").await.unwrap());
    }
}

// =============================================================================
// File Store Tests
// =============================================================================

mod file_store_tests {
    use super::*;

    #[tokio::test]
    async fn test_manager_over_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yaml");
        let clock = Arc::new(ManualClock::new(start()));
        let store = Arc::new(FileStore::new(&path).with_clock(clock.clone()));
        let manager = SettingsManager::new(store.clone())
            .unwrap()
            .with_clock(clock.clone());

        let settings = manager.get::<BasicSettings>().await.unwrap();
        assert_eq!(store.load().await.unwrap().len(), 3);
        manager.refresh_changed().await.unwrap();

        // Another writer sharing the file
        clock.advance(TimeDelta::seconds(1));
        let other = FileStore::new(&path).with_clock(clock.clone());
        other
            .write_row(Row::new("Settings", "Decimal", Some("2.25".into()), start()))
            .await
            .unwrap();

        let report = manager.refresh_changed().await.unwrap();

        assert_eq!(report.rows_read, 1);
        assert_eq!(settings.read().decimal, 2.25);
    }
}
