use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use panel_client::RequestManager;
use panel_client::config::WatcherConfig;
use panel_client::error::{RequestError, SettingsError};
use panel_client::settings::{
    InMemoryDocument, PollOutcome, SettingValue, SettingsEvent, SettingsSource, SettingsWatcher,
    Target, Visibility,
};
use panel_client::store::ConfigStore;
use serde_json::{Value, json};
use tokio::sync::watch;

// Scripted backend, fetched through the request queue like the real endpoint
#[derive(Clone)]
struct ScriptedSource {
    manager: RequestManager<Value>,
    calls: Arc<AtomicUsize>,
    script: Arc<Mutex<VecDeque<Result<Value, RequestError>>>>,
    fallback: Value,
}

impl ScriptedSource {
    fn new(fallback: Value) -> Self {
        Self {
            manager: RequestManager::new(4, Duration::from_millis(100)),
            calls: Arc::new(AtomicUsize::new(0)),
            script: Arc::new(Mutex::new(VecDeque::new())),
            fallback,
        }
    }

    fn then(&self, response: Result<Value, RequestError>) -> &Self {
        self.script.lock().unwrap().push_back(response);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SettingsSource for ScriptedSource {
    fn fetch(&self) -> impl Future<Output = Result<Value, RequestError>> + Send {
        let calls = Arc::clone(&self.calls);
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback.clone()));
        self.manager.queue_request(
            "GET:/settings",
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                next
            },
            3,
        )
    }
}

fn watcher(
    source: ScriptedSource,
) -> (
    Arc<SettingsWatcher<ScriptedSource>>,
    Arc<ConfigStore>,
    Arc<InMemoryDocument>,
) {
    let store = Arc::new(ConfigStore::default());
    let document = Arc::new(InMemoryDocument::new());
    let watcher = Arc::new(SettingsWatcher::new(
        source,
        Arc::clone(&store),
        document.clone(),
        WatcherConfig::default(),
    ));
    (watcher, store, document)
}

fn theme_settings() -> Value {
    json!([
        {"key": "appearance.primary_color", "value": "#3366ff"},
        {"key": "ui.sidebar_collapsed", "value": "true", "type": "boolean"},
        {"key": "typography.font_size", "value": 15},
        {"key": "features.bulk_export", "value": true},
        {"key": "business.currency", "value": "EUR"}
    ])
}

#[tokio::test]
async fn poll_applies_and_notifies() {
    let (watcher, store, document) = watcher(ScriptedSource::new(theme_settings()));
    let mut events = watcher.subscribe();

    let outcome = watcher.poll_once().await;
    assert!(matches!(outcome, PollOutcome::Applied { changed, .. } if changed > 0));

    let state = document.state();
    assert_eq!(state.style.get("--primary").unwrap(), "225 100% 60%");
    assert_eq!(state.style.get("--primary-hover").unwrap(), "225 100% 55%");
    assert_eq!(state.style.get("--font-size-base").unwrap(), "15px");
    assert!(state.has_class(Target::Body, "sidebar-collapsed"));
    assert!(document.globals().feature_enabled("bulk_export"));

    assert_eq!(
        store.get("business.currency"),
        Some(SettingValue::String("EUR".to_string()))
    );
    match events.try_recv().unwrap() {
        SettingsEvent::Updated(snapshot) => assert_eq!(snapshot.mapping.len(), 5),
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn unchanged_snapshot_is_not_reapplied() {
    let (watcher, _store, document) = watcher(ScriptedSource::new(theme_settings()));
    let mut events = watcher.subscribe();

    watcher.poll_once().await;
    let writes = document.writes();
    let _ = events.try_recv();

    assert!(matches!(watcher.poll_once().await, PollOutcome::Unchanged));
    assert_eq!(document.writes(), writes);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn first_successful_poll_always_notifies() {
    let (watcher, store, _document) = watcher(ScriptedSource::new(json!({})));
    let mut events = watcher.subscribe();
    assert!(watcher.last_applied().is_none());

    assert!(matches!(
        watcher.poll_once().await,
        PollOutcome::Applied { effects: 0, .. }
    ));
    match events.try_recv().unwrap() {
        SettingsEvent::Updated(snapshot) => assert!(snapshot.mapping.is_empty()),
        other => panic!("unexpected event {other:?}"),
    }
    assert!(store.snapshot().mapping.is_empty());

    assert!(matches!(watcher.poll_once().await, PollOutcome::Unchanged));
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn failed_poll_keeps_previous_state() {
    let source = ScriptedSource::new(theme_settings());
    source
        .then(Ok(theme_settings()))
        .then(Err(RequestError::Timeout))
        .then(Ok(json!("not settings")));
    let (watcher, store, document) = watcher(source);

    watcher.poll_once().await;
    let applied = store.snapshot();
    let state = document.state();

    assert!(matches!(
        watcher.poll_once().await,
        PollOutcome::Failed(SettingsError::Fetch(RequestError::Timeout))
    ));
    assert!(matches!(
        watcher.poll_once().await,
        PollOutcome::Failed(SettingsError::Parse(_))
    ));

    assert_eq!(store.snapshot(), applied);
    assert_eq!(watcher.last_applied(), Some(applied));
    assert_eq!(document.state(), state);
}

#[tokio::test]
async fn company_name_change_is_announced() {
    let source = ScriptedSource::new(json!({"app.company_name": "Acme"}));
    source
        .then(Ok(json!({"app.company_name": "Acme", "app.name": "Admin"})))
        .then(Ok(json!({"app.company_name": "Acme", "app.name": "Backoffice"})));
    let (watcher, _store, document) = watcher(source);
    let mut events = watcher.subscribe();

    watcher.poll_once().await;
    assert!(matches!(events.try_recv().unwrap(), SettingsEvent::Updated(_)));
    match events.try_recv().unwrap() {
        SettingsEvent::CompanyNameChanged(name) => assert_eq!(name, "Acme"),
        other => panic!("unexpected event {other:?}"),
    }

    // title changes, company does not
    watcher.poll_once().await;
    assert!(matches!(events.try_recv().unwrap(), SettingsEvent::Updated(_)));
    assert!(events.try_recv().is_err());
    assert_eq!(document.state().title.as_deref(), Some("Backoffice"));
}

async fn settle() {
    for _ in 0..5 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(start_paused = true)]
async fn short_absence_waits_for_the_timer_long_absence_refetches() {
    let source = ScriptedSource::new(theme_settings());
    let (watcher, _store, _document) = watcher(source.clone());
    let (visibility_tx, visibility_rx) = watch::channel(Visibility::Visible);
    let (_auth_tx, auth_rx) = watch::channel(true);

    let handle = watcher.spawn(visibility_rx, auth_rx);
    settle().await;
    assert_eq!(source.calls(), 1);

    // hidden for 30 seconds
    visibility_tx.send(Visibility::Hidden).unwrap();
    tokio::time::sleep(Duration::from_secs(30)).await;
    visibility_tx.send(Visibility::Visible).unwrap();
    settle().await;
    assert_eq!(source.calls(), 1);

    // hidden for 6 minutes
    visibility_tx.send(Visibility::Hidden).unwrap();
    tokio::time::sleep(Duration::from_secs(360)).await;
    visibility_tx.send(Visibility::Visible).unwrap();
    settle().await;
    assert_eq!(source.calls(), 2);

    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn cadence_follows_visibility() {
    let source = ScriptedSource::new(theme_settings());
    let (watcher, _store, _document) = watcher(source.clone());
    let (visibility_tx, visibility_rx) = watch::channel(Visibility::Visible);
    let (_auth_tx, auth_rx) = watch::channel(true);

    let handle = watcher.spawn(visibility_rx, auth_rx);
    settle().await;
    assert_eq!(source.calls(), 1);

    tokio::time::sleep(Duration::from_secs(121)).await;
    assert_eq!(source.calls(), 2);

    // backgrounded: next poll ten minutes after the last one
    visibility_tx.send(Visibility::Hidden).unwrap();
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(source.calls(), 2);
    tokio::time::sleep(Duration::from_secs(301)).await;
    assert_eq!(source.calls(), 3);

    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn polling_waits_for_sign_in() {
    let source = ScriptedSource::new(theme_settings());
    let (watcher, _store, _document) = watcher(source.clone());
    let (_visibility_tx, visibility_rx) = watch::channel(Visibility::Visible);
    let (auth_tx, auth_rx) = watch::channel(false);

    let handle = watcher.spawn(visibility_rx, auth_rx);
    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(source.calls(), 0);

    auth_tx.send(true).unwrap();
    settle().await;
    assert_eq!(source.calls(), 1);

    auth_tx.send(false).unwrap();
    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(source.calls(), 1);

    handle.stop().await;
}
