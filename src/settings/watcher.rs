//! Poll-and-apply loop for backend settings.
//!
//! Cadence depends on the session and on whether the app is visible: a short
//! interval while visible, a long one while backgrounded, nothing at all while
//! signed out. Coming back from the background only forces a refetch when the
//! app was hidden for longer than the configured threshold.

use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use crate::config::WatcherConfig;
use crate::error::{RequestError, SettingsError};
use crate::http_client::{HttpClient, RequestOptions};
use crate::metrics::{SETTINGS_APPLIED, SETTINGS_POLL_FAILURES, SETTINGS_POLLS};
use crate::store::ConfigStore;

use super::applier::EffectApplier;
use super::registry::HandlerRegistry;
use super::value::{SettingsSnapshot, normalize_settings};

pub const COMPANY_NAME_KEY: &str = "app.company_name";

pub trait SettingsSource: Send + Sync + 'static {
    fn fetch(&self) -> impl Future<Output = Result<Value, RequestError>> + Send;
}

// Settings endpoint of the backend, fetched through the request queue
pub struct SettingsEndpoint {
    client: Arc<HttpClient>,
    path: String,
    priority: i32,
}

impl SettingsEndpoint {
    pub fn new(client: Arc<HttpClient>, path: impl Into<String>, priority: i32) -> Self {
        Self {
            client,
            path: path.into(),
            priority,
        }
    }
}

impl SettingsSource for SettingsEndpoint {
    fn fetch(&self) -> impl Future<Output = Result<Value, RequestError>> + Send {
        self.client
            .get(&self.path, RequestOptions::default().priority(self.priority))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Visible,
    Hidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WatcherPhase {
    Idle,
    Polling,
    Applying,
}

#[derive(Debug, Clone)]
pub enum SettingsEvent {
    Updated(Arc<SettingsSnapshot>),
    CompanyNameChanged(String),
}

#[derive(Debug, Clone)]
pub enum PollOutcome {
    Unchanged,
    Applied { effects: usize, changed: usize },
    Failed(SettingsError),
}

/// Interval until the next poll, `None` while polling is suspended.
pub fn poll_interval(
    config: &WatcherConfig,
    visibility: Visibility,
    authenticated: bool,
) -> Option<Duration> {
    if !authenticated {
        return None;
    }
    match visibility {
        Visibility::Visible => Some(config.visible_interval),
        Visibility::Hidden => Some(config.hidden_interval),
    }
}

// Remembers when the app went to the background
#[derive(Debug, Clone)]
pub struct VisibilityTracker {
    threshold: Duration,
    hidden_since: Option<Instant>,
}

impl VisibilityTracker {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            hidden_since: None,
        }
    }

    pub fn hidden(&mut self, now: Instant) {
        // keep the first timestamp if hidden is reported twice
        self.hidden_since.get_or_insert(now);
    }

    /// Returns true when the app was hidden long enough to warrant a refetch.
    pub fn visible(&mut self, now: Instant) -> bool {
        match self.hidden_since.take() {
            Some(since) => now.saturating_duration_since(since) > self.threshold,
            None => false,
        }
    }

    pub fn is_backgrounded(&self) -> bool {
        self.hidden_since.is_some()
    }
}

pub struct SettingsWatcher<S> {
    source: S,
    store: Arc<ConfigStore>,
    applier: Arc<dyn EffectApplier>,
    registry: HandlerRegistry,
    config: WatcherConfig,
    events: broadcast::Sender<SettingsEvent>,
    // None until the first successful poll
    last_applied: Mutex<Option<Arc<SettingsSnapshot>>>,
    phase: Mutex<WatcherPhase>,
    // one poll/apply pass at a time
    poll_lock: tokio::sync::Mutex<()>,
}

impl<S: SettingsSource> SettingsWatcher<S> {
    pub fn new(
        source: S,
        store: Arc<ConfigStore>,
        applier: Arc<dyn EffectApplier>,
        config: WatcherConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            source,
            store,
            applier,
            registry: HandlerRegistry::standard(),
            config,
            events,
            last_applied: Mutex::new(None),
            phase: Mutex::new(WatcherPhase::Idle),
            poll_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_registry(mut self, registry: HandlerRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SettingsEvent> {
        self.events.subscribe()
    }

    pub fn phase(&self) -> WatcherPhase {
        *lock(&self.phase)
    }

    pub fn last_applied(&self) -> Option<Arc<SettingsSnapshot>> {
        lock(&self.last_applied).clone()
    }

    fn set_phase(&self, phase: WatcherPhase) {
        *lock(&self.phase) = phase;
    }

    /// Fetches once and applies the result if it differs from the last
    /// applied snapshot. Failures keep the previous snapshot and effects.
    pub async fn poll_once(&self) -> PollOutcome {
        let _guard = self.poll_lock.lock().await;
        SETTINGS_POLLS.inc();
        self.set_phase(WatcherPhase::Polling);

        let mapping = match self.source.fetch().await {
            Ok(body) => normalize_settings(body),
            Err(err) => Err(SettingsError::Fetch(err)),
        };
        let mapping = match mapping {
            Ok(mapping) => mapping,
            Err(err) => {
                SETTINGS_POLL_FAILURES.inc();
                warn!(error = %err, "settings poll failed, keeping previous settings");
                self.set_phase(WatcherPhase::Idle);
                return PollOutcome::Failed(err);
            }
        };

        let previous = self.last_applied();
        if previous
            .as_ref()
            .is_some_and(|previous| !previous.differs_from(&mapping))
        {
            debug!(keys = mapping.len(), "settings unchanged");
            self.set_phase(WatcherPhase::Idle);
            return PollOutcome::Unchanged;
        }

        self.set_phase(WatcherPhase::Applying);
        let snapshot = Arc::new(SettingsSnapshot::new(mapping));
        *lock(&self.last_applied) = Some(Arc::clone(&snapshot));
        self.store.replace(Arc::clone(&snapshot));

        let effects = self.registry.apply(&snapshot);
        let changed = self.applier.apply(&effects);
        SETTINGS_APPLIED.inc();
        info!(
            keys = snapshot.mapping.len(),
            effects = effects.len(),
            changed,
            "applied settings"
        );

        let _ = self.events.send(SettingsEvent::Updated(Arc::clone(&snapshot)));
        let company = snapshot.get(COMPANY_NAME_KEY);
        let before = previous
            .as_ref()
            .and_then(|previous| previous.get(COMPANY_NAME_KEY));
        if company.is_some() && company != before {
            let name = company.map(|value| value.to_text()).unwrap_or_default();
            let _ = self.events.send(SettingsEvent::CompanyNameChanged(name));
        }

        self.set_phase(WatcherPhase::Idle);
        PollOutcome::Applied {
            effects: effects.len(),
            changed,
        }
    }

    /// Starts the timer loop. Dropping or stopping the handle ends it.
    pub fn spawn(
        self: Arc<Self>,
        visibility: watch::Receiver<Visibility>,
        authenticated: watch::Receiver<bool>,
    ) -> WatcherHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(visibility, authenticated, shutdown_rx));
        WatcherHandle {
            shutdown: shutdown_tx,
            task,
        }
    }

    async fn run(
        self: Arc<Self>,
        mut visibility: watch::Receiver<Visibility>,
        mut authenticated: watch::Receiver<bool>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut tracker = VisibilityTracker::new(self.config.hidden_refetch_threshold);
        let mut visible_open = true;
        let mut auth_open = true;

        let mut current_visibility = *visibility.borrow_and_update();
        let mut signed_in = *authenticated.borrow_and_update();
        if current_visibility == Visibility::Hidden {
            tracker.hidden(Instant::now());
        }

        info!(visibility = ?current_visibility, signed_in, "settings watcher started");
        if signed_in {
            self.poll_once().await;
        }
        let mut last_poll = Instant::now();

        loop {
            let deadline = poll_interval(&self.config, current_visibility, signed_in)
                .map(|interval| last_poll + interval);
            let tick = async {
                match deadline {
                    Some(deadline) => sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            };

            let poll_now = tokio::select! {
                _ = tick => true,
                changed = visibility.changed(), if visible_open => {
                    if changed.is_err() {
                        visible_open = false;
                        false
                    } else {
                        current_visibility = *visibility.borrow_and_update();
                        let now = Instant::now();
                        match current_visibility {
                            Visibility::Hidden => {
                                debug!("app backgrounded");
                                tracker.hidden(now);
                                false
                            }
                            Visibility::Visible => {
                                let stale = tracker.visible(now);
                                if stale {
                                    debug!("app visible after a long absence, refetching");
                                }
                                stale && signed_in
                            }
                        }
                    }
                }
                changed = authenticated.changed(), if auth_open => {
                    if changed.is_err() {
                        auth_open = false;
                        false
                    } else {
                        let was_signed_in = signed_in;
                        signed_in = *authenticated.borrow_and_update();
                        if !signed_in {
                            debug!("signed out, settings polling suspended");
                        }
                        signed_in && !was_signed_in
                    }
                }
                _ = shutdown.changed() => break,
            };

            if poll_now {
                self.poll_once().await;
                last_poll = Instant::now();
            }
        }

        info!("settings watcher stopped");
    }
}

pub struct WatcherHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl WatcherHandle {
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
