use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

use crate::store::PermissionStore;

// Persisted credential blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRecord {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

pub trait AuthStore: Send + Sync {
    fn load(&self) -> Option<AuthRecord>;
    fn save(&self, record: &AuthRecord);
    fn clear(&self);

    fn token(&self) -> Option<String> {
        self.load()
            .map(|record| record.token)
            .filter(|token| !token.is_empty())
    }
}

// Auth record kept in a JSON file between runs
pub struct FileAuthStore {
    path: PathBuf,
}

impl FileAuthStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl AuthStore for FileAuthStore {
    fn load(&self) -> Option<AuthRecord> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "ignoring unreadable auth record");
                None
            }
        }
    }

    fn save(&self, record: &AuthRecord) {
        let result = serde_json::to_string_pretty(record)
            .map_err(std::io::Error::other)
            .and_then(|json| std::fs::write(&self.path, json));
        if let Err(err) = result {
            warn!(path = %self.path.display(), error = %err, "failed to persist auth record");
        }
    }

    fn clear(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "failed to remove auth record")
            }
        }
    }
}

#[derive(Default)]
pub struct MemoryAuthStore {
    record: RwLock<Option<AuthRecord>>,
}

impl MemoryAuthStore {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            record: RwLock::new(Some(AuthRecord {
                token: token.into(),
                user_id: None,
                expires_at: None,
            })),
        }
    }
}

impl AuthStore for MemoryAuthStore {
    fn load(&self) -> Option<AuthRecord> {
        self.record.read().ok().and_then(|record| record.clone())
    }

    fn save(&self, record: &AuthRecord) {
        if let Ok(mut slot) = self.record.write() {
            *slot = Some(record.clone());
        }
    }

    fn clear(&self) {
        if let Ok(mut slot) = self.record.write() {
            *slot = None;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn,
    RedirectToLogin { path: String, reason: String },
}

// Session lifecycle shared by the http client and the settings watcher
#[derive(Clone)]
pub struct Session {
    auth: Arc<dyn AuthStore>,
    permissions: Arc<PermissionStore>,
    login_path: String,
    authenticated: watch::Sender<bool>,
    events: broadcast::Sender<SessionEvent>,
    // set once a 401 has been handled, until the next sign in
    signed_out: Arc<AtomicBool>,
}

impl Session {
    pub fn new(
        auth: Arc<dyn AuthStore>,
        permissions: Arc<PermissionStore>,
        login_path: impl Into<String>,
    ) -> Self {
        let authenticated = auth.token().is_some();
        let (events, _) = broadcast::channel(16);
        Self {
            auth,
            permissions,
            login_path: login_path.into(),
            authenticated: watch::Sender::new(authenticated),
            events,
            // nothing to sign out of until a token shows up
            signed_out: Arc::new(AtomicBool::new(!authenticated)),
        }
    }

    pub fn auth(&self) -> &Arc<dyn AuthStore> {
        &self.auth
    }

    pub fn permissions(&self) -> &Arc<PermissionStore> {
        &self.permissions
    }

    pub fn bearer_token(&self) -> Option<String> {
        self.auth.token()
    }

    pub fn is_authenticated(&self) -> bool {
        *self.authenticated.borrow()
    }

    pub fn watch_authenticated(&self) -> watch::Receiver<bool> {
        self.authenticated.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn sign_in(&self, record: AuthRecord) {
        self.auth.save(&record);
        self.signed_out.store(false, Ordering::SeqCst);
        self.authenticated.send_replace(true);
        let _ = self.events.send(SessionEvent::SignedIn);
        info!(user_id = record.user_id.as_deref().unwrap_or("-"), "signed in");
    }

    /// Clears credentials and asks the app to go to the login page.
    ///
    /// Only the first call after a sign in has any effect; returns whether
    /// this call was the one that signed out.
    pub fn handle_unauthorized(&self, reason: &str) -> bool {
        if self
            .signed_out
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        warn!(reason, login_path = %self.login_path, "credentials rejected, signing out");
        self.auth.clear();
        self.permissions.clear();
        self.authenticated.send_replace(false);
        let _ = self.events.send(SessionEvent::RedirectToLogin {
            path: self.login_path.clone(),
            reason: reason.to_string(),
        });
        true
    }
}
