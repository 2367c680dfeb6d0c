use dashmap::DashSet;
use std::sync::Arc;
use tokio::sync::watch;

use crate::settings::value::{SettingValue, SettingsSnapshot};

// Reactive holder of the last applied settings snapshot.
// Readers always see a whole snapshot; writers swap it in one step.
pub struct ConfigStore {
    current: watch::Sender<Arc<SettingsSnapshot>>,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self {
            current: watch::Sender::new(Arc::new(SettingsSnapshot::empty())),
        }
    }
}

impl ConfigStore {
    pub fn snapshot(&self) -> Arc<SettingsSnapshot> {
        Arc::clone(&self.current.borrow())
    }

    pub fn get(&self, key: &str) -> Option<SettingValue> {
        self.current.borrow().mapping.get(key).cloned()
    }

    pub fn replace(&self, snapshot: Arc<SettingsSnapshot>) {
        self.current.send_replace(snapshot);
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<SettingsSnapshot>> {
        self.current.subscribe()
    }
}

#[derive(Debug, Default)]
pub struct PermissionStore {
    granted: DashSet<String>,
}

impl PermissionStore {
    pub fn replace(&self, permissions: impl IntoIterator<Item = String>) {
        self.granted.clear();
        for permission in permissions {
            self.granted.insert(permission);
        }
    }

    pub fn has(&self, permission: &str) -> bool {
        self.granted.contains(permission)
    }

    pub fn clear(&self) {
        self.granted.clear();
    }

    pub fn len(&self) -> usize {
        self.granted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.granted.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::value::SettingsMap;

    #[test]
    fn replace_swaps_whole_snapshot() {
        let store = ConfigStore::default();
        let mut rx = store.subscribe();

        let mut mapping = SettingsMap::new();
        mapping.insert("app.name".to_string(), SettingValue::String("Shop".to_string()));
        store.replace(Arc::new(SettingsSnapshot::new(mapping)));

        assert!(rx.has_changed().unwrap());
        assert_eq!(
            store.get("app.name"),
            Some(SettingValue::String("Shop".to_string()))
        );
        assert_eq!(rx.borrow_and_update().mapping.len(), 1);
    }

    #[test]
    fn permissions_replace_and_clear() {
        let permissions = PermissionStore::default();
        permissions.replace(["a".to_string(), "b".to_string()]);
        assert!(permissions.has("a"));
        permissions.replace(["c".to_string()]);
        assert!(!permissions.has("a"));
        assert_eq!(permissions.len(), 1);
        permissions.clear();
        assert!(permissions.is_empty());
    }
}
