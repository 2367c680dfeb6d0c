use dashmap::DashMap;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use super::effects::{Effect, EffectSet, GlobalNamespace, Target};
use super::value::SettingValue;

pub trait EffectApplier: Send + Sync {
    /// Executes `effects` in one pass and returns how many of them changed
    /// observable state. Re-applying the same set returns 0.
    fn apply(&self, effects: &EffectSet) -> usize;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DocumentState {
    pub style: BTreeMap<String, String>,
    pub classes: BTreeMap<Target, BTreeSet<String>>,
    pub attributes: BTreeMap<Target, BTreeMap<String, String>>,
    pub title: Option<String>,
}

impl DocumentState {
    pub fn has_class(&self, target: Target, class: &str) -> bool {
        self.classes
            .get(&target)
            .is_some_and(|classes| classes.contains(class))
    }

    fn apply_one(&mut self, effect: &Effect) -> bool {
        match effect {
            Effect::SetStyle { name, value } => {
                if self.style.get(name) == Some(value) {
                    return false;
                }
                self.style.insert(name.clone(), value.clone());
                true
            }
            Effect::ToggleClass {
                target,
                class,
                enabled,
            } => {
                let classes = self.classes.entry(*target).or_default();
                if *enabled {
                    classes.insert(class.clone())
                } else {
                    classes.remove(class)
                }
            }
            Effect::SetAttribute {
                target,
                name,
                value,
            } => {
                let attributes = self.attributes.entry(*target).or_default();
                if attributes.get(name) == Some(value) {
                    return false;
                }
                attributes.insert(name.clone(), value.clone());
                true
            }
            Effect::SetTitle { title } => {
                if self.title.as_ref() == Some(title) {
                    return false;
                }
                self.title = Some(title.clone());
                true
            }
            // globals live outside the document
            Effect::SetGlobal { .. } => false,
        }
    }
}

// Process-wide dictionaries for consumers that do not subscribe to the store
#[derive(Debug, Default)]
pub struct Globals {
    features: DashMap<String, SettingValue>,
    business_settings: DashMap<String, SettingValue>,
    app: DashMap<String, SettingValue>,
}

impl Globals {
    fn namespace(&self, namespace: GlobalNamespace) -> &DashMap<String, SettingValue> {
        match namespace {
            GlobalNamespace::Features => &self.features,
            GlobalNamespace::BusinessSettings => &self.business_settings,
            GlobalNamespace::App => &self.app,
        }
    }

    pub fn get(&self, namespace: GlobalNamespace, key: &str) -> Option<SettingValue> {
        self.namespace(namespace).get(key).map(|entry| entry.value().clone())
    }

    pub fn feature_enabled(&self, name: &str) -> bool {
        self.get(GlobalNamespace::Features, name)
            .and_then(|value| value.as_bool())
            .unwrap_or(false)
    }

    fn set(&self, namespace: GlobalNamespace, key: &str, value: &SettingValue) -> bool {
        let map = self.namespace(namespace);
        if map.get(key).is_some_and(|current| current.value() == value) {
            return false;
        }
        map.insert(key.to_string(), value.clone());
        true
    }

    pub fn to_json(&self) -> Value {
        let dump = |map: &DashMap<String, SettingValue>| {
            let sorted: BTreeMap<String, Value> = map
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().to_json()))
                .collect();
            Value::Object(sorted.into_iter().collect::<Map<_, _>>())
        };
        serde_json::json!({
            "features": dump(&self.features),
            "businessSettings": dump(&self.business_settings),
            "app": dump(&self.app),
        })
    }
}

// Headless document: keeps the state a browser document would hold
#[derive(Debug, Default)]
pub struct InMemoryDocument {
    state: RwLock<DocumentState>,
    globals: Globals,
    writes: AtomicU64,
}

impl InMemoryDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> DocumentState {
        match self.state.read() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn globals(&self) -> &Globals {
        &self.globals
    }

    // Total number of effective mutations since creation
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}

impl EffectApplier for InMemoryDocument {
    fn apply(&self, effects: &EffectSet) -> usize {
        let mut state = match self.state.write() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut changed = 0;
        for effect in effects {
            let did_change = match effect {
                Effect::SetGlobal {
                    namespace,
                    key,
                    value,
                } => self.globals.set(*namespace, key, value),
                other => state.apply_one(other),
            };
            if did_change {
                changed += 1;
            }
        }
        self.writes.fetch_add(changed as u64, Ordering::Relaxed);
        changed
    }
}
