//! Backend settings: normalization, theme derivation, effect planning and
//! the watcher that keeps the document in sync.

pub mod applier;
pub mod color;
pub mod effects;
pub mod registry;
pub mod value;
pub mod watcher;

pub use applier::{DocumentState, EffectApplier, Globals, InMemoryDocument};
pub use effects::{Effect, EffectSet, GlobalNamespace, Target, apply_settings};
pub use registry::{Family, HandlerRegistry};
pub use value::{SettingValue, SettingsMap, SettingsSnapshot, normalize_settings};
pub use watcher::{
    PollOutcome, SettingsEndpoint, SettingsEvent, SettingsSource, SettingsWatcher, Visibility,
    WatcherHandle, WatcherPhase,
};
