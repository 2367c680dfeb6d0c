//! Declarative document mutations derived from a settings snapshot.
//!
//! Nothing in here touches a real environment: [`apply_settings`] turns a
//! snapshot into an [`EffectSet`], and an [`EffectApplier`] decides what to do
//! with it.
//!
//! [`EffectApplier`]: super::applier::EffectApplier

use serde::Serialize;
use tracing::warn;

use super::color::{Hsl, hex_to_hsl, palette_for};
use super::registry::HandlerRegistry;
use super::value::{SettingValue, SettingsSnapshot, format_number};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    // the root <html> element
    Document,
    Body,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum GlobalNamespace {
    Features,
    BusinessSettings,
    App,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Effect {
    SetStyle {
        name: String,
        value: String,
    },
    ToggleClass {
        target: Target,
        class: String,
        enabled: bool,
    },
    SetAttribute {
        target: Target,
        name: String,
        value: String,
    },
    SetGlobal {
        namespace: GlobalNamespace,
        key: String,
        value: SettingValue,
    },
    SetTitle {
        title: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EffectSet {
    effects: Vec<Effect>,
}

impl EffectSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    pub fn style(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.push(Effect::SetStyle {
            name: name.into(),
            value: value.into(),
        });
    }

    pub fn class(&mut self, target: Target, class: &str, enabled: bool) {
        self.push(Effect::ToggleClass {
            target,
            class: class.to_string(),
            enabled,
        });
    }

    pub fn attribute(&mut self, target: Target, name: &str, value: impl Into<String>) {
        self.push(Effect::SetAttribute {
            target,
            name: name.to_string(),
            value: value.into(),
        });
    }

    pub fn global(&mut self, namespace: GlobalNamespace, key: &str, value: SettingValue) {
        self.push(Effect::SetGlobal {
            namespace,
            key: key.to_string(),
            value,
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &Effect> {
        self.effects.iter()
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }
}

impl<'a> IntoIterator for &'a EffectSet {
    type Item = &'a Effect;
    type IntoIter = std::slice::Iter<'a, Effect>;

    fn into_iter(self) -> Self::IntoIter {
        self.effects.iter()
    }
}

/// Pure translation of a snapshot into effects, using the standard registry.
pub fn apply_settings(snapshot: &SettingsSnapshot) -> EffectSet {
    HandlerRegistry::standard().apply(snapshot)
}

const NEUTRAL: Hsl = Hsl { h: 0, s: 0, l: 50 };

fn css_name(name: &str) -> String {
    name.trim().replace(['_', '.', ' '], "-").to_ascii_lowercase()
}

// Numbers and bare numeric strings get a px unit, anything else passes through
fn with_px(value: &SettingValue) -> String {
    match value {
        SettingValue::Number(n) => format!("{}px", format_number(*n)),
        SettingValue::String(s) if s.trim().parse::<f64>().is_ok() => format!("{}px", s.trim()),
        other => other.to_text(),
    }
}

fn flag(key: &str, value: &SettingValue) -> Option<bool> {
    let flag = value.as_bool();
    if flag.is_none() {
        warn!(key, value = %value.to_text(), "expected a boolean setting");
    }
    flag
}

fn primary_palette(value: &SettingValue, out: &mut EffectSet) {
    let palette = palette_for(value.as_str().unwrap_or_default());
    out.style("--primary", palette.base.to_css());
    out.style("--primary-hover", palette.hover.to_css());
    out.style("--primary-light", palette.light.to_css());
    out.style("--primary-lighter", palette.lighter.to_css());
}

pub(super) fn theme(name: &str, key: &str, value: &SettingValue, out: &mut EffectSet) {
    match name {
        "primary_color" | "primary" => primary_palette(value, out),
        "mode" | "theme" => {
            let mode = value.to_text().to_ascii_lowercase();
            out.attribute(Target::Document, "data-theme", mode.as_str());
            out.class(Target::Document, "dark", mode == "dark");
        }
        "dark_mode" => {
            if let Some(dark) = flag(key, value) {
                out.class(Target::Document, "dark", dark);
            }
        }
        "border_radius" | "radius" => out.style("--radius", with_px(value)),
        _ => {}
    }
}

pub(super) fn layout(name: &str, key: &str, value: &SettingValue, out: &mut EffectSet) {
    match name {
        "sidebar_collapsed" => {
            if let Some(collapsed) = flag(key, value) {
                out.class(Target::Body, "sidebar-collapsed", collapsed);
            }
        }
        "reduce_motion" => {
            if let Some(reduce) = flag(key, value) {
                out.class(Target::Body, "reduce-motion", reduce);
            }
        }
        "animations" => {
            if let Some(enabled) = flag(key, value) {
                out.class(Target::Body, "reduce-motion", !enabled);
            }
        }
        "compact_mode" => {
            if let Some(compact) = flag(key, value) {
                let density = if compact { "compact" } else { "comfortable" };
                out.attribute(Target::Body, "data-density", density);
            }
        }
        "density" => out.attribute(Target::Body, "data-density", value.to_text()),
        "language" | "locale" => out.attribute(Target::Document, "lang", value.to_text()),
        "sidebar_width" => out.style("--sidebar-width", with_px(value)),
        "page_size" => out.global(GlobalNamespace::App, "pageSize", value.clone()),
        _ => {}
    }
}

pub(super) fn typography(name: &str, _key: &str, value: &SettingValue, out: &mut EffectSet) {
    match name {
        "font_size" | "base_font_size" => out.style("--font-size-base", with_px(value)),
        "font_family" => out.style("--font-family", value.to_text()),
        "heading_font" | "heading_font_family" => {
            out.style("--font-family-heading", value.to_text())
        }
        "line_height" => out.style("--line-height", value.to_text()),
        _ => {}
    }
}

pub(super) fn color(name: &str, key: &str, value: &SettingValue, out: &mut EffectSet) {
    if name == "primary" || name == "primary_color" {
        primary_palette(value, out);
        return;
    }
    let raw = value.as_str().unwrap_or_default();
    let hsl = hex_to_hsl(raw).unwrap_or_else(|| {
        warn!(key, color = raw, "invalid color, using neutral");
        NEUTRAL
    });
    out.style(format!("--{}", css_name(name)), hsl.to_css());
}

pub(super) fn feature(name: &str, _key: &str, value: &SettingValue, out: &mut EffectSet) {
    let value = match value.as_bool() {
        Some(enabled) => SettingValue::Bool(enabled),
        None => value.clone(),
    };
    out.global(GlobalNamespace::Features, name, value);
}

pub(super) fn application(name: &str, key: &str, value: &SettingValue, out: &mut EffectSet) {
    match name {
        "name" | "app_name" | "title" => out.push(Effect::SetTitle {
            title: value.to_text(),
        }),
        "company_name" => out.global(GlobalNamespace::App, "companyName", value.clone()),
        "maintenance_mode" => {
            if let Some(on) = flag(key, value) {
                out.class(Target::Body, "maintenance-mode", on);
            }
        }
        other => out.global(GlobalNamespace::App, other, value.clone()),
    }
}

pub(super) fn business(name: &str, _key: &str, value: &SettingValue, out: &mut EffectSet) {
    out.global(GlobalNamespace::BusinessSettings, name, value.clone());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::value::SettingsMap;
    use serde_json::json;

    fn snapshot(pairs: &[(&str, SettingValue)]) -> SettingsSnapshot {
        let mapping: SettingsMap = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        SettingsSnapshot::new(mapping)
    }

    #[test]
    fn primary_color_emits_palette_in_one_run() {
        let effects = apply_settings(&snapshot(&[(
            "appearance.primary_color",
            SettingValue::String("#3366ff".into()),
        )]));
        let styles: Vec<_> = effects
            .iter()
            .map(|e| match e {
                Effect::SetStyle { name, value } => (name.as_str(), value.as_str()),
                other => panic!("unexpected effect {other:?}"),
            })
            .collect();
        assert_eq!(
            styles,
            vec![
                ("--primary", "225 100% 60%"),
                ("--primary-hover", "225 100% 55%"),
                ("--primary-light", "225 100% 95%"),
                ("--primary-lighter", "225 100% 98%"),
            ]
        );
    }

    #[test]
    fn bad_color_does_not_abort_the_pass() {
        let effects = apply_settings(&snapshot(&[
            ("color.success", SettingValue::String("#zzz".into())),
            ("typography.font_size", SettingValue::Number(15.0)),
        ]));
        assert!(effects.iter().any(|e| *e
            == Effect::SetStyle {
                name: "--success".into(),
                value: "0 0% 50%".into()
            }));
        assert!(effects.iter().any(|e| *e
            == Effect::SetStyle {
                name: "--font-size-base".into(),
                value: "15px".into()
            }));
    }

    #[test]
    fn layout_flags_toggle_classes() {
        let effects = apply_settings(&snapshot(&[
            ("ui.sidebar_collapsed", SettingValue::String("true".into())),
            ("ui.animations", SettingValue::Bool(false)),
            ("app.maintenance_mode", SettingValue::Bool(true)),
            ("appearance.mode", SettingValue::String("Dark".into())),
        ]));
        let classes: Vec<_> = effects
            .iter()
            .filter_map(|e| match e {
                Effect::ToggleClass { class, enabled, .. } => Some((class.as_str(), *enabled)),
                _ => None,
            })
            .collect();
        assert!(classes.contains(&("sidebar-collapsed", true)));
        assert!(classes.contains(&("reduce-motion", true)));
        assert!(classes.contains(&("maintenance-mode", true)));
        assert!(classes.contains(&("dark", true)));
    }

    #[test]
    fn features_and_business_go_to_globals() {
        let effects = apply_settings(&snapshot(&[
            ("features.export", SettingValue::String("yes".into())),
            ("business.currency", SettingValue::String("EUR".into())),
            ("business.hours", SettingValue::Object(json!({"open": 9}))),
            ("unknown.key", SettingValue::Bool(true)),
        ]));
        assert_eq!(effects.len(), 3);
        assert!(effects.iter().any(|e| *e
            == Effect::SetGlobal {
                namespace: GlobalNamespace::Features,
                key: "export".into(),
                value: SettingValue::Bool(true)
            }));
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::SetGlobal { namespace: GlobalNamespace::BusinessSettings, key, .. } if key == "hours"
        )));
    }

    #[test]
    fn same_snapshot_yields_same_effects() {
        let s = snapshot(&[
            ("appearance.primary_color", SettingValue::String("#3366ff".into())),
            ("app.name", SettingValue::String("Shop Admin".into())),
        ]);
        assert_eq!(apply_settings(&s), apply_settings(&s));
    }
}
