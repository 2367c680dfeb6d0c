use serde::Serialize;

use super::effects::{self, EffectSet};
use super::value::{SettingValue, SettingsSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    Theme,
    Layout,
    Typography,
    Color,
    Feature,
    Application,
    Business,
}

// (name after the prefix, full key, value, output)
pub type Handler = fn(&str, &str, &SettingValue, &mut EffectSet);

struct Route {
    prefix: String,
    family: Family,
    handler: Handler,
}

// Ordered prefix table. The first registered prefix that matches a key wins.
pub struct HandlerRegistry {
    routes: Vec<Route>,
}

impl HandlerRegistry {
    pub fn empty() -> Self {
        Self { routes: Vec::new() }
    }

    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry
            .register("appearance.", Family::Theme, effects::theme)
            .register("theme.", Family::Theme, effects::theme)
            .register("ui.", Family::Layout, effects::layout)
            .register("layout.", Family::Layout, effects::layout)
            .register("typography.", Family::Typography, effects::typography)
            .register("color.", Family::Color, effects::color)
            .register("colors.", Family::Color, effects::color)
            .register("features.", Family::Feature, effects::feature)
            .register("feature.", Family::Feature, effects::feature)
            .register("app.", Family::Application, effects::application)
            .register("application.", Family::Application, effects::application)
            .register("business.", Family::Business, effects::business);
        registry
    }

    pub fn register(&mut self, prefix: impl Into<String>, family: Family, handler: Handler) -> &mut Self {
        self.routes.push(Route {
            prefix: prefix.into(),
            family,
            handler,
        });
        self
    }

    // Family and the remainder of the key, for the first matching prefix
    pub fn resolve<'k>(&self, key: &'k str) -> Option<(Family, &'k str)> {
        self.route(key).map(|(route, name)| (route.family, name))
    }

    fn route<'k>(&self, key: &'k str) -> Option<(&Route, &'k str)> {
        self.routes.iter().find_map(|route| {
            key.strip_prefix(route.prefix.as_str())
                .filter(|name| !name.is_empty())
                .map(|name| (route, name))
        })
    }

    pub fn apply(&self, snapshot: &SettingsSnapshot) -> EffectSet {
        let mut out = EffectSet::new();
        for (key, value) in &snapshot.mapping {
            if let Some((route, name)) = self.route(key) {
                (route.handler)(name, key, value, &mut out);
            }
        }
        out
    }
}
