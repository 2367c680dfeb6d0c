use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::SettingsError;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SettingValue {
    String(String),
    Number(f64),
    Bool(bool),
    Object(Value),
}

impl SettingValue {
    // None for null, which the backend uses for "unset"
    pub fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(SettingValue::Bool(b)),
            Value::Number(n) => n.as_f64().map(SettingValue::Number),
            Value::String(s) => Some(SettingValue::String(s)),
            other => Some(SettingValue::Object(other)),
        }
    }

    // Typed record, e.g. {"key": "ui.compact", "value": "true", "type": "boolean"}
    fn from_typed(value: Value, kind: &str) -> Option<Self> {
        let raw = match &value {
            Value::String(s) => s.trim().to_string(),
            _ => return Self::from_json(value),
        };
        match kind {
            "bool" | "boolean" => parse_bool(&raw).map(SettingValue::Bool),
            "number" | "int" | "integer" | "float" => raw.parse().ok().map(SettingValue::Number),
            "json" | "object" | "array" => serde_json::from_str(&raw)
                .ok()
                .and_then(Self::from_json),
            _ => Some(SettingValue::String(raw)),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SettingValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SettingValue::Bool(b) => Some(*b),
            SettingValue::Number(n) => Some(*n != 0.0),
            SettingValue::String(s) => parse_bool(s),
            SettingValue::Object(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SettingValue::Number(n) => Some(*n),
            SettingValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    // Plain text form used for css values and globals
    pub fn to_text(&self) -> String {
        match self {
            SettingValue::String(s) => s.clone(),
            SettingValue::Number(n) => format_number(*n),
            SettingValue::Bool(b) => b.to_string(),
            SettingValue::Object(v) => v.to_string(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            SettingValue::String(s) => Value::String(s.clone()),
            SettingValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            SettingValue::Bool(b) => Value::Bool(*b),
            SettingValue::Object(v) => v.clone(),
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

pub type SettingsMap = BTreeMap<String, SettingValue>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettingsSnapshot {
    pub mapping: SettingsMap,
    pub fetched_at: DateTime<Utc>,
}

impl SettingsSnapshot {
    pub fn new(mapping: SettingsMap) -> Self {
        Self {
            mapping,
            fetched_at: Utc::now(),
        }
    }

    pub fn empty() -> Self {
        Self::new(SettingsMap::new())
    }

    pub fn get(&self, key: &str) -> Option<&SettingValue> {
        self.mapping.get(key)
    }

    // Key-by-key comparison, fetch time is ignored
    pub fn differs_from(&self, mapping: &SettingsMap) -> bool {
        &self.mapping != mapping
    }
}

/// Flattens a settings response into a key/value map.
///
/// Accepts either an array of `{key, value, type?}` records or a plain
/// object. Records without a string key are skipped; any other shape is a
/// parse error.
pub fn normalize_settings(body: Value) -> Result<SettingsMap, SettingsError> {
    let mut mapping = SettingsMap::new();
    match body {
        Value::Array(records) => {
            for record in records {
                let Value::Object(mut fields) = record else {
                    continue;
                };
                let Some(Value::String(key)) = fields.remove("key") else {
                    continue;
                };
                let value = fields.remove("value").unwrap_or(Value::Null);
                let parsed = match fields.get("type").and_then(Value::as_str) {
                    Some(kind) => SettingValue::from_typed(value, &kind.to_ascii_lowercase()),
                    None => SettingValue::from_json(value),
                };
                if let Some(parsed) = parsed {
                    mapping.insert(key, parsed);
                }
            }
        }
        Value::Object(fields) => {
            for (key, value) in fields {
                if let Some(parsed) = SettingValue::from_json(value) {
                    mapping.insert(key, parsed);
                }
            }
        }
        other => {
            return Err(SettingsError::Parse(format!(
                "expected an array or object of settings, got {}",
                json_kind(&other)
            )));
        }
    }
    Ok(mapping)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
