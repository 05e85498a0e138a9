//! Reader preferences and their persistence.
//!
//! Settings live as one flat JSON record under a well-known key in a
//! key-value store. Loading shallow-merges the stored record over the
//! defaults; every change rewrites the whole record.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::{SettingError, StoreError};

/// Speed presets offered by the toolbar.
pub const RATE_PRESETS: &[f32] = &[0.5, 0.75, 1.0, 1.25, 1.5, 2.0];

macro_rules! setting_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ();

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(()),
                }
            }
        }
    };
}

setting_enum!(FontSize { Sm => "sm", Md => "md", Lg => "lg", Xl => "xl" });
setting_enum!(LineHeight { Tight => "tight", Normal => "normal", Loose => "loose" });
setting_enum!(Theme {
    Default => "default",
    ContrastLight => "contrast-light",
    ContrastDark => "contrast-dark",
});
setting_enum!(FontFamily { Default => "default", Dyslexic => "dyslexic" });
setting_enum!(SpeechMode { Auto => "auto", Native => "native" });

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReaderSettings {
    pub font_size: FontSize,
    pub line_height: LineHeight,
    pub theme: Theme,
    pub font: FontFamily,
    #[serde(deserialize_with = "deserialize_rate")]
    pub rate: f32,
    pub mode: SpeechMode,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            font_size: FontSize::Md,
            line_height: LineHeight::Normal,
            theme: Theme::Default,
            font: FontFamily::Default,
            rate: 1.0,
            mode: SpeechMode::Auto,
        }
    }
}

/// Accepts `1.25` and the legacy toolbar form `"1.25"`.
fn deserialize_rate<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f32, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawRate {
        Number(f32),
        Text(String),
    }

    let rate = match RawRate::deserialize(deserializer)? {
        RawRate::Number(n) => n,
        RawRate::Text(s) => s.trim().parse().map_err(serde::de::Error::custom)?,
    };
    Ok(sanitize_rate(rate))
}

fn sanitize_rate(rate: f32) -> f32 {
    if rate.is_finite() && rate > 0.0 {
        rate
    } else {
        1.0
    }
}

impl ReaderSettings {
    /// Classes applied to the content container for the current typography.
    pub fn typography_classes(&self) -> Vec<String> {
        let mut classes = vec![
            format!("text-size-{}", self.font_size),
            format!("line-height-{}", self.line_height),
        ];
        if self.font == FontFamily::Dyslexic {
            classes.push("reader-dyslexic".into());
        }
        if self.theme != Theme::Default {
            classes.push(format!("reader-{}", self.theme));
        }
        classes
    }

    /// Every class `typography_classes` can produce, for clearing.
    pub fn all_typography_classes() -> Vec<String> {
        let mut classes: Vec<String> = ["sm", "md", "lg", "xl"]
            .iter()
            .map(|s| format!("text-size-{s}"))
            .collect();
        classes.extend(["tight", "normal", "loose"].iter().map(|l| format!("line-height-{l}")));
        classes.extend(
            ["reader-dyslexic", "reader-contrast-light", "reader-contrast-dark"]
                .iter()
                .map(|c| c.to_string()),
        );
        classes
    }

    /// Shallow-merge a stored record over the defaults. Unknown keys are
    /// ignored; a key whose value does not fit keeps its default.
    pub fn merged_over_defaults(stored: &Map<String, Value>) -> Self {
        let mut merged = match serde_json::to_value(Self::default()) {
            Ok(Value::Object(map)) => map,
            _ => return Self::default(),
        };
        let defaults = merged.clone();

        for (key, value) in stored {
            if !merged.contains_key(key) {
                continue;
            }
            merged.insert(key.clone(), value.clone());
            if serde_json::from_value::<Self>(Value::Object(merged.clone())).is_err() {
                debug!("Ignoring stored reader setting {key}={value}");
                if let Some(default) = defaults.get(key) {
                    merged.insert(key.clone(), default.clone());
                }
            }
        }

        serde_json::from_value(Value::Object(merged)).unwrap_or_default()
    }
}

/// A single user-initiated settings change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SettingChange {
    FontSize(FontSize),
    LineHeight(LineHeight),
    Theme(Theme),
    Font(FontFamily),
    Rate(f32),
    Mode(SpeechMode),
}

impl SettingChange {
    /// Parse a toolbar-style `(setting, value)` pair, e.g. `("fontSize", "lg")`.
    pub fn parse(setting: &str, value: &str) -> Result<Self, SettingError> {
        let invalid = || SettingError::InvalidValue {
            setting: setting.to_string(),
            value: value.to_string(),
        };
        let value = value.trim();
        match setting {
            "fontSize" | "font-size" | "size" => value.parse().map(Self::FontSize).map_err(|_| invalid()),
            "lineHeight" | "line-height" | "spacing" => {
                value.parse().map(Self::LineHeight).map_err(|_| invalid())
            }
            "theme" => value.parse().map(Self::Theme).map_err(|_| invalid()),
            "font" => value.parse().map(Self::Font).map_err(|_| invalid()),
            "mode" => value.parse().map(Self::Mode).map_err(|_| invalid()),
            "rate" | "speed" => {
                let rate: f32 = value.trim_end_matches('x').parse().map_err(|_| invalid())?;
                if rate.is_finite() && rate > 0.0 {
                    Ok(Self::Rate(rate))
                } else {
                    Err(invalid())
                }
            }
            other => Err(SettingError::UnknownSetting(other.to_string())),
        }
    }

    pub fn apply(self, settings: &mut ReaderSettings) {
        match self {
            Self::FontSize(v) => settings.font_size = v,
            Self::LineHeight(v) => settings.line_height = v,
            Self::Theme(v) => settings.theme = v,
            Self::Font(v) => settings.font = v,
            Self::Rate(v) => settings.rate = sanitize_rate(v),
            Self::Mode(v) => settings.mode = v,
        }
    }
}

/// Durable client-side key-value storage.
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// In-memory store. Clones share the same map, so a clone handed to a new
/// reader sees everything the previous one persisted.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), value.to_string());
        }
        Ok(())
    }
}

/// Key-value store backed by a single JSON object file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Map<String, Value> {
        let Ok(contents) = fs::read_to_string(&self.path) else {
            return Map::new();
        };
        match serde_json::from_str(&contents) {
            Ok(Value::Object(map)) => map,
            _ => {
                warn!("Ignoring malformed storage file {}", self.path.display());
                Map::new()
            }
        }
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.read_all()
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut all = self.read_all();
        all.insert(key.to_string(), Value::String(value.to_string()));

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&Value::Object(all))?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}

/// Loads, merges and persists [`ReaderSettings`].
pub struct SettingsStore {
    store: Box<dyn KeyValueStore>,
    key: String,
    settings: ReaderSettings,
}

impl SettingsStore {
    /// Read the persisted record; absent or malformed means defaults.
    pub fn load(store: Box<dyn KeyValueStore>, key: &str) -> Self {
        let settings = match store.get(key) {
            None => ReaderSettings::default(),
            Some(raw) => match serde_json::from_str::<Value>(&raw) {
                Ok(Value::Object(map)) => {
                    info!("Loaded reader settings from storage key {key}");
                    ReaderSettings::merged_over_defaults(&map)
                }
                Ok(_) => {
                    warn!("Stored reader settings are not an object, using defaults");
                    ReaderSettings::default()
                }
                Err(e) => {
                    warn!("Failed to parse stored reader settings: {e}, using defaults");
                    ReaderSettings::default()
                }
            },
        };

        Self {
            store,
            key: key.to_string(),
            settings,
        }
    }

    pub fn settings(&self) -> &ReaderSettings {
        &self.settings
    }

    /// Apply a change and persist the whole record.
    pub fn update(&mut self, change: SettingChange) -> Result<&ReaderSettings, StoreError> {
        change.apply(&mut self.settings);
        self.persist()?;
        Ok(&self.settings)
    }

    pub fn persist(&mut self) -> Result<(), StoreError> {
        let json = serde_json::to_string(&self.settings)?;
        self.store.set(&self.key, &json)?;
        debug!("Persisted reader settings: {json}");
        Ok(())
    }
}
