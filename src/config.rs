//! Configuration management for accessible-reader.
//!
//! Loads config from YAML files in standard locations. Every section falls
//! back to its defaults, so an empty or partial file is valid.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub health_timeout_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "http://localhost:8000".into(),
            health_timeout_ms: 2000,
            request_timeout_secs: 30,
        }
    }
}

impl RemoteConfig {
    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NativeConfig {
    /// Command-line synthesizer (espeak-ng compatible flags).
    pub command: String,
    /// Voice used when no voice matches the language hint. Empty = engine default.
    pub default_voice: String,
    /// Words per minute at rate 1.0.
    pub base_wpm: u32,
}

impl Default for NativeConfig {
    fn default() -> Self {
        Self {
            command: "espeak-ng".into(),
            default_voice: String::new(),
            base_wpm: 175,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// `command` or `rodio` (requires the `rodio-output` feature).
    pub backend: String,
    pub command: String,
    /// Arguments; `{file}` is replaced by the path of the audio file.
    pub args: Vec<String>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            backend: "command".into(),
            command: "aplay".into(),
            args: vec!["-q".into(), "{file}".into()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    pub tags: Vec<String>,
    pub classes: Vec<String>,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            tags: vec!["p".into(), "li".into()],
            classes: vec![
                "verse-block".into(),
                "verse-unit".into(),
                "song-line".into(),
                "content-inner".into(),
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON key-value file. Empty = ~/.config/accessible-reader/storage.json
    pub path: String,
    pub settings_key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            settings_key: "readerSettings".into(),
        }
    }
}

impl StorageConfig {
    pub fn resolved_path(&self) -> PathBuf {
        if self.path.is_empty() {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("accessible-reader/storage.json")
        } else {
            PathBuf::from(&self.path)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8791,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub remote: RemoteConfig,
    pub native: NativeConfig,
    pub player: PlayerConfig,
    pub segmenter: SegmenterConfig,
    pub storage: StorageConfig,
    pub api: ApiConfig,
    pub language: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            remote: RemoteConfig::default(),
            native: NativeConfig::default(),
            player: PlayerConfig::default(),
            segmenter: SegmenterConfig::default(),
            storage: StorageConfig::default(),
            api: ApiConfig::default(),
            language: "en".into(),
        }
    }
}

impl Config {
    /// Load configuration from YAML file.
    ///
    /// Searches standard locations if no path is provided:
    /// 1. ./config.yaml
    /// 2. ~/.config/accessible-reader/config.yaml
    /// 3. /etc/accessible-reader/config.yaml
    pub fn load(path: Option<&Path>) -> Self {
        let resolved = path.map(PathBuf::from).or_else(|| {
            let candidates = [
                std::env::current_dir().ok().map(|d| d.join("config.yaml")),
                dirs::home_dir().map(|h| h.join(".config/accessible-reader/config.yaml")),
                Some(PathBuf::from("/etc/accessible-reader/config.yaml")),
            ];
            candidates.into_iter().flatten().find(|p| p.exists())
        });

        let Some(config_path) = resolved else {
            info!("No config file found, using defaults");
            return Self::default();
        };

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match Self::from_yaml(&contents) {
                Ok(config) => {
                    info!("Loaded config from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {e}, using defaults", config_path.display());
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read {}: {e}, using defaults", config_path.display());
                Self::default()
            }
        }
    }

    pub fn from_yaml(contents: &str) -> Result<Self, serde_yml::Error> {
        serde_yml::from_str(contents)
    }
}
