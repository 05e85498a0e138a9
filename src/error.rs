//! Error types for the reader subsystems.
//!
//! None of these are fatal while reading: callers log them and degrade
//! (remote -> native, stored settings -> defaults).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpeechError {
    #[error("synthesis request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("synthesis service returned status {0}")]
    Status(u16),

    #[error("synthesis service returned no audio")]
    EmptyAudio,

    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("synthesizer exited with {0}")]
    Synthesizer(String),

    #[error("audio playback failed: {0}")]
    Playback(String),

    #[error("speech cancelled")]
    Cancelled,
}

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("markup parse error at byte {position}: {message}")]
    Parse { position: u64, message: String },

    #[error("failed to read content: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Error, Debug, PartialEq)]
pub enum SettingError {
    #[error("unknown setting: {0}")]
    UnknownSetting(String),

    #[error("invalid value {value:?} for {setting}")]
    InvalidValue { setting: String, value: String },
}

#[derive(Error, Debug, PartialEq)]
pub enum ControlError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("{0} needs an argument")]
    MissingArgument(&'static str),

    #[error(transparent)]
    Setting(#[from] SettingError),
}
