//! Speech backends.
//!
//! Components:
//! - `native`: on-device synthesis through a command-line synthesizer
//! - `remote`: HTTP synthesis service + health probe
//! - `output`: the single audio output remote audio is played through
//! - `selector`: backend policy (remote when healthy, native fallback per chunk)

pub mod native;
pub mod output;
pub mod remote;
pub mod selector;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::SpeechError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Native,
    Remote,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => write!(f, "native"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

/// Language tag such as `en-US` or `hi-IN`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageHint(String);

impl LanguageHint {
    /// Normalizes `hi_in` to `hi-IN` and expands the bare codes the content
    /// uses (`en`, `hi`) to their regional tags.
    pub fn new(tag: &str) -> Self {
        let tag = tag.trim().replace('_', "-");
        let mut parts = tag.split('-').filter(|p| !p.is_empty());
        let primary = parts.next().unwrap_or("en").to_ascii_lowercase();
        let region = parts.next().map(str::to_ascii_uppercase);

        let full = match (primary.as_str(), region) {
            (_, Some(region)) => format!("{primary}-{region}"),
            ("en", None) => "en-US".to_string(),
            ("hi", None) => "hi-IN".to_string(),
            (_, None) => primary,
        };
        Self(full)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `hi` for `hi-IN`.
    pub fn primary(&self) -> &str {
        self.0.split('-').next().unwrap_or(&self.0)
    }
}

impl Default for LanguageHint {
    fn default() -> Self {
        Self::new("en")
    }
}

impl fmt::Display for LanguageHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One chunk's worth of speech.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub language: LanguageHint,
    pub rate: f32,
}

/// A speech-synthesis provider.
///
/// `speak` resolves when the utterance has finished playing. Cancelling the
/// token must stop output promptly and resolve with [`SpeechError::Cancelled`].
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    async fn speak(&self, utterance: &Utterance, cancel: &CancellationToken) -> Result<(), SpeechError>;

    /// Startup probe deciding whether this backend may be used at all.
    async fn health_check(&self) -> bool {
        true
    }
}
