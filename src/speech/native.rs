//! On-device speech through a command-line synthesizer.
//!
//! Uses espeak-ng compatible flags: `--voices` to enumerate, `-v` to pick a
//! voice and `-s` for words per minute. The synthesizer process is killed as
//! soon as the utterance is cancelled.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{BackendKind, LanguageHint, SpeechBackend, Utterance};
use crate::config::NativeConfig;
use crate::error::SpeechError;

const MIN_WPM: f32 = 80.0;
const MAX_WPM: f32 = 450.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    /// Language tag as reported by the synthesizer (`hi`, `en-us`).
    pub language: String,
    pub name: String,
}

pub struct NativeSpeech {
    command: String,
    default_voice: String,
    base_wpm: u32,
    voices: OnceCell<Vec<Voice>>,
}

impl NativeSpeech {
    pub fn new(config: &NativeConfig) -> Self {
        Self {
            command: config.command.clone(),
            default_voice: config.default_voice.clone(),
            base_wpm: config.base_wpm,
            voices: OnceCell::new(),
        }
    }

    /// Enumerate installed voices once per backend.
    pub async fn voices(&self) -> &[Voice] {
        self.voices
            .get_or_init(|| async {
                match Command::new(&self.command).arg("--voices").output().await {
                    Ok(output) if output.status.success() => {
                        let voices = parse_voice_list(&String::from_utf8_lossy(&output.stdout));
                        info!("{} reports {} voices", self.command, voices.len());
                        voices
                    }
                    Ok(output) => {
                        warn!("{} --voices exited with {}", self.command, output.status);
                        Vec::new()
                    }
                    Err(e) => {
                        warn!("Failed to enumerate voices with {}: {e}", self.command);
                        Vec::new()
                    }
                }
            })
            .await
    }

    async fn voice_for(&self, language: &LanguageHint) -> Option<String> {
        match select_voice(self.voices().await, language) {
            Some(voice) => Some(voice.language.clone()),
            None if !self.default_voice.is_empty() => Some(self.default_voice.clone()),
            None => None,
        }
    }

    fn words_per_minute(&self, rate: f32) -> u32 {
        (self.base_wpm as f32 * rate).round().clamp(MIN_WPM, MAX_WPM) as u32
    }
}

#[async_trait]
impl SpeechBackend for NativeSpeech {
    fn kind(&self) -> BackendKind {
        BackendKind::Native
    }

    async fn speak(&self, utterance: &Utterance, cancel: &CancellationToken) -> Result<(), SpeechError> {
        let voice = self.voice_for(&utterance.language).await;
        let wpm = self.words_per_minute(utterance.rate).to_string();

        let mut cmd = Command::new(&self.command);
        if let Some(voice) = &voice {
            cmd.args(["-v", voice.as_str()]);
        }
        cmd.args(["-s", wpm.as_str(), "--", utterance.text.as_str()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        debug!(
            "Native speech: voice={} wpm={wpm} \"{}\"",
            voice.as_deref().unwrap_or("default"),
            utterance.text
        );

        let mut child = cmd.spawn().map_err(|source| SpeechError::Spawn {
            command: self.command.clone(),
            source,
        })?;

        tokio::select! {
            status = child.wait() => {
                let status = status.map_err(|e| SpeechError::Synthesizer(e.to_string()))?;
                if status.success() {
                    Ok(())
                } else {
                    Err(SpeechError::Synthesizer(status.to_string()))
                }
            }
            _ = cancel.cancelled() => {
                if let Err(e) = child.kill().await {
                    debug!("Synthesizer already gone: {e}");
                }
                Err(SpeechError::Cancelled)
            }
        }
    }
}

/// Parse `espeak-ng --voices` output.
///
/// ```text
/// Pty Language       Age/Gender VoiceName          File                 Other Languages
///  5  hi              --/M      Hindi              inc/hi
/// ```
pub fn parse_voice_list(output: &str) -> Vec<Voice> {
    output
        .lines()
        .filter(|line| !line.trim_start().starts_with("Pty"))
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            match fields.as_slice() {
                [_, language, _, name, ..] => Some(Voice {
                    language: language.to_string(),
                    name: name.replace('_', " "),
                }),
                _ => None,
            }
        })
        .collect()
}

/// Exact tag match first, then a voice for the same primary language.
pub fn select_voice<'a>(voices: &'a [Voice], hint: &LanguageHint) -> Option<&'a Voice> {
    let wanted = hint.as_str().to_ascii_lowercase();
    let primary = hint.primary().to_ascii_lowercase();

    voices
        .iter()
        .find(|v| v.language.replace('_', "-").to_ascii_lowercase() == wanted)
        .or_else(|| {
            voices.iter().find(|v| {
                let lang = v.language.to_ascii_lowercase();
                lang == primary || lang.starts_with(&format!("{primary}-"))
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const VOICES: &str = "\
Pty Language       Age/Gender VoiceName          File                 Other Languages
 5  af              --/M      Afrikaans          gmw/af
 2  en-gb           --/M      English_(Great_Britain) gmw/en            (en 2)
 5  en-us           --/M      English_(America)  gmw/en-US            (en 3)
 5  en-029          --/M      English_(Caribbean) gmw/en-029
 5  hi              --/M      Hindi              inc/hi
";

    #[test]
    fn parses_voice_table() {
        let voices = parse_voice_list(VOICES);
        assert_eq!(voices.len(), 5);
        assert_eq!(voices[4], Voice { language: "hi".into(), name: "Hindi".into() });
    }

    #[test]
    fn prefers_exact_then_primary_language() {
        let voices = parse_voice_list(VOICES);
        let us = select_voice(&voices, &LanguageHint::new("en-US")).unwrap();
        assert_eq!(us.language, "en-us");

        let hindi = select_voice(&voices, &LanguageHint::new("hi")).unwrap();
        assert_eq!(hindi.language, "hi");

        let indian_english = select_voice(&voices, &LanguageHint::new("en-IN")).unwrap();
        assert_eq!(indian_english.language, "en-gb");

        assert!(select_voice(&voices, &LanguageHint::new("ta")).is_none());
    }

    #[test]
    fn rate_maps_to_clamped_wpm() {
        let native = NativeSpeech::new(&NativeConfig::default());
        assert_eq!(native.words_per_minute(1.0), 175);
        assert_eq!(native.words_per_minute(2.0), 350);
        assert_eq!(native.words_per_minute(0.1), 80);
    }

    #[tokio::test]
    async fn missing_synthesizer_is_a_spawn_error() {
        let native = NativeSpeech::new(&NativeConfig {
            command: "definitely-not-a-synthesizer".into(),
            ..NativeConfig::default()
        });
        let utterance = Utterance {
            text: "Amen.".into(),
            language: LanguageHint::default(),
            rate: 1.0,
        };
        let err = native.speak(&utterance, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, SpeechError::Spawn { .. }));
    }
}
