//! Audio output for synthesized speech.
//!
//! One output per reader. Starting a new stream stops the one before it, so
//! at most one stream is ever audible.

use std::io::Write;
use std::process::Stdio;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::PlayerConfig;
use crate::error::SpeechError;

#[async_trait]
pub trait AudioOutput: Send + Sync {
    /// Play encoded audio (WAV from the synthesis service) to the end.
    async fn play(&self, audio: Vec<u8>, rate: f32, cancel: &CancellationToken) -> Result<(), SpeechError>;
}

/// Tracks the active stream so a new one can stop it.
#[derive(Default)]
struct StreamSlot {
    current: Mutex<Option<CancellationToken>>,
}

impl StreamSlot {
    /// Claim the output: stops the previous stream and returns a token that
    /// fires when this stream is cancelled or replaced.
    fn claim(&self, cancel: &CancellationToken) -> CancellationToken {
        let stream = cancel.child_token();
        if let Some(previous) = self.current.lock().unwrap().replace(stream.clone()) {
            previous.cancel();
        }
        stream
    }
}

/// Plays audio by writing it to a temp file and running an external player.
pub struct CommandOutput {
    command: String,
    args: Vec<String>,
    slot: StreamSlot,
}

impl CommandOutput {
    pub fn new(config: &PlayerConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            slot: StreamSlot::default(),
        }
    }
}

#[async_trait]
impl AudioOutput for CommandOutput {
    async fn play(&self, audio: Vec<u8>, rate: f32, cancel: &CancellationToken) -> Result<(), SpeechError> {
        let stream = self.slot.claim(cancel);

        let mut file = tempfile::Builder::new()
            .prefix("accessible-reader-")
            .suffix(".wav")
            .tempfile()
            .map_err(|e| SpeechError::Playback(format!("Failed to create audio file: {e}")))?;
        file.write_all(&audio)
            .and_then(|_| file.flush())
            .map_err(|e| SpeechError::Playback(format!("Failed to write audio file: {e}")))?;

        let path = file.path().to_string_lossy().to_string();
        let args: Vec<String> = self.args.iter().map(|a| a.replace("{file}", &path)).collect();
        if rate != 1.0 {
            debug!("{} has no playback-rate control, playing at 1.0x", self.command);
        }

        let mut child = Command::new(&self.command)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SpeechError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        tokio::select! {
            status = child.wait() => {
                let status = status.map_err(|e| SpeechError::Playback(e.to_string()))?;
                if status.success() {
                    Ok(())
                } else {
                    Err(SpeechError::Playback(format!("{} exited with {status}", self.command)))
                }
            }
            _ = stream.cancelled() => {
                let _ = child.kill().await;
                Err(SpeechError::Cancelled)
            }
        }
    }
}

#[cfg(feature = "rodio-output")]
pub use rodio_output::RodioOutput;

#[cfg(feature = "rodio-output")]
mod rodio_output {
    use std::io::Cursor;
    use std::time::Duration;

    use async_trait::async_trait;
    use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink};
    use tokio_util::sync::CancellationToken;
    use tracing::info;

    use super::{AudioOutput, StreamSlot};
    use crate::error::SpeechError;

    /// In-process playback through a rodio sink with playback-rate control.
    pub struct RodioOutput {
        // Kept alive for the lifetime of the output.
        stream: OutputStream,
        slot: StreamSlot,
    }

    impl RodioOutput {
        pub fn open() -> Result<Self, SpeechError> {
            let stream = OutputStreamBuilder::open_default_stream()
                .map_err(|e| SpeechError::Playback(format!("Failed to open audio output: {e}")))?;
            info!("Opened default audio output");
            Ok(Self {
                stream,
                slot: StreamSlot::default(),
            })
        }
    }

    #[async_trait]
    impl AudioOutput for RodioOutput {
        async fn play(&self, audio: Vec<u8>, rate: f32, cancel: &CancellationToken) -> Result<(), SpeechError> {
            let stream = self.slot.claim(cancel);
            let source = Decoder::new(Cursor::new(audio))
                .map_err(|e| SpeechError::Playback(format!("Undecodable audio: {e}")))?;

            // rodio 0.21: Sink::connect_new takes &Mixer
            let sink = Sink::connect_new(self.stream.mixer());
            sink.set_speed(rate);
            sink.append(source);

            let mut poll = tokio::time::interval(Duration::from_millis(50));
            loop {
                tokio::select! {
                    _ = poll.tick() => {
                        if sink.empty() {
                            return Ok(());
                        }
                    }
                    _ = stream.cancelled() => {
                        sink.stop();
                        return Err(SpeechError::Cancelled);
                    }
                }
            }
        }
    }
}
