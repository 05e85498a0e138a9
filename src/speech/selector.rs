//! Backend selection policy.
//!
//! Remote is used when the startup probe succeeded and the speech mode is
//! `auto`. A remote failure falls back to native for that chunk only; the
//! next chunk tries remote again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::native::NativeSpeech;
use super::output::{AudioOutput, CommandOutput};
use super::remote::RemoteSpeech;
use super::{BackendKind, SpeechBackend, Utterance};
use crate::config::{Config, PlayerConfig};
use crate::error::SpeechError;
use crate::settings::SpeechMode;

pub struct BackendSelector {
    native: Arc<dyn SpeechBackend>,
    remote: Option<Arc<dyn SpeechBackend>>,
    remote_eligible: AtomicBool,
}

impl BackendSelector {
    pub fn new(native: Arc<dyn SpeechBackend>, remote: Option<Arc<dyn SpeechBackend>>) -> Self {
        Self {
            native,
            remote,
            remote_eligible: AtomicBool::new(false),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let native: Arc<dyn SpeechBackend> = Arc::new(NativeSpeech::new(&config.native));
        let remote = config.remote.enabled.then(|| {
            let output = audio_output(&config.player);
            Arc::new(RemoteSpeech::new(&config.remote, output)) as Arc<dyn SpeechBackend>
        });
        Self::new(native, remote)
    }

    /// Probe the remote service once. Until this runs, only native is used.
    pub async fn probe(&self) -> bool {
        let available = match &self.remote {
            Some(remote) => remote.health_check().await,
            None => false,
        };
        self.remote_eligible.store(available, Ordering::SeqCst);
        available
    }

    pub fn remote_available(&self) -> bool {
        self.remote_eligible.load(Ordering::SeqCst)
    }

    /// Speak one chunk, returning the backend that actually produced it.
    pub async fn speak(
        &self,
        utterance: &Utterance,
        mode: SpeechMode,
        cancel: &CancellationToken,
    ) -> Result<BackendKind, SpeechError> {
        if mode == SpeechMode::Auto && self.remote_available() {
            if let Some(remote) = &self.remote {
                match remote.speak(utterance, cancel).await {
                    Ok(()) => return Ok(remote.kind()),
                    Err(SpeechError::Cancelled) => return Err(SpeechError::Cancelled),
                    Err(e) => warn!("Remote speech failed, using native for this chunk: {e}"),
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(SpeechError::Cancelled);
        }
        self.native.speak(utterance, cancel).await?;
        Ok(self.native.kind())
    }
}

fn audio_output(player: &PlayerConfig) -> Arc<dyn AudioOutput> {
    match player.backend.as_str() {
        #[cfg(feature = "rodio-output")]
        "rodio" => match super::output::RodioOutput::open() {
            Ok(output) => return Arc::new(output),
            Err(e) => warn!("{e}, falling back to {}", player.command),
        },
        "command" => {}
        other => warn!("Unknown player backend {other:?}, using {}", player.command),
    }
    info!("Remote audio plays through {}", player.command);
    Arc::new(CommandOutput::new(player))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::LanguageHint;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct FakeBackend {
        kind: BackendKind,
        healthy: bool,
        fail: bool,
        calls: AtomicUsize,
    }

    impl FakeBackend {
        fn new(kind: BackendKind, healthy: bool, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                kind,
                healthy,
                fail,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SpeechBackend for FakeBackend {
        fn kind(&self) -> BackendKind {
            self.kind
        }

        async fn speak(&self, _utterance: &Utterance, _cancel: &CancellationToken) -> Result<(), SpeechError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(SpeechError::Status(503))
            } else {
                Ok(())
            }
        }

        async fn health_check(&self) -> bool {
            self.healthy
        }
    }

    fn utterance() -> Utterance {
        Utterance {
            text: "Q1. What is the chief end of man?".into(),
            language: LanguageHint::default(),
            rate: 1.0,
        }
    }

    #[tokio::test]
    async fn healthy_remote_is_used_in_auto_mode_only() {
        let native = FakeBackend::new(BackendKind::Native, true, false);
        let remote = FakeBackend::new(BackendKind::Remote, true, false);
        let selector = BackendSelector::new(native.clone(), Some(remote.clone()));
        assert!(selector.probe().await);

        let cancel = CancellationToken::new();
        let used = selector.speak(&utterance(), SpeechMode::Auto, &cancel).await.unwrap();
        assert_eq!(used, BackendKind::Remote);

        let used = selector.speak(&utterance(), SpeechMode::Native, &cancel).await.unwrap();
        assert_eq!(used, BackendKind::Native);
        assert_eq!((remote.calls(), native.calls()), (1, 1));
    }

    #[tokio::test]
    async fn remote_failure_falls_back_per_chunk() {
        let native = FakeBackend::new(BackendKind::Native, true, false);
        let remote = FakeBackend::new(BackendKind::Remote, true, true);
        let selector = BackendSelector::new(native.clone(), Some(remote.clone()));
        selector.probe().await;

        let cancel = CancellationToken::new();
        for _ in 0..3 {
            let used = selector.speak(&utterance(), SpeechMode::Auto, &cancel).await.unwrap();
            assert_eq!(used, BackendKind::Native);
        }
        // Still eligible: every chunk retries remote first.
        assert!(selector.remote_available());
        assert_eq!((remote.calls(), native.calls()), (3, 3));
    }

    #[tokio::test]
    async fn unhealthy_or_missing_remote_is_never_called() {
        let native = FakeBackend::new(BackendKind::Native, true, false);
        let remote = FakeBackend::new(BackendKind::Remote, false, false);
        let selector = BackendSelector::new(native.clone(), Some(remote.clone()));
        assert!(!selector.probe().await);
        selector
            .speak(&utterance(), SpeechMode::Auto, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(remote.calls(), 0);

        let selector = BackendSelector::new(native.clone(), None);
        assert!(!selector.probe().await);
        assert!(!selector.remote_available());
    }

    #[tokio::test]
    async fn reported_backend_is_the_one_that_spoke() {
        // A remote service configured as the only backend reports itself.
        let only = FakeBackend::new(BackendKind::Remote, true, false);
        let selector = BackendSelector::new(only, None);
        let used = selector
            .speak(&utterance(), SpeechMode::Native, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(used, BackendKind::Remote);
    }

    #[tokio::test]
    async fn native_failure_is_reported() {
        let native = FakeBackend::new(BackendKind::Native, true, true);
        let selector = BackendSelector::new(native, None);
        let err = selector
            .speak(&utterance(), SpeechMode::Auto, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SpeechError::Status(503)));
    }
}
