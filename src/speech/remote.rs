//! Remote speech synthesis over HTTP.
//!
//! Endpoints:
//! - `GET  /health`      any 2xx within the health timeout = usable
//! - `POST /synthesize`  `{text, language, rate}` -> audio bytes
//!
//! The returned audio is played through the shared [`AudioOutput`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::output::AudioOutput;
use super::{BackendKind, SpeechBackend, Utterance};
use crate::config::RemoteConfig;
use crate::error::SpeechError;

#[derive(Debug, Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
    /// Primary subtag only (`hi`, `en`).
    language: &'a str,
    rate: f32,
}

pub struct RemoteSpeech {
    endpoint: String,
    client: Client,
    health_timeout: Duration,
    output: Arc<dyn AudioOutput>,
}

impl RemoteSpeech {
    pub fn new(config: &RemoteConfig, output: Arc<dyn AudioOutput>) -> Self {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to configure HTTP client ({e}), using defaults");
                Client::new()
            });

        Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            client,
            health_timeout: config.health_timeout(),
            output,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn synthesize(&self, utterance: &Utterance) -> Result<Vec<u8>, SpeechError> {
        let body = SynthesizeRequest {
            text: &utterance.text,
            language: utterance.language.primary(),
            rate: utterance.rate,
        };
        let resp = self
            .client
            .post(format!("{}/synthesize", self.endpoint))
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(SpeechError::Status(resp.status().as_u16()));
        }
        let audio = resp.bytes().await?;
        if audio.is_empty() {
            return Err(SpeechError::EmptyAudio);
        }
        Ok(audio.to_vec())
    }
}

#[async_trait]
impl SpeechBackend for RemoteSpeech {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    async fn speak(&self, utterance: &Utterance, cancel: &CancellationToken) -> Result<(), SpeechError> {
        let audio = tokio::select! {
            audio = self.synthesize(utterance) => audio?,
            _ = cancel.cancelled() => return Err(SpeechError::Cancelled),
        };
        debug!("Remote synthesis returned {} bytes", audio.len());
        self.output.play(audio, utterance.rate, cancel).await
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/health", self.endpoint);
        match self.client.get(&url).timeout(self.health_timeout).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!("Remote speech available at {}", self.endpoint);
                true
            }
            Ok(resp) => {
                warn!("Remote speech health check returned {}", resp.status());
                false
            }
            Err(e) => {
                info!("Remote speech unavailable at {}: {e}", self.endpoint);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::LanguageHint;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingOutput {
        played: Mutex<Vec<(Vec<u8>, f32)>>,
    }

    #[async_trait]
    impl AudioOutput for RecordingOutput {
        async fn play(&self, audio: Vec<u8>, rate: f32, _cancel: &CancellationToken) -> Result<(), SpeechError> {
            self.played.lock().unwrap().push((audio, rate));
            Ok(())
        }
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn remote(endpoint: String, output: Arc<RecordingOutput>) -> RemoteSpeech {
        let config = RemoteConfig {
            endpoint,
            health_timeout_ms: 500,
            ..RemoteConfig::default()
        };
        RemoteSpeech::new(&config, output)
    }

    fn utterance(text: &str) -> Utterance {
        Utterance {
            text: text.into(),
            language: LanguageHint::new("hi"),
            rate: 1.5,
        }
    }

    #[tokio::test]
    async fn synthesizes_and_plays_audio() {
        let app = Router::new()
            .route("/health", get(|| async { Json(serde_json::json!({"status": "ok"})) }))
            .route(
                "/synthesize",
                post(|Json(body): Json<serde_json::Value>| async move {
                    assert_eq!(body["language"], "hi");
                    assert_eq!(body["rate"], 1.5);
                    format!("WAV:{}", body["text"].as_str().unwrap_or_default()).into_bytes()
                }),
            );
        let output = Arc::new(RecordingOutput::default());
        let remote = remote(serve(app).await, output.clone());

        assert!(remote.health_check().await);
        remote
            .speak(&utterance("आदि में परमेश्वर"), &CancellationToken::new())
            .await
            .unwrap();

        let played = output.played.lock().unwrap();
        assert_eq!(played.len(), 1);
        assert_eq!(played[0].0, "WAV:आदि में परमेश्वर".as_bytes());
        assert_eq!(played[0].1, 1.5);
    }

    #[tokio::test]
    async fn error_status_and_empty_audio_are_failures() {
        let app = Router::new()
            .route("/health", get(|| async { StatusCode::SERVICE_UNAVAILABLE }))
            .route("/synthesize", post(|| async { StatusCode::INTERNAL_SERVER_ERROR }));
        let output = Arc::new(RecordingOutput::default());
        let remote = remote(serve(app).await, output.clone());

        assert!(!remote.health_check().await);
        let err = remote
            .speak(&utterance("Amen."), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SpeechError::Status(500)));

        let app = Router::new().route("/synthesize", post(|| async { Vec::<u8>::new() }));
        let remote = super::RemoteSpeech::new(
            &RemoteConfig {
                endpoint: serve(app).await,
                ..RemoteConfig::default()
            },
            output.clone(),
        );
        let err = remote
            .speak(&utterance("Amen."), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SpeechError::EmptyAudio));
        assert!(output.played.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreachable_service_fails_health_check() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let remote = remote(endpoint, Arc::new(RecordingOutput::default()));
        assert!(!remote.health_check().await);
    }

    #[tokio::test]
    async fn cancelled_before_audio_arrives() {
        let app = Router::new().route(
            "/synthesize",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                vec![1u8]
            }),
        );
        let output = Arc::new(RecordingOutput::default());
        let remote = remote(serve(app).await, output.clone());

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });
        let err = remote.speak(&utterance("Selah"), &cancel).await.unwrap_err();
        assert!(matches!(err, SpeechError::Cancelled));
        assert!(output.played.lock().unwrap().is_empty());
    }
}
