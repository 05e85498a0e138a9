//! HTTP control API for a running reader.
//!
//! Runs on 127.0.0.1:8791 (configurable) using axum. Used by `reader-ctl`
//! and anything else that wants to drive the reader from outside.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::reader::{ReaderHandle, ReaderSnapshot};
use crate::settings::SettingChange;

#[derive(Clone)]
pub struct ApiState {
    pub reader: ReaderHandle,
}

// --- Request/Response types ---

#[derive(Deserialize)]
struct SettingRequest {
    setting: String,
    value: serde_json::Value,
}

#[derive(Deserialize)]
struct LanguageRequest {
    language: String,
}

#[derive(Serialize)]
struct SimpleResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reader: Option<ReaderSnapshot>,
}

impl SimpleResponse {
    fn ok(status: &str, reader: ReaderSnapshot) -> Self {
        Self {
            status: status.into(),
            error: None,
            reader: Some(reader),
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            status: "error".into(),
            error: Some(message.into()),
            reader: None,
        }
    }
}

/// Build the axum router.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/status", get(handle_status))
        .route("/play", post(handle_play))
        .route("/pause", post(handle_pause))
        .route("/toggle", post(handle_toggle))
        .route("/stop", post(handle_stop))
        .route("/next", post(handle_next))
        .route("/prev", post(handle_prev))
        .route("/settings", post(handle_settings))
        .route("/language", post(handle_language))
        .with_state(state)
}

/// Start the control API server as a background tokio task.
pub async fn start_control_api(state: ApiState, port: u16) {
    let app = router(state);
    let addr = format!("127.0.0.1:{port}");
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            warn!("Failed to bind control API on {addr}: {e}");
            return;
        }
    };
    info!("Control API listening on {addr}");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            warn!("Control API server error: {e}");
        }
    });
}

/// Wait for the reader to process the command, then report its state.
async fn settled(state: &ApiState, status: &str) -> Json<SimpleResponse> {
    state.reader.sync().await;
    Json(SimpleResponse::ok(status, state.reader.snapshot()))
}

// --- Handlers ---

async fn handle_status(State(state): State<ApiState>) -> Json<ReaderSnapshot> {
    Json(state.reader.snapshot())
}

async fn handle_play(State(state): State<ApiState>) -> Json<SimpleResponse> {
    state.reader.play();
    settled(&state, "ok").await
}

async fn handle_pause(State(state): State<ApiState>) -> Json<SimpleResponse> {
    state.reader.pause();
    settled(&state, "ok").await
}

async fn handle_toggle(State(state): State<ApiState>) -> Json<SimpleResponse> {
    state.reader.toggle();
    settled(&state, "ok").await
}

async fn handle_stop(State(state): State<ApiState>) -> Json<SimpleResponse> {
    state.reader.stop();
    settled(&state, "ok").await
}

async fn handle_next(State(state): State<ApiState>) -> Json<SimpleResponse> {
    state.reader.next();
    settled(&state, "ok").await
}

async fn handle_prev(State(state): State<ApiState>) -> Json<SimpleResponse> {
    state.reader.prev();
    settled(&state, "ok").await
}

async fn handle_settings(
    State(state): State<ApiState>,
    Json(req): Json<SettingRequest>,
) -> Json<SimpleResponse> {
    // Toolbar values arrive as strings or numbers (`"lg"`, `1.25`).
    let value = match &req.value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    match SettingChange::parse(&req.setting, &value) {
        Ok(change) => {
            info!("HTTP /settings: {}={value}", req.setting);
            state.reader.change_setting(change);
            settled(&state, "ok").await
        }
        Err(e) => Json(SimpleResponse::err(e.to_string())),
    }
}

async fn handle_language(
    State(state): State<ApiState>,
    Json(req): Json<LanguageRequest>,
) -> Json<SimpleResponse> {
    if req.language.trim().is_empty() {
        return Json(SimpleResponse::err("empty language"));
    }
    state.reader.set_language(&req.language);
    settled(&state, "ok").await
}
