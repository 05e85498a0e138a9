//! The accessible reader: drives speech over a chunk list.
//!
//! One task owns all mutable reader state (sequencer, chunks, settings,
//! presenter). Callers talk to it through a cloneable [`ReaderHandle`];
//! control methods are synchronous sends. Speech for the current chunk runs in
//! its own task and reports back tagged with the sequencer generation it was
//! started under, so completions of cancelled utterances are discarded. Each
//! speech task waits for the one before it to exit, so a cancelled utterance
//! is silent before the next one starts.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::SpeechError;
use crate::playback::{Effect, PlaybackCursor, PlaybackState, Sequencer, STATUS_READY};
use crate::presenter::Presenter;
use crate::segmenter::Chunk;
use crate::settings::{ReaderSettings, SettingChange, SettingsStore};
use crate::speech::selector::BackendSelector;
use crate::speech::{BackendKind, LanguageHint, Utterance};

/// Published after every command and completion.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReaderSnapshot {
    pub state: PlaybackState,
    pub cursor: PlaybackCursor,
    pub chunk_count: usize,
    pub current_text: Option<String>,
    pub status: String,
    pub language: String,
    pub remote_available: bool,
    pub settings: ReaderSettings,
}

#[derive(Debug)]
enum Command {
    Load(Vec<Chunk>),
    Play,
    Pause,
    Toggle,
    Stop,
    Navigate(isize),
    SetLanguage(LanguageHint),
    ChangeSetting(SettingChange),
    Sync(oneshot::Sender<()>),
    Dispose(oneshot::Sender<()>),
}

struct Completion {
    generation: u64,
    result: Result<BackendKind, SpeechError>,
}

pub struct AccessibleReader {
    selector: Arc<BackendSelector>,
    settings: SettingsStore,
    presenter: Box<dyn Presenter>,
    language: LanguageHint,
}

impl AccessibleReader {
    pub fn new(
        selector: Arc<BackendSelector>,
        settings: SettingsStore,
        presenter: Box<dyn Presenter>,
        language: LanguageHint,
    ) -> Self {
        Self {
            selector,
            settings,
            presenter,
            language,
        }
    }

    /// Probe the remote backend, apply stored settings and start the reader
    /// task. Must be called from within a tokio runtime.
    pub async fn init(self) -> ReaderHandle {
        let remote = self.selector.probe().await;
        if !remote {
            info!("Using native speech only");
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = mpsc::unbounded_channel();

        let mut task = ReaderTask {
            seq: Sequencer::new(),
            chunks: Vec::new(),
            settings: self.settings,
            presenter: self.presenter,
            selector: self.selector,
            language: self.language,
            status: STATUS_READY.to_string(),
            in_flight: None,
            speaking: None,
            done_tx,
            state_tx: None,
        };
        task.presenter.apply_settings(task.settings.settings());
        task.presenter.status(STATUS_READY);

        let (state_tx, state_rx) = watch::channel(task.snapshot());
        task.state_tx = Some(state_tx);
        tokio::spawn(task.run(rx, done_rx));

        ReaderHandle { tx, state: state_rx }
    }
}

/// Cloneable control surface for a running reader.
#[derive(Clone)]
pub struct ReaderHandle {
    tx: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ReaderSnapshot>,
}

impl ReaderHandle {
    fn send(&self, command: Command) -> bool {
        if self.tx.send(command).is_err() {
            debug!("Reader has been disposed, command dropped");
            return false;
        }
        true
    }

    /// Replace the chunk list (content load). Cancels anything in flight.
    pub fn load(&self, chunks: Vec<Chunk>) {
        self.send(Command::Load(chunks));
    }

    pub fn play(&self) {
        self.send(Command::Play);
    }

    pub fn pause(&self) {
        self.send(Command::Pause);
    }

    pub fn toggle(&self) {
        self.send(Command::Toggle);
    }

    pub fn stop(&self) {
        self.send(Command::Stop);
    }

    pub fn navigate(&self, delta: isize) {
        self.send(Command::Navigate(delta));
    }

    pub fn next(&self) {
        self.navigate(1);
    }

    pub fn prev(&self) {
        self.navigate(-1);
    }

    /// Language for chunks spoken from now on.
    pub fn set_language(&self, language: &str) {
        self.send(Command::SetLanguage(LanguageHint::new(language)));
    }

    pub fn change_setting(&self, change: SettingChange) {
        self.send(Command::ChangeSetting(change));
    }

    /// Takes effect from the next chunk spoken.
    pub fn set_rate(&self, rate: f32) {
        self.change_setting(SettingChange::Rate(rate));
    }

    pub fn snapshot(&self) -> ReaderSnapshot {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<ReaderSnapshot> {
        self.state.clone()
    }

    /// Resolves once every command sent before it has been processed.
    pub async fn sync(&self) {
        let (ack, done) = oneshot::channel();
        if self.send(Command::Sync(ack)) {
            let _ = done.await;
        }
    }

    /// Cancel speech, clear highlights and end the reader task.
    pub async fn dispose(&self) {
        let (ack, done) = oneshot::channel();
        if self.send(Command::Dispose(ack)) {
            let _ = done.await;
        }
    }
}

struct ReaderTask {
    seq: Sequencer,
    chunks: Vec<Chunk>,
    settings: SettingsStore,
    presenter: Box<dyn Presenter>,
    selector: Arc<BackendSelector>,
    language: LanguageHint,
    status: String,
    in_flight: Option<CancellationToken>,
    // Most recently spawned speech task.
    speaking: Option<JoinHandle<()>>,
    done_tx: mpsc::UnboundedSender<Completion>,
    state_tx: Option<watch::Sender<ReaderSnapshot>>,
}

impl ReaderTask {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Dispose(ack)) => {
                        self.shutdown();
                        self.drain().await;
                        let _ = ack.send(());
                        break;
                    }
                    Some(Command::Sync(ack)) => {
                        self.publish();
                        let _ = ack.send(());
                    }
                    Some(command) => self.handle(command),
                    None => {
                        self.shutdown();
                        self.drain().await;
                        break;
                    }
                },
                Some(done) = completions.recv() => self.on_completion(done),
            }
            self.publish();
        }
        info!("Reader disposed");
    }

    fn handle(&mut self, command: Command) {
        debug!("Reader command: {command:?}");
        match command {
            Command::Load(chunks) => {
                if chunks.is_empty() {
                    warn!("No readable content found");
                } else {
                    info!("Loaded {} chunks", chunks.len());
                }
                let effects = self.seq.load(chunks.len());
                self.apply(effects);
                self.chunks = chunks;
            }
            Command::Play => {
                let effects = self.seq.play();
                self.apply(effects);
            }
            Command::Pause => {
                let effects = self.seq.pause();
                self.apply(effects);
            }
            Command::Toggle => {
                let effects = self.seq.toggle();
                self.apply(effects);
            }
            Command::Stop => {
                let effects = self.seq.stop();
                self.apply(effects);
            }
            Command::Navigate(delta) => {
                let effects = self.seq.navigate(delta);
                self.apply(effects);
            }
            Command::SetLanguage(language) => {
                info!("Language: {language}");
                self.language = language;
            }
            Command::ChangeSetting(change) => {
                if let Err(e) = self.settings.update(change) {
                    warn!("Failed to persist reader settings: {e}");
                }
                self.presenter.apply_settings(self.settings.settings());
            }
            Command::Sync(_) | Command::Dispose(_) => {}
        }
    }

    fn on_completion(&mut self, done: Completion) {
        let current = done.generation == self.seq.generation();
        match done.result {
            Ok(backend) => {
                if current {
                    self.seq.record_backend(backend);
                }
            }
            Err(SpeechError::Cancelled) => debug!("Utterance {} cancelled", done.generation),
            Err(e) => warn!("Speech failed, skipping chunk: {e}"),
        }
        if current {
            self.in_flight = None;
        }
        let effects = self.seq.chunk_finished(done.generation);
        self.apply(effects);
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Speak { index, generation } => self.speak(index, generation),
                Effect::CancelSpeech => self.cancel_in_flight(),
                Effect::Highlight(index) => {
                    if let Some(chunk) = self.chunks.get(index) {
                        self.presenter.highlight(index, chunk);
                    }
                }
                Effect::ClearHighlight(index) => {
                    if let Some(chunk) = self.chunks.get(index) {
                        self.presenter.clear_highlight(index, chunk);
                    }
                }
                Effect::ClearAllHighlights => self.presenter.clear_all_highlights(),
                Effect::ScrollTo(index) => {
                    if let Some(chunk) = self.chunks.get(index) {
                        self.presenter.scroll_into_view(index, chunk);
                    }
                }
                Effect::Status(message) => {
                    self.presenter.status(&message);
                    self.status = message;
                }
            }
        }
    }

    fn speak(&mut self, index: usize, generation: u64) {
        self.cancel_in_flight();
        let Some(chunk) = self.chunks.get(index) else {
            warn!("No chunk at index {index}");
            return;
        };

        let settings = self.settings.settings();
        let utterance = Utterance {
            text: chunk.text.clone(),
            language: self.language.clone(),
            rate: settings.rate,
        };
        let mode = settings.mode;
        let cancel = CancellationToken::new();
        self.in_flight = Some(cancel.clone());

        let selector = self.selector.clone();
        let done_tx = self.done_tx.clone();
        let previous = self.speaking.take();
        self.speaking = Some(tokio::spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            let result = if cancel.is_cancelled() {
                Err(SpeechError::Cancelled)
            } else {
                selector.speak(&utterance, mode, &cancel).await
            };
            let _ = done_tx.send(Completion { generation, result });
        }));
    }

    fn cancel_in_flight(&mut self) {
        if let Some(cancel) = self.in_flight.take() {
            cancel.cancel();
        }
    }

    /// Wait for the last speech task to exit.
    async fn drain(&mut self) {
        if let Some(task) = self.speaking.take() {
            let _ = task.await;
        }
    }

    fn shutdown(&mut self) {
        let effects = self.seq.stop();
        self.apply(effects);
        self.cancel_in_flight();
        self.presenter.clear_all_highlights();
        self.publish();
    }

    fn snapshot(&self) -> ReaderSnapshot {
        let cursor = self.seq.cursor();
        ReaderSnapshot {
            state: self.seq.state(),
            cursor,
            chunk_count: self.chunks.len(),
            current_text: self.chunks.get(cursor.current_index).map(|c| c.text.clone()),
            status: self.status.clone(),
            language: self.language.to_string(),
            remote_available: self.selector.remote_available(),
            settings: self.settings.settings().clone(),
        }
    }

    fn publish(&self) {
        if let Some(state_tx) = &self.state_tx {
            state_tx.send_replace(self.snapshot());
        }
    }
}
