//! Playback sequencing state machine.
//!
//! IDLE → PLAYING ⇄ PAUSED → IDLE
//!
//! The sequencer owns no I/O. Every transition returns the effects the driver
//! must perform, in order. Each `Speak` carries a generation; a completion is
//! only honoured if its generation is still current, so anything that cancels
//! speech (pause, stop, navigate, load) also invalidates late completions.

use serde::Serialize;

use crate::speech::BackendKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Playing => write!(f, "PLAYING"),
            Self::Paused => write!(f, "PAUSED"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackCursor {
    pub current_index: usize,
    pub is_playing: bool,
    pub active_backend: BackendKind,
}

impl Default for PlaybackCursor {
    fn default() -> Self {
        Self {
            current_index: 0,
            is_playing: false,
            active_backend: BackendKind::Native,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Start speaking chunk `index`; report completion with `generation`.
    Speak { index: usize, generation: u64 },
    /// Cancel whatever is in flight.
    CancelSpeech,
    Highlight(usize),
    ClearHighlight(usize),
    ClearAllHighlights,
    ScrollTo(usize),
    Status(String),
}

pub const STATUS_READY: &str = "Ready to read";
pub const STATUS_PAUSED: &str = "Paused";

#[derive(Debug, Clone)]
pub struct Sequencer {
    state: PlaybackState,
    cursor: PlaybackCursor,
    len: usize,
    generation: u64,
    highlighted: Option<usize>,
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl Sequencer {
    pub fn new() -> Self {
        Self {
            state: PlaybackState::Idle,
            cursor: PlaybackCursor::default(),
            len: 0,
            generation: 0,
            highlighted: None,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn cursor(&self) -> PlaybackCursor {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Replace the chunk list with one of `len` chunks.
    pub fn load(&mut self, len: usize) -> Vec<Effect> {
        let mut effects = self.halt();
        self.len = len;
        self.cursor.current_index = 0;
        self.highlighted = None;
        self.set_state(PlaybackState::Idle);
        effects.push(Effect::ClearAllHighlights);
        effects.push(Effect::Status(STATUS_READY.into()));
        effects
    }

    pub fn play(&mut self) -> Vec<Effect> {
        if self.len == 0 || self.state == PlaybackState::Playing {
            return Vec::new();
        }
        self.set_state(PlaybackState::Playing);
        self.speak_current()
    }

    pub fn pause(&mut self) -> Vec<Effect> {
        if self.state != PlaybackState::Playing {
            return Vec::new();
        }
        let mut effects = self.halt();
        self.set_state(PlaybackState::Paused);
        effects.extend(self.clear_highlight());
        effects.push(Effect::Status(STATUS_PAUSED.into()));
        effects
    }

    pub fn stop(&mut self) -> Vec<Effect> {
        let mut effects = self.halt();
        self.set_state(PlaybackState::Idle);
        self.cursor.current_index = 0;
        self.highlighted = None;
        effects.push(Effect::ClearAllHighlights);
        effects.push(Effect::Status(STATUS_READY.into()));
        effects
    }

    pub fn toggle(&mut self) -> Vec<Effect> {
        if self.state == PlaybackState::Playing {
            self.pause()
        } else {
            self.play()
        }
    }

    /// The utterance started with `generation` has ended (spoken, failed or
    /// cancelled). Advances only if it is the current utterance.
    pub fn chunk_finished(&mut self, generation: u64) -> Vec<Effect> {
        if generation != self.generation || self.state != PlaybackState::Playing {
            return Vec::new();
        }

        let mut effects = self.clear_highlight();
        let next = self.cursor.current_index + 1;
        if next < self.len {
            self.cursor.current_index = next;
            effects.extend(self.speak_current());
        } else {
            self.generation += 1;
            self.cursor.current_index = 0;
            self.set_state(PlaybackState::Idle);
            effects.push(Effect::Status(STATUS_READY.into()));
        }
        effects
    }

    /// Move the cursor by `delta`. Moves outside the list are ignored.
    pub fn navigate(&mut self, delta: isize) -> Vec<Effect> {
        let Some(target) = self
            .cursor
            .current_index
            .checked_add_signed(delta)
            .filter(|&t| t < self.len)
        else {
            return Vec::new();
        };

        if self.state == PlaybackState::Playing {
            let mut effects = self.halt();
            effects.extend(self.clear_highlight());
            self.cursor.current_index = target;
            effects.extend(self.speak_current());
            effects
        } else {
            let mut effects = self.clear_highlight();
            self.cursor.current_index = target;
            self.highlighted = Some(target);
            effects.push(Effect::Highlight(target));
            effects.push(Effect::ScrollTo(target));
            effects.push(Effect::Status(format!("Selected {}", target + 1)));
            effects
        }
    }

    pub fn record_backend(&mut self, backend: BackendKind) {
        self.cursor.active_backend = backend;
    }

    fn speak_current(&mut self) -> Vec<Effect> {
        let index = self.cursor.current_index;
        self.generation += 1;

        let mut effects = Vec::new();
        if self.highlighted != Some(index) {
            effects.extend(self.clear_highlight());
            effects.push(Effect::Highlight(index));
            self.highlighted = Some(index);
        }
        effects.push(Effect::ScrollTo(index));
        effects.push(Effect::Status(format!("Reading {}/{}", index + 1, self.len)));
        effects.push(Effect::Speak {
            index,
            generation: self.generation,
        });
        effects
    }

    /// Cancel in-flight speech and invalidate its completion.
    fn halt(&mut self) -> Vec<Effect> {
        self.generation += 1;
        if self.state == PlaybackState::Playing {
            vec![Effect::CancelSpeech]
        } else {
            Vec::new()
        }
    }

    fn clear_highlight(&mut self) -> Vec<Effect> {
        self.highlighted.take().map(Effect::ClearHighlight).into_iter().collect()
    }

    fn set_state(&mut self, state: PlaybackState) {
        self.state = state;
        self.cursor.is_playing = state == PlaybackState::Playing;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn speaks(effects: &[Effect]) -> Vec<usize> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Speak { index, .. } => Some(*index),
                _ => None,
            })
            .collect()
    }

    fn generation_of(effects: &[Effect]) -> u64 {
        effects
            .iter()
            .find_map(|e| match e {
                Effect::Speak { generation, .. } => Some(*generation),
                _ => None,
            })
            .expect("no speak effect")
    }

    #[test]
    fn play_on_empty_list_is_a_no_op() {
        let mut seq = Sequencer::new();
        seq.load(0);
        for _ in 0..3 {
            assert!(seq.play().is_empty());
            assert_eq!(seq.state(), PlaybackState::Idle);
        }
        assert!(seq.toggle().is_empty());
    }

    #[test]
    fn plays_through_and_resets_at_the_end() {
        let mut seq = Sequencer::new();
        seq.load(2);

        let effects = seq.play();
        assert_eq!(speaks(&effects), vec![0]);
        assert!(effects.contains(&Effect::Status("Reading 1/2".into())));

        let effects = seq.chunk_finished(generation_of(&effects));
        assert_eq!(speaks(&effects), vec![1]);
        assert_eq!(effects[0], Effect::ClearHighlight(0));

        let effects = seq.chunk_finished(generation_of(&effects));
        assert_eq!(
            effects,
            vec![Effect::ClearHighlight(1), Effect::Status(STATUS_READY.into())]
        );
        assert_eq!(seq.state(), PlaybackState::Idle);
        assert_eq!(seq.cursor().current_index, 0);
        assert!(!seq.cursor().is_playing);
    }

    #[test]
    fn play_while_playing_is_ignored() {
        let mut seq = Sequencer::new();
        seq.load(3);
        seq.play();
        assert!(seq.play().is_empty());
    }

    #[test]
    fn pause_then_play_resumes_the_same_chunk() {
        let mut seq = Sequencer::new();
        seq.load(3);
        let first = seq.play();
        let second = seq.chunk_finished(generation_of(&first));
        assert_eq!(speaks(&second), vec![1]);

        let effects = seq.pause();
        assert_eq!(effects[0], Effect::CancelSpeech);
        assert!(effects.contains(&Effect::Status(STATUS_PAUSED.into())));
        assert_eq!(seq.cursor().current_index, 1);

        // Late completion of the cancelled utterance must not advance.
        assert!(seq.chunk_finished(generation_of(&second)).is_empty());

        let resumed = seq.play();
        assert_eq!(speaks(&resumed), vec![1]);
    }

    #[test]
    fn stale_completion_is_ignored_after_navigation() {
        let mut seq = Sequencer::new();
        seq.load(3);
        let first = seq.play();
        let jumped = seq.navigate(1);
        assert_eq!(jumped[0], Effect::CancelSpeech);
        assert_eq!(speaks(&jumped), vec![1]);

        assert!(seq.chunk_finished(generation_of(&first)).is_empty());
        assert_eq!(seq.cursor().current_index, 1);

        let next = seq.chunk_finished(generation_of(&jumped));
        assert_eq!(speaks(&next), vec![2]);
    }

    #[test]
    fn navigation_is_clamped_without_wraparound() {
        let mut seq = Sequencer::new();
        seq.load(3);
        assert!(seq.navigate(-1).is_empty());
        assert_eq!(seq.cursor().current_index, 0);

        let effects = seq.navigate(1);
        assert_eq!(
            effects,
            vec![
                Effect::Highlight(1),
                Effect::ScrollTo(1),
                Effect::Status("Selected 2".into()),
            ]
        );
        seq.navigate(1);
        assert!(seq.navigate(1).is_empty());
        assert_eq!(seq.cursor().current_index, 2);
        assert!(speaks(&seq.navigate(-1)).is_empty());
    }

    #[test]
    fn selecting_again_moves_the_highlight() {
        let mut seq = Sequencer::new();
        seq.load(3);
        seq.navigate(1);

        let effects = seq.navigate(1);
        assert_eq!(
            effects,
            vec![
                Effect::ClearHighlight(1),
                Effect::Highlight(2),
                Effect::ScrollTo(2),
                Effect::Status("Selected 3".into()),
            ]
        );
    }

    #[test]
    fn stop_resets_cursor_and_clears_everything() {
        let mut seq = Sequencer::new();
        seq.load(3);
        let first = seq.play();
        seq.chunk_finished(generation_of(&first));

        let effects = seq.stop();
        assert_eq!(
            effects,
            vec![
                Effect::CancelSpeech,
                Effect::ClearAllHighlights,
                Effect::Status(STATUS_READY.into()),
            ]
        );
        assert_eq!(seq.cursor().current_index, 0);
        assert_eq!(seq.state(), PlaybackState::Idle);
    }

    #[test]
    fn load_replaces_the_list_and_cancels() {
        let mut seq = Sequencer::new();
        seq.load(5);
        let first = seq.play();
        seq.navigate(3);

        let effects = seq.load(2);
        assert_eq!(effects[0], Effect::CancelSpeech);
        assert_eq!(seq.len(), 2);
        assert_eq!(seq.cursor().current_index, 0);
        assert!(seq.chunk_finished(generation_of(&first)).is_empty());
    }

    #[test]
    fn toggle_alternates_play_and_pause() {
        let mut seq = Sequencer::new();
        seq.load(1);
        assert_eq!(speaks(&seq.toggle()), vec![0]);
        assert_eq!(seq.state(), PlaybackState::Playing);
        seq.toggle();
        assert_eq!(seq.state(), PlaybackState::Paused);
    }
}
