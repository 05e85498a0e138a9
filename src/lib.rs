//! accessible-reader: read-aloud engine for devotional content.
//!
//! Segments a content region into chunks, speaks them one after another and
//! highlights the chunk being read. Synthesis goes to a remote service when
//! one is healthy and falls back to an on-device synthesizer per chunk.

pub mod api;
pub mod config;
pub mod controls;
pub mod document;
pub mod error;
pub mod playback;
pub mod presenter;
pub mod reader;
pub mod segmenter;
pub mod settings;
pub mod speech;
