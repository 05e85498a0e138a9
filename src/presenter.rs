//! Visible side of the reader: highlight, scroll, status text, typography.

use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::document::{Document, NodeId};
use crate::segmenter::Chunk;
use crate::settings::ReaderSettings;

/// Class marking the chunk being read.
pub const HIGHLIGHT_CLASS: &str = "reading";

pub trait Presenter: Send {
    fn highlight(&mut self, index: usize, chunk: &Chunk);
    fn clear_highlight(&mut self, index: usize, chunk: &Chunk);
    fn clear_all_highlights(&mut self);
    fn scroll_into_view(&mut self, index: usize, chunk: &Chunk);
    fn status(&mut self, message: &str);
    fn apply_settings(&mut self, settings: &ReaderSettings);
}

/// Terminal presenter: prints the chunk being read and status changes.
#[derive(Default)]
pub struct ConsolePresenter {
    last_status: String,
}

impl ConsolePresenter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Presenter for ConsolePresenter {
    fn highlight(&mut self, index: usize, chunk: &Chunk) {
        println!("  ▶ [{}] {}", index + 1, chunk.text);
    }

    fn clear_highlight(&mut self, _index: usize, _chunk: &Chunk) {}

    fn clear_all_highlights(&mut self) {}

    fn scroll_into_view(&mut self, _index: usize, _chunk: &Chunk) {}

    fn status(&mut self, message: &str) {
        if message != self.last_status {
            println!("[{message}]");
            self.last_status = message.to_string();
        }
    }

    fn apply_settings(&mut self, settings: &ReaderSettings) {
        debug!(
            "Typography: {} (rate {}x, mode {})",
            settings.typography_classes().join(" "),
            settings.rate,
            settings.mode
        );
    }
}

/// Presents onto a shared [`Document`]: highlight and typography become
/// classes on elements. Clones share the same view.
#[derive(Clone)]
pub struct DocumentPresenter {
    document: Arc<Mutex<Document>>,
    container: NodeId,
    status: Arc<Mutex<String>>,
    scrolled_to: Arc<Mutex<Option<NodeId>>>,
}

impl DocumentPresenter {
    pub fn new(document: Arc<Mutex<Document>>, container: NodeId) -> Self {
        Self {
            document,
            container,
            status: Arc::new(Mutex::new(String::new())),
            scrolled_to: Arc::new(Mutex::new(None)),
        }
    }

    pub fn status_text(&self) -> String {
        self.status.lock().unwrap().clone()
    }

    pub fn scrolled_to(&self) -> Option<NodeId> {
        *self.scrolled_to.lock().unwrap()
    }

    pub fn highlighted(&self) -> Vec<NodeId> {
        self.document.lock().unwrap().elements_with_class(HIGHLIGHT_CLASS)
    }
}

impl Presenter for DocumentPresenter {
    fn highlight(&mut self, _index: usize, chunk: &Chunk) {
        let mut doc = self.document.lock().unwrap();
        for id in doc.elements_with_class(HIGHLIGHT_CLASS) {
            doc.remove_class(id, HIGHLIGHT_CLASS);
        }
        doc.add_class(chunk.source, HIGHLIGHT_CLASS);
    }

    fn clear_highlight(&mut self, _index: usize, chunk: &Chunk) {
        self.document.lock().unwrap().remove_class(chunk.source, HIGHLIGHT_CLASS);
    }

    fn clear_all_highlights(&mut self) {
        let mut doc = self.document.lock().unwrap();
        for id in doc.elements_with_class(HIGHLIGHT_CLASS) {
            doc.remove_class(id, HIGHLIGHT_CLASS);
        }
    }

    fn scroll_into_view(&mut self, _index: usize, chunk: &Chunk) {
        *self.scrolled_to.lock().unwrap() = Some(chunk.source);
    }

    fn status(&mut self, message: &str) {
        *self.status.lock().unwrap() = message.to_string();
    }

    fn apply_settings(&mut self, settings: &ReaderSettings) {
        let mut doc = self.document.lock().unwrap();
        for class in ReaderSettings::all_typography_classes() {
            doc.remove_class(self.container, &class);
        }
        for class in settings.typography_classes() {
            doc.add_class(self.container, &class);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{FontFamily, FontSize, Theme};

    fn presenter() -> (DocumentPresenter, Vec<Chunk>) {
        let doc = Document::parse_html(
            r#"<div id="content"><p>Amazing grace!</p><p>How sweet the sound.</p></div>"#,
        )
        .unwrap();
        let container = doc.find_by_id("content").unwrap();
        let chunks = doc
            .children(container)
            .iter()
            .map(|&source| Chunk {
                source,
                text: doc.text_content(source),
            })
            .collect();
        (DocumentPresenter::new(Arc::new(Mutex::new(doc)), container), chunks)
    }

    #[test]
    fn exactly_one_chunk_is_highlighted() {
        let (mut p, chunks) = presenter();
        p.highlight(0, &chunks[0]);
        p.highlight(1, &chunks[1]);
        assert_eq!(p.highlighted(), vec![chunks[1].source]);

        p.clear_highlight(1, &chunks[1]);
        assert!(p.highlighted().is_empty());

        p.highlight(0, &chunks[0]);
        p.clear_all_highlights();
        assert!(p.highlighted().is_empty());
    }

    #[test]
    fn typography_classes_replace_previous_ones() {
        let (mut p, _) = presenter();
        let mut settings = ReaderSettings {
            font_size: FontSize::Xl,
            theme: Theme::ContrastDark,
            font: FontFamily::Dyslexic,
            ..ReaderSettings::default()
        };
        p.apply_settings(&settings);
        settings.font_size = FontSize::Sm;
        settings.theme = Theme::Default;
        p.apply_settings(&settings);

        let doc = p.document.lock().unwrap();
        let classes = &doc.element(p.container).unwrap().classes;
        assert!(classes.contains(&"text-size-sm".to_string()));
        assert!(classes.contains(&"reader-dyslexic".to_string()));
        assert!(!classes.contains(&"text-size-xl".to_string()));
        assert!(!classes.contains(&"reader-contrast-dark".to_string()));
    }
}
