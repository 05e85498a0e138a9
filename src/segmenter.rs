//! Content segmentation: host document -> ordered list of speakable chunks.
//!
//! Structural mode accepts elements matching a configurable tag/class set.
//! When nothing matches, the container's text is split into sentences and
//! each sentence gets its own wrapper element so it can still be highlighted.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::SegmenterConfig;
use crate::document::{Document, NodeId};

/// Wrapper class for sentence chunks synthesized in fallback mode.
pub const SENTENCE_CHUNK_CLASS: &str = "reader-chunk";

static SENTENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^.!?]+[.!?]+").expect("static sentence regex"));

/// One speakable unit mapped to one highlightable element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub source: NodeId,
    pub text: String,
}

/// Which elements count as chunk boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentRules {
    pub tags: Vec<String>,
    pub classes: Vec<String>,
}

impl Default for SegmentRules {
    fn default() -> Self {
        Self::from(&SegmenterConfig::default())
    }
}

impl From<&SegmenterConfig> for SegmentRules {
    fn from(config: &SegmenterConfig) -> Self {
        Self {
            tags: config.tags.iter().map(|t| t.to_ascii_lowercase()).collect(),
            classes: config.classes.clone(),
        }
    }
}

impl SegmentRules {
    fn accepts(&self, doc: &Document, id: NodeId) -> bool {
        let Some(el) = doc.element(id) else {
            return false;
        };
        self.tags.iter().any(|t| *t == el.tag) || self.classes.iter().any(|c| el.has_class(c))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segmentation {
    /// Chunks backed by existing elements.
    Structural(Vec<Chunk>),
    /// Sentences of the container's flattened text, not yet bound to elements.
    Sentences { container: NodeId, sentences: Vec<String> },
}

impl Segmentation {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Segmentation::Sentences { .. })
    }

    /// Bind the segmentation to elements. In sentence mode the container's
    /// children are replaced by one `span.reader-chunk` per sentence.
    pub fn materialize(self, doc: &mut Document) -> Vec<Chunk> {
        match self {
            Segmentation::Structural(chunks) => chunks,
            Segmentation::Sentences { container, sentences } => {
                if sentences.is_empty() {
                    return Vec::new();
                }
                doc.clear_children(container);
                sentences
                    .into_iter()
                    .enumerate()
                    .map(|(idx, text)| {
                        let span = doc.append_element(container, "span");
                        doc.add_class(span, SENTENCE_CHUNK_CLASS);
                        doc.set_attribute(span, "data-reader-idx", &idx.to_string());
                        doc.append_text(span, &format!("{text} "));
                        Chunk { source: span, text }
                    })
                    .collect()
            }
        }
    }
}

/// Segment the subtree under `root`.
///
/// Depth-first, document order. An accepted element that contains other
/// accepted elements yields the inner ones, plus one chunk for each run of
/// its own content lying between them. Text outside every accepted element
/// is not read.
pub fn segment(doc: &Document, root: NodeId, rules: &SegmentRules) -> Segmentation {
    if !rules.accepts(doc, root) && !has_accepted_descendant(doc, root, rules) {
        return Segmentation::Sentences {
            container: root,
            sentences: split_sentences(&doc.text_content(root)),
        };
    }

    let mut chunks = Vec::new();
    if has_accepted_descendant(doc, root, rules) {
        collect(doc, root, rules, rules.accepts(doc, root), &mut chunks);
    } else {
        push_run(doc, root, &[root], &mut chunks);
    }
    Segmentation::Structural(chunks)
}

fn has_accepted_descendant(doc: &Document, id: NodeId, rules: &SegmentRules) -> bool {
    doc.descendants(id).into_iter().any(|d| rules.accepts(doc, d))
}

/// Walk the children of `parent`, which has accepted descendants.
/// `speak_own` is set when `parent` or one of its ancestors is accepted.
fn collect(doc: &Document, parent: NodeId, rules: &SegmentRules, speak_own: bool, out: &mut Vec<Chunk>) {
    let mut run: Vec<NodeId> = Vec::new();
    for &child in doc.children(parent) {
        let accepted = rules.accepts(doc, child);
        let nested = has_accepted_descendant(doc, child, rules);
        if !accepted && !nested {
            if speak_own {
                run.push(child);
            }
            continue;
        }

        push_run(doc, parent, &run, out);
        run.clear();
        if nested {
            collect(doc, child, rules, speak_own || accepted, out);
        } else {
            push_run(doc, child, &[child], out);
        }
    }
    push_run(doc, parent, &run, out);
}

/// Emit `nodes` as one chunk. A run made of a single element is highlighted
/// on that element, anything else on the enclosing `parent`.
fn push_run(doc: &Document, parent: NodeId, nodes: &[NodeId], out: &mut Vec<Chunk>) {
    let text = doc.text_of(nodes);
    if !is_speakable(&text) {
        return;
    }
    let mut visible = nodes.iter().copied().filter(|&n| !doc.text_content(n).is_empty());
    let source = match (visible.next(), visible.next()) {
        (Some(only), None) if doc.element(only).is_some() => only,
        _ => parent,
    };
    out.push(Chunk { source, text });
}

/// Non-empty and contains a letter; drops bare verse numbers and punctuation.
fn is_speakable(text: &str) -> bool {
    text.chars().any(char::is_alphabetic)
}

/// Split on terminal punctuation (`.`, `!`, `?`), keeping a trailing
/// unterminated fragment.
pub fn split_sentences(text: &str) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let mut sentences = Vec::new();
    let mut end = 0;
    for m in SENTENCE.find_iter(text) {
        let s = m.as_str().trim();
        if !s.is_empty() {
            sentences.push(s.to_string());
        }
        end = m.end();
    }

    let rest = text[end..].trim();
    if !rest.is_empty() {
        sentences.push(rest.to_string());
    }
    sentences
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATECHISM: &str = r#"<main>
      <section id="content">
        <div class="content-inner">
          <p>Q1. What is the chief end of man?</p>
          <p>Man's chief end is to glorify God, and to enjoy him for ever.</p>
          <p>   </p>
          <p>12</p>
        </div>
      </section>
    </main>"#;

    fn content(doc: &Document) -> NodeId {
        doc.find_by_id("content").unwrap()
    }

    #[test]
    fn structural_mode_uses_accepted_elements_in_order() {
        let doc = Document::parse_html(CATECHISM).unwrap();
        let seg = segment(&doc, content(&doc), &SegmentRules::default());

        let Segmentation::Structural(chunks) = seg else {
            panic!("expected structural segmentation");
        };
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "Q1. What is the chief end of man?",
                "Man's chief end is to glorify God, and to enjoy him for ever.",
            ]
        );
    }

    #[test]
    fn wrapper_text_between_accepted_children_is_kept() {
        let html = r#"<div id="content">
          <div class="content-inner">
            <p>Answer text.</p>
            <div class="question">इसका क्या अर्थ है?</div>
            <p>Explanation text.</p>
          </div>
        </div>"#;
        let doc = Document::parse_html(html).unwrap();
        let Segmentation::Structural(chunks) = segment(&doc, content(&doc), &SegmentRules::default()) else {
            panic!("expected structural segmentation");
        };
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["Answer text.", "इसका क्या अर्थ है?", "Explanation text."]);
        assert_eq!(doc.element(chunks[1].source).unwrap().tag, "div");
        assert!(doc.has_class(chunks[1].source, "question"));
    }

    #[test]
    fn loose_inline_text_in_a_wrapper_is_one_chunk() {
        let html = r#"<div id="content"><div class="content-inner"><p>Q2. Who made you?</p>God <b>made</b> me.<p>Q3. What else?</p></div></div>"#;
        let doc = Document::parse_html(html).unwrap();
        let inner = doc.elements_with_class("content-inner")[0];
        let Segmentation::Structural(chunks) = segment(&doc, content(&doc), &SegmentRules::default()) else {
            panic!("expected structural segmentation");
        };
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].text, "God made me.");
        assert_eq!(chunks[1].source, inner);
    }

    #[test]
    fn text_outside_accepted_elements_is_not_read() {
        let html = r#"<div id="content"><h2>Heading</h2><p>Only this.</p></div>"#;
        let doc = Document::parse_html(html).unwrap();
        let Segmentation::Structural(chunks) = segment(&doc, content(&doc), &SegmentRules::default()) else {
            panic!("expected structural segmentation");
        };
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Only this.");
    }

    #[test]
    fn verse_numbers_and_whitespace_are_dropped() {
        let html = r#"<div id="content">
            <span class="verse-unit"><sup>1</sup></span>
            <span class="verse-unit">In the beginning God created the heaven and the earth.</span>
            <span class="verse-unit">२</span>
            <span class="verse-unit">पृथ्वी बेडौल और सुनसान पड़ी थी</span>
        </div>"#;
        let doc = Document::parse_html(html).unwrap();
        let seg = segment(&doc, content(&doc), &SegmentRules::default());
        let Segmentation::Structural(chunks) = seg else {
            panic!("expected structural segmentation");
        };
        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].text.starts_with("पृथ्वी"));
    }

    #[test]
    fn segmentation_is_deterministic() {
        let doc = Document::parse_html(CATECHISM).unwrap();
        let rules = SegmentRules::default();
        let first = segment(&doc, content(&doc), &rules);
        for _ in 0..5 {
            assert_eq!(segment(&doc, content(&doc), &rules), first);
        }
    }

    #[test]
    fn predicate_is_configurable() {
        let doc = Document::parse_html(CATECHISM).unwrap();
        let rules = SegmentRules {
            tags: vec![],
            classes: vec!["content-inner".into()],
        };
        let Segmentation::Structural(chunks) = segment(&doc, content(&doc), &rules) else {
            panic!("expected structural segmentation");
        };
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.ends_with("for ever. 12"));
    }

    #[test]
    fn falls_back_to_sentences_and_wraps_each_one() {
        let mut doc = Document::from_text(
            "The Lord is my shepherd; I shall not want. He maketh me to lie down! Selah",
            "content",
        );
        let root = content(&doc);
        let seg = segment(&doc, root, &SegmentRules::default());
        assert!(seg.is_fallback());

        let chunks = seg.materialize(&mut doc);
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "The Lord is my shepherd; I shall not want.",
                "He maketh me to lie down!",
                "Selah",
            ]
        );

        assert_eq!(doc.children(root).len(), 3);
        for (idx, chunk) in chunks.iter().enumerate() {
            let el = doc.element(chunk.source).unwrap();
            assert_eq!(el.tag, "span");
            assert!(el.has_class(SENTENCE_CHUNK_CLASS));
            assert_eq!(el.attribute("data-reader-idx"), Some(idx.to_string().as_str()));
        }
    }

    #[test]
    fn empty_container_yields_no_chunks_and_is_left_alone() {
        let mut doc = Document::parse_html(r#"<div id="content">   </div>"#).unwrap();
        let root = content(&doc);
        let chunks = segment(&doc, root, &SegmentRules::default()).materialize(&mut doc);
        assert!(chunks.is_empty());
        assert_eq!(doc.children(root).len(), 1);
    }

    #[test]
    fn text_without_terminal_punctuation_is_one_sentence() {
        assert_eq!(split_sentences("  Hallelujah  "), vec!["Hallelujah"]);
        assert!(split_sentences("   ").is_empty());
    }
}
