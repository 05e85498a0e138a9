//! Host content model.
//!
//! A small element/text arena standing in for the rendered page the reader
//! reads from. Content is parsed from HTML markup (lenient: unclosed and
//! mismatched tags are tolerated) or built from plain text. Chunks refer to
//! elements by [`NodeId`] and never own them.

use std::borrow::Cow;
use std::fs;
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::error::DocumentError;

/// Elements that never have content or a closing tag in HTML.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Elements whose text is never rendered.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "template", "noscript"];

/// Elements that break the flow of text when flattened.
const BREAKING_ELEMENTS: &[&str] = &[
    "br", "p", "div", "li", "ul", "ol", "section", "article", "h1", "h2", "h3", "h4", "h5", "h6",
    "blockquote", "tr", "td",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub tag: String,
    pub classes: Vec<String>,
    pub attributes: Vec<(String, String)>,
}

impl Element {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            classes: Vec::new(),
            attributes: Vec::new(),
        }
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone)]
enum NodeKind {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                kind: NodeKind::Element(Element::new("#document")),
                children: Vec::new(),
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Wrap plain text in a single container element with the given id.
    pub fn from_text(text: &str, container_id: &str) -> Self {
        let mut doc = Self::new();
        let container = doc.append_element(doc.root(), "div");
        doc.set_attribute(container, "id", container_id);
        doc.append_text(container, text);
        doc
    }

    /// Load a content file. `.txt` files are treated as plain text inside a
    /// container with `container_id`; everything else is parsed as markup.
    pub fn load(path: &Path, container_id: &str) -> Result<Self, DocumentError> {
        let contents = fs::read_to_string(path)?;
        let is_text = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("txt"));
        if is_text {
            Ok(Self::from_text(&contents, container_id))
        } else {
            Self::parse_html(&contents)
        }
    }

    pub fn parse_html(markup: &str) -> Result<Self, DocumentError> {
        let mut doc = Self::new();
        let mut stack = vec![doc.root()];
        let mut skip_depth = 0usize;

        let mut reader = Reader::from_str(markup);
        reader.config_mut().trim_text(false);
        reader.config_mut().check_end_names = false;

        loop {
            let event = reader.read_event().map_err(|e| DocumentError::Parse {
                position: reader.buffer_position(),
                message: e.to_string(),
            })?;
            let parent = *stack.last().unwrap_or(&NodeId(0));

            match event {
                Event::Start(e) => {
                    let tag = tag_name(&reader, &e);
                    let is_void = VOID_ELEMENTS.contains(&tag.as_str());
                    if skip_depth > 0 {
                        if !is_void {
                            skip_depth += 1;
                        }
                        continue;
                    }
                    if SKIPPED_ELEMENTS.contains(&tag.as_str()) {
                        skip_depth = 1;
                        continue;
                    }
                    let id = doc.append_element(parent, &tag);
                    doc.copy_attributes(&reader, id, &e);
                    if !is_void {
                        stack.push(id);
                    }
                }
                Event::Empty(e) => {
                    if skip_depth > 0 {
                        continue;
                    }
                    let tag = tag_name(&reader, &e);
                    let id = doc.append_element(parent, &tag);
                    doc.copy_attributes(&reader, id, &e);
                }
                Event::End(e) => {
                    let tag = String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase();
                    if VOID_ELEMENTS.contains(&tag.as_str()) {
                        continue;
                    }
                    if skip_depth > 0 {
                        skip_depth -= 1;
                        continue;
                    }
                    // Close up to the nearest open element with this tag; stray
                    // end tags are dropped.
                    if let Some(pos) = stack.iter().rposition(|&n| doc.tag(n) == Some(tag.as_str())) {
                        if pos > 0 {
                            stack.truncate(pos);
                        }
                    }
                }
                Event::Text(e) => {
                    if skip_depth > 0 {
                        continue;
                    }
                    let text = e.decode().map_err(|err| DocumentError::Parse {
                        position: reader.buffer_position(),
                        message: err.to_string(),
                    })?;
                    doc.append_text(parent, &text);
                }
                Event::CData(e) => {
                    if skip_depth > 0 {
                        continue;
                    }
                    let text = reader.decoder().decode(&e).map_err(|err| DocumentError::Parse {
                        position: reader.buffer_position(),
                        message: err.to_string(),
                    })?;
                    doc.append_text(parent, &text);
                }
                Event::GeneralRef(e) => {
                    if skip_depth > 0 {
                        continue;
                    }
                    let resolved = match e.resolve_char_ref() {
                        Ok(Some(ch)) => Cow::Owned(ch.to_string()),
                        _ => {
                            let name = e.decode().unwrap_or_default();
                            resolve_entity(&name)
                        }
                    };
                    doc.append_text(parent, &resolved);
                }
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(doc)
    }

    pub fn append_element(&mut self, parent: NodeId, tag: &str) -> NodeId {
        self.push_node(parent, NodeKind::Element(Element::new(tag)))
    }

    /// Append text, merging with a directly preceding text node.
    pub fn append_text(&mut self, parent: NodeId, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(&last) = self.nodes[parent.0].children.last() {
            if let NodeKind::Text(existing) = &mut self.nodes[last.0].kind {
                existing.push_str(text);
                return;
            }
        }
        self.push_node(parent, NodeKind::Text(text.to_string()));
    }

    fn push_node(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    fn copy_attributes(&mut self, reader: &Reader<&[u8]>, id: NodeId, start: &BytesStart<'_>) {
        for attr in start.attributes().flatten() {
            let Ok(key) = reader.decoder().decode(attr.key.as_ref()) else {
                continue;
            };
            let Ok(raw) = reader.decoder().decode(&attr.value) else {
                continue;
            };
            let value = quick_xml::escape::unescape(&raw)
                .map(Cow::into_owned)
                .unwrap_or_else(|_| raw.into_owned());
            self.set_attribute(id, &key.to_ascii_lowercase(), &value);
        }
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes.get(id.0)?.kind {
            NodeKind::Element(el) => Some(el),
            NodeKind::Text(_) => None,
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match &mut self.nodes.get_mut(id.0)?.kind {
            NodeKind::Element(el) => Some(el),
            NodeKind::Text(_) => None,
        }
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|el| el.tag.as_str())
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id.0)
            .map(|n| n.children.as_slice())
            .unwrap_or_default()
    }

    /// Set an attribute. `class` is split into the element's class list.
    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) {
        let Some(el) = self.element_mut(id) else {
            return;
        };
        if name == "class" {
            el.classes = value.split_whitespace().map(str::to_string).collect();
            return;
        }
        match el.attributes.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) => *existing = value.to_string(),
            None => el.attributes.push((name.to_string(), value.to_string())),
        }
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.element(id).is_some_and(|el| el.has_class(class))
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) {
        if let Some(el) = self.element_mut(id) {
            if !el.has_class(class) {
                el.classes.push(class.to_string());
            }
        }
    }

    pub fn remove_class(&mut self, id: NodeId, class: &str) {
        if let Some(el) = self.element_mut(id) {
            el.classes.retain(|c| c != class);
        }
    }

    /// Depth-first search for the element with `id="..."`.
    pub fn find_by_id(&self, element_id: &str) -> Option<NodeId> {
        self.descendants(self.root())
            .into_iter()
            .find(|&n| self.element(n).and_then(|el| el.attribute("id")) == Some(element_id))
    }

    /// Every element with the given class, in document order.
    pub fn elements_with_class(&self, class: &str) -> Vec<NodeId> {
        self.descendants(self.root())
            .into_iter()
            .filter(|&n| self.has_class(n, class))
            .collect()
    }

    /// All descendants of `id` (excluding `id`) in document order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut pending: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = pending.pop() {
            out.push(next);
            pending.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    /// Flattened, whitespace-collapsed text of a subtree.
    pub fn text_content(&self, id: NodeId) -> String {
        self.text_of(&[id])
    }

    /// Flattened text of adjacent sibling nodes, read as one run.
    pub fn text_of(&self, ids: &[NodeId]) -> String {
        let mut raw = String::new();
        for &id in ids {
            self.collect_text(id, &mut raw);
        }
        raw.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.nodes.get(id.0) else {
            return;
        };
        match &node.kind {
            NodeKind::Text(text) => out.push_str(text),
            NodeKind::Element(el) => {
                let breaks = BREAKING_ELEMENTS.contains(&el.tag.as_str());
                if breaks {
                    out.push(' ');
                }
                for &child in &node.children {
                    self.collect_text(child, out);
                }
                if breaks {
                    out.push(' ');
                }
            }
        }
    }

    /// Detach all children of `id`. Detached nodes stay in the arena but are
    /// unreachable from the root.
    pub fn clear_children(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.children.clear();
        }
    }
}

fn tag_name(reader: &Reader<&[u8]>, start: &BytesStart<'_>) -> String {
    let decoded = reader
        .decoder()
        .decode(start.name().as_ref())
        .map(Cow::into_owned)
        .unwrap_or_default();
    decoded
        .rsplit(':')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

fn resolve_entity(name: &str) -> Cow<'static, str> {
    if let Some(resolved) = quick_xml::escape::resolve_predefined_entity(name) {
        return Cow::Borrowed(resolved);
    }
    match name {
        "nbsp" => Cow::Borrowed(" "),
        "mdash" => Cow::Borrowed("\u{2014}"),
        "ndash" => Cow::Borrowed("\u{2013}"),
        "hellip" => Cow::Borrowed("\u{2026}"),
        "rsquo" => Cow::Borrowed("\u{2019}"),
        "lsquo" => Cow::Borrowed("\u{2018}"),
        "ldquo" => Cow::Borrowed("\u{201c}"),
        "rdquo" => Cow::Borrowed("\u{201d}"),
        other => Cow::Owned(format!("&{other};")),
    }
}
