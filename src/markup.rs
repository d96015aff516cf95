//! Markup tokenizer and tree builder.
//!
//! A deliberately small XHTML reader: it recognizes start, end, void and
//! self-closing tags plus comments, and keeps every text run and tag verbatim
//! so a parsed tree serializes back to its source. Entities are not decoded.

use smallvec::SmallVec;

use crate::error::ParseError;
use crate::node::{Document, NodeId, NodeKind};

/// Elements that never take children or a closing tag.
pub const VOID_ELEMENTS: &[&str] = &[
    "area",
    "base",
    "br",
    "col",
    "hr",
    "img",
    "input",
    "link",
    "meta",
    "param",
    "keygen",
    "source",
    "image",
    "svg:image",
    "?dp",
    "?pagebreak",
    "?xml",
];

/// Returns `true` for void elements, declarations and comments.
pub fn is_void_element(name: &str) -> bool {
    name.starts_with('!')
        || VOID_ELEMENTS
            .iter()
            .any(|void| void.eq_ignore_ascii_case(name))
}

/// Inner content of the `<body>` element, if there is one.
pub fn extract_body(html: &str) -> Option<&str> {
    let lower = html.to_ascii_lowercase();
    let mut search = 0;
    let open = loop {
        let at = search + lower[search..].find("<body")?;
        let next = lower.as_bytes().get(at + 5).copied();
        if matches!(next, Some(b'>') | Some(b'/')) || next.is_some_and(|b| b.is_ascii_whitespace())
        {
            break at;
        }
        search = at + 5;
    };
    let content_start = open + lower[open..].find('>')? + 1;
    let content_end = content_start + lower[content_start..].rfind("</body")?;
    Some(&html[content_start..content_end])
}

/// Parse a markup fragment into a tree without assigning positions.
pub fn parse_fragment(markup: &str) -> Result<Document, ParseError> {
    let mut builder = TreeBuilder::new();
    for (index, c) in markup.chars().enumerate() {
        builder.feed(index, c)?;
    }
    builder.finish(markup.chars().count())
}

/// Parse one spine resource: body extraction, tree building, leaf collapse
/// and position assignment starting at `entry`.
pub fn parse_resource(source: &str, entry: usize) -> Result<Document, ParseError> {
    let body = extract_body(source).unwrap_or(source);
    let mut document = parse_fragment(body)?;
    document.collapse_leaves();
    document.assign_positions(entry);
    Ok(document)
}

struct TreeBuilder {
    document: Document,
    open: SmallVec<[NodeId; 16]>,
    buffer: String,
    buffer_start: usize,
}

impl TreeBuilder {
    fn new() -> Self {
        let document = Document::new();
        let mut open = SmallVec::new();
        open.push(document.root());
        Self {
            document,
            open,
            buffer: String::new(),
            buffer_start: 0,
        }
    }

    fn current(&self) -> NodeId {
        self.open
            .last()
            .copied()
            .unwrap_or_else(|| self.document.root())
    }

    fn in_comment(&self) -> bool {
        self.buffer.starts_with("<!--")
    }

    fn feed(&mut self, index: usize, c: char) -> Result<(), ParseError> {
        if c == '<' && !self.in_comment() {
            if self.buffer.starts_with('<') {
                return Err(ParseError::markup(
                    "STRAY_LT",
                    format!("unexpected < inside tag {}", self.buffer),
                )
                .with_offset(index));
            }
            self.flush_text();
            self.buffer_start = index;
        }
        if self.buffer.is_empty() {
            self.buffer_start = index;
        }
        self.buffer.push(c);

        if c != '>' {
            return Ok(());
        }
        if self.in_comment() {
            if self.buffer.len() >= 7 && self.buffer.ends_with("-->") {
                let raw = core::mem::take(&mut self.buffer);
                let parent = self.current();
                self.document.push_element(parent, "!--", raw, true);
            }
            return Ok(());
        }
        if !self.buffer.starts_with('<') {
            return Err(ParseError::markup(
                "WILD_GT",
                "wild > encountered outside of a tag",
            )
            .with_offset(index));
        }
        let tag = core::mem::take(&mut self.buffer);
        self.close_tag(tag)
    }

    fn flush_text(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let text = core::mem::take(&mut self.buffer);
        let parent = self.current();
        self.document.push_text(parent, text);
    }

    fn close_tag(&mut self, tag: String) -> Result<(), ParseError> {
        let offset = self.buffer_start;
        let is_end = tag.starts_with("</");
        let name = tag_name(&tag, is_end);
        if name.is_empty() {
            return Err(ParseError::markup(
                "EMPTY_TAG_NAME",
                format!("tag {} has no name", tag),
            )
            .with_offset(offset));
        }

        if is_end {
            let parent = self.current();
            if is_void_element(name) {
                let last = self.document.node(parent).children().last().copied();
                let matches = last.is_some_and(|id| self.document.node(id).tag() == name);
                return match last {
                    Some(id) if matches => {
                        self.document.append_raw(id, &tag);
                        Ok(())
                    }
                    _ => Err(incompatible(&tag, "previous sibling").with_offset(offset)),
                };
            }
            let open_tag = match self.document.node(parent).kind() {
                NodeKind::Element { tag } => Some(tag.as_str()),
                _ => None,
            };
            if open_tag != Some(name) {
                let target = open_tag.map_or_else(|| "document root".to_string(), |t| format!("<{}>", t));
                return Err(incompatible(&tag, &target).with_offset(offset));
            }
            self.open.pop();
            return Ok(());
        }

        let name = name.to_string();
        let parent = self.current();
        if tag.ends_with("/>") || is_void_element(&name) {
            self.document.push_element(parent, &name, tag, true);
        } else {
            let id = self.document.push_element(parent, &name, tag, false);
            self.open.push(id);
        }
        Ok(())
    }

    fn finish(mut self, length: usize) -> Result<Document, ParseError> {
        if self.buffer.starts_with('<') {
            return Err(ParseError::markup(
                "UNTERMINATED_TAG",
                format!("tag {} is never closed", self.buffer),
            )
            .with_offset(length));
        }
        self.flush_text();
        if self.open.len() > 1 {
            log::debug!(
                "markup ended with {} unclosed element(s)",
                self.open.len() - 1
            );
        }
        Ok(self.document)
    }
}

fn incompatible(tag: &str, target: &str) -> ParseError {
    ParseError::markup(
        "INCOMPATIBLE_END_TAG",
        format!("end tag {} does not close {}", tag, target),
    )
}

fn tag_name(tag: &str, is_end: bool) -> &str {
    let body = &tag[if is_end { 2 } else { 1 }..];
    let mut end = body.len();
    for (index, c) in body.char_indices() {
        let terminates = c.is_whitespace() || c == '/' || c == '>' || (c == '?' && index > 0);
        if terminates {
            end = index;
            break;
        }
    }
    &body[..end]
}
