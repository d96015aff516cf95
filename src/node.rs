//! Positional document model.
//!
//! A [`Document`] is an arena of [`Node`]s. Children are owned through the
//! arena's index lists; the parent link is a plain index used only for
//! upward traversal. After [`Document::assign_positions`], every node holds an
//! inclusive `[start, end]` range in the global position space:
//!
//! - a text node occupies one position per character,
//! - a leaf-collapsed element (`img`, `tr`, `image`, `svg`) and any element
//!   without children occupy exactly one position,
//! - any other element spans exactly the union of its children.

use core::ops::Range;

use crate::attributes::{parse_attributes, value_of, Attributes};

/// Tags whose whole subtree is folded into a single indivisible leaf.
pub const LEAF_ELEMENTS: &[&str] = &["img", "tr", "image", "svg"];

/// Tags whose raw markup may carry asset or link references.
const REFERENCE_TAGS: &[&str] = &["img", "image", "svg:image", "a", "tr", "svg"];

/// Returns `true` for tags collapsed into a single leaf.
pub fn is_leaf_element(tag: &str) -> bool {
    LEAF_ELEMENTS
        .iter()
        .any(|leaf| leaf.eq_ignore_ascii_case(tag))
}

/// Index of a node inside its [`Document`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Raw arena index.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Node flavor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    /// Synthetic container for a parsed fragment. Serializes as its children.
    Root,
    /// Markup element.
    Element {
        /// Tag name as written.
        tag: String,
    },
    /// Character data, stored verbatim.
    Text,
}

/// One node of the positional tree.
#[derive(Clone, Debug)]
pub struct Node {
    kind: NodeKind,
    raw: String,
    /// `raw` already holds the node's complete markup (void, self-closing or
    /// collapsed elements).
    raw_complete: bool,
    chars: usize,
    attributes: Attributes,
    id: Option<String>,
    parent: Option<NodeId>,
    index_in_parent: usize,
    children: Vec<NodeId>,
    start: usize,
    end: usize,
}

impl Node {
    fn new(kind: NodeKind, raw: String, raw_complete: bool, attributes: Attributes) -> Self {
        let chars = match kind {
            NodeKind::Text => raw.chars().count(),
            _ => 0,
        };
        let id = value_of(&attributes, "id").map(str::to_string);
        Self {
            kind,
            raw,
            raw_complete,
            chars,
            attributes,
            id,
            parent: None,
            index_in_parent: 0,
            children: Vec::new(),
            start: 0,
            end: 0,
        }
    }

    fn detached(&self) -> Self {
        Self {
            kind: self.kind.clone(),
            raw: self.raw.clone(),
            raw_complete: self.raw_complete,
            chars: self.chars,
            attributes: self.attributes.clone(),
            id: self.id.clone(),
            parent: None,
            index_in_parent: 0,
            children: Vec::new(),
            start: self.start,
            end: self.end,
        }
    }

    /// Node flavor.
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Tag name, `"text"` for text nodes and `"#root"` for the fragment root.
    pub fn tag(&self) -> &str {
        match &self.kind {
            NodeKind::Root => "#root",
            NodeKind::Element { tag } => tag,
            NodeKind::Text => "text",
        }
    }

    /// Verbatim source slice. For elements this is the opening tag, or the
    /// whole serialized subtree for collapsed leaves.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Parsed attributes (empty for text nodes and unparseable tags).
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Value of the `id` attribute.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// First position (inclusive).
    pub fn start(&self) -> usize {
        self.start
    }

    /// Last position (inclusive).
    pub fn end(&self) -> usize {
        self.end
    }

    /// Number of positions covered.
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    pub fn is_text(&self) -> bool {
        matches!(self.kind, NodeKind::Text)
    }

    /// Element collapsed into a single indivisible position.
    pub fn is_leaf_collapsed(&self) -> bool {
        match &self.kind {
            NodeKind::Element { tag } => is_leaf_element(tag),
            _ => false,
        }
    }

    fn is_atomic(&self) -> bool {
        match self.kind {
            NodeKind::Element { .. } => self.is_leaf_collapsed() || self.children.is_empty(),
            _ => false,
        }
    }
}

/// Kind of a reference found in element markup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReferenceKind {
    /// Embedded asset (`img src`, `image xlink:href`).
    Asset,
    /// Hyperlink (`a href`).
    Link,
}

/// Replacement applied by [`Document::rewrite_references`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rewrite {
    /// Keep the attribute, replace its value.
    Value(String),
    /// Replace the whole `name="value"` attribute with this markup.
    Attribute(String),
}

/// Arena-backed positional tree for one resource or one copied slice.
#[derive(Clone, Debug)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create a document holding only an empty root.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(
                NodeKind::Root,
                String::new(),
                false,
                Attributes::new(),
            )],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// First position of the document.
    pub fn start(&self) -> usize {
        self.node(self.root).start
    }

    /// Last position of the document.
    pub fn end(&self) -> usize {
        self.node(self.root).end
    }

    /// Number of positions the document occupies.
    pub fn len(&self) -> usize {
        self.node(self.root).len()
    }

    /// Whether `position` falls inside the document.
    pub fn contains(&self, position: usize) -> bool {
        self.start() <= position && position <= self.end()
    }

    pub(crate) fn push_element(
        &mut self,
        parent: NodeId,
        tag: &str,
        raw: String,
        raw_complete: bool,
    ) -> NodeId {
        // Comments, declarations and processing instructions carry no attributes.
        let attributes = if tag.starts_with(['!', '?']) {
            Attributes::new()
        } else {
            match parse_attributes(&raw) {
                Ok(attributes) => attributes,
                Err(err) => {
                    log::warn!("ignoring attributes of <{}>: {}", tag, err);
                    Attributes::new()
                }
            }
        };
        let node = Node::new(
            NodeKind::Element {
                tag: tag.to_string(),
            },
            raw,
            raw_complete,
            attributes,
        );
        self.attach(parent, node)
    }

    pub(crate) fn push_text(&mut self, parent: NodeId, text: String) -> NodeId {
        let node = Node::new(NodeKind::Text, text, false, Attributes::new());
        self.attach(parent, node)
    }

    pub(crate) fn append_raw(&mut self, id: NodeId, extra: &str) {
        self.nodes[id.0].raw.push_str(extra);
    }

    fn alloc(&mut self, parent: NodeId, mut node: Node) -> NodeId {
        node.parent = Some(parent);
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    fn link(&mut self, parent: NodeId, child: NodeId) {
        let index = self.nodes[parent.0].children.len();
        self.nodes[child.0].index_in_parent = index;
        self.nodes[parent.0].children.push(child);
    }

    fn attach(&mut self, parent: NodeId, node: Node) -> NodeId {
        let id = self.alloc(parent, node);
        self.link(parent, id);
        id
    }

    /// Node ids in document order, starting at the root.
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.node(id).children.iter().rev().copied());
        }
        out
    }

    /// Fold every leaf-collapsed element's subtree into its raw content.
    ///
    /// Must run before [`Document::assign_positions`].
    pub fn collapse_leaves(&mut self) {
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let node = self.node(id);
            if node.is_leaf_collapsed() {
                if !node.raw_complete {
                    let serialized = self.serialize_node(id);
                    let node = &mut self.nodes[id.0];
                    node.raw = serialized;
                    node.raw_complete = true;
                    node.children.clear();
                }
                continue;
            }
            stack.extend(node.children.iter().rev().copied());
        }
    }

    /// Assign positions to every node, the first leaf starting at `entry`.
    pub fn assign_positions(&mut self, entry: usize) {
        self.assign_from(self.root, entry);
    }

    fn assign_from(&mut self, id: NodeId, cursor: usize) -> usize {
        let end = {
            let node = &self.nodes[id.0];
            if node.is_text() {
                Some(cursor + node.chars.max(1) - 1)
            } else if node.is_leaf_collapsed() || node.children.is_empty() {
                Some(cursor)
            } else {
                None
            }
        };
        let end = match end {
            Some(end) => end,
            None => {
                let mut next = cursor;
                let mut last = cursor;
                for index in 0..self.nodes[id.0].children.len() {
                    let child = self.nodes[id.0].children[index];
                    last = self.assign_from(child, next);
                    next = last + 1;
                }
                last
            }
        };
        let node = &mut self.nodes[id.0];
        node.start = cursor;
        node.end = end;
        end
    }

    /// Serialize the whole document back to markup.
    pub fn serialize(&self) -> String {
        self.serialize_node(self.root)
    }

    /// Serialize one subtree back to markup.
    pub fn serialize_node(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_node(id, &mut out);
        out
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        let node = self.node(id);
        match &node.kind {
            NodeKind::Text => out.push_str(&node.raw),
            NodeKind::Root => {
                for child in &node.children {
                    self.write_node(*child, out);
                }
            }
            NodeKind::Element { tag } => {
                out.push_str(&node.raw);
                if node.raw_complete {
                    return;
                }
                for child in &node.children {
                    self.write_node(*child, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }

    /// Copy the part of the document intersecting `[from, to]`.
    ///
    /// Positions are preserved. Text is sliced by character; collapsed
    /// leaves and childless elements are copied whole or not at all;
    /// elements whose children all fall outside the range are dropped.
    /// Returns `None` when nothing in the range can be copied.
    pub fn copy(&self, from: usize, to: usize) -> Option<Document> {
        if from > to || to < self.start() || from > self.end() {
            return None;
        }
        let mut out = Document::new();
        let out_root = out.root;
        for child in &self.node(self.root).children {
            self.copy_node(*child, from, to, &mut out, out_root);
        }
        let (first, last) = {
            let children = &out.node(out_root).children;
            (children.first().copied()?, children.last().copied()?)
        };
        let start = out.node(first).start;
        let end = out.node(last).end;
        let root = &mut out.nodes[out_root.0];
        root.start = start;
        root.end = end;
        Some(out)
    }

    fn copy_node(
        &self,
        id: NodeId,
        from: usize,
        to: usize,
        out: &mut Document,
        parent: NodeId,
    ) -> bool {
        let node = self.node(id);
        if node.end < from || node.start > to {
            return false;
        }
        if node.is_text() {
            let start = node.start.max(from);
            let end = node.end.min(to);
            let text = char_slice(&node.raw, start - node.start, end - node.start + 1);
            let mut copied = node.detached();
            copied.chars = end - start + 1;
            copied.raw = text.to_string();
            copied.start = start;
            copied.end = end;
            out.attach(parent, copied);
            return true;
        }
        if node.is_atomic() {
            if from <= node.start && node.end <= to {
                out.attach(parent, node.detached());
                return true;
            }
            return false;
        }

        let mark = out.nodes.len();
        let copied = out.alloc(parent, node.detached());
        for child in &node.children {
            self.copy_node(*child, from, to, out, copied);
        }
        let survivors = &out.node(copied).children;
        let (Some(first), Some(last)) = (survivors.first().copied(), survivors.last().copied())
        else {
            out.nodes.truncate(mark);
            return false;
        };
        let start = out.node(first).start;
        let end = out.node(last).end;
        let entry = &mut out.nodes[copied.0];
        entry.start = start;
        entry.end = end;
        out.link(parent, copied);
        true
    }

    /// Start position of the first node (document order) with this `id`.
    pub fn id_position(&self, id: &str) -> Option<usize> {
        self.preorder()
            .into_iter()
            .map(|node| self.node(node))
            .find(|node| node.id() == Some(id))
            .map(Node::start)
    }

    /// Leaf whose range contains `position`.
    pub fn leaf_at(&self, position: usize) -> Option<NodeId> {
        if !self.contains(position) {
            return None;
        }
        let mut current = self.root;
        loop {
            let children = &self.node(current).children;
            if children.is_empty() {
                return Some(current);
            }
            let index = children.partition_point(|child| self.node(*child).end < position);
            let child = *children.get(index)?;
            if self.node(child).start > position {
                return None;
            }
            current = child;
        }
    }

    fn first_leaf(&self, mut id: NodeId) -> NodeId {
        while let Some(first) = self.node(id).children.first() {
            id = *first;
        }
        id
    }

    fn last_leaf(&self, mut id: NodeId) -> NodeId {
        while let Some(last) = self.node(id).children.last() {
            id = *last;
        }
        id
    }

    /// Leaf following `id` in document order.
    pub fn next_leaf(&self, id: NodeId) -> Option<NodeId> {
        if !self.node(id).children.is_empty() {
            return Some(self.first_leaf(id));
        }
        let mut current = id;
        loop {
            let node = self.node(current);
            let parent = node.parent?;
            let siblings = &self.node(parent).children;
            if let Some(next) = siblings.get(node.index_in_parent + 1) {
                return Some(self.first_leaf(*next));
            }
            current = parent;
        }
    }

    /// Leaf preceding `id` in document order.
    pub fn previous_leaf(&self, id: NodeId) -> Option<NodeId> {
        let mut current = id;
        loop {
            let node = self.node(current);
            let parent = node.parent?;
            if node.index_in_parent > 0 {
                let previous = self.node(parent).children[node.index_in_parent - 1];
                return Some(self.last_leaf(previous));
            }
            current = parent;
        }
    }

    /// Position of the next whitespace after `position`.
    ///
    /// Non-text leaves are indivisible, so the boundary is the leaf's end.
    /// Returns the document end when no further leaf exists.
    pub fn find_space_after(&self, position: usize) -> usize {
        let mut leaf = self.leaf_at(position);
        if let Some(id) = leaf {
            if self.node(id).end == position {
                leaf = self.next_leaf(id);
            }
        }
        let Some(id) = leaf else {
            return self.end();
        };
        let node = self.node(id);
        if node.is_text() {
            let skip = (position + 1).saturating_sub(node.start);
            if let Some(offset) = node.raw.chars().skip(skip).position(char::is_whitespace) {
                return node.start + skip + offset;
            }
        }
        node.end
    }

    /// Position of the last whitespace before `position`.
    ///
    /// Falls back to the end of the preceding leaf, then to the document
    /// start.
    pub fn find_space_before(&self, position: usize) -> usize {
        let Some(id) = self.leaf_at(position) else {
            return self.start();
        };
        let node = self.node(id);
        if node.is_text() {
            let before = position - node.start;
            let last_space = node
                .raw
                .chars()
                .take(before)
                .enumerate()
                .filter(|(_, c)| c.is_whitespace())
                .map(|(index, _)| index)
                .last();
            if let Some(offset) = last_space {
                return node.start + offset;
            }
        }
        match self.previous_leaf(id) {
            Some(previous) => self.node(previous).end,
            None => self.start(),
        }
    }

    /// Every asset and link reference in document order.
    pub fn references(&self) -> Vec<(ReferenceKind, String)> {
        let mut out = Vec::new();
        for id in self.preorder() {
            let node = self.node(id);
            if !carries_references(node) {
                continue;
            }
            for_each_reference(&node.raw, |kind, value, _, _| {
                out.push((kind, value.to_string()));
            });
        }
        out
    }

    /// Referenced external paths (`src`, `xlink:href`, `href`).
    pub fn resources(&self) -> Vec<String> {
        self.references()
            .into_iter()
            .map(|(_, value)| value)
            .collect()
    }

    /// Rewrite references in place. `rewrite` returns `None` to keep a
    /// reference unchanged.
    pub fn rewrite_references<F>(&mut self, mut rewrite: F)
    where
        F: FnMut(ReferenceKind, &str) -> Option<Rewrite>,
    {
        for id in self.preorder() {
            if !carries_references(self.node(id)) {
                continue;
            }
            let raw = &self.nodes[id.0].raw;
            let mut edits: Vec<(Range<usize>, String)> = Vec::new();
            for_each_reference(raw, |kind, value, attr_span, value_span| {
                match rewrite(kind, value) {
                    Some(Rewrite::Value(new_value)) => edits.push((value_span, new_value)),
                    Some(Rewrite::Attribute(markup)) => edits.push((attr_span, markup)),
                    None => {}
                }
            });
            if edits.is_empty() {
                continue;
            }
            edits.sort_by_key(|(span, _)| span.start);
            let mut rewritten = raw.clone();
            for (span, replacement) in edits.into_iter().rev() {
                rewritten.replace_range(span, &replacement);
            }
            self.nodes[id.0].raw = rewritten;
        }
    }

    /// Indented `tag[start,end]` listing, one node per line.
    pub fn outline(&self) -> String {
        let mut out = String::new();
        self.outline_node(self.root, 0, &mut out);
        out
    }

    fn outline_node(&self, id: NodeId, depth: usize, out: &mut String) {
        let node = self.node(id);
        for _ in 0..depth {
            out.push_str("  ");
        }
        out.push_str(&format!("{}[{},{}]\n", node.tag(), node.start, node.end));
        for child in &node.children {
            self.outline_node(*child, depth + 1, out);
        }
    }
}

fn carries_references(node: &Node) -> bool {
    match &node.kind {
        NodeKind::Element { tag } => REFERENCE_TAGS
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(tag)),
        _ => false,
    }
}

fn char_slice(text: &str, from: usize, to: usize) -> &str {
    let mut indices = text.char_indices().map(|(index, _)| index);
    let start = indices.nth(from).unwrap_or(text.len());
    let end = if to > from {
        text.char_indices()
            .map(|(index, _)| index)
            .nth(to)
            .unwrap_or(text.len())
    } else {
        start
    };
    &text[start..end]
}

/// Visit reference attributes in every opening tag of `raw`.
///
/// The callback receives the reference kind, the raw value, the byte span of
/// the whole attribute and the byte span of the value.
fn for_each_reference<F>(raw: &str, mut visit: F)
where
    F: FnMut(ReferenceKind, &str, Range<usize>, Range<usize>),
{
    let mut cursor = 0;
    while let Some(offset) = raw[cursor..].find('<') {
        let tag_start = cursor + offset;
        let Some(length) = tag_end(&raw[tag_start..]) else {
            return;
        };
        let tag_stop = tag_start + length;
        let tag = &raw[tag_start..tag_stop];
        cursor = tag_stop;
        if tag.starts_with("</") || tag.starts_with("<!") || tag.starts_with("<?") {
            continue;
        }
        let name: String = tag[1..]
            .chars()
            .take_while(|c| !c.is_whitespace() && *c != '/' && *c != '>')
            .collect();
        let attrs: &[(&str, ReferenceKind)] = match name.to_ascii_lowercase().as_str() {
            "img" => &[("src", ReferenceKind::Asset)],
            "image" | "svg:image" => &[
                ("xlink:href", ReferenceKind::Asset),
                ("href", ReferenceKind::Asset),
            ],
            "a" => &[("href", ReferenceKind::Link)],
            _ => &[],
        };
        for (attr, kind) in attrs {
            if let Some((attr_span, value_span)) = attr_value_span(tag, attr) {
                let value = &tag[value_span.clone()];
                visit(
                    *kind,
                    value,
                    tag_start + attr_span.start..tag_start + attr_span.end,
                    tag_start + value_span.start..tag_start + value_span.end,
                );
            }
        }
    }
}

/// Byte length of the tag starting at `text[0] == '<'`, honoring quotes.
fn tag_end(text: &str) -> Option<usize> {
    let mut quote: Option<u8> = None;
    for (index, byte) in text.bytes().enumerate() {
        match quote {
            Some(q) if byte == q => quote = None,
            Some(_) => {}
            None if byte == b'"' || byte == b'\'' => quote = Some(byte),
            None if byte == b'>' => return Some(index + 1),
            None => {}
        }
    }
    None
}

/// Locate `name="value"` in one tag. Returns the attribute span and the
/// value span, both relative to `tag`.
fn attr_value_span(tag: &str, name: &str) -> Option<(Range<usize>, Range<usize>)> {
    let bytes = tag.as_bytes();
    let needle = name.as_bytes();
    let skip_ws = |mut index: usize| {
        while index < bytes.len() && bytes[index].is_ascii_whitespace() {
            index += 1;
        }
        index
    };
    let mut quote: Option<u8> = None;
    let mut index = 0;
    while index < bytes.len() {
        let byte = bytes[index];
        if let Some(q) = quote {
            if byte == q && bytes[index - 1] != b'\\' {
                quote = None;
            }
            index += 1;
            continue;
        }
        if byte == b'"' || byte == b'\'' {
            quote = Some(byte);
            index += 1;
            continue;
        }
        if index > 0
            && bytes[index - 1].is_ascii_whitespace()
            && bytes[index..].starts_with(needle)
        {
            let eq = skip_ws(index + needle.len());
            if bytes.get(eq) == Some(&b'=') {
                let open = skip_ws(eq + 1);
                if let Some(&q) = bytes.get(open).filter(|b| **b == b'"' || **b == b'\'') {
                    let value_start = open + 1;
                    let mut close = value_start;
                    while close < bytes.len() && !(bytes[close] == q && bytes[close - 1] != b'\\')
                    {
                        close += 1;
                    }
                    if close < bytes.len() {
                        return Some((index..close + 1, value_start..close));
                    }
                    return None;
                }
            }
        }
        index += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::{parse_fragment, parse_resource};

    fn positioned(markup: &str) -> Document {
        parse_resource(markup, 0).expect("valid markup")
    }

    fn element_children(doc: &Document, id: NodeId) -> Vec<NodeId> {
        doc.node(id).children().to_vec()
    }

    #[test]
    fn declarations_and_comments_have_no_attributes() {
        let doc = positioned(concat!(
            r#"<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.1//EN" "http://www.w3.org/TR/xhtml11/DTD/xhtml11.dtd">"#,
            "<p><!-- don't --><span id=\"x\">a</span></p>",
        ));
        let root = doc.root();
        let children = element_children(&doc, root);
        assert_eq!(doc.node(children[0]).tag(), "!DOCTYPE");
        assert!(doc.node(children[0]).attributes().is_empty());
        let comment = element_children(&doc, children[1])[0];
        assert_eq!(doc.node(comment).tag(), "!--");
        assert!(doc.node(comment).attributes().is_empty());
        assert_eq!(doc.id_position("x"), Some(doc.node(comment).end() + 1));
    }

    #[test]
    fn hello_world_positions() {
        let doc = positioned("<p>Hello world</p>");
        let root = doc.root();
        let p = element_children(&doc, root)[0];
        assert_eq!(doc.node(p).tag(), "p");
        let text = element_children(&doc, p)[0];
        assert!(doc.node(text).is_text());
        assert_eq!(doc.node(text).raw(), "Hello world");
        assert_eq!((doc.node(text).start(), doc.node(text).end()), (0, 10));
        assert_eq!((doc.node(p).start(), doc.node(p).end()), (0, 10));
        assert_eq!(doc.len(), 11);
    }

    #[test]
    fn entry_offset_shifts_every_position() {
        let doc = parse_resource("<p>ab</p><p>cd</p>", 100).expect("valid markup");
        assert_eq!(doc.start(), 100);
        assert_eq!(doc.end(), 103);
        assert_eq!(
            doc.outline(),
            "#root[100,103]\n  p[100,101]\n    text[100,101]\n  p[102,103]\n    text[102,103]\n"
        );
    }

    #[test]
    fn childless_elements_occupy_one_position() {
        let doc = positioned("a<br/>b<p></p>c");
        assert_eq!(doc.len(), 5);
        let children = element_children(&doc, doc.root());
        let br = doc.node(children[1]);
        assert_eq!(br.tag(), "br");
        assert_eq!((br.start(), br.end()), (1, 1));
        let p = doc.node(children[3]);
        assert_eq!((p.start(), p.end()), (3, 3));
    }

    #[test]
    fn image_is_single_position_anywhere() {
        let filler = "x".repeat(250);
        let markup = format!(
            r#"<div><p>{filler}</p><img src="a.png"/><p>{filler}</p></div>"#
        );
        let doc = positioned(&markup);
        let img = doc
            .preorder()
            .into_iter()
            .find(|id| doc.node(*id).tag() == "img")
            .expect("img node");
        assert_eq!(doc.node(img).start(), doc.node(img).end());
        assert_eq!(doc.node(img).start(), 250);
        assert_eq!(doc.len(), 501);
    }

    #[test]
    fn collapsed_table_row_folds_children() {
        let doc = positioned(r#"<table><tr><td>one</td><td>two</td></tr></table>"#);
        let tr = doc
            .preorder()
            .into_iter()
            .find(|id| doc.node(*id).tag() == "tr")
            .expect("tr node");
        let tr = doc.node(tr);
        assert!(tr.children().is_empty());
        assert_eq!(tr.raw(), "<tr><td>one</td><td>two</td></tr>");
        assert_eq!(tr.start(), tr.end());
        assert_eq!(
            doc.serialize(),
            "<table><tr><td>one</td><td>two</td></tr></table>"
        );
    }

    #[test]
    fn copy_slices_text_inside_node() {
        let doc = positioned("Hello world");
        let copy = doc.copy(3, 7).expect("copy");
        let text = copy.node(copy.node(copy.root()).children()[0]);
        assert_eq!(text.raw(), "lo wo");
        assert_eq!((text.start(), text.end()), (3, 7));
    }

    #[test]
    fn copy_covers_start_and_end_cases() {
        let doc = positioned("<p>Hello</p><p>world</p>");
        assert_eq!(doc.copy(2, 6).expect("copy").serialize(), "<p>llo</p><p>wo</p>");
        assert_eq!(doc.copy(0, 9).expect("copy").serialize(), "<p>Hello</p><p>world</p>");
        assert_eq!(doc.copy(5, 9).expect("copy").serialize(), "<p>world</p>");
        assert_eq!(doc.copy(0, 0).expect("copy").serialize(), "<p>H</p>");
    }

    #[test]
    fn copy_keeps_positions_and_parent_bounds() {
        let doc = positioned("<div><p>abc</p><p>def</p></div>");
        let copy = doc.copy(4, 5).expect("copy");
        assert_eq!(copy.start(), 4);
        assert_eq!(copy.end(), 5);
        let div = copy.node(copy.root()).children()[0];
        assert_eq!((copy.node(div).start(), copy.node(div).end()), (4, 5));
        assert_eq!(copy.serialize(), "<div><p>ef</p></div>");
    }

    #[test]
    fn collapsed_leaves_are_atomic_for_copy() {
        let doc = positioned(r#"ab<img src="x.png">cd"#);
        assert_eq!(doc.len(), 5);
        assert_eq!(doc.copy(0, 1).expect("copy").serialize(), "ab");
        assert_eq!(
            doc.copy(1, 3).expect("copy").serialize(),
            r#"b<img src="x.png">c"#
        );
    }

    #[test]
    fn full_copy_round_trips() {
        let markup = r#"<div class="c"><h1 id="t">Title</h1><p>Some <em>emph</em> text<br/>more</p><img src="a.png"></img></div>"#;
        let doc = positioned(markup);
        let copy = doc.copy(doc.start(), doc.end()).expect("copy");
        assert_eq!(copy.serialize(), markup);
        assert_eq!(doc.serialize(), markup);
    }

    #[test]
    fn copy_rejects_inverted_and_outside_ranges() {
        let doc = positioned("<p>abc</p>");
        assert!(doc.copy(2, 1).is_none());
        assert!(doc.copy(10, 12).is_none());
    }

    #[test]
    fn id_position_finds_first_match() {
        let doc = positioned(r#"<p>ab</p><p id="second">cd</p><span id="second">ef</span>"#);
        assert_eq!(doc.id_position("second"), Some(2));
        assert_eq!(doc.id_position("missing"), None);
    }

    #[test]
    fn find_space_after_in_text() {
        let doc = positioned("Hello world");
        assert_eq!(doc.find_space_after(0), 5);
        assert_eq!(doc.find_space_after(5), 10);
        assert_eq!(doc.find_space_after(10), 10);
    }

    #[test]
    fn find_space_after_moves_to_next_leaf_at_leaf_end() {
        let doc = positioned("<p>ab</p><p>cd ef</p>");
        // position 1 is the end of "ab": search continues in "cd ef".
        assert_eq!(doc.find_space_after(1), 4);
    }

    #[test]
    fn find_space_after_treats_images_as_boundaries() {
        let doc = positioned(r#"ab<img src="x.png">cd"#);
        assert_eq!(doc.find_space_after(0), 1);
        assert_eq!(doc.find_space_after(1), 2);
        assert_eq!(doc.find_space_after(2), 4);
    }

    #[test]
    fn find_space_before_in_text() {
        let doc = positioned("one two three");
        assert_eq!(doc.find_space_before(10), 7);
        assert_eq!(doc.find_space_before(5), 3);
        assert_eq!(doc.find_space_before(2), 0);
    }

    #[test]
    fn find_space_before_falls_back_to_previous_leaf() {
        let doc = positioned("<p>ab</p><p>cd</p>");
        assert_eq!(doc.find_space_before(3), 1);
    }

    #[test]
    fn resources_collects_scoped_references() {
        let doc = positioned(concat!(
            r#"<p><a href="ch2.xhtml#x">link</a></p>"#,
            r#"<img src="images/a.png"/>"#,
            r#"<svg><image xlink:href="images/b.jpg"/></svg>"#,
            r#"<table><tr><td><img src="images/c.gif"/></td></tr></table>"#,
            r#"<link href="style.css"/>"#,
        ));
        assert_eq!(
            doc.resources(),
            vec![
                "ch2.xhtml#x".to_string(),
                "images/a.png".to_string(),
                "images/b.jpg".to_string(),
                "images/c.gif".to_string(),
            ]
        );
    }

    #[test]
    fn rewrite_references_replaces_values_and_attributes() {
        let mut doc = positioned(r##"<a href="#n">x</a><img alt="src='no'" src="a.png"/>"##);
        doc.rewrite_references(|kind, value| match kind {
            ReferenceKind::Asset => Some(Rewrite::Value(format!("data:{}", value))),
            ReferenceKind::Link => Some(Rewrite::Attribute("onclick=\"jumpTo(3)\"".into())),
        });
        assert_eq!(
            doc.serialize(),
            r#"<a onclick="jumpTo(3)">x</a><img alt="src='no'" src="data:a.png"/>"#
        );
    }

    #[test]
    fn next_and_previous_leaf_walk_document_order() {
        let doc = parse_fragment("<p>a<b>c</b></p>d").expect("valid markup");
        let leaves: Vec<String> = {
            let mut out = Vec::new();
            let mut leaf = doc.next_leaf(doc.root());
            while let Some(id) = leaf {
                out.push(doc.node(id).raw().to_string());
                leaf = doc.next_leaf(id);
            }
            out
        };
        assert_eq!(leaves, vec!["a", "c", "d"]);
        let last = doc.last_leaf(doc.root());
        let previous = doc.previous_leaf(last).expect("previous leaf");
        assert_eq!(doc.node(previous).raw(), "c");
    }

    #[test]
    fn unicode_text_counts_characters() {
        let doc = positioned("<p>héllo wörld</p>");
        assert_eq!(doc.len(), 11);
        assert_eq!(doc.copy(1, 4).expect("copy").serialize(), "<p>éllo</p>");
        assert_eq!(doc.find_space_after(0), 5);
    }
}
