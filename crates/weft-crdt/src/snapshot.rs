//! Editor document snapshots with position arithmetic.
//!
//! A snapshot is the editor's node tree in its JSON shape (`{type, attrs,
//! content, text, marks}`). Positions count tokens, not nodes:
//!
//! ```text
//!   doc
//!    └ blockGroup                         0 ─┐ before blockGroup
//!       ├ blockContainer id=1@temp        1  │ before container
//!       │  └ paragraph                    2  │ before paragraph
//!       │     └ "Hello!"              3..9   │ characters
//!       │                                10  │ after paragraph
//!       │                                11  │ after container
//!       └ blockContainer id=8@temp   11..21  │
//!                                        22 ─┘ after blockGroup
//! ```
//!
//! Entering or leaving a non-leaf element costs one position, each character
//! costs one, and leaf elements (images, hard breaks) cost one in total.
//! Character counts are Unicode scalar values.
//!
//! [`DocumentSnapshot::resolve`] turns a position into a [`ResolvedPos`]: the
//! chain of ancestors containing it, with the child index and content start at
//! every depth. [`DocumentSnapshot::slice`] cuts the content between two
//! positions at their shared depth.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use weft_types::{BlockIdentity, MarkType};

use crate::error::CompileError;
use crate::schema;
use crate::Result;

/// Attributes of an element or mark.
pub type Attrs = serde_json::Map<String, serde_json::Value>;

// ============================================================================
// Marks
// ============================================================================

/// A formatting mark applied to text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mark {
    #[serde(rename = "type")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Attrs::is_empty")]
    pub attrs: Attrs,
}

impl Mark {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Attrs::new(),
        }
    }

    pub fn with_attr(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.attrs.insert(key.to_string(), value.into());
        self
    }

    pub fn mark_type(&self) -> MarkType {
        MarkType::from(self.name.clone())
    }

    /// String attribute, if present.
    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).and_then(|v| v.as_str())
    }
}

// ============================================================================
// Nodes
// ============================================================================

/// A run of characters sharing one mark set.
#[derive(Clone, Debug, PartialEq)]
pub struct TextNode {
    pub text: String,
    pub marks: Vec<Mark>,
}

impl TextNode {
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Characters `from..to` of this run, marks kept.
    pub fn cut(&self, from: usize, to: usize) -> TextNode {
        TextNode {
            text: self.text.chars().skip(from).take(to.saturating_sub(from)).collect(),
            marks: self.marks.clone(),
        }
    }
}

/// Any non-text node.
#[derive(Clone, Debug, PartialEq)]
pub struct ElementNode {
    pub name: String,
    pub attrs: Attrs,
    pub content: Fragment,
}

impl ElementNode {
    pub fn new(name: impl Into<String>, attrs: Attrs, content: Vec<Node>) -> Self {
        Self {
            name: name.into(),
            attrs,
            content: Fragment::from(content),
        }
    }

    pub fn is_leaf(&self) -> bool {
        schema::is_leaf(&self.name)
    }

    pub fn is_inline(&self) -> bool {
        schema::is_inline(&self.name)
    }

    pub fn is_block(&self) -> bool {
        !self.is_inline()
    }

    /// A block whose content is inline (text, hard breaks).
    pub fn is_textblock(&self) -> bool {
        if !self.is_block() || self.is_leaf() || schema::is_container(&self.name) {
            return false;
        }
        self.content.iter().all(Node::is_inline)
    }

    pub fn node_size(&self) -> usize {
        if self.is_leaf() {
            1
        } else {
            self.content.size() + 2
        }
    }

    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).and_then(|v| v.as_str())
    }

    /// The block identity carried in the `id` attribute.
    pub fn block_id(&self) -> Option<BlockIdentity> {
        if !self.is_block() {
            return None;
        }
        self.attr_str(schema::ID_ATTR)
            .filter(|s| !s.is_empty())
            .map(BlockIdentity::from)
    }

    /// The node holding this block's own text: itself when it is a textblock,
    /// otherwise its first child when that is one.
    pub fn inline_container(&self) -> Option<&ElementNode> {
        if self.is_textblock() {
            return Some(self);
        }
        match self.content.child(0) {
            Some(Node::Element(first)) if first.is_textblock() => Some(first),
            _ => None,
        }
    }

    /// Characters of this block's own text (nested blocks excluded).
    pub fn text_len(&self) -> usize {
        self.inline_container()
            .map(|inline| inline.content.text_len())
            .unwrap_or(0)
    }

    /// Copy with content cut to `from..to`.
    pub fn cut(&self, from: usize, to: usize) -> ElementNode {
        ElementNode {
            name: self.name.clone(),
            attrs: self.attrs.clone(),
            content: self.content.cut(from, to),
        }
    }

    /// First descendant block (depth-first, self excluded) carrying an id.
    pub fn first_descendant_block_id(&self) -> Option<BlockIdentity> {
        for child in self.content.iter() {
            if let Node::Element(el) = child {
                if let Some(id) = el.block_id() {
                    return Some(id);
                }
                if let Some(id) = el.first_descendant_block_id() {
                    return Some(id);
                }
            }
        }
        None
    }

    fn collect_block_ids(&self, out: &mut BTreeSet<BlockIdentity>) {
        if let Some(id) = self.block_id() {
            out.insert(id);
        }
        for child in self.content.iter() {
            if let Node::Element(el) = child {
                el.collect_block_ids(out);
            }
        }
    }

    fn find_block(&self, id: &BlockIdentity) -> Option<&ElementNode> {
        if self.block_id().as_ref() == Some(id) {
            return Some(self);
        }
        self.content.iter().find_map(|child| match child {
            Node::Element(el) => el.find_block(id),
            Node::Text(_) => None,
        })
    }
}

/// A node of the editor tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "NodeJson", into = "NodeJson")]
pub enum Node {
    Element(ElementNode),
    Text(TextNode),
}

impl Node {
    pub fn text(text: impl Into<String>) -> Node {
        Node::Text(TextNode {
            text: text.into(),
            marks: Vec::new(),
        })
    }

    pub fn marked_text(text: impl Into<String>, marks: Vec<Mark>) -> Node {
        Node::Text(TextNode {
            text: text.into(),
            marks,
        })
    }

    pub fn element(name: impl Into<String>, attrs: Attrs, content: Vec<Node>) -> Node {
        Node::Element(ElementNode::new(name, attrs, content))
    }

    pub fn node_size(&self) -> usize {
        match self {
            Node::Element(el) => el.node_size(),
            Node::Text(t) => t.len(),
        }
    }

    pub fn is_inline(&self) -> bool {
        match self {
            Node::Element(el) => el.is_inline(),
            Node::Text(_) => true,
        }
    }

    pub fn is_block(&self) -> bool {
        !self.is_inline()
    }

    pub fn as_element(&self) -> Option<&ElementNode> {
        match self {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        }
    }

    pub fn block_id(&self) -> Option<BlockIdentity> {
        self.as_element().and_then(ElementNode::block_id)
    }
}

/// Serialized form shared by text and element nodes.
#[derive(Serialize, Deserialize)]
struct NodeJson {
    #[serde(rename = "type")]
    name: String,
    #[serde(default, skip_serializing_if = "Attrs::is_empty")]
    attrs: Attrs,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    content: Vec<Node>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    marks: Vec<Mark>,
}

impl From<NodeJson> for Node {
    fn from(json: NodeJson) -> Self {
        if json.name == schema::TEXT {
            Node::Text(TextNode {
                text: json.text.unwrap_or_default(),
                marks: json.marks,
            })
        } else {
            Node::Element(ElementNode {
                name: json.name,
                attrs: json.attrs,
                content: Fragment(json.content),
            })
        }
    }
}

impl From<Node> for NodeJson {
    fn from(node: Node) -> Self {
        match node {
            Node::Text(t) => NodeJson {
                name: schema::TEXT.to_string(),
                attrs: Attrs::new(),
                content: Vec::new(),
                text: Some(t.text),
                marks: t.marks,
            },
            Node::Element(el) => NodeJson {
                name: el.name,
                attrs: el.attrs,
                content: el.content.0,
                text: None,
                marks: Vec::new(),
            },
        }
    }
}

// ============================================================================
// Fragment
// ============================================================================

/// An ordered list of sibling nodes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fragment(Vec<Node>);

impl From<Vec<Node>> for Fragment {
    fn from(nodes: Vec<Node>) -> Self {
        Fragment(nodes).normalized()
    }
}

impl Fragment {
    pub fn empty() -> Self {
        Fragment(Vec::new())
    }

    pub fn size(&self) -> usize {
        self.0.iter().map(Node::node_size).sum()
    }

    pub fn child_count(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn child(&self, index: usize) -> Option<&Node> {
        self.0.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Node> {
        self.0.iter()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.0
    }

    pub fn into_nodes(self) -> Vec<Node> {
        self.0
    }

    /// Whether any top-level node is a block.
    pub fn has_block(&self) -> bool {
        self.0.iter().any(Node::is_block)
    }

    /// Characters across all text in this fragment, at any depth.
    pub fn text_len(&self) -> usize {
        self.0
            .iter()
            .map(|node| match node {
                Node::Text(t) => t.len(),
                Node::Element(el) => el.content.text_len(),
            })
            .sum()
    }

    /// Concatenated text, at any depth.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for node in &self.0 {
            match node {
                Node::Text(t) => out.push_str(&t.text),
                Node::Element(el) => out.push_str(&el.content.text_content()),
            }
        }
        out
    }

    /// Child index containing content offset `pos`, and that child's start.
    ///
    /// An offset sitting exactly on a boundary maps to the following child.
    pub fn find_index(&self, pos: usize) -> (usize, usize) {
        if pos == 0 {
            return (0, 0);
        }
        if pos >= self.size() {
            return (self.0.len(), self.size());
        }
        let mut cur = 0;
        for (i, child) in self.0.iter().enumerate() {
            let end = cur + child.node_size();
            if end >= pos {
                if end == pos {
                    return (i + 1, end);
                }
                return (i, cur);
            }
            cur = end;
        }
        (self.0.len(), cur)
    }

    /// Content between offsets `from` and `to`, cutting partially covered
    /// children (elements keep their attributes, text keeps its marks).
    pub fn cut(&self, from: usize, to: usize) -> Fragment {
        if from == 0 && to >= self.size() {
            return self.clone();
        }
        let mut result = Vec::new();
        if to <= from {
            return Fragment(result);
        }
        let mut pos = 0;
        for child in &self.0 {
            if pos >= to {
                break;
            }
            let end = pos + child.node_size();
            if end > from {
                let piece = if pos < from || end > to {
                    match child {
                        Node::Text(t) => {
                            Node::Text(t.cut(from.saturating_sub(pos), (to - pos).min(t.len())))
                        }
                        Node::Element(el) => Node::Element(el.cut(
                            from.saturating_sub(pos + 1),
                            (to - pos - 1).min(el.content.size()),
                        )),
                    }
                } else {
                    child.clone()
                };
                result.push(piece);
            }
            pos = end;
        }
        Fragment(result)
    }

    /// `self` followed by `other`, joining adjacent text runs.
    pub fn append(&self, other: &Fragment) -> Fragment {
        let mut nodes = self.0.clone();
        nodes.extend(other.0.iter().cloned());
        Fragment(nodes).normalized()
    }

    /// Drop empty text runs and join neighbours with identical marks.
    fn normalized(self) -> Fragment {
        let mut out: Vec<Node> = Vec::with_capacity(self.0.len());
        for node in self.0 {
            if let Node::Text(t) = &node {
                if t.is_empty() {
                    continue;
                }
                if let Some(Node::Text(prev)) = out.last_mut() {
                    if prev.marks == t.marks {
                        prev.text.push_str(&t.text);
                        continue;
                    }
                }
            }
            out.push(node);
        }
        Fragment(out)
    }

    pub(crate) fn replace_child(&self, index: usize, node: Node) -> Fragment {
        let mut nodes = self.0.clone();
        if let Some(slot) = nodes.get_mut(index) {
            *slot = node;
        }
        Fragment(nodes).normalized()
    }
}

// ============================================================================
// Slice
// ============================================================================

/// A piece of document content with the depths at which its ends are open.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slice {
    #[serde(default)]
    pub content: Fragment,
    #[serde(default)]
    pub open_start: usize,
    #[serde(default)]
    pub open_end: usize,
}

impl Slice {
    /// A closed slice of whole nodes.
    pub fn closed(nodes: Vec<Node>) -> Self {
        Self {
            content: Fragment::from(nodes),
            open_start: 0,
            open_end: 0,
        }
    }

    pub fn size(&self) -> usize {
        self.content.size().saturating_sub(self.open_start + self.open_end)
    }
}

// ============================================================================
// Resolved positions
// ============================================================================

#[derive(Clone, Copy, Debug)]
struct Level<'a> {
    node: &'a ElementNode,
    /// Index of the child the position falls in (or before).
    index: usize,
    /// Position where this node's content begins.
    start: usize,
}

/// A position with its ancestor chain.
#[derive(Clone, Debug)]
pub struct ResolvedPos<'a> {
    pos: usize,
    path: Vec<Level<'a>>,
    parent_offset: usize,
}

impl<'a> ResolvedPos<'a> {
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Depth of the innermost ancestor; the document is depth 0.
    pub fn depth(&self) -> usize {
        self.path.len() - 1
    }

    /// Ancestor at `depth`.
    pub fn node(&self, depth: usize) -> &'a ElementNode {
        self.path[depth].node
    }

    pub fn parent(&self) -> &'a ElementNode {
        self.node(self.depth())
    }

    /// Position where the content of the ancestor at `depth` begins.
    pub fn start(&self, depth: usize) -> usize {
        self.path[depth].start
    }

    /// Position where the content of the ancestor at `depth` ends.
    pub fn end(&self, depth: usize) -> usize {
        self.start(depth) + self.node(depth).content.size()
    }

    /// Child index within the ancestor at `depth`.
    pub fn index(&self, depth: usize) -> usize {
        self.path[depth].index
    }

    /// Offset of the position within its parent's content.
    pub fn parent_offset(&self) -> usize {
        self.parent_offset
    }

    /// The node directly before the position in its parent, if any.
    pub fn node_before(&self) -> Option<&'a Node> {
        let index = self.index(self.depth());
        let parent = self.parent();
        let (_, child_start) = parent.content.find_index(self.parent_offset);
        if child_start < self.parent_offset {
            // Inside a text node.
            return parent.content.child(index);
        }
        index.checked_sub(1).and_then(|i| parent.content.child(i))
    }

    /// Deepest depth whose node contains both this position and `other`.
    pub fn shared_depth(&self, other: usize) -> usize {
        for depth in (1..=self.depth()).rev() {
            if self.start(depth) <= other && self.end(depth) >= other {
                return depth;
            }
        }
        0
    }

    /// Indices along the path, for rebuilding an edited tree.
    pub(crate) fn indices(&self) -> Vec<usize> {
        self.path.iter().map(|level| level.index).collect()
    }
}

// ============================================================================
// DocumentSnapshot
// ============================================================================

/// An immutable editor document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Node", into = "Node")]
pub struct DocumentSnapshot {
    root: ElementNode,
}

impl TryFrom<Node> for DocumentSnapshot {
    type Error = String;

    fn try_from(node: Node) -> std::result::Result<Self, Self::Error> {
        match node {
            Node::Element(root) => Ok(DocumentSnapshot { root }),
            Node::Text(_) => Err("document root must be an element".to_string()),
        }
    }
}

impl From<DocumentSnapshot> for Node {
    fn from(doc: DocumentSnapshot) -> Self {
        Node::Element(doc.root)
    }
}

impl DocumentSnapshot {
    pub fn new(root: ElementNode) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &ElementNode {
        &self.root
    }

    /// Size of the document's content; valid positions are `0..=size`.
    pub fn size(&self) -> usize {
        self.root.content.size()
    }

    pub fn resolve(&self, pos: usize) -> Result<ResolvedPos<'_>> {
        let size = self.size();
        if pos > size {
            return Err(CompileError::PositionOutOfBounds { pos, size });
        }

        let mut path = Vec::new();
        let mut node = &self.root;
        let mut start = 0;
        let mut parent_offset = pos;
        loop {
            let (index, offset) = node.content.find_index(parent_offset);
            let rem = parent_offset - offset;
            path.push(Level { node, index, start });
            if rem == 0 {
                break;
            }
            match node.content.child(index) {
                Some(Node::Element(child)) => {
                    node = child;
                    start += offset + 1;
                    parent_offset = rem - 1;
                }
                // Inside a text run: the textblock is the parent.
                _ => break,
            }
        }
        Ok(ResolvedPos {
            pos,
            path,
            parent_offset,
        })
    }

    /// Content between `from` and `to`, cut at their shared depth.
    pub fn slice(&self, from: usize, to: usize) -> Result<Slice> {
        if from > to {
            return Ok(Slice::default());
        }
        let rfrom = self.resolve(from)?;
        let rto = self.resolve(to)?;
        let depth = rfrom.shared_depth(to);
        let start = rfrom.start(depth);
        let content = rfrom.node(depth).content.cut(from - start, to - start);
        Ok(Slice {
            content,
            open_start: rfrom.depth() - depth,
            open_end: rto.depth() - depth,
        })
    }

    /// Every block identity present in the document.
    pub fn block_ids(&self) -> BTreeSet<BlockIdentity> {
        let mut ids = BTreeSet::new();
        self.root.collect_block_ids(&mut ids);
        ids
    }

    pub fn find_block(&self, id: &BlockIdentity) -> Option<&ElementNode> {
        self.root.find_block(id)
    }

    /// Character count of a block's own text.
    pub fn block_text_len(&self, id: &BlockIdentity) -> Option<usize> {
        self.find_block(id).map(ElementNode::text_len)
    }

    /// Concatenated text of the whole document.
    pub fn text_content(&self) -> String {
        self.root.content.text_content()
    }
}
