//! Building the editor's view of a materialized store document.
//!
//! ```text
//! doc
//!  └ blockGroup
//!     └ blockContainer {id, textColor, backgroundColor}
//!        ├ <type> {textAlignment, level?}     text runs with marks
//!        └ blockGroup                         nested children, if any
//! ```

use serde_json::Value;

use weft_types::{BlockType, CompiledBlock, InlineContent, StyledText};

use crate::schema;
use crate::snapshot::{Attrs, DocumentSnapshot, ElementNode, Mark, Node};

/// Attribute carrying color values on color marks.
pub const COLOR_ATTR: &str = "stringValue";

/// Attribute carrying the target on link marks.
pub const HREF_ATTR: &str = "href";

impl DocumentSnapshot {
    /// The snapshot the editor shows for a store document.
    pub fn from_compiled(blocks: &[CompiledBlock]) -> DocumentSnapshot {
        let group = block_group(blocks);
        DocumentSnapshot::new(ElementNode::new("doc", Attrs::new(), vec![group]))
    }
}

fn block_group(blocks: &[CompiledBlock]) -> Node {
    Node::element(
        "blockGroup",
        Attrs::new(),
        blocks.iter().map(block_container).collect(),
    )
}

fn block_container(block: &CompiledBlock) -> Node {
    let mut attrs = Attrs::new();
    attrs.insert(schema::ID_ATTR.into(), Value::String(block.id.to_string()));
    attrs.insert(
        schema::TEXT_COLOR_ATTR.into(),
        Value::String(
            block
                .props
                .text_color
                .clone()
                .unwrap_or_else(|| "default".into()),
        ),
    );
    attrs.insert(
        schema::BACKGROUND_COLOR_ATTR.into(),
        Value::String(
            block
                .props
                .background_color
                .clone()
                .unwrap_or_else(|| "default".into()),
        ),
    );

    let mut content_attrs = Attrs::new();
    content_attrs.insert(
        schema::TEXT_ALIGNMENT_ATTR.into(),
        Value::String(
            block
                .props
                .text_alignment
                .unwrap_or_default()
                .as_str()
                .to_string(),
        ),
    );
    if block.block_type == BlockType::Heading || block.props.level.is_some() {
        content_attrs.insert(
            schema::LEVEL_ATTR.into(),
            Value::from(block.props.level.unwrap_or(weft_types::DEFAULT_LEVEL)),
        );
    }

    let inline: Vec<Node> = block.content.iter().flat_map(inline_nodes).collect();
    let mut children = vec![Node::element(
        block.block_type.as_str(),
        content_attrs,
        inline,
    )];
    if !block.children.is_empty() {
        children.push(block_group(&block.children));
    }
    Node::element("blockContainer", attrs, children)
}

fn inline_nodes(item: &InlineContent) -> Vec<Node> {
    match item {
        InlineContent::Text(run) => vec![styled_text(run, None)],
        InlineContent::Link { href, content } => content
            .iter()
            .map(|run| styled_text(run, Some(href)))
            .collect(),
    }
}

fn styled_text(run: &StyledText, href: Option<&str>) -> Node {
    let mut marks: Vec<Mark> = run
        .styles
        .iter()
        .filter_map(|(name, value)| match value {
            Value::Bool(true) => Some(Mark::new(name.clone())),
            Value::String(s) => Some(Mark::new(name.clone()).with_attr(COLOR_ATTR, s.clone())),
            _ => None,
        })
        .collect();
    if let Some(href) = href {
        marks.push(Mark::new("link").with_attr(HREF_ATTR, href));
    }
    marks.sort_by(|a, b| a.name.cmp(&b.name));
    Node::marked_text(run.text.clone(), marks)
}
