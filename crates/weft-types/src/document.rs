//! The store's materialized document: a list of blocks with styled runs.
//!
//! Every character in a run carries the identity the store assigned to it
//! (`charIds`, parallel to `text`). This is what a session rebuilds its
//! character identity map from after each load.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::block::{BlockProps, BlockType, TextAlignment};
use crate::ids::{BlockIdentity, CharId};

/// Block properties as the store spells them (camelCase keys).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledProps {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_alignment: Option<TextAlignment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
}

impl From<&CompiledProps> for BlockProps {
    fn from(p: &CompiledProps) -> Self {
        BlockProps {
            background_color: p.background_color.clone(),
            text_color: p.text_color.clone(),
            text_alignment: p.text_alignment,
            level: p.level,
        }
    }
}

/// A run of text sharing one set of styles.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StyledText {
    pub text: String,
    /// Style name to value: `true` for toggles, a string for colors.
    #[serde(default)]
    pub styles: BTreeMap<String, serde_json::Value>,
    #[serde(rename = "charIds", default)]
    pub char_ids: Vec<CharId>,
}

/// Inline content of a block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InlineContent {
    Text(StyledText),
    Link {
        href: String,
        #[serde(default)]
        content: Vec<StyledText>,
    },
}

impl InlineContent {
    /// The styled runs of this item, flattening links.
    pub fn runs(&self) -> &[StyledText] {
        match self {
            InlineContent::Text(run) => std::slice::from_ref(run),
            InlineContent::Link { content, .. } => content,
        }
    }
}

/// One block of a materialized document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompiledBlock {
    pub id: BlockIdentity,
    #[serde(rename = "type", default)]
    pub block_type: BlockType,
    #[serde(default)]
    pub props: CompiledProps,
    #[serde(default)]
    pub content: Vec<InlineContent>,
    #[serde(default)]
    pub children: Vec<CompiledBlock>,
}

impl CompiledBlock {
    /// An empty block with default props.
    pub fn empty(id: BlockIdentity, block_type: BlockType) -> Self {
        Self {
            id,
            block_type,
            props: CompiledProps {
                text_color: Some("default".into()),
                background_color: Some("default".into()),
                text_alignment: Some(TextAlignment::Left),
                level: None,
            },
            content: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Character identities of this block's own text, in order.
    pub fn char_ids(&self) -> Vec<CharId> {
        self.content
            .iter()
            .flat_map(|item| item.runs())
            .flat_map(|run| run.char_ids.iter().cloned())
            .collect()
    }

    /// This block's own text (children excluded).
    pub fn text(&self) -> String {
        self.content
            .iter()
            .flat_map(|item| item.runs())
            .map(|run| run.text.as_str())
            .collect()
    }

    /// Depth-first visit of this block and all descendants.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a CompiledBlock)) {
        f(self);
        for child in &self.children {
            child.walk(f);
        }
    }
}

/// Highest `<n>@temp` sequence among all block and character ids.
pub fn max_local_sequence(blocks: &[CompiledBlock]) -> Option<u64> {
    let mut max = None;
    for block in blocks {
        block.walk(&mut |b| {
            let char_ids = b.char_ids();
            let ids = b
                .id
                .local_sequence()
                .into_iter()
                .chain(char_ids.iter().filter_map(CharId::local_sequence));
            for n in ids {
                max = Some(max.map_or(n, |m: u64| m.max(n)));
            }
        });
    }
    max
}

#[cfg(test)]
mod tests {
    use super::*;

    const STORE_JSON: &str = r#"[
        {"id":"1@temp","type":"paragraph",
         "props":{"textColor":"default","backgroundColor":"default","textAlignment":"left"},
         "content":[
            {"type":"text","text":"Hel","styles":{"bold":true},"charIds":["2@temp","3@temp","4@temp"]},
            {"type":"link","href":"https://x.dev","content":[
                {"type":"text","text":"lo","styles":{},"charIds":["5@temp","6@temp"]}
            ]}
         ],
         "children":[
            {"id":"9@temp","type":"heading","props":{"level":2},
             "content":[{"type":"text","text":"!","styles":{},"charIds":["10@temp"]}],
             "children":[]}
         ]}
    ]"#;

    #[test]
    fn test_decode_store_document() {
        let blocks: Vec<CompiledBlock> = serde_json::from_str(STORE_JSON).unwrap();
        assert_eq!(blocks.len(), 1);
        let block = &blocks[0];
        assert_eq!(block.id, BlockIdentity::Local(1));
        assert_eq!(block.block_type, BlockType::Paragraph);
        assert_eq!(block.text(), "Hello");
        assert_eq!(
            block.char_ids(),
            ["2@temp", "3@temp", "4@temp", "5@temp", "6@temp"].map(CharId::from).to_vec()
        );
        assert_eq!(block.children[0].block_type, BlockType::Heading);
        assert_eq!(block.children[0].props.level, Some(2));
    }

    #[test]
    fn test_max_local_sequence_includes_children() {
        let blocks: Vec<CompiledBlock> = serde_json::from_str(STORE_JSON).unwrap();
        assert_eq!(max_local_sequence(&blocks), Some(10));
        assert_eq!(max_local_sequence(&[]), None);
    }
}
