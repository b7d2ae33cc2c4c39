//! Block and mark vocabulary shared by the editor and the store.
//!
//! Names follow the store's wire spelling (`bulletListItem`, `textColor`, ...).
//! Parsing is case-insensitive and accepts the editor's aliases; unknown names
//! are preserved in an `Other` variant rather than rejected, since the editor
//! schema can grow faster than this vocabulary.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::EnumString;

// ============================================================================
// BlockType
// ============================================================================

/// The kind of a block's content node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString)]
#[serde(from = "String", into = "String")]
#[strum(ascii_case_insensitive)]
pub enum BlockType {
    #[default]
    #[strum(serialize = "paragraph")]
    Paragraph,
    #[strum(serialize = "heading")]
    Heading,
    #[strum(serialize = "bulletListItem", serialize = "bulletedListItem")]
    BulletListItem,
    #[strum(serialize = "numberedListItem")]
    NumberedListItem,
    #[strum(serialize = "image")]
    Image,
    #[strum(serialize = "table")]
    Table,
    /// A block type this vocabulary doesn't know about.
    #[strum(default)]
    Other(String),
}

impl BlockType {
    pub fn as_str(&self) -> &str {
        match self {
            BlockType::Paragraph => "paragraph",
            BlockType::Heading => "heading",
            BlockType::BulletListItem => "bulletListItem",
            BlockType::NumberedListItem => "numberedListItem",
            BlockType::Image => "image",
            BlockType::Table => "table",
            BlockType::Other(name) => name,
        }
    }
}

impl From<String> for BlockType {
    fn from(s: String) -> Self {
        match BlockType::from_str(&s) {
            Ok(t) => t,
            Err(_) => BlockType::Other(s),
        }
    }
}

impl From<BlockType> for String {
    fn from(t: BlockType) -> String {
        t.as_str().to_string()
    }
}

impl std::fmt::Display for BlockType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// TextAlignment
// ============================================================================

/// Horizontal alignment of a block's text.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum TextAlignment {
    #[default]
    Left,
    Center,
    Right,
    Justify,
}

impl TextAlignment {
    /// Lenient parse; unknown values fall back to the default.
    pub fn parse_or_default(s: &str) -> Self {
        TextAlignment::from_str(s).unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TextAlignment::Left => "left",
            TextAlignment::Center => "center",
            TextAlignment::Right => "right",
            TextAlignment::Justify => "justify",
        }
    }
}

// ============================================================================
// BlockProps
// ============================================================================

/// Default heading level when a block doesn't declare one.
pub const DEFAULT_LEVEL: u8 = 1;

/// Presentation properties carried by every block.
///
/// Fields are optional so that two property sets can be unioned field by
/// field. The operation builder always fills every field; partial sets come
/// from the store or from hand-written batches.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BlockProps {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_alignment: Option<TextAlignment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
}

impl BlockProps {
    /// Fully populated defaults: empty colors, left alignment, level 1.
    pub fn defaults() -> Self {
        Self {
            background_color: Some(String::new()),
            text_color: Some(String::new()),
            text_alignment: Some(TextAlignment::default()),
            level: Some(DEFAULT_LEVEL),
        }
    }

    /// Field-wise union; `other` wins wherever it has a value.
    pub fn merged_with(&self, other: &BlockProps) -> BlockProps {
        BlockProps {
            background_color: other
                .background_color
                .clone()
                .or_else(|| self.background_color.clone()),
            text_color: other.text_color.clone().or_else(|| self.text_color.clone()),
            text_alignment: other.text_alignment.or(self.text_alignment),
            level: other.level.or(self.level),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.background_color.is_none()
            && self.text_color.is_none()
            && self.text_alignment.is_none()
            && self.level.is_none()
    }
}

// ============================================================================
// Marks
// ============================================================================

/// A formatting mark kind.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString)]
#[serde(from = "String", into = "String")]
#[strum(ascii_case_insensitive)]
pub enum MarkType {
    #[strum(serialize = "bold", serialize = "strong")]
    Bold,
    #[strum(serialize = "italic", serialize = "em")]
    Italic,
    #[strum(serialize = "underline")]
    Underline,
    #[strum(serialize = "strikethrough", serialize = "strike")]
    Strikethrough,
    #[strum(serialize = "code")]
    Code,
    #[strum(serialize = "textColor")]
    TextColor,
    #[strum(serialize = "backgroundColor")]
    BackgroundColor,
    #[strum(serialize = "link")]
    Link,
    #[strum(default)]
    Other(String),
}

impl MarkType {
    pub fn as_str(&self) -> &str {
        match self {
            MarkType::Bold => "bold",
            MarkType::Italic => "italic",
            MarkType::Underline => "underline",
            MarkType::Strikethrough => "strikethrough",
            MarkType::Code => "code",
            MarkType::TextColor => "textColor",
            MarkType::BackgroundColor => "backgroundColor",
            MarkType::Link => "link",
            MarkType::Other(name) => name,
        }
    }

    /// Color marks carry a color value in their options.
    pub fn is_color(&self) -> bool {
        matches!(self, MarkType::TextColor | MarkType::BackgroundColor)
    }
}

impl From<String> for MarkType {
    fn from(s: String) -> Self {
        match MarkType::from_str(&s) {
            Ok(t) => t,
            Err(_) => MarkType::Other(s),
        }
    }
}

impl From<MarkType> for String {
    fn from(t: MarkType) -> String {
        t.as_str().to_string()
    }
}

impl std::fmt::Display for MarkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extra data attached to an AddMark.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MarkOptions {
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub href: String,
}

impl MarkOptions {
    pub fn color(color: impl Into<String>) -> Self {
        Self {
            color: color.into(),
            href: String::new(),
        }
    }

    pub fn link(href: impl Into<String>) -> Self {
        Self {
            color: String::new(),
            href: href.into(),
        }
    }
}
