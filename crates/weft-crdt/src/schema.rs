//! Node-name knowledge the snapshot model needs from the editor schema.
//!
//! The editor's JSON doesn't say which nodes are inline or atomic, so the few
//! names that matter are listed here. Everything not inline is a block.

/// Inline nodes other than text.
const INLINE_ELEMENTS: &[&str] = &["hardBreak", "mention", "emoji"];

/// Atomic nodes: no content, size 1.
const LEAF_ELEMENTS: &[&str] = &["hardBreak", "mention", "emoji", "image", "horizontalRule"];

/// Structural wrappers that hold blocks, never text.
const CONTAINER_ELEMENTS: &[&str] = &["doc", "blockGroup", "blockContainer", "columnList", "column"];

/// Node name of text runs.
pub const TEXT: &str = "text";

/// Attribute carrying a block's identity.
pub const ID_ATTR: &str = "id";

// ── block property attributes ──

pub const TEXT_COLOR_ATTR: &str = "textColor";
pub const BACKGROUND_COLOR_ATTR: &str = "backgroundColor";
pub const TEXT_ALIGNMENT_ATTR: &str = "textAlignment";
pub const LEVEL_ATTR: &str = "level";

pub fn is_inline(name: &str) -> bool {
    name == TEXT || INLINE_ELEMENTS.contains(&name)
}

pub fn is_leaf(name: &str) -> bool {
    LEAF_ELEMENTS.contains(&name)
}

pub fn is_container(name: &str) -> bool {
    CONTAINER_ELEMENTS.contains(&name)
}
