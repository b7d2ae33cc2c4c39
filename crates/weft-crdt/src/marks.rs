//! Anchoring formatting ranges to character identities.
//!
//! A mark over `from..to` is sent as two anchors rather than offsets:
//!
//! ```text
//!   text      H   e   l   l   o   !
//!   ids       2   3   4   5   6   7          (n@temp)
//!   range         [-----------)              from=1, to=4 (in-block)
//!   Start     after 2   ("before" the first marked char)
//!   End       after 5   (the last marked char)
//! ```
//!
//! Concurrent inserts elsewhere in the block shift offsets but not anchors.

use weft_types::{BlockIdentity, MarkAnchor, MarkOptions, MarkType};

use crate::Result;
use crate::charmap::CharIdentityMap;
use crate::error::CompileError;
use crate::locator::BlockLocator;
use crate::materialize::{COLOR_ATTR, HREF_ATTR};
use crate::snapshot::{DocumentSnapshot, Mark};

/// Anchors for a mark range within one block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MarkSpan {
    pub block: BlockIdentity,
    pub start: MarkAnchor,
    pub end: MarkAnchor,
}

/// Resolve `from..to` in `doc` into anchors from `char_ids`.
///
/// Both ends must sit in the same block. A start at offset 0 has no
/// preceding character; an end past the block's known characters has none.
pub fn resolve_mark_span(
    doc: &DocumentSnapshot,
    from: usize,
    to: usize,
    char_ids: &CharIdentityMap,
) -> Result<MarkSpan> {
    let locator = BlockLocator::new(doc);
    let start = locator
        .enclosing_block(from)?
        .ok_or(CompileError::UnresolvedContext { pos: from })?;
    let end = locator
        .enclosing_block(to)?
        .ok_or(CompileError::CrossBlockMark { from, to })?;
    if start.id != end.id {
        return Err(CompileError::CrossBlockMark { from, to });
    }

    let start_id = char_ids.id_before(&start.id, start.offset).cloned();
    let end_id = char_ids.id_before(&start.id, end.offset).cloned();
    Ok(MarkSpan {
        block: start.id,
        start: MarkAnchor::start(start_id),
        end: MarkAnchor::end(end_id),
    })
}

/// Options carried by an AddMark for `mark`.
pub fn mark_options(mark: &Mark) -> MarkOptions {
    let mark_type = mark.mark_type();
    if mark_type.is_color() {
        MarkOptions::color(mark.attr_str(COLOR_ATTR).unwrap_or_default())
    } else if mark_type == MarkType::Link {
        MarkOptions::link(mark.attr_str(HREF_ATTR).unwrap_or_default())
    } else {
        MarkOptions::default()
    }
}
