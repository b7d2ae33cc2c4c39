//! Structural queries over a snapshot: which block a position belongs to,
//! what precedes it, what contains it.
//!
//! "Block" here always means an identity-bearing block: a non-inline element
//! with a non-empty `id` attribute. Wrappers without identity (block groups,
//! the inline container of a block) are skipped over.

use serde::{Deserialize, Serialize};
use strum::EnumString;

use weft_types::BlockIdentity;

use crate::Result;
use crate::snapshot::{DocumentSnapshot, ElementNode, Fragment, Node, ResolvedPos};

/// The nearest identity-bearing ancestor of a position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnclosingBlock {
    pub id: BlockIdentity,
    /// Depth of the block in the resolved path.
    pub depth: usize,
    /// Offset of the position within the block's own text.
    pub offset: usize,
}

/// Stateless queries against one snapshot.
#[derive(Clone, Copy, Debug)]
pub struct BlockLocator<'a> {
    doc: &'a DocumentSnapshot,
}

impl<'a> BlockLocator<'a> {
    pub fn new(doc: &'a DocumentSnapshot) -> Self {
        Self { doc }
    }

    pub fn doc(&self) -> &'a DocumentSnapshot {
        self.doc
    }

    /// Nearest identity-bearing ancestor of `pos`, deepest first.
    pub fn enclosing_block(&self, pos: usize) -> Result<Option<EnclosingBlock>> {
        let resolved = self.doc.resolve(pos)?;
        Ok(enclosing_in(&resolved))
    }

    /// Block that contains `pos` as a child position.
    ///
    /// At a boundary between blocks this is the nearest identity ancestor.
    /// When `pos` sits inside a block's own content, that block is the one
    /// being addressed and its parent is one level further up.
    pub fn parent_block(&self, pos: usize) -> Result<Option<BlockIdentity>> {
        let resolved = self.doc.resolve(pos)?;
        let Some(enclosing) = enclosing_in(&resolved) else {
            return Ok(None);
        };

        let depth = resolved.depth();
        let inside = depth == enclosing.depth
            || (depth == enclosing.depth + 1 && resolved.parent().is_textblock());
        if !inside {
            return Ok(Some(enclosing.id));
        }
        Ok((0..enclosing.depth)
            .rev()
            .find_map(|d| resolved.node(d).block_id()))
    }

    /// Sibling block immediately before `pos` in its parent.
    pub fn after_block(&self, pos: usize) -> Result<Option<BlockIdentity>> {
        let resolved = self.doc.resolve(pos)?;
        let depth = resolved.depth();
        let index = resolved.index(depth);
        Ok(index
            .checked_sub(1)
            .and_then(|i| resolved.parent().content.child(i))
            .and_then(Node::block_id))
    }

    /// First identity-bearing descendant of the node containing `pos`.
    pub fn nested_block(&self, pos: usize) -> Result<Option<BlockIdentity>> {
        let resolved = self.doc.resolve(pos)?;
        Ok(resolved.parent().first_descendant_block_id())
    }

    pub fn find_block(&self, id: &BlockIdentity) -> Option<&'a ElementNode> {
        self.doc.find_block(id)
    }
}

fn enclosing_in(resolved: &ResolvedPos<'_>) -> Option<EnclosingBlock> {
    let pos = resolved.pos();
    (0..=resolved.depth()).rev().find_map(|depth| {
        let node = resolved.node(depth);
        let id = node.block_id()?;
        // The block's text starts inside its inline container, one token in
        // when that container is a child rather than the block itself.
        let text_start = if node.is_textblock() {
            resolved.start(depth)
        } else {
            resolved.start(depth) + 1
        };
        Some(EnclosingBlock {
            id,
            depth,
            offset: pos.saturating_sub(text_start),
        })
    })
}

/// The block node inserted content is about: the first top-level block that
/// carries an identity, or a block one level down that does, falling back to
/// the first top-level block.
pub fn inserted_block_node(content: &Fragment) -> Option<&ElementNode> {
    let blocks = || {
        content
            .iter()
            .filter_map(Node::as_element)
            .filter(|el| el.is_block())
    };
    blocks()
        .find_map(|el| {
            if el.block_id().is_some() {
                return Some(el);
            }
            el.content
                .iter()
                .filter_map(Node::as_element)
                .find(|child| child.is_block() && child.block_id().is_some())
        })
        .or_else(|| blocks().next())
}

/// Identity of the first block in inserted content, looking at the top level
/// and one level down.
pub fn inserted_block_id(content: &Fragment) -> Option<BlockIdentity> {
    inserted_block_node(content).and_then(ElementNode::block_id)
}

/// Identity of the last top-level block in removed content.
pub fn removed_block_id(content: &Fragment) -> Option<BlockIdentity> {
    content.iter().rev().filter(|n| n.is_block()).find_map(Node::block_id)
}

// ============================================================================
// Tie-break policy
// ============================================================================

/// Which removed block a mixed replace (content removed and inserted in one
/// step, with blocks among the removed content) is attributed to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum TieBreakPolicy {
    /// Keyed off the number of removed top-level nodes, matching the shapes
    /// the block editor produces: three nodes pick the third, two pick the
    /// second, a single node with children picks its first child.
    #[default]
    Observed,
    /// First identity-bearing top-level node.
    FirstRemoved,
    /// Last identity-bearing top-level node.
    LastRemoved,
}

impl TieBreakPolicy {
    /// The affected block, or `None` to keep the enclosing block.
    pub fn pick(&self, removed: &Fragment) -> Option<BlockIdentity> {
        match self {
            TieBreakPolicy::Observed => match removed.child_count() {
                3 => removed
                    .child(2)
                    .filter(|n| n.is_block())
                    .and_then(Node::block_id),
                2 => removed_block_id(removed),
                1 => removed
                    .child(0)
                    .and_then(Node::as_element)
                    .filter(|el| el.is_block() && !el.content.is_empty())
                    .and_then(|el| el.content.child(0))
                    .and_then(Node::block_id),
                _ => None,
            },
            TieBreakPolicy::FirstRemoved => removed
                .iter()
                .filter(|n| n.is_block())
                .find_map(Node::block_id),
            TieBreakPolicy::LastRemoved => removed_block_id(removed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::Attrs;
    use crate::snapshot::fixtures::*;

    #[test]
    fn test_enclosing_block_offsets() {
        let doc = hello_world();
        let locator = BlockLocator::new(&doc);

        let start = locator.enclosing_block(3).unwrap().unwrap();
        assert_eq!(start.id, BlockIdentity::Local(1));
        assert_eq!(start.offset, 0);
        assert_eq!(start.depth, 2);

        let end = locator.enclosing_block(9).unwrap().unwrap();
        assert_eq!(end.offset, 6);

        let heading = locator.enclosing_block(15).unwrap().unwrap();
        assert_eq!(heading.id, BlockIdentity::Local(8));
        assert_eq!(heading.offset, 2);
    }

    #[test]
    fn test_no_enclosing_block_between_top_level_blocks() {
        let doc = hello_world();
        let locator = BlockLocator::new(&doc);
        assert_eq!(locator.enclosing_block(11).unwrap(), None);
        assert_eq!(locator.parent_block(11).unwrap(), None);
    }

    #[test]
    fn test_flat_textblock_offsets() {
        // Blocks that are their own textblock: doc > paragraph(id) > text.
        let doc = DocumentSnapshot::new(ElementNode::new(
            "doc",
            Attrs::new(),
            vec![Node::element(
                "paragraph",
                attrs(serde_json::json!({"id": "p1"})),
                vec![Node::text("abc")],
            )],
        ));
        let locator = BlockLocator::new(&doc);
        let enclosing = locator.enclosing_block(2).unwrap().unwrap();
        assert_eq!(enclosing.id, BlockIdentity::Durable("p1".into()));
        assert_eq!(enclosing.offset, 1);
    }

    #[test]
    fn test_after_block() {
        let doc = hello_world();
        let locator = BlockLocator::new(&doc);
        assert_eq!(locator.after_block(11).unwrap(), Some(BlockIdentity::Local(1)));
        assert_eq!(locator.after_block(21).unwrap(), Some(BlockIdentity::Local(8)));
        assert_eq!(locator.after_block(1).unwrap(), None);
        // Inside text there is no preceding block sibling.
        assert_eq!(locator.after_block(5).unwrap(), None);
    }

    #[test]
    fn test_parent_block_nested() {
        let doc = doc(vec![container_with_children(
            "outer",
            paragraph("ab"),
            vec![container("inner", paragraph("cd"))],
        )]);
        let locator = BlockLocator::new(&doc);
        // group(0) > outer(1) > paragraph(2) "ab" 3..5, 6 after paragraph,
        // inner group at 6, inner container at 7, its paragraph at 8, "cd" 9..11.
        let inner_text = 9;
        assert_eq!(
            locator.enclosing_block(inner_text).unwrap().map(|b| b.id),
            Some(BlockIdentity::Durable("inner".into()))
        );
        assert_eq!(
            locator.parent_block(inner_text).unwrap(),
            Some(BlockIdentity::Durable("outer".into()))
        );
        // Boundary inside the nested group, before the inner container.
        assert_eq!(
            locator.parent_block(7).unwrap(),
            Some(BlockIdentity::Durable("outer".into()))
        );
        assert_eq!(locator.after_block(7).unwrap(), None);
    }

    #[test]
    fn test_nested_block_scan() {
        let doc = hello_world();
        let locator = BlockLocator::new(&doc);
        assert_eq!(locator.nested_block(11).unwrap(), Some(BlockIdentity::Local(1)));
        assert_eq!(locator.nested_block(5).unwrap(), None);
    }

    #[test]
    fn test_inserted_block_id_looks_one_level_down() {
        let direct = Fragment::from(vec![container("new", paragraph("x"))]);
        assert_eq!(inserted_block_id(&direct), Some(BlockIdentity::Durable("new".into())));

        let wrapped = Fragment::from(vec![Node::element(
            "blockGroup",
            Attrs::new(),
            vec![container("nested", paragraph("y"))],
        )]);
        assert_eq!(
            inserted_block_id(&wrapped),
            Some(BlockIdentity::Durable("nested".into()))
        );

        let bare = Fragment::from(vec![paragraph("z")]);
        assert_eq!(inserted_block_id(&bare), None);
        assert_eq!(inserted_block_id(&Fragment::from(vec![Node::text("t")])), None);
    }

    #[test]
    fn test_observed_tie_break() {
        let policy = TieBreakPolicy::Observed;
        let three = Fragment::from(vec![
            container("a", paragraph("1")),
            container("b", paragraph("2")),
            container("c", paragraph("3")),
        ]);
        assert_eq!(policy.pick(&three), Some(BlockIdentity::Durable("c".into())));

        let two = Fragment::from(vec![
            container("a", paragraph("1")),
            container("b", paragraph("2")),
        ]);
        assert_eq!(policy.pick(&two), Some(BlockIdentity::Durable("b".into())));

        let one = Fragment::from(vec![Node::element(
            "blockGroup",
            Attrs::new(),
            vec![container("only", paragraph("1"))],
        )]);
        assert_eq!(policy.pick(&one), Some(BlockIdentity::Durable("only".into())));

        let four = Fragment::from(vec![
            container("a", paragraph("1")),
            container("b", paragraph("2")),
            container("c", paragraph("3")),
            container("d", paragraph("4")),
        ]);
        assert_eq!(policy.pick(&four), None);
        assert_eq!(
            TieBreakPolicy::FirstRemoved.pick(&four),
            Some(BlockIdentity::Durable("a".into()))
        );
        assert_eq!(
            TieBreakPolicy::LastRemoved.pick(&four),
            Some(BlockIdentity::Durable("d".into()))
        );
    }
}
