//! Turning classified steps into operation records.
//!
//! The builder owns the mutable half of compilation: it allocates operation
//! ids and keeps the character identity map in lockstep with every character
//! operation it emits. Everything a step needs is validated before the first
//! id is allocated, so a rejected step leaves the counter and map untouched.

use serde_json::Value;
use tracing::trace;

use weft_types::{
    AddBlock, AddMark, BlockIdentity, BlockProps, BlockType, CharId, CrdtOperation, DeleteChar,
    DocumentId, InsertChar, OperationId, OperationPayload, RemoveBlock, RemoveMark, ReplicaId,
    TextAlignment, UpdateBlock,
};

use crate::Result;
use crate::charmap::CharIdentityMap;
use crate::classify::{Classification, StepAction};
use crate::config::InsertTextPolicy;
use crate::error::CompileError;
use crate::locator::{BlockLocator, inserted_block_id, inserted_block_node};
use crate::marks::{MarkSpan, mark_options, resolve_mark_span};
use crate::schema;
use crate::snapshot::{Attrs, DocumentSnapshot, ElementNode, Node};
use crate::step::DeltaStep;

/// Builds operations for one transaction.
pub struct OperationBuilder<'a> {
    document_id: &'a DocumentId,
    origin: &'a ReplicaId,
    next_op_id: &'a mut OperationId,
    char_ids: &'a mut CharIdentityMap,
    insert_text: InsertTextPolicy,
}

impl<'a> OperationBuilder<'a> {
    pub fn new(
        document_id: &'a DocumentId,
        origin: &'a ReplicaId,
        next_op_id: &'a mut OperationId,
        char_ids: &'a mut CharIdentityMap,
        insert_text: InsertTextPolicy,
    ) -> Self {
        Self {
            document_id,
            origin,
            next_op_id,
            char_ids,
            insert_text,
        }
    }

    /// Operations for `step`, classified as `classification`.
    ///
    /// Most steps yield one operation. Text insertions and deletions yield one
    /// per character; a new block with text is followed by its characters.
    pub fn build(
        &mut self,
        step: &DeltaStep,
        classification: &Classification,
        before: &DocumentSnapshot,
        after: &DocumentSnapshot,
    ) -> Result<Vec<CrdtOperation>> {
        let from = step.from();
        match classification.action {
            StepAction::AddBlock => self.add_block(step, classification.block.clone(), before, after),
            StepAction::RemoveBlock => {
                let block = require_block(classification, from)?;
                let op_id = self.next_op_id.bump();
                Ok(vec![self.operation(
                    op_id,
                    Some(block.clone()),
                    OperationPayload::RemoveBlock(RemoveBlock {
                        removed_block: Some(block),
                    }),
                )])
            }
            StepAction::UpdateBlock => {
                let op = self.update_block(step, classification.block.clone(), after)?;
                Ok(vec![op])
            }
            StepAction::InsertChar | StepAction::InsertText => {
                self.insert_text(step, classification, before, after)
            }
            StepAction::DeleteChar => {
                let block = require_block(classification, from)?;
                let offset = text_offset(before, from, &block)?;
                let count = before.slice(from, step.to())?.content.text_len();
                Ok(self.delete_run(&block, offset, count))
            }
            StepAction::AddMark | StepAction::RemoveMark => self.mark(step, classification, after),
        }
    }

    fn add_block(
        &mut self,
        step: &DeltaStep,
        block: Option<BlockIdentity>,
        before: &DocumentSnapshot,
        after: &DocumentSnapshot,
    ) -> Result<Vec<CrdtOperation>> {
        let (from, to) = (step.from(), step.to());
        let node = step
            .inserted()
            .and_then(inserted_block_node)
            .ok_or_else(|| unsupported(step, StepAction::AddBlock))?;

        let locator = BlockLocator::new(after);
        let sibling = locator.after_block(from)?;
        let parent = locator.parent_block(from)?;
        let after_block = sibling.or_else(|| parent.clone());
        let parent_block = parent.filter(|p| after_block.as_ref() != Some(p));
        let (block_type, props) = block_shape(node);
        let seed: Vec<char> = node
            .inline_container()
            .map(|inline| inline.content.text_content().chars().collect())
            .unwrap_or_default();

        // Text the new block replaced, when it landed over a selection.
        let replaced = if to > from {
            let count = before.slice(from, to)?.content.text_len();
            let enclosing = BlockLocator::new(before).enclosing_block(from)?;
            enclosing.filter(|_| count > 0).map(|e| (e.id, e.offset, count))
        } else {
            None
        };

        let mut ops = Vec::new();
        if let Some((id, offset, count)) = replaced {
            ops.extend(self.delete_run(&id, offset, count));
        }

        let op_id = self.next_op_id.bump();
        ops.push(self.operation(
            op_id,
            block.clone(),
            OperationPayload::AddBlock(AddBlock {
                after_block,
                parent_block,
                block_type,
                props: BlockProps::defaults().merged_with(&props),
            }),
        ));

        // A block that already exists (moved, not created) keeps its characters.
        if let Some(id) = &block {
            if is_new_block(id, before, self.char_ids) {
                self.char_ids.init_block(id);
                ops.extend(self.insert_run(id, 0, &seed));
            }
        }
        Ok(ops)
    }

    fn update_block(
        &mut self,
        step: &DeltaStep,
        classified: Option<BlockIdentity>,
        after: &DocumentSnapshot,
    ) -> Result<CrdtOperation> {
        let from = step.from();
        let locator = BlockLocator::new(after);
        let target = match step.inserted().and_then(inserted_block_id) {
            Some(id) => Some(id),
            None => locator.nested_block(from)?,
        }
        .or(classified);

        let after_block = locator.after_block(from)?;
        let parent_block = locator.parent_block(from)?;
        let (block_type, props) = match target.as_ref().and_then(|id| locator.find_block(id)) {
            Some(node) => {
                let (block_type, props) = block_shape(node);
                (Some(block_type), BlockProps::defaults().merged_with(&props))
            }
            None => (None, BlockProps::default()),
        };

        let op_id = self.next_op_id.bump();
        Ok(self.operation(
            op_id,
            target,
            OperationPayload::UpdateBlock(UpdateBlock {
                after_block,
                parent_block,
                block_type,
                props,
            }),
        ))
    }

    fn insert_text(
        &mut self,
        step: &DeltaStep,
        classification: &Classification,
        before: &DocumentSnapshot,
        after: &DocumentSnapshot,
    ) -> Result<Vec<CrdtOperation>> {
        let DeltaStep::RangeReplace { from, to, slice } = step else {
            return Err(unsupported(step, classification.action));
        };
        if classification.action == StepAction::InsertText
            && self.insert_text == InsertTextPolicy::Reject
        {
            return Err(CompileError::UnimplementedCase("multi-character text insertion"));
        }

        let block = require_block(classification, *from)?;
        let chars: Vec<char> = slice.content.text_content().chars().collect();
        let removed = if to > from {
            let count = before.slice(*from, *to)?.content.text_len();
            Some((text_offset(before, *from, &block)?, count))
        } else {
            None
        };
        let offset = text_offset(after, *from, &block)?;

        let mut ops = Vec::with_capacity(chars.len());
        if let Some((removed_offset, count)) = removed {
            ops.extend(self.delete_run(&block, removed_offset, count));
        }
        ops.extend(self.insert_run(&block, offset, &chars));
        Ok(ops)
    }

    fn mark(
        &mut self,
        step: &DeltaStep,
        classification: &Classification,
        after: &DocumentSnapshot,
    ) -> Result<Vec<CrdtOperation>> {
        let payload_for = |span: &MarkSpan| match (classification.action, step) {
            (StepAction::AddMark, DeltaStep::MarkAdd { mark, .. }) => {
                Some(OperationPayload::AddMark(AddMark {
                    start: span.start.clone(),
                    end: span.end.clone(),
                    mark_type: mark.mark_type(),
                    options: mark_options(mark),
                }))
            }
            (StepAction::RemoveMark, DeltaStep::MarkRemove { mark, .. }) => {
                Some(OperationPayload::RemoveMark(RemoveMark {
                    start: span.start.clone(),
                    end: span.end.clone(),
                    mark_type: mark.mark_type(),
                }))
            }
            _ => None,
        };

        let span = resolve_mark_span(after, step.from(), step.to(), &*self.char_ids)?;
        let payload =
            payload_for(&span).ok_or_else(|| unsupported(step, classification.action))?;
        let op_id = self.next_op_id.bump();
        Ok(vec![self.operation(op_id, Some(span.block), payload)])
    }

    /// Insert `chars` at `offset`, each anchored after the one before it.
    fn insert_run(
        &mut self,
        block: &BlockIdentity,
        offset: usize,
        chars: &[char],
    ) -> Vec<CrdtOperation> {
        let mut anchor = self.char_ids.id_before(block, offset).cloned();
        let mut ops = Vec::with_capacity(chars.len());
        for c in chars {
            let op_id = self.next_op_id.bump();
            let new_id = CharId::placeholder(op_id);
            self.char_ids
                .insert_after(block, anchor.as_ref(), new_id.clone());
            trace!(%block, %op_id, after = ?anchor, "insert char");
            let after_id = anchor.replace(new_id);
            ops.push(self.operation(
                op_id,
                Some(block.clone()),
                OperationPayload::InsertChar(InsertChar {
                    after_id,
                    character: c.to_string(),
                }),
            ));
        }
        ops
    }

    /// Delete `count` characters starting at `offset`.
    fn delete_run(
        &mut self,
        block: &BlockIdentity,
        offset: usize,
        count: usize,
    ) -> Vec<CrdtOperation> {
        let mut ops = Vec::with_capacity(count);
        for _ in 0..count {
            let removed_id = self.char_ids.id_removed_at(block, offset).cloned();
            if let Some(id) = &removed_id {
                self.char_ids.remove_id(block, id);
            }
            let op_id = self.next_op_id.bump();
            trace!(%block, %op_id, removed = ?removed_id, "delete char");
            ops.push(self.operation(
                op_id,
                Some(block.clone()),
                OperationPayload::DeleteChar(DeleteChar { removed_id }),
            ));
        }
        ops
    }

    fn operation(
        &self,
        operation_id: OperationId,
        block_id: Option<BlockIdentity>,
        payload: OperationPayload,
    ) -> CrdtOperation {
        CrdtOperation {
            origin: self.origin.clone(),
            operation_id,
            document_id: self.document_id.clone(),
            block_id,
            payload,
        }
    }
}

fn require_block(classification: &Classification, pos: usize) -> Result<BlockIdentity> {
    classification
        .block
        .clone()
        .ok_or(CompileError::UnresolvedContext { pos })
}

/// Neither in the document before the step nor in the identity map. A block
/// removed earlier in the same transaction is gone from the first but not
/// from the second.
fn is_new_block(id: &BlockIdentity, before: &DocumentSnapshot, char_ids: &CharIdentityMap) -> bool {
    before.find_block(id).is_none() && !char_ids.contains(id)
}

fn unsupported(step: &DeltaStep, action: StepAction) -> CompileError {
    CompileError::UnsupportedStep(format!("{} step built as {}", step.kind_name(), action))
}

/// In-block text offset of `pos`, which must sit in `block`.
fn text_offset(doc: &DocumentSnapshot, pos: usize, block: &BlockIdentity) -> Result<usize> {
    BlockLocator::new(doc)
        .enclosing_block(pos)?
        .filter(|enclosing| &enclosing.id == block)
        .map(|enclosing| enclosing.offset)
        .ok_or(CompileError::UnresolvedContext { pos })
}

// ── block attributes ──

/// Type and properties of a block node.
///
/// A container block takes its type from its first child and its properties
/// from both, the child's winning.
pub fn block_shape(node: &ElementNode) -> (BlockType, BlockProps) {
    if node.is_textblock() || node.is_leaf() {
        return (BlockType::from(node.name.clone()), props_from_attrs(&node.attrs));
    }
    match node
        .content
        .child(0)
        .and_then(Node::as_element)
        .filter(|child| child.is_block())
    {
        Some(content) => (
            BlockType::from(content.name.clone()),
            props_from_attrs(&node.attrs).merged_with(&props_from_attrs(&content.attrs)),
        ),
        None => (BlockType::Paragraph, props_from_attrs(&node.attrs)),
    }
}

fn props_from_attrs(attrs: &Attrs) -> BlockProps {
    let string = |key: &str| attrs.get(key).and_then(Value::as_str).map(str::to_string);
    BlockProps {
        background_color: string(schema::BACKGROUND_COLOR_ATTR),
        text_color: string(schema::TEXT_COLOR_ATTR),
        text_alignment: attrs
            .get(schema::TEXT_ALIGNMENT_ATTR)
            .and_then(Value::as_str)
            .map(TextAlignment::parse_or_default),
        level: attrs
            .get(schema::LEVEL_ATTR)
            .and_then(Value::as_u64)
            .and_then(|level| u8::try_from(level).ok()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use crate::locator::TieBreakPolicy;
    use crate::snapshot::fixtures::*;
    use crate::snapshot::{Mark, Slice};
    use weft_types::{AnchorSide, MarkType, OperationKind};

    struct Harness {
        document_id: DocumentId,
        origin: ReplicaId,
        next_op_id: OperationId,
        char_ids: CharIdentityMap,
    }

    impl Harness {
        fn new() -> Self {
            let mut char_ids = CharIdentityMap::new();
            for (block, first) in [(BlockIdentity::Local(1), 2u64), (BlockIdentity::Local(8), 9)] {
                char_ids.init_block(&block);
                let mut after: Option<CharId> = None;
                for n in first..first + 6 {
                    let id = CharId::placeholder(OperationId(n));
                    char_ids.insert_after(&block, after.as_ref(), id.clone());
                    after = Some(id);
                }
            }
            Self {
                document_id: DocumentId::from("doc-1"),
                origin: ReplicaId::placeholder(),
                next_op_id: OperationId(100),
                char_ids,
            }
        }

        fn build(&mut self, step: &DeltaStep, policy: InsertTextPolicy) -> Result<Vec<CrdtOperation>> {
            let before = hello_world();
            let after = step.apply(&before)?;
            let classification = classify(step, &before, &after, TieBreakPolicy::Observed)?;
            OperationBuilder::new(
                &self.document_id,
                &self.origin,
                &mut self.next_op_id,
                &mut self.char_ids,
                policy,
            )
            .build(step, &classification, &before, &after)
        }
    }

    fn replace(from: usize, to: usize, nodes: Vec<Node>) -> DeltaStep {
        DeltaStep::RangeReplace {
            from,
            to,
            slice: Slice::closed(nodes),
        }
    }

    #[test]
    fn test_insert_char_anchors_after_previous() {
        let mut h = Harness::new();
        let ops = h.build(&replace(9, 9, vec![Node::text("A")]), InsertTextPolicy::Decompose).unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].operation_id, OperationId(100));
        assert_eq!(ops[0].block_id, Some(BlockIdentity::Local(1)));
        match &ops[0].payload {
            OperationPayload::InsertChar(insert) => {
                assert_eq!(insert.character, "A");
                assert_eq!(insert.after_id, Some(CharId::from("7@temp")));
            }
            other => panic!("unexpected payload {other:?}"),
        }
        assert_eq!(h.next_op_id, OperationId(101));
        let ids = h.char_ids.get(&BlockIdentity::Local(1)).unwrap();
        assert_eq!(ids.last(), Some(&CharId::from("100@temp")));
        assert_eq!(ids.len(), 7);
    }

    #[test]
    fn test_insert_text_decomposes() {
        let mut h = Harness::new();
        let ops = h.build(&replace(4, 4, vec![Node::text("xy")]), InsertTextPolicy::Decompose).unwrap();
        let anchors: Vec<_> = ops
            .iter()
            .map(|op| match &op.payload {
                OperationPayload::InsertChar(insert) => insert.after_id.clone(),
                other => panic!("unexpected payload {other:?}"),
            })
            .collect();
        assert_eq!(
            anchors,
            vec![Some(CharId::from("2@temp")), Some(CharId::from("100@temp"))]
        );
        let ids = h.char_ids.get(&BlockIdentity::Local(1)).unwrap();
        assert_eq!(ids[1], CharId::from("100@temp"));
        assert_eq!(ids[2], CharId::from("101@temp"));
        assert_eq!(ids[3], CharId::from("3@temp"));
    }

    #[test]
    fn test_insert_text_rejected_leaves_state() {
        let mut h = Harness::new();
        let before = h.char_ids.clone();
        let err = h
            .build(&replace(4, 4, vec![Node::text("xy")]), InsertTextPolicy::Reject)
            .unwrap_err();
        assert!(matches!(err, CompileError::UnimplementedCase(_)));
        assert_eq!(h.next_op_id, OperationId(100));
        assert_eq!(h.char_ids, before);
    }

    #[test]
    fn test_text_over_text_deletes_then_inserts() {
        let mut h = Harness::new();
        let ops = h.build(&replace(3, 5, vec![Node::text("J")]), InsertTextPolicy::Decompose).unwrap();
        let kinds: Vec<_> = ops.iter().map(CrdtOperation::kind).collect();
        assert_eq!(
            kinds,
            vec![OperationKind::DeleteChar, OperationKind::DeleteChar, OperationKind::InsertChar]
        );
        assert_eq!(h.char_ids.len(&BlockIdentity::Local(1)), 5);
        assert_eq!(h.char_ids.get(&BlockIdentity::Local(1)).unwrap()[0], CharId::from("102@temp"));
    }

    #[test]
    fn test_delete_range_one_op_per_char() {
        let mut h = Harness::new();
        let ops = h.build(&replace(3, 5, vec![]), InsertTextPolicy::Decompose).unwrap();
        let removed: Vec<_> = ops
            .iter()
            .map(|op| match &op.payload {
                OperationPayload::DeleteChar(delete) => delete.removed_id.clone(),
                other => panic!("unexpected payload {other:?}"),
            })
            .collect();
        assert_eq!(removed, vec![Some(CharId::from("2@temp")), Some(CharId::from("3@temp"))]);
        assert_eq!(h.char_ids.len(&BlockIdentity::Local(1)), 4);
    }

    #[test]
    fn test_add_block_with_text() {
        let mut h = Harness::new();
        let ops = h
            .build(&replace(21, 21, vec![container("new", paragraph("Hi"))]), InsertTextPolicy::Decompose)
            .unwrap();
        assert_eq!(ops.len(), 3);
        let add = ops[0].as_add_block().unwrap();
        assert_eq!(ops[0].block_id, Some(BlockIdentity::Durable("new".into())));
        assert_eq!(add.after_block, Some(BlockIdentity::Local(8)));
        assert_eq!(add.parent_block, None);
        assert_eq!(add.block_type, BlockType::Paragraph);
        assert_eq!(add.props.text_alignment, Some(TextAlignment::Left));
        assert_eq!(add.props.text_color.as_deref(), Some("default"));
        assert_eq!(add.props.level, Some(1));
        assert_eq!(ops[2].kind(), OperationKind::InsertChar);
        assert_eq!(h.char_ids.len(&BlockIdentity::Durable("new".into())), 2);
    }

    #[test]
    fn test_remove_block() {
        let mut h = Harness::new();
        let ops = h.build(&replace(11, 21, vec![]), InsertTextPolicy::Decompose).unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(
            ops[0].payload,
            OperationPayload::RemoveBlock(RemoveBlock {
                removed_block: Some(BlockIdentity::Local(8))
            })
        );
        // Block removal leaves the map to the store.
        assert_eq!(h.char_ids.len(&BlockIdentity::Local(8)), 6);
    }

    #[test]
    fn test_update_block_reads_current_attributes() {
        let mut h = Harness::new();
        let step = DeltaStep::StructuralReplace {
            from: 11,
            to: 21,
            gap_from: 12,
            gap_to: 20,
            insert: 1,
            slice: Slice::closed(vec![container("8@temp", heading("", 2))]),
            structure: true,
        };
        let doc = hello_world();
        let classification = classify(&step, &doc, &doc, TieBreakPolicy::Observed).unwrap();
        let op = OperationBuilder::new(
            &h.document_id,
            &h.origin,
            &mut h.next_op_id,
            &mut h.char_ids,
            InsertTextPolicy::Decompose,
        )
        .update_block(&step, classification.block, &doc)
        .unwrap();
        assert_eq!(op.block_id, Some(BlockIdentity::Local(8)));
        let update = op.as_update_block().unwrap();
        assert_eq!(update.block_type, Some(BlockType::Heading));
        assert_eq!(update.props.level, Some(1));
        assert_eq!(update.after_block, Some(BlockIdentity::Local(1)));
    }

    #[test]
    fn test_marks() {
        let mut h = Harness::new();
        let bold = Mark::new("bold");
        let ops = h
            .build(&DeltaStep::MarkAdd { from: 3, to: 9, mark: bold.clone() }, InsertTextPolicy::Decompose)
            .unwrap();
        match &ops[0].payload {
            OperationPayload::AddMark(add) => {
                assert_eq!(add.mark_type, MarkType::Bold);
                assert_eq!(add.start.side, AnchorSide::Before);
                assert_eq!(add.end.op_id, Some(CharId::from("7@temp")));
            }
            other => panic!("unexpected payload {other:?}"),
        }
        let ops = h
            .build(&DeltaStep::MarkRemove { from: 3, to: 9, mark: bold }, InsertTextPolicy::Decompose)
            .unwrap();
        assert_eq!(ops[0].kind(), OperationKind::RemoveMark);
        assert_eq!(ops[0].operation_id, OperationId(101));
    }

    #[test]
    fn test_mismatched_mark_action() {
        let mut h = Harness::new();
        let doc = hello_world();
        let step = DeltaStep::MarkAdd { from: 3, to: 9, mark: Mark::new("bold") };
        let classification = Classification {
            action: StepAction::RemoveMark,
            block: Some(BlockIdentity::Local(1)),
        };
        let err = OperationBuilder::new(
            &h.document_id,
            &h.origin,
            &mut h.next_op_id,
            &mut h.char_ids,
            InsertTextPolicy::Decompose,
        )
        .build(&step, &classification, &doc, &doc)
        .unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedStep(_)));
        assert_eq!(h.next_op_id, OperationId(100));
    }

    #[test]
    fn test_block_shape() {
        let doc = hello_world();
        let heading = doc.find_block(&BlockIdentity::Local(8)).unwrap();
        let (block_type, props) = block_shape(heading);
        assert_eq!(block_type, BlockType::Heading);
        assert_eq!(props.level, Some(1));
        assert_eq!(props.background_color.as_deref(), Some("default"));
    }
}
