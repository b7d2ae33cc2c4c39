//! Deciding which operation kind a step represents.
//!
//! ```text
//! step               inserted   replaced  block content           action
//! ─────────────────  ─────────  ────────  ──────────────────────  ───────────
//! addMark            -          -         -                       AddMark
//! removeMark         -          -         -                       RemoveMark
//! replace            > 0        0         inserted has block      AddBlock
//! replace            1 char     0         -                       InsertChar
//! replace            text       0         -                       InsertText
//! replace            0          > 0       removed has block       RemoveBlock
//! replace            0          > 0       plain text              DeleteChar
//! replace            > 0        > 0       removed has block       RemoveBlock (tie-break)
//! replace            > 0        > 0       inserted has block      AddBlock
//! replace            > 0        > 0       neither                 InsertText
//! replace            otherwise                                    UpdateBlock
//! replaceAround      -          -         inserted has block      UpdateBlock
//! replaceAround      -          -         no block                (dropped)
//! ```

use std::fmt;

use weft_types::BlockIdentity;

use crate::Result;
use crate::error::CompileError;
use crate::locator::{BlockLocator, TieBreakPolicy, inserted_block_id, removed_block_id};
use crate::snapshot::{DocumentSnapshot, Fragment, Node};
use crate::step::DeltaStep;

/// What a step does, before any operation is built.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StepAction {
    AddBlock,
    RemoveBlock,
    UpdateBlock,
    InsertChar,
    /// Several characters at once; how it is emitted is a compiler policy.
    InsertText,
    DeleteChar,
    AddMark,
    RemoveMark,
}

impl StepAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepAction::AddBlock => "addBlock",
            StepAction::RemoveBlock => "removeBlock",
            StepAction::UpdateBlock => "updateBlock",
            StepAction::InsertChar => "insertChar",
            StepAction::InsertText => "insertText",
            StepAction::DeleteChar => "deleteChar",
            StepAction::AddMark => "addMark",
            StepAction::RemoveMark => "removeMark",
        }
    }

    /// Whether an operation of this kind can be built without a known target.
    /// New blocks get their identity during placeholder fixup.
    pub fn needs_block(&self) -> bool {
        !matches!(self, StepAction::AddBlock)
    }
}

impl fmt::Display for StepAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified step and the block it affects.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Classification {
    pub action: StepAction,
    pub block: Option<BlockIdentity>,
}

impl Classification {
    fn new(action: StepAction, block: Option<BlockIdentity>) -> Self {
        Self { action, block }
    }
}

/// Classify `step`, which turns `before` into `after`.
///
/// Block context comes from the enclosing block of `from` in `after`;
/// removed content is read from `before`.
pub fn classify(
    step: &DeltaStep,
    before: &DocumentSnapshot,
    after: &DocumentSnapshot,
    tie_break: TieBreakPolicy,
) -> Result<Classification> {
    let from = step.from();
    let enclosing = BlockLocator::new(after)
        .enclosing_block(from)?
        .map(|block| block.id);

    let classification = match step {
        DeltaStep::MarkAdd { .. } => Classification::new(StepAction::AddMark, enclosing),
        DeltaStep::MarkRemove { .. } => Classification::new(StepAction::RemoveMark, enclosing),
        DeltaStep::RangeReplace { from, to, slice } => {
            classify_replace(*from, *to, &slice.content, before, enclosing, tie_break)?
        }
        DeltaStep::StructuralReplace { slice, .. } => {
            if !slice.content.has_block() {
                return Err(CompileError::UnsupportedStep(
                    "structural replace without block content".to_string(),
                ));
            }
            Classification::new(
                StepAction::UpdateBlock,
                inserted_block_id(&slice.content).or(enclosing),
            )
        }
    };

    if classification.action.needs_block() && classification.block.is_none() {
        return Err(CompileError::UnresolvedContext { pos: from });
    }
    Ok(classification)
}

fn classify_replace(
    from: usize,
    to: usize,
    inserted: &Fragment,
    before: &DocumentSnapshot,
    enclosing: Option<BlockIdentity>,
    tie_break: TieBreakPolicy,
) -> Result<Classification> {
    let inserted_count = inserted.child_count();
    let replaced = to.saturating_sub(from);

    let classification = if inserted_count > 0 && replaced == 0 {
        if inserted.has_block() {
            Classification::new(StepAction::AddBlock, inserted_block_id(inserted))
        } else if is_single_char(inserted) {
            Classification::new(StepAction::InsertChar, enclosing)
        } else {
            Classification::new(StepAction::InsertText, enclosing)
        }
    } else if inserted_count == 0 && replaced > 0 {
        let removed = before.slice(from, to)?.content;
        if removed.has_block() {
            Classification::new(
                StepAction::RemoveBlock,
                removed_block_id(&removed).or(enclosing),
            )
        } else {
            Classification::new(StepAction::DeleteChar, enclosing)
        }
    } else if inserted_count > 0 && replaced > 0 {
        let removed = before.slice(from, to)?.content;
        if removed.has_block() {
            Classification::new(
                StepAction::RemoveBlock,
                tie_break
                    .pick(&removed)
                    .or_else(|| removed_block_id(&removed))
                    .or(enclosing),
            )
        } else if inserted.has_block() {
            Classification::new(StepAction::AddBlock, inserted_block_id(inserted))
        } else {
            Classification::new(StepAction::InsertText, enclosing)
        }
    } else {
        Classification::new(StepAction::UpdateBlock, enclosing)
    };
    Ok(classification)
}

fn is_single_char(content: &Fragment) -> bool {
    match content.nodes() {
        [Node::Text(text)] => text.len() == 1,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::fixtures::*;
    use crate::snapshot::{Mark, Slice};

    fn replace(from: usize, to: usize, nodes: Vec<Node>) -> DeltaStep {
        DeltaStep::RangeReplace {
            from,
            to,
            slice: Slice::closed(nodes),
        }
    }

    fn run(step: &DeltaStep) -> Result<Classification> {
        let before = hello_world();
        let after = step.apply(&before)?;
        classify(step, &before, &after, TieBreakPolicy::Observed)
    }

    #[test]
    fn test_mark_steps() {
        let add = DeltaStep::MarkAdd {
            from: 3,
            to: 9,
            mark: Mark::new("bold"),
        };
        assert_eq!(
            run(&add).unwrap(),
            Classification::new(StepAction::AddMark, Some(BlockIdentity::Local(1)))
        );
        let remove = DeltaStep::MarkRemove {
            from: 13,
            to: 15,
            mark: Mark::new("bold"),
        };
        assert_eq!(run(&remove).unwrap().action, StepAction::RemoveMark);
        assert_eq!(run(&remove).unwrap().block, Some(BlockIdentity::Local(8)));
    }

    #[test]
    fn test_insertions() {
        let one = run(&replace(9, 9, vec![Node::text("A")])).unwrap();
        assert_eq!(one.action, StepAction::InsertChar);
        assert_eq!(one.block, Some(BlockIdentity::Local(1)));

        let many = run(&replace(9, 9, vec![Node::text("AB")])).unwrap();
        assert_eq!(many.action, StepAction::InsertText);

        let block = run(&replace(21, 21, vec![container("new", paragraph(""))])).unwrap();
        assert_eq!(block.action, StepAction::AddBlock);
        assert_eq!(block.block, Some(BlockIdentity::Durable("new".into())));
    }

    #[test]
    fn test_add_block_without_identity_is_allowed() {
        let before = hello_world();
        let step = replace(21, 21, vec![Node::element(
            "blockContainer",
            Default::default(),
            vec![paragraph("")],
        )]);
        let after = step.apply(&before).unwrap();
        let c = classify(&step, &before, &after, TieBreakPolicy::Observed).unwrap();
        assert_eq!(c, Classification::new(StepAction::AddBlock, None));
    }

    #[test]
    fn test_removals() {
        let text = run(&replace(3, 4, vec![])).unwrap();
        assert_eq!(text.action, StepAction::DeleteChar);
        assert_eq!(text.block, Some(BlockIdentity::Local(1)));

        let block = run(&replace(11, 21, vec![])).unwrap();
        assert_eq!(block.action, StepAction::RemoveBlock);
        assert_eq!(block.block, Some(BlockIdentity::Local(8)));
    }

    #[test]
    fn test_mixed_replace() {
        let text_over_text = run(&replace(3, 5, vec![Node::text("J")])).unwrap();
        assert_eq!(text_over_text.action, StepAction::InsertText);

        let block_over_block =
            run(&replace(11, 21, vec![container("swap", paragraph("x"))])).unwrap();
        assert_eq!(block_over_block.action, StepAction::RemoveBlock);
        // The removed container's first child carries no id, so the removed
        // container itself is used.
        assert_eq!(block_over_block.block, Some(BlockIdentity::Local(8)));
    }

    #[test]
    fn test_empty_replace_is_update() {
        let c = run(&replace(5, 5, vec![])).unwrap();
        assert_eq!(c, Classification::new(StepAction::UpdateBlock, Some(BlockIdentity::Local(1))));
    }

    #[test]
    fn test_no_context_is_unresolved() {
        let before = hello_world();
        let step = replace(11, 11, vec![]);
        let err = classify(&step, &before, &before, TieBreakPolicy::Observed).unwrap_err();
        assert_eq!(err, CompileError::UnresolvedContext { pos: 11 });
    }

    #[test]
    fn test_structural_replace() {
        let doc = hello_world();
        let without_block = DeltaStep::StructuralReplace {
            from: 1,
            to: 11,
            gap_from: 2,
            gap_to: 10,
            insert: 1,
            slice: Slice::default(),
            structure: true,
        };
        assert!(matches!(
            classify(&without_block, &doc, &doc, TieBreakPolicy::Observed),
            Err(CompileError::UnsupportedStep(_))
        ));

        let with_block = DeltaStep::StructuralReplace {
            from: 1,
            to: 11,
            gap_from: 2,
            gap_to: 10,
            insert: 1,
            slice: Slice::closed(vec![container("1@temp", paragraph(""))]),
            structure: true,
        };
        let c = classify(&with_block, &doc, &doc, TieBreakPolicy::Observed).unwrap();
        assert_eq!(c, Classification::new(StepAction::UpdateBlock, Some(BlockIdentity::Local(1))));
    }
}
