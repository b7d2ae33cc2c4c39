//! Whole-batch passes over a transaction's raw operations.
//!
//! ```text
//!   raw ops
//!     │  1. RemoveBlock, AddBlock        → UpdateBlock   (block moved/retyped)
//!     │  2. AddBlock, UpdateBlock(same)  → AddBlock      (new block, final shape)
//!     │  3. UpdateBlock × n              → UpdateBlock   (folded, appended last)
//!     │     repeat 1-3 until nothing merges
//!     ▼
//!   compacted ops
//!     │  4. AddBlock targets → <OperationID>@temp, references rewritten
//!     ▼
//!   batch ready to send
//! ```
//!
//! Mark operations are never merged: an AddMark followed by a RemoveMark of
//! the same range is two operations on the wire.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::error;

use weft_types::{AddBlock, BlockIdentity, CrdtOperation, OperationPayload, UpdateBlock};

use crate::Result;
use crate::error::CompileError;

// ============================================================================
// Compaction
// ============================================================================

/// Run passes 1-3 until the batch stops shrinking.
pub fn compact(mut ops: Vec<CrdtOperation>) -> Vec<CrdtOperation> {
    loop {
        let len = ops.len();
        ops = merge_updates(merge_add_update(merge_remove_add(ops)));
        if ops.len() == len {
            return ops;
        }
    }
}

/// Pass 1: a RemoveBlock immediately followed by an AddBlock becomes one
/// UpdateBlock carrying the RemoveBlock's id and origin and the AddBlock's
/// placement and shape.
pub fn merge_remove_add(ops: Vec<CrdtOperation>) -> Vec<CrdtOperation> {
    let mut out = Vec::with_capacity(ops.len());
    let mut iter = ops.into_iter().peekable();
    while let Some(op) = iter.next() {
        let is_remove = matches!(op.payload, OperationPayload::RemoveBlock(_));
        let add = match iter.peek() {
            Some(next) if is_remove => next.as_add_block().cloned(),
            _ => None,
        };
        let Some(add) = add else {
            out.push(op);
            continue;
        };
        let Some(next) = iter.next() else {
            out.push(op);
            continue;
        };

        out.push(CrdtOperation {
            block_id: next.block_id.or(op.block_id),
            payload: OperationPayload::UpdateBlock(UpdateBlock {
                after_block: add.after_block,
                parent_block: add.parent_block,
                block_type: Some(add.block_type),
                props: add.props,
            }),
            ..op
        });
    }
    out
}

/// Pass 2: an AddBlock followed by an UpdateBlock of the same block becomes
/// one AddBlock with the update applied. The added block's own characters may
/// sit between the two.
pub fn merge_add_update(ops: Vec<CrdtOperation>) -> Vec<CrdtOperation> {
    let mut out: Vec<CrdtOperation> = Vec::with_capacity(ops.len());
    for op in ops {
        let merged = trailing_add(&out)
            .and_then(|index| absorb_update(&out[index], &op).map(|add| (index, add)));
        match merged {
            Some((index, add)) => out[index] = add,
            None => out.push(op),
        }
    }
    out
}

/// Index of the AddBlock that ends `ops`, looking past character operations
/// on the block it adds.
pub fn trailing_add(ops: &[CrdtOperation]) -> Option<usize> {
    let index = ops.iter().rposition(|op| !op.kind().is_char_op())?;
    let add = &ops[index];
    let own_chars = ops[index + 1..]
        .iter()
        .all(|op| op.block_id.is_some() && op.block_id == add.block_id);
    (add.is_add_block() && own_chars).then_some(index)
}

/// `add` with `update` folded in, when `add` is an AddBlock and `update` is
/// an UpdateBlock that can refer to the same block.
///
/// An update without a target, or an add without one, is taken to refer to
/// the other.
pub fn absorb_update(add: &CrdtOperation, update: &CrdtOperation) -> Option<CrdtOperation> {
    let added = add.as_add_block()?;
    let updated = update.as_update_block()?;
    let same_block = match (&add.block_id, &update.block_id) {
        (Some(a), Some(u)) => a == u,
        _ => true,
    };
    if !same_block {
        return None;
    }

    Some(CrdtOperation {
        block_id: update.block_id.clone().or_else(|| add.block_id.clone()),
        payload: OperationPayload::AddBlock(AddBlock {
            after_block: updated
                .after_block
                .clone()
                .or_else(|| added.after_block.clone()),
            parent_block: updated
                .parent_block
                .clone()
                .or_else(|| added.parent_block.clone()),
            block_type: updated
                .block_type
                .clone()
                .unwrap_or_else(|| added.block_type.clone()),
            props: added.props.merged_with(&updated.props),
        }),
        ..add.clone()
    })
}

/// Pass 3: every UpdateBlock in the batch folded left to right into the
/// first one, which moves to the end of the batch.
pub fn merge_updates(ops: Vec<CrdtOperation>) -> Vec<CrdtOperation> {
    if ops.iter().filter(|op| op.is_update_block()).count() <= 1 {
        return ops;
    }

    let (updates, mut others): (Vec<_>, Vec<_>) =
        ops.into_iter().partition(CrdtOperation::is_update_block);
    let mut updates = updates.into_iter();
    let Some(mut combined) = updates.next() else {
        return others;
    };

    for op in updates {
        let OperationPayload::UpdateBlock(next) = op.payload else {
            continue;
        };
        if combined.block_id.is_none() {
            combined.block_id = op.block_id;
        }
        if let OperationPayload::UpdateBlock(acc) = &mut combined.payload {
            if next.after_block.is_some() {
                acc.after_block = next.after_block;
            }
            if next.parent_block.is_some() {
                acc.parent_block = next.parent_block;
            }
            if next.block_type.is_some() {
                acc.block_type = next.block_type;
            }
            acc.props = acc.props.merged_with(&next.props);
        }
    }

    others.push(combined);
    others
}

// ============================================================================
// Placeholder fixup
// ============================================================================

/// Old block identity → canonical identity, built during fixup.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolutionTable {
    entries: BTreeMap<BlockIdentity, BlockIdentity>,
}

impl ResolutionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &BlockIdentity) -> Option<&BlockIdentity> {
        self.entries.get(id)
    }

    /// `id`'s canonical form, or `id` itself when it was not renamed.
    pub fn resolve(&self, id: &BlockIdentity) -> BlockIdentity {
        self.get(id).cloned().unwrap_or_else(|| id.clone())
    }

    pub fn insert(&mut self, old: BlockIdentity, new: BlockIdentity) {
        self.entries.insert(old, new);
    }

    /// Add `later`'s renames, rewriting existing targets that `later` renamed
    /// again.
    pub fn chain(&mut self, later: &ResolutionTable) {
        for target in self.entries.values_mut() {
            if let Some(renamed) = later.get(target) {
                *target = renamed.clone();
            }
        }
        for (old, new) in later.iter() {
            self.entries.entry(old.clone()).or_insert_with(|| new.clone());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BlockIdentity, &BlockIdentity)> {
        self.entries.iter()
    }
}

/// Give every AddBlock the canonical identity `<OperationID>@temp` and
/// rewrite every block reference in the batch to match.
pub fn fix_placeholder_ids(ops: &mut [CrdtOperation]) -> ResolutionTable {
    let mut table = ResolutionTable::new();
    for op in ops.iter().filter(|op| op.is_add_block()) {
        let canonical = BlockIdentity::local(op.operation_id);
        if let Some(old) = &op.block_id {
            if *old != canonical {
                table.insert(old.clone(), canonical);
            }
        }
    }

    for op in ops.iter_mut() {
        op.for_each_block_ref_mut(|slot| {
            if let Some(new) = slot.as_ref().and_then(|id| table.get(id)) {
                *slot = Some(new.clone());
            }
        });
        if op.is_add_block() {
            op.block_id = Some(BlockIdentity::local(op.operation_id));
        }
    }
    table
}

/// Check that every local block reference in `ops` names a block added in
/// the batch or present in `known`.
pub fn verify_references(ops: &[CrdtOperation], known: &BTreeSet<BlockIdentity>) -> Result<()> {
    let added: BTreeSet<&BlockIdentity> = ops
        .iter()
        .filter(|op| op.is_add_block())
        .filter_map(|op| op.block_id.as_ref())
        .collect();

    for op in ops {
        for block in op.block_refs() {
            if block.is_local() && !added.contains(block) && !known.contains(block) {
                error!(
                    operation = %op.operation_id,
                    kind = op.kind().as_str(),
                    %block,
                    "operation references unknown local block"
                );
                return Err(CompileError::ReferentialInconsistency {
                    operation: op.operation_id.get(),
                    block: block.clone(),
                });
            }
        }
    }
    Ok(())
}
