//! Per-block registry of character identities.
//!
//! For every block the map holds the ordered identities of its characters:
//! the identity at index `i` is the character at text offset `i`. Offsets are
//! only meaningful against the document the map was last synchronized with,
//! which is why the map is mutated in lockstep with each emitted operation.
//!
//! Lookups against unknown blocks return `None` rather than failing; callers
//! decide what an absent anchor means.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use weft_types::{BlockIdentity, CharId, CompiledBlock};

/// Block identity to ordered character identities.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CharIdentityMap {
    blocks: BTreeMap<BlockIdentity, Vec<CharId>>,
}

impl CharIdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a materialized document, nested blocks included.
    pub fn from_compiled(blocks: &[CompiledBlock]) -> Self {
        let mut map = Self::new();
        for block in blocks {
            block.walk(&mut |b| {
                map.blocks.insert(b.id.clone(), b.char_ids());
            });
        }
        map
    }

    /// Identity of the character before `offset`, i.e. at `offset - 1`.
    pub fn id_before(&self, block: &BlockIdentity, offset: usize) -> Option<&CharId> {
        let index = offset.checked_sub(1)?;
        self.blocks.get(block)?.get(index)
    }

    /// Identity of the character at `offset`.
    pub fn id_removed_at(&self, block: &BlockIdentity, offset: usize) -> Option<&CharId> {
        self.blocks.get(block)?.get(offset)
    }

    /// Insert `new_id` right after `after`, or at the head when `after` is
    /// `None` or not present. Creates the block's sequence if needed.
    pub fn insert_after(&mut self, block: &BlockIdentity, after: Option<&CharId>, new_id: CharId) {
        let ids = self.blocks.entry(block.clone()).or_default();
        let index = after
            .and_then(|a| ids.iter().position(|id| id == a))
            .map_or(0, |i| i + 1);
        ids.insert(index, new_id);
    }

    /// Remove the first occurrence of `id`. Returns whether anything changed.
    pub fn remove_id(&mut self, block: &BlockIdentity, id: &CharId) -> bool {
        let Some(ids) = self.blocks.get_mut(block) else {
            return false;
        };
        match ids.iter().position(|existing| existing == id) {
            Some(index) => {
                ids.remove(index);
                true
            }
            None => false,
        }
    }

    /// Start an empty sequence for `block`, clearing any existing one.
    pub fn init_block(&mut self, block: &BlockIdentity) {
        self.blocks.insert(block.clone(), Vec::new());
    }

    /// Ensure `block` has a sequence without touching an existing one.
    pub fn ensure_block(&mut self, block: &BlockIdentity) {
        self.blocks.entry(block.clone()).or_default();
    }

    /// Move `old`'s sequence to `new`. No-op when `old` is unknown.
    pub fn rekey(&mut self, old: &BlockIdentity, new: BlockIdentity) {
        if let Some(ids) = self.blocks.remove(old) {
            self.blocks.insert(new, ids);
        }
    }

    pub fn get(&self, block: &BlockIdentity) -> Option<&[CharId]> {
        self.blocks.get(block).map(Vec::as_slice)
    }

    /// Number of characters recorded for `block` (0 when unknown).
    pub fn len(&self, block: &BlockIdentity) -> usize {
        self.blocks.get(block).map_or(0, Vec::len)
    }

    pub fn contains(&self, block: &BlockIdentity) -> bool {
        self.blocks.contains_key(block)
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BlockIdentity, &[CharId])> {
        self.blocks.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Highest `<n>@temp` sequence among recorded block and character ids.
    pub fn max_local_sequence(&self) -> Option<u64> {
        self.blocks
            .iter()
            .flat_map(|(block, ids)| {
                block
                    .local_sequence()
                    .into_iter()
                    .chain(ids.iter().filter_map(CharId::local_sequence))
            })
            .max()
    }
}
