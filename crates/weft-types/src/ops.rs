//! CRDT operation records as they travel to the authoritative store.
//!
//! # Wire shape
//!
//! ```text
//! {
//!   "Type": "insert",                 // operation kind tag
//!   "Origin": "temp",                 // replica that produced it
//!   "OperationID": 104,
//!   "DocumentID": "doc-1",
//!   "BlockID": "1@temp",
//!   "Operation": { "AfterID": "7@temp", "Character": "A" }
//! }
//! ```
//!
//! Absent identifiers are written as `""`, which is what the store's decoder
//! produces for zero values. In memory they are `Option`s.

use serde::{Deserialize, Serialize};
use strum::EnumString;

use crate::block::{BlockProps, BlockType, MarkOptions, MarkType};
use crate::ids::{BlockIdentity, CharId, DocumentId, OperationId, ReplicaId, empty_as_none};

// ============================================================================
// OperationKind
// ============================================================================

/// Discriminant of a [`CrdtOperation`], spelled as the wire `Type` tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString)]
pub enum OperationKind {
    #[serde(rename = "addBlock")]
    #[strum(serialize = "addBlock")]
    AddBlock,
    #[serde(rename = "removeBlock")]
    #[strum(serialize = "removeBlock")]
    RemoveBlock,
    #[serde(rename = "updateBlock")]
    #[strum(serialize = "updateBlock")]
    UpdateBlock,
    #[serde(rename = "insert")]
    #[strum(serialize = "insert")]
    InsertChar,
    #[serde(rename = "delete")]
    #[strum(serialize = "delete")]
    DeleteChar,
    #[serde(rename = "addMark")]
    #[strum(serialize = "addMark")]
    AddMark,
    #[serde(rename = "removeMark")]
    #[strum(serialize = "removeMark")]
    RemoveMark,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::AddBlock => "addBlock",
            OperationKind::RemoveBlock => "removeBlock",
            OperationKind::UpdateBlock => "updateBlock",
            OperationKind::InsertChar => "insert",
            OperationKind::DeleteChar => "delete",
            OperationKind::AddMark => "addMark",
            OperationKind::RemoveMark => "removeMark",
        }
    }

    pub fn is_block_op(&self) -> bool {
        matches!(
            self,
            OperationKind::AddBlock | OperationKind::RemoveBlock | OperationKind::UpdateBlock
        )
    }

    pub fn is_char_op(&self) -> bool {
        matches!(self, OperationKind::InsertChar | OperationKind::DeleteChar)
    }
}

// ============================================================================
// Payloads
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AddBlock {
    #[serde(default, with = "empty_as_none")]
    pub after_block: Option<BlockIdentity>,
    #[serde(default, with = "empty_as_none")]
    pub parent_block: Option<BlockIdentity>,
    #[serde(default)]
    pub block_type: BlockType,
    #[serde(default)]
    pub props: BlockProps,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RemoveBlock {
    #[serde(default, with = "empty_as_none")]
    pub removed_block: Option<BlockIdentity>,
}

/// Update of an existing block. The updated block is the operation's
/// `BlockID`; it is mirrored as `UpdatedBlock` on the wire.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateBlock {
    #[serde(default, with = "empty_as_none")]
    pub after_block: Option<BlockIdentity>,
    #[serde(default, with = "empty_as_none")]
    pub parent_block: Option<BlockIdentity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_type: Option<BlockType>,
    #[serde(default)]
    pub props: BlockProps,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertChar {
    #[serde(rename = "AfterID", default, with = "empty_as_none")]
    pub after_id: Option<CharId>,
    #[serde(rename = "Character")]
    pub character: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteChar {
    #[serde(rename = "RemovedID", default, with = "empty_as_none")]
    pub removed_id: Option<CharId>,
}

/// Which side of its character an anchor binds to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnchorSide {
    Before,
    After,
}

/// One end of a mark range, expressed as a character identity.
///
/// `op_id == None` means the start of the block (for `Start`) or that no
/// character bounds the range (for `End`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkAnchor {
    #[serde(rename = "Type")]
    pub side: AnchorSide,
    #[serde(rename = "OpID", default, with = "empty_as_none")]
    pub op_id: Option<CharId>,
}

impl MarkAnchor {
    pub fn start(op_id: Option<CharId>) -> Self {
        Self {
            side: AnchorSide::Before,
            op_id,
        }
    }

    pub fn end(op_id: Option<CharId>) -> Self {
        Self {
            side: AnchorSide::After,
            op_id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AddMark {
    pub start: MarkAnchor,
    pub end: MarkAnchor,
    pub mark_type: MarkType,
    #[serde(default)]
    pub options: MarkOptions,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RemoveMark {
    pub start: MarkAnchor,
    pub end: MarkAnchor,
    pub mark_type: MarkType,
}

/// Kind-specific body of an operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OperationPayload {
    AddBlock(AddBlock),
    RemoveBlock(RemoveBlock),
    UpdateBlock(UpdateBlock),
    InsertChar(InsertChar),
    DeleteChar(DeleteChar),
    AddMark(AddMark),
    RemoveMark(RemoveMark),
}

impl OperationPayload {
    pub fn kind(&self) -> OperationKind {
        match self {
            OperationPayload::AddBlock(_) => OperationKind::AddBlock,
            OperationPayload::RemoveBlock(_) => OperationKind::RemoveBlock,
            OperationPayload::UpdateBlock(_) => OperationKind::UpdateBlock,
            OperationPayload::InsertChar(_) => OperationKind::InsertChar,
            OperationPayload::DeleteChar(_) => OperationKind::DeleteChar,
            OperationPayload::AddMark(_) => OperationKind::AddMark,
            OperationPayload::RemoveMark(_) => OperationKind::RemoveMark,
        }
    }
}

// ============================================================================
// CrdtOperation
// ============================================================================

/// One CRDT operation produced by a local replica.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireOperation", into = "WireOperation")]
pub struct CrdtOperation {
    pub origin: ReplicaId,
    pub operation_id: OperationId,
    pub document_id: DocumentId,
    /// Target block. Always set for character and mark operations.
    pub block_id: Option<BlockIdentity>,
    pub payload: OperationPayload,
}

impl CrdtOperation {
    pub fn kind(&self) -> OperationKind {
        self.payload.kind()
    }

    pub fn as_add_block(&self) -> Option<&AddBlock> {
        match &self.payload {
            OperationPayload::AddBlock(add) => Some(add),
            _ => None,
        }
    }

    pub fn as_update_block(&self) -> Option<&UpdateBlock> {
        match &self.payload {
            OperationPayload::UpdateBlock(update) => Some(update),
            _ => None,
        }
    }

    pub fn is_add_block(&self) -> bool {
        matches!(self.payload, OperationPayload::AddBlock(_))
    }

    pub fn is_update_block(&self) -> bool {
        matches!(self.payload, OperationPayload::UpdateBlock(_))
    }

    /// Every block reference carried by this operation, target first.
    pub fn block_refs(&self) -> Vec<&BlockIdentity> {
        let mut refs: Vec<&BlockIdentity> = self.block_id.iter().collect();
        match &self.payload {
            OperationPayload::AddBlock(add) => {
                refs.extend(add.after_block.iter());
                refs.extend(add.parent_block.iter());
            }
            OperationPayload::UpdateBlock(update) => {
                refs.extend(update.after_block.iter());
                refs.extend(update.parent_block.iter());
            }
            OperationPayload::RemoveBlock(remove) => {
                refs.extend(remove.removed_block.iter());
            }
            OperationPayload::InsertChar(_)
            | OperationPayload::DeleteChar(_)
            | OperationPayload::AddMark(_)
            | OperationPayload::RemoveMark(_) => {}
        }
        refs
    }

    /// Visit every block reference slot mutably.
    pub fn for_each_block_ref_mut(&mut self, mut f: impl FnMut(&mut Option<BlockIdentity>)) {
        f(&mut self.block_id);
        match &mut self.payload {
            OperationPayload::AddBlock(add) => {
                f(&mut add.after_block);
                f(&mut add.parent_block);
            }
            OperationPayload::UpdateBlock(update) => {
                f(&mut update.after_block);
                f(&mut update.parent_block);
            }
            OperationPayload::RemoveBlock(remove) => f(&mut remove.removed_block),
            OperationPayload::InsertChar(_)
            | OperationPayload::DeleteChar(_)
            | OperationPayload::AddMark(_)
            | OperationPayload::RemoveMark(_) => {}
        }
    }
}

/// A compiled batch handed to the operation sink.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OperationsMessage {
    pub operations: Vec<CrdtOperation>,
}

impl OperationsMessage {
    pub fn new(operations: Vec<CrdtOperation>) -> Self {
        Self { operations }
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }
}

// ── Wire conversion ─────────────────────────────────────────────────────────

/// Envelope as serialized; the payload stays untyped until `Type` is known.
#[derive(Serialize, Deserialize)]
struct WireOperation {
    #[serde(rename = "Type")]
    kind: OperationKind,
    #[serde(rename = "Origin", default)]
    origin: ReplicaId,
    #[serde(rename = "OperationID")]
    operation_id: OperationId,
    #[serde(rename = "DocumentID")]
    document_id: DocumentId,
    #[serde(rename = "BlockID", default, with = "empty_as_none")]
    block_id: Option<BlockIdentity>,
    #[serde(rename = "Operation", default)]
    operation: serde_json::Value,
}

impl From<CrdtOperation> for WireOperation {
    fn from(op: CrdtOperation) -> Self {
        let kind = op.kind();
        let operation = match &op.payload {
            OperationPayload::AddBlock(p) => serde_json::to_value(p),
            OperationPayload::RemoveBlock(p) => serde_json::to_value(p),
            OperationPayload::UpdateBlock(p) => serde_json::to_value(p).map(|mut v| {
                if let Some(map) = v.as_object_mut() {
                    let updated = op
                        .block_id
                        .as_ref()
                        .map(ToString::to_string)
                        .unwrap_or_default();
                    map.insert("UpdatedBlock".into(), serde_json::Value::String(updated));
                }
                v
            }),
            OperationPayload::InsertChar(p) => serde_json::to_value(p),
            OperationPayload::DeleteChar(p) => serde_json::to_value(p),
            OperationPayload::AddMark(p) => serde_json::to_value(p),
            OperationPayload::RemoveMark(p) => serde_json::to_value(p),
        }
        // Payloads are plain structs of strings and numbers.
        .unwrap_or(serde_json::Value::Null);

        WireOperation {
            kind,
            origin: op.origin,
            operation_id: op.operation_id,
            document_id: op.document_id,
            block_id: op.block_id,
            operation,
        }
    }
}

impl TryFrom<WireOperation> for CrdtOperation {
    type Error = serde_json::Error;

    fn try_from(wire: WireOperation) -> Result<Self, Self::Error> {
        let body = wire.operation;
        let payload = match wire.kind {
            OperationKind::AddBlock => OperationPayload::AddBlock(serde_json::from_value(body)?),
            OperationKind::RemoveBlock => {
                OperationPayload::RemoveBlock(serde_json::from_value(body)?)
            }
            OperationKind::UpdateBlock => {
                OperationPayload::UpdateBlock(serde_json::from_value(body)?)
            }
            OperationKind::InsertChar => {
                OperationPayload::InsertChar(serde_json::from_value(body)?)
            }
            OperationKind::DeleteChar => {
                OperationPayload::DeleteChar(serde_json::from_value(body)?)
            }
            OperationKind::AddMark => OperationPayload::AddMark(serde_json::from_value(body)?),
            OperationKind::RemoveMark => {
                OperationPayload::RemoveMark(serde_json::from_value(body)?)
            }
        };
        Ok(CrdtOperation {
            origin: wire.origin,
            operation_id: wire.operation_id,
            document_id: wire.document_id,
            block_id: wire.block_id,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(payload: OperationPayload) -> CrdtOperation {
        CrdtOperation {
            origin: ReplicaId::placeholder(),
            operation_id: OperationId(104),
            document_id: DocumentId::from("doc-1"),
            block_id: Some(BlockIdentity::Local(1)),
            payload,
        }
    }

    #[test]
    fn test_insert_char_wire_shape() {
        let insert = op(OperationPayload::InsertChar(InsertChar {
            after_id: Some(CharId::from("7@temp")),
            character: "A".into(),
        }));
        let json = serde_json::to_value(&insert).unwrap();
        assert_eq!(json["Type"], "insert");
        assert_eq!(json["Origin"], "temp");
        assert_eq!(json["OperationID"], 104);
        assert_eq!(json["DocumentID"], "doc-1");
        assert_eq!(json["BlockID"], "1@temp");
        assert_eq!(json["Operation"]["AfterID"], "7@temp");
        assert_eq!(json["Operation"]["Character"], "A");
    }

    #[test]
    fn test_absent_ids_are_empty_strings() {
        let insert = op(OperationPayload::InsertChar(InsertChar {
            after_id: None,
            character: "x".into(),
        }));
        let json = serde_json::to_value(&insert).unwrap();
        assert_eq!(json["Operation"]["AfterID"], "");

        let back: CrdtOperation = serde_json::from_value(json).unwrap();
        assert_eq!(back, insert);
    }

    #[test]
    fn test_update_block_mirrors_target() {
        let update = op(OperationPayload::UpdateBlock(UpdateBlock {
            block_type: Some(BlockType::Heading),
            ..Default::default()
        }));
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["Type"], "updateBlock");
        assert_eq!(json["Operation"]["UpdatedBlock"], "1@temp");
        assert_eq!(json["Operation"]["BlockType"], "heading");

        let back: CrdtOperation = serde_json::from_value(json).unwrap();
        assert_eq!(back, update);
    }

    #[test]
    fn test_add_mark_anchor_shape() {
        let mark = op(OperationPayload::AddMark(AddMark {
            start: MarkAnchor::start(None),
            end: MarkAnchor::end(Some(CharId::from("8@temp"))),
            mark_type: MarkType::Link,
            options: MarkOptions::link("https://example.com"),
        }));
        let json = serde_json::to_value(&mark).unwrap();
        assert_eq!(json["Operation"]["Start"]["Type"], "before");
        assert_eq!(json["Operation"]["Start"]["OpID"], "");
        assert_eq!(json["Operation"]["End"]["Type"], "after");
        assert_eq!(json["Operation"]["End"]["OpID"], "8@temp");
        assert_eq!(json["Operation"]["MarkType"], "link");
        assert_eq!(json["Operation"]["Options"]["Href"], "https://example.com");
    }

    #[test]
    fn test_decode_store_message() {
        let raw = r#"{"Operations":[
            {"Type":"removeBlock","Origin":"node-a","OperationID":3,"DocumentID":"d",
             "BlockID":"2@temp","Operation":{"RemovedBlock":"2@temp"}},
            {"Type":"delete","Origin":"node-a","OperationID":4,"DocumentID":"d",
             "BlockID":"1@temp","Operation":{"RemovedID":null}}
        ]}"#;
        let msg: OperationsMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.len(), 2);
        assert_eq!(msg.operations[0].kind(), OperationKind::RemoveBlock);
        assert_eq!(
            msg.operations[0].block_refs(),
            vec![&BlockIdentity::Local(2), &BlockIdentity::Local(2)]
        );
        assert_eq!(
            msg.operations[1].payload,
            OperationPayload::DeleteChar(DeleteChar { removed_id: None })
        );
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let raw = r#"{"Type":"teleport","OperationID":1,"DocumentID":"d","Operation":{}}"#;
        assert!(serde_json::from_str::<CrdtOperation>(raw).is_err());
    }

    #[test]
    fn test_for_each_block_ref_mut_visits_all_slots() {
        let mut add = op(OperationPayload::AddBlock(AddBlock {
            after_block: Some(BlockIdentity::Local(5)),
            parent_block: None,
            block_type: BlockType::Paragraph,
            props: BlockProps::defaults(),
        }));
        let mut slots = 0;
        add.for_each_block_ref_mut(|slot| {
            slots += 1;
            if slot.is_some() {
                *slot = Some(BlockIdentity::Durable("x".into()));
            }
        });
        assert_eq!(slots, 3);
        assert_eq!(add.block_id, Some(BlockIdentity::Durable("x".into())));
        assert_eq!(
            add.as_add_block().unwrap().after_block,
            Some(BlockIdentity::Durable("x".into()))
        );
    }
}
