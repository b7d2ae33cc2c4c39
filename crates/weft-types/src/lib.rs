//! Shared vocabulary for weft: identifiers, block and mark types, the CRDT
//! operation records sent to the authoritative store, and the materialized
//! documents it sends back.
//!
//! # Identity
//!
//! | Type | Wire form | Minted by |
//! |------|-----------|-----------|
//! | [`OperationId`] | number | local session counter |
//! | [`BlockIdentity`] | `"<n>@temp"` or store string | session (Local) / store (Durable) |
//! | [`CharId`] | string | session placeholder or store |
//! | [`DocumentId`] | string | store |
//! | [`ReplicaId`] | string | deployment |

pub mod block;
pub mod document;
pub mod ids;
pub mod ops;

pub use block::{BlockProps, BlockType, DEFAULT_LEVEL, MarkOptions, MarkType, TextAlignment};
pub use document::{CompiledBlock, CompiledProps, InlineContent, StyledText, max_local_sequence};
pub use ids::{BlockIdentity, CharId, DocumentId, LOCAL_SUFFIX, OperationId, ReplicaId};
pub use ops::{
    AddBlock, AddMark, AnchorSide, CrdtOperation, DeleteChar, InsertChar, MarkAnchor,
    OperationKind, OperationPayload, OperationsMessage, RemoveBlock, RemoveMark, UpdateBlock,
};
