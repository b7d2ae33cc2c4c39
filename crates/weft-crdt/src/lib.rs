//! Delta-to-operation compiler for block editor documents.
//!
//! The editor reports each local transaction as a list of position-based
//! steps over its node tree. The store speaks a Peritext/RGA-style CRDT where
//! every block and every character has a stable identity. This crate turns
//! the former into the latter.
//!
//! ```text
//!   DeltaStep ──▶ classify ──▶ OperationBuilder ──▶ compact ──▶ fixup ──▶ batch
//!                    │               │
//!               BlockLocator   CharIdentityMap (offset ↔ CharId, kept in lockstep)
//!                                    │
//!                               resolve_mark_span (marks as CharId anchors)
//! ```
//!
//! # State
//!
//! All mutable state (operation counter, character identities, document id)
//! lives in a [`TransactionContext`]. Compiling a transaction works on copies
//! and commits only when the whole batch is consistent, so one context must
//! process one transaction at a time.
//!
//! # Failure
//!
//! Steps that cannot be compiled are dropped and reported in
//! [`CompiledBatch::dropped`]. Only [`CompileError::ReferentialInconsistency`]
//! fails a batch.

mod builder;
mod charmap;
mod classify;
mod compact;
mod config;
mod error;
mod locator;
mod mapping;
mod marks;
mod materialize;
pub mod schema;
mod snapshot;
mod step;
mod transform;

pub use builder::{OperationBuilder, block_shape};
pub use charmap::CharIdentityMap;
pub use classify::{Classification, StepAction, classify};
pub use compact::{
    ResolutionTable, absorb_update, compact, fix_placeholder_ids, merge_add_update,
    merge_remove_add, merge_updates, trailing_add, verify_references,
};
pub use config::{
    CompilerConfig, DEFAULT_INITIAL_OPERATION_ID, DEFAULT_POST_SEND_OPERATION_ID,
    InsertTextPolicy,
};
pub use error::{CompileError, ConfigError};
pub use locator::{
    BlockLocator, EnclosingBlock, TieBreakPolicy, inserted_block_id, inserted_block_node,
    removed_block_id,
};
pub use mapping::{CompiledBatch, DroppedStep, TransactionContext};
pub use marks::{MarkSpan, mark_options, resolve_mark_span};
pub use materialize::{COLOR_ATTR, HREF_ATTR};
pub use snapshot::{Attrs, DocumentSnapshot, ElementNode, Fragment, Mark, Node, ResolvedPos, Slice, TextNode};
pub use step::{DeltaStep, apply_all};

/// Result type for compilation.
pub type Result<T> = std::result::Result<T, CompileError>;
