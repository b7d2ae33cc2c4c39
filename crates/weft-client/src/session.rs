//! One editor's session against one document.
//!
//! ```text
//!            load()                  apply_transaction() × n              send()
//!  store ──────────────▶ blocks ───────────────────────────▶ pending ──────────────▶ sink
//!    ▲                   char ids         (compiled,          history                │
//!    │                   counter           compacted)                                │
//!    └──────────────────────────────── reload on success ◀───────────────────────────┘
//! ```
//!
//! New blocks are renamed to `<OperationID>@temp` when compiled, while the
//! editor keeps showing them under the id it minted. The session remembers
//! those renames and applies them to every snapshot the editor hands in until
//! the next reload replaces the document.

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

use weft_crdt::{
    CharIdentityMap, CompileError, CompiledBatch, CompilerConfig, DeltaStep, DocumentSnapshot,
    ResolutionTable, TransactionContext, absorb_update, fix_placeholder_ids, trailing_add,
};
use weft_types::{
    BlockIdentity, CompiledBlock, CrdtOperation, DocumentId, OperationId, OperationsMessage,
    max_local_sequence,
};

use crate::collaborator::{CollaboratorError, DocumentCompiler, OperationSink};
use crate::fallback::{
    SEEDED_NEXT_OPERATION_ID, empty_document, empty_document_history, fallback_document,
};

/// Errors surfaced by an [`EditSession`].
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    /// The batch reached the store but the document could not be reloaded.
    #[error("sent {sent} operations, reload failed: {source}")]
    ReloadAfterSend {
        sent: usize,
        source: CollaboratorError,
    },
}

/// Where the session's current document came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocumentSource {
    /// Materialized by the store.
    Store,
    /// The store's document was empty; seeded locally with pending history.
    Seeded,
    /// The store failed; showing the fixed fallback document.
    Fallback,
}

/// Session state for one document. Not thread-safe; share it through
/// [`SharedSession`].
#[derive(Debug)]
pub struct EditSession {
    config: CompilerConfig,
    context: TransactionContext,
    blocks: Vec<CompiledBlock>,
    source: Option<DocumentSource>,
    pending: Vec<CrdtOperation>,
    aliases: ResolutionTable,
}

/// The single critical section around "process one transaction".
pub type SharedSession = Arc<Mutex<EditSession>>;

pub fn shared_session(session: EditSession) -> SharedSession {
    Arc::new(Mutex::new(session))
}

impl EditSession {
    pub fn new(document_id: DocumentId, config: CompilerConfig) -> Self {
        let context = TransactionContext::with_config(document_id, &config);
        Self {
            config,
            context,
            blocks: Vec::new(),
            source: None,
            pending: Vec::new(),
            aliases: ResolutionTable::new(),
        }
    }

    pub fn document_id(&self) -> &DocumentId {
        &self.context.document_id
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// The document as last loaded, seeded or substituted.
    pub fn blocks(&self) -> &[CompiledBlock] {
        &self.blocks
    }

    /// The editor's view of [`EditSession::blocks`].
    pub fn snapshot(&self) -> DocumentSnapshot {
        DocumentSnapshot::from_compiled(&self.blocks)
    }

    pub fn source(&self) -> Option<DocumentSource> {
        self.source
    }

    pub fn pending(&self) -> &[CrdtOperation] {
        &self.pending
    }

    pub fn next_op_id(&self) -> OperationId {
        self.context.next_op_id
    }

    pub fn char_ids(&self) -> &CharIdentityMap {
        &self.context.char_ids
    }

    /// Editor block ids renamed since the last load.
    pub fn aliases(&self) -> &ResolutionTable {
        &self.aliases
    }

    // ── Loading ─────────────────────────────────────────────────────────────

    /// Load the document from the store.
    ///
    /// On failure nothing changes; the caller decides whether to retry or
    /// [`install_fallback`](Self::install_fallback).
    pub fn load(&mut self, compiler: &impl DocumentCompiler) -> Result<DocumentSource, SessionError> {
        self.load_with_baseline(compiler, self.config.initial_operation_id())
    }

    /// Show the fixed fallback document.
    pub fn install_fallback(&mut self) {
        warn!(document = %self.context.document_id, "installing fallback document");
        let baseline = self.config.initial_operation_id();
        self.replace_document(fallback_document(), baseline, DocumentSource::Fallback);
    }

    fn load_with_baseline(
        &mut self,
        compiler: &impl DocumentCompiler,
        baseline: OperationId,
    ) -> Result<DocumentSource, SessionError> {
        let blocks = compiler
            .compile_document(&self.context.document_id)
            .inspect_err(|err| {
                warn!(document = %self.context.document_id, %err, "failed to compile document");
            })?;

        if blocks.is_empty() {
            info!(document = %self.context.document_id, "document is empty, seeding two paragraphs");
            self.pending = empty_document_history(&self.context.document_id, &self.context.origin);
            self.replace_document(empty_document(), baseline, DocumentSource::Seeded);
            self.context.next_op_id = SEEDED_NEXT_OPERATION_ID;
            return Ok(DocumentSource::Seeded);
        }

        self.replace_document(blocks, baseline, DocumentSource::Store);
        info!(
            document = %self.context.document_id,
            blocks = self.blocks.len(),
            next_op_id = %self.context.next_op_id,
            "loaded document"
        );
        Ok(DocumentSource::Store)
    }

    fn replace_document(&mut self, blocks: Vec<CompiledBlock>, baseline: OperationId, source: DocumentSource) {
        let after_highest = max_local_sequence(&blocks).map_or(0, |n| n + 1);
        self.context.char_ids = CharIdentityMap::from_compiled(&blocks);
        self.context.next_op_id = OperationId(baseline.get().max(after_highest));
        self.blocks = blocks;
        self.source = Some(source);
        self.aliases = ResolutionTable::new();
    }

    // ── Editing ─────────────────────────────────────────────────────────────

    /// Compile one editor transaction and queue its operations.
    ///
    /// A queued AddBlock, followed by nothing but its own characters, absorbs
    /// a leading UpdateBlock of the same block, so a block created in one
    /// transaction and restyled in the next is still sent as a single AddBlock.
    pub fn apply_transaction(
        &mut self,
        steps: &[DeltaStep],
        before: &DocumentSnapshot,
        after: &DocumentSnapshot,
    ) -> Result<CompiledBatch, SessionError> {
        let (before, after) = if self.aliases.is_empty() {
            (before.clone(), after.clone())
        } else {
            let rename = |id: &BlockIdentity| self.aliases.get(id).cloned();
            (before.relabel_blocks(&rename), after.relabel_blocks(&rename))
        };

        let batch = self.context.compile(steps, &before, &after, &self.config)?;
        self.aliases.chain(&batch.resolutions);

        let mut incoming = batch.operations.iter();
        if let (Some(index), Some(first)) = (trailing_add(&self.pending), batch.operations.first()) {
            let queued = &self.pending[index];
            let same_block = first.block_id.is_some() && first.block_id == queued.block_id;
            if let Some(merged) = absorb_update(queued, first).filter(|_| same_block) {
                debug!(operation = %first.operation_id, into = %queued.operation_id, "update absorbed by queued add");
                self.pending[index] = merged;
                incoming.next();
            }
        }
        self.pending.extend(incoming.cloned());

        debug!(
            operations = batch.operations.len(),
            dropped = batch.dropped.len(),
            pending = self.pending.len(),
            "applied transaction"
        );
        Ok(batch)
    }

    // ── Sending ─────────────────────────────────────────────────────────────

    /// Send the pending history and reload.
    ///
    /// Returns the number of operations sent. When the sink fails, the
    /// pending history and counter are left as they were. With nothing
    /// pending this only reloads.
    pub fn send(
        &mut self,
        sink: &impl OperationSink,
        compiler: &impl DocumentCompiler,
    ) -> Result<usize, SessionError> {
        let baseline = self.config.post_send_operation_id();
        if self.pending.is_empty() {
            self.load_with_baseline(compiler, baseline)?;
            return Ok(0);
        }

        let mut operations = self.pending.clone();
        fix_placeholder_ids(&mut operations);
        let message = OperationsMessage::new(operations);
        let sent = message.len();

        sink.save_operations(&message).inspect_err(|err| {
            warn!(document = %self.context.document_id, pending = sent, %err, "failed to send operations");
        })?;
        info!(document = %self.context.document_id, sent, "sent operations");

        self.pending.clear();
        self.aliases = ResolutionTable::new();
        self.context.next_op_id = baseline;
        match self.load_with_baseline(compiler, baseline) {
            Ok(_) => Ok(sent),
            Err(SessionError::Collaborator(source)) => Err(SessionError::ReloadAfterSend { sent, source }),
            Err(err) => Err(err),
        }
    }
}
