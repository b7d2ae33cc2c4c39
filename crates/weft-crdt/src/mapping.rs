//! One editor transaction in, one operation batch out.
//!
//! ```text
//!  steps[0..n]          before ──apply──▶ s1 ──apply──▶ s2 ... ▶ after
//!     │                    │               │
//!     ▼                    ▼               ▼
//!  classify(step_i, s_i, s_i+1) ─▶ build ─▶ raw ops ──▶ compact ──▶ fixup ──▶ verify
//!                                    │                                          │
//!                          op counter, char ids (working copies)      commit on success
//! ```
//!
//! A step that cannot be compiled is dropped and reported; the rest of the
//! transaction still compiles. A referential inconsistency after fixup fails
//! the whole batch and leaves the context untouched.

use tracing::{debug, error};

use weft_types::{CrdtOperation, DocumentId, OperationId, ReplicaId};

use crate::Result;
use crate::builder::OperationBuilder;
use crate::charmap::CharIdentityMap;
use crate::classify::classify;
use crate::compact::{ResolutionTable, compact, fix_placeholder_ids, verify_references};
use crate::config::CompilerConfig;
use crate::error::CompileError;
use crate::snapshot::DocumentSnapshot;
use crate::step::DeltaStep;

/// Session state threaded through every compiled transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionContext {
    pub document_id: DocumentId,
    pub origin: ReplicaId,
    /// Next operation id to allocate.
    pub next_op_id: OperationId,
    pub char_ids: CharIdentityMap,
}

/// A step left out of a batch, and why.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DroppedStep {
    pub index: usize,
    pub kind: &'static str,
    pub reason: CompileError,
}

/// Result of compiling one transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompiledBatch {
    /// Compacted operations with canonical block identities.
    pub operations: Vec<CrdtOperation>,
    /// Block identities renamed during fixup.
    pub resolutions: ResolutionTable,
    pub dropped: Vec<DroppedStep>,
}

impl CompiledBatch {
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

impl TransactionContext {
    pub fn new(
        document_id: DocumentId,
        origin: ReplicaId,
        next_op_id: OperationId,
        char_ids: CharIdentityMap,
    ) -> Self {
        Self {
            document_id,
            origin,
            next_op_id,
            char_ids,
        }
    }

    /// A context for `document_id` with settings from `config` and no
    /// known characters.
    pub fn with_config(document_id: DocumentId, config: &CompilerConfig) -> Self {
        Self::new(
            document_id,
            config.origin.clone(),
            config.initial_operation_id(),
            CharIdentityMap::new(),
        )
    }

    /// Compile `steps`, which turned `before` into `after`.
    ///
    /// Each step is classified against the snapshots immediately around it.
    /// When a step cannot be replayed onto the running snapshot, `after`
    /// stands in for its result and later steps continue from there.
    pub fn compile(
        &mut self,
        steps: &[DeltaStep],
        before: &DocumentSnapshot,
        after: &DocumentSnapshot,
        config: &CompilerConfig,
    ) -> Result<CompiledBatch> {
        let mut next_op_id = self.next_op_id;
        let mut char_ids = self.char_ids.clone();
        let mut raw = Vec::new();
        let mut dropped = Vec::new();

        let mut current = before.clone();
        for (index, step) in steps.iter().enumerate() {
            let stepped = match step.apply(&current) {
                Ok(doc) => doc,
                Err(err) => {
                    debug!(index, kind = step.kind_name(), %err, "step not replayable, using final document");
                    after.clone()
                }
            };

            let built = classify(step, &current, &stepped, config.tie_break).and_then(|c| {
                debug!(
                    index,
                    kind = step.kind_name(),
                    action = %c.action,
                    block = ?c.block,
                    "classified step"
                );
                OperationBuilder::new(
                    &self.document_id,
                    &self.origin,
                    &mut next_op_id,
                    &mut char_ids,
                    config.insert_text,
                )
                .build(step, &c, &current, &stepped)
            });

            match built {
                Ok(ops) => raw.extend(ops),
                Err(reason) => {
                    debug!(index, kind = step.kind_name(), %reason, "dropped step");
                    dropped.push(DroppedStep {
                        index,
                        kind: step.kind_name(),
                        reason,
                    });
                }
            }
            current = stepped;
        }

        let mut operations = compact(raw);
        let resolutions = fix_placeholder_ids(&mut operations);
        if let Err(err) = verify_references(&operations, &before.block_ids()) {
            error!(document = %self.document_id, %err, "batch rejected, nothing committed");
            return Err(err);
        }

        for (old, new) in resolutions.iter() {
            char_ids.rekey(old, new.clone());
        }
        for op in operations.iter().filter(|op| op.is_add_block()) {
            if let Some(id) = &op.block_id {
                char_ids.ensure_block(id);
            }
        }

        debug!(
            steps = steps.len(),
            operations = operations.len(),
            dropped = dropped.len(),
            next_op_id = %next_op_id,
            "compiled transaction"
        );
        self.next_op_id = next_op_id;
        self.char_ids = char_ids;
        Ok(CompiledBatch {
            operations,
            resolutions,
            dropped,
        })
    }
}
