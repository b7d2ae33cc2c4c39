//! Seams to the authoritative store.
//!
//! The session never talks to the store directly: it asks a
//! [`DocumentCompiler`] for the materialized document and hands compiled
//! batches to an [`OperationSink`]. Transport, retries and timeouts belong to
//! the implementations.

use thiserror::Error;

use weft_types::{CompiledBlock, DocumentId, OperationsMessage};

/// Failure reported by a collaborator. Passed upward unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("document {0} not found")]
    NotFound(DocumentId),

    #[error("store rejected batch: {0}")]
    Rejected(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Produces the current materialized document.
pub trait DocumentCompiler {
    fn compile_document(&self, id: &DocumentId) -> Result<Vec<CompiledBlock>, CollaboratorError>;
}

/// Accepts one compiled batch.
pub trait OperationSink {
    fn save_operations(&self, message: &OperationsMessage) -> Result<(), CollaboratorError>;
}

impl<F> DocumentCompiler for F
where
    F: Fn(&DocumentId) -> Result<Vec<CompiledBlock>, CollaboratorError>,
{
    fn compile_document(&self, id: &DocumentId) -> Result<Vec<CompiledBlock>, CollaboratorError> {
        self(id)
    }
}
