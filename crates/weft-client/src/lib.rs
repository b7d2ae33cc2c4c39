//! Editing session around the weft delta compiler.
//!
//! [`EditSession`] owns what the compiler needs between transactions: the
//! loaded document, the character identity map, the operation counter and
//! the history of operations not yet sent. The store is reached only through
//! the [`DocumentCompiler`] and [`OperationSink`] traits.

pub mod collaborator;
pub mod fallback;
pub mod session;

pub use collaborator::{CollaboratorError, DocumentCompiler, OperationSink};
pub use fallback::{empty_document, empty_document_history, fallback_document};
pub use session::{DocumentSource, EditSession, SessionError, SharedSession, shared_session};
