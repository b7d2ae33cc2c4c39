//! Error types for delta compilation.

use thiserror::Error;

use weft_types::BlockIdentity;

/// Errors that can occur while compiling editor steps into operations.
///
/// Everything except [`CompileError::ReferentialInconsistency`] is scoped to a
/// single step: the step is dropped and the rest of the transaction compiles.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// No identity-bearing block encloses the step's position.
    #[error("no enclosing block at position {pos}")]
    UnresolvedContext { pos: usize },

    /// Step shape has no entry in the classification table.
    #[error("unsupported step: {0}")]
    UnsupportedStep(String),

    /// A mark range starts and ends in different blocks.
    #[error("mark range {from}..{to} spans more than one block")]
    CrossBlockMark { from: usize, to: usize },

    /// A recognised shape the compiler is configured not to handle.
    #[error("unimplemented case: {0}")]
    UnimplementedCase(&'static str),

    /// Position outside the document.
    #[error("position {pos} out of bounds for document of size {size}")]
    PositionOutOfBounds { pos: usize, size: usize },

    /// After placeholder fixup an operation still references a local block
    /// that neither the batch nor the prior snapshot knows about.
    #[error("operation {operation} references unknown local block {block}")]
    ReferentialInconsistency {
        operation: u64,
        block: BlockIdentity,
    },
}

impl CompileError {
    /// Whether this error aborts the whole batch rather than one step.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CompileError::ReferentialInconsistency { .. })
    }
}

/// Errors loading compiler configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] ron::error::SpannedError),
}
