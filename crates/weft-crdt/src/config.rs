//! Compiler configuration, loaded from RON.
//!
//! ```ron
//! (
//!     origin: "temp",
//!     initial_operation_id: 100,
//!     post_send_operation_id: 1,
//!     insert_text: Decompose,
//!     tie_break: Observed,
//! )
//! ```
//!
//! Every field is optional.

use std::path::Path;

use serde::{Deserialize, Serialize};
use strum::EnumString;

use weft_types::{OperationId, ReplicaId};

use crate::error::ConfigError;
use crate::locator::TieBreakPolicy;

/// First operation id of a session that has not loaded a document yet.
pub const DEFAULT_INITIAL_OPERATION_ID: u64 = 100;

/// Counter baseline after a successful send and reload.
pub const DEFAULT_POST_SEND_OPERATION_ID: u64 = 1;

/// How a multi-character text insertion is emitted.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum InsertTextPolicy {
    /// One InsertChar per character, each anchored after the previous one.
    #[default]
    Decompose,
    /// Drop the step as an unimplemented case.
    Reject,
}

/// Knobs for the delta compiler and the session around it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Replica id stamped on every operation.
    pub origin: ReplicaId,
    pub initial_operation_id: u64,
    pub post_send_operation_id: u64,
    pub insert_text: InsertTextPolicy,
    pub tie_break: TieBreakPolicy,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            origin: ReplicaId::placeholder(),
            initial_operation_id: DEFAULT_INITIAL_OPERATION_ID,
            post_send_operation_id: DEFAULT_POST_SEND_OPERATION_ID,
            insert_text: InsertTextPolicy::default(),
            tie_break: TieBreakPolicy::default(),
        }
    }
}

impl CompilerConfig {
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let bytes = std::fs::read(path)?;
        Ok(ron::de::from_bytes(&bytes)?)
    }

    pub fn initial_operation_id(&self) -> OperationId {
        OperationId(self.initial_operation_id)
    }

    pub fn post_send_operation_id(&self) -> OperationId {
        OperationId(self.post_send_operation_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::str::FromStr;

    #[test]
    fn test_defaults() {
        let config = CompilerConfig::default();
        assert_eq!(config.origin.as_str(), "temp");
        assert_eq!(config.initial_operation_id(), OperationId(100));
        assert_eq!(config.post_send_operation_id(), OperationId(1));
        assert_eq!(config.insert_text, InsertTextPolicy::Decompose);
        assert_eq!(config.tie_break, TieBreakPolicy::Observed);
    }

    #[test]
    fn test_partial_ron() {
        let config = CompilerConfig::from_ron_str("(insert_text: Reject, origin: \"peer-7\")").unwrap();
        assert_eq!(config.insert_text, InsertTextPolicy::Reject);
        assert_eq!(config.origin.as_str(), "peer-7");
        assert_eq!(config.initial_operation_id, DEFAULT_INITIAL_OPERATION_ID);
        assert_eq!(CompilerConfig::from_ron_str("()").unwrap(), CompilerConfig::default());
    }

    #[test]
    fn test_bad_ron() {
        let err = CompilerConfig::from_ron_str("(tie_break: Sideways)").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "(tie_break: LastRemoved, post_send_operation_id: 5)").unwrap();
        let config = CompilerConfig::load(file.path()).unwrap();
        assert_eq!(config.tie_break, TieBreakPolicy::LastRemoved);
        assert_eq!(config.post_send_operation_id(), OperationId(5));

        let missing = CompilerConfig::load(file.path().with_extension("missing"));
        assert!(matches!(missing, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_policy_names() {
        assert_eq!(InsertTextPolicy::from_str("reject").unwrap(), InsertTextPolicy::Reject);
        assert_eq!(TieBreakPolicy::from_str("firstremoved").unwrap(), TieBreakPolicy::FirstRemoved);
    }
}
