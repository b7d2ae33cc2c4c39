//! Typed identifiers for operations, blocks, characters, documents and replicas.
//!
//! Local sessions mint identifiers from a monotonic operation counter. A block or
//! character created locally is addressed as `<OperationID>@temp` until the
//! authoritative store hands back its own identifiers. On the wire every id is a
//! string; in memory the block case is the explicit sum type [`BlockIdentity`]
//! so the placeholder fixup pass never has to parse suffixes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Suffix marking an identifier minted by a local session.
pub const LOCAL_SUFFIX: &str = "@temp";

/// Parse `<digits>@temp` into its sequence number.
fn parse_local(s: &str) -> Option<u64> {
    let digits = s.strip_suffix(LOCAL_SUFFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

// ============================================================================
// OperationId
// ============================================================================

/// Session-local, monotonically increasing operation number.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(pub u64);

impl OperationId {
    pub const fn new(n: u64) -> Self {
        Self(n)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    /// The id that follows this one.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Return the current id and advance the counter past it.
    pub fn bump(&mut self) -> Self {
        let current = *self;
        self.0 += 1;
        current
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self(1)
    }
}

// ============================================================================
// BlockIdentity
// ============================================================================

/// Identity of a block: a local placeholder or a store-assigned identifier.
///
/// `Local(n)` displays as `n@temp` and is only meaningful inside the session
/// that minted it. Everything else is `Durable` and passed through untouched.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum BlockIdentity {
    Local(u64),
    Durable(String),
}

impl BlockIdentity {
    /// The canonical placeholder for a block created by operation `op`.
    pub fn local(op: OperationId) -> Self {
        Self::Local(op.0)
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }

    /// Sequence number of a local placeholder.
    pub fn local_sequence(&self) -> Option<u64> {
        match self {
            Self::Local(n) => Some(*n),
            Self::Durable(_) => None,
        }
    }
}

impl fmt::Display for BlockIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(n) => write!(f, "{n}{LOCAL_SUFFIX}"),
            Self::Durable(s) => f.write_str(s),
        }
    }
}

impl FromStr for BlockIdentity {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl From<&str> for BlockIdentity {
    fn from(s: &str) -> Self {
        match parse_local(s) {
            Some(n) => Self::Local(n),
            None => Self::Durable(s.to_string()),
        }
    }
}

impl Serialize for BlockIdentity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BlockIdentity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s.as_str()))
    }
}

// ============================================================================
// CharId
// ============================================================================

/// Stable identity of one character in one block.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CharId(String);

impl CharId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Placeholder for a character inserted by operation `op`.
    pub fn placeholder(op: OperationId) -> Self {
        Self(format!("{}{LOCAL_SUFFIX}", op.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Sequence number when this id has the `<n>@temp` shape.
    pub fn local_sequence(&self) -> Option<u64> {
        parse_local(&self.0)
    }
}

impl fmt::Display for CharId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CharId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<&str> for CharId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ── String ids ──────────────────────────────────────────────────────────────

/// A document identifier assigned by the store.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

/// Identifier of the replica that originated an operation.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplicaId(String);

macro_rules! impl_string_id {
    ($T:ident, $name:literal) => {
        impl $T {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($name, "({})"), self.0)
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $T {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $T {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

impl_string_id!(DocumentId, "DocumentId");
impl_string_id!(ReplicaId, "ReplicaId");

impl ReplicaId {
    /// Origin used by sessions that have not been assigned a replica address.
    pub fn placeholder() -> Self {
        Self("temp".to_string())
    }
}

impl Default for ReplicaId {
    fn default() -> Self {
        Self::placeholder()
    }
}

// ── Wire helpers ────────────────────────────────────────────────────────────

/// Serde adapter for optional string ids: the store writes `""` for none.
/// `null` is accepted on input as well.
pub mod empty_as_none {
    use std::str::FromStr;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<T, S>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        match value {
            Some(v) => v.serialize(serializer),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        T: FromStr,
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw
            .filter(|s| !s.is_empty())
            .and_then(|s| T::from_str(&s).ok()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_identity_parse() {
        assert_eq!(BlockIdentity::from("12@temp"), BlockIdentity::Local(12));
        assert_eq!(
            BlockIdentity::from("8860708c-50a6-4d1f"),
            BlockIdentity::Durable("8860708c-50a6-4d1f".into())
        );
        // Not a number before the suffix: durable.
        assert_eq!(
            BlockIdentity::from("x@temp"),
            BlockIdentity::Durable("x@temp".into())
        );
        assert_eq!(BlockIdentity::from("@temp"), BlockIdentity::Durable("@temp".into()));
    }

    #[test]
    fn test_block_identity_display_roundtrip() {
        for raw in ["1@temp", "42@temp", "3@node-a", "abc"] {
            let id = BlockIdentity::from(raw);
            assert_eq!(id.to_string(), raw);
        }
    }

    #[test]
    fn test_block_identity_serde_as_string() {
        let json = serde_json::to_string(&BlockIdentity::Local(7)).unwrap();
        assert_eq!(json, "\"7@temp\"");
        let back: BlockIdentity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, BlockIdentity::Local(7));
    }

    #[test]
    fn test_char_id_placeholder() {
        let id = CharId::placeholder(OperationId(9));
        assert_eq!(id.as_str(), "9@temp");
        assert_eq!(id.local_sequence(), Some(9));
        assert_eq!(CharId::from("5@node").local_sequence(), None);
    }

    #[test]
    fn test_operation_id_bump() {
        let mut next = OperationId(100);
        assert_eq!(next.bump(), OperationId(100));
        assert_eq!(next.bump(), OperationId(101));
        assert_eq!(next, OperationId(102));
    }

    #[test]
    fn test_string_id_debug() {
        assert_eq!(format!("{:?}", DocumentId::from("doc-1")), "DocumentId(doc-1)");
        assert_eq!(ReplicaId::placeholder().as_str(), "temp");
    }
}
