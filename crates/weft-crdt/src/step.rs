//! Atomic editor steps, independent of any editor library.
//!
//! Serialized in the editor's step JSON:
//!
//! ```text
//! {"stepType":"replace","from":9,"to":9,"slice":{"content":[{"type":"text","text":"A"}]}}
//! {"stepType":"addMark","from":3,"to":10,"mark":{"type":"bold"}}
//! {"stepType":"replaceAround","from":1,"to":11,"gapFrom":2,"gapTo":10,"insert":1,"slice":{...}}
//! ```

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::error::CompileError;
use crate::snapshot::{DocumentSnapshot, Fragment, Mark, Slice};

/// One atomic edit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stepType")]
pub enum DeltaStep {
    /// Formatting added over `from..to`.
    #[serde(rename = "addMark")]
    MarkAdd { from: usize, to: usize, mark: Mark },

    /// Formatting removed over `from..to`.
    #[serde(rename = "removeMark")]
    MarkRemove { from: usize, to: usize, mark: Mark },

    /// `from..to` replaced by `slice`.
    #[serde(rename = "replace")]
    RangeReplace {
        from: usize,
        to: usize,
        #[serde(default)]
        slice: Slice,
    },

    /// Content around an insertion point rewrapped (`gap_from..gap_to` is kept
    /// and moved into `slice` at `insert`), e.g. list nesting changes.
    #[serde(rename = "replaceAround", rename_all = "camelCase")]
    StructuralReplace {
        from: usize,
        to: usize,
        gap_from: usize,
        gap_to: usize,
        #[serde(default)]
        insert: usize,
        #[serde(default)]
        slice: Slice,
        #[serde(default)]
        structure: bool,
    },
}

impl DeltaStep {
    pub fn from(&self) -> usize {
        match self {
            DeltaStep::MarkAdd { from, .. }
            | DeltaStep::MarkRemove { from, .. }
            | DeltaStep::RangeReplace { from, .. }
            | DeltaStep::StructuralReplace { from, .. } => *from,
        }
    }

    pub fn to(&self) -> usize {
        match self {
            DeltaStep::MarkAdd { to, .. }
            | DeltaStep::MarkRemove { to, .. }
            | DeltaStep::RangeReplace { to, .. }
            | DeltaStep::StructuralReplace { to, .. } => *to,
        }
    }

    /// Content the step inserts; empty for mark steps.
    pub fn inserted(&self) -> Option<&Fragment> {
        match self {
            DeltaStep::RangeReplace { slice, .. } | DeltaStep::StructuralReplace { slice, .. } => {
                Some(&slice.content)
            }
            DeltaStep::MarkAdd { .. } | DeltaStep::MarkRemove { .. } => None,
        }
    }

    pub fn mark(&self) -> Option<&Mark> {
        match self {
            DeltaStep::MarkAdd { mark, .. } | DeltaStep::MarkRemove { mark, .. } => Some(mark),
            DeltaStep::RangeReplace { .. } | DeltaStep::StructuralReplace { .. } => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            DeltaStep::MarkAdd { .. } => "addMark",
            DeltaStep::MarkRemove { .. } => "removeMark",
            DeltaStep::RangeReplace { .. } => "replace",
            DeltaStep::StructuralReplace { .. } => "replaceAround",
        }
    }

    /// The document this step produces from `doc`.
    pub fn apply(&self, doc: &DocumentSnapshot) -> Result<DocumentSnapshot> {
        match self {
            DeltaStep::MarkAdd { from, to, mark } => doc.add_mark(*from, *to, mark),
            DeltaStep::MarkRemove { from, to, mark } => doc.remove_mark(*from, *to, mark),
            DeltaStep::RangeReplace { from, to, slice } => doc.replace(*from, *to, slice),
            DeltaStep::StructuralReplace { .. } => Err(CompileError::UnsupportedStep(
                "applying a structural replace".to_string(),
            )),
        }
    }
}

/// Apply `steps` in order.
pub fn apply_all(doc: &DocumentSnapshot, steps: &[DeltaStep]) -> Result<DocumentSnapshot> {
    let mut current = doc.clone();
    for step in steps {
        current = step.apply(&current)?;
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::fixtures::*;
    use crate::snapshot::Node;

    #[test]
    fn test_decode_editor_steps() {
        let raw = r#"[
            {"stepType":"replace","from":9,"to":9,"slice":{"content":[{"type":"text","text":"A"}]}},
            {"stepType":"replace","from":3,"to":4},
            {"stepType":"addMark","from":3,"to":10,"mark":{"type":"bold"}},
            {"stepType":"replaceAround","from":1,"to":11,"gapFrom":2,"gapTo":10,"insert":1,
             "slice":{"content":[{"type":"blockContainer","attrs":{"id":"x"}}],"openStart":0,"openEnd":0},
             "structure":true}
        ]"#;
        let steps: Vec<DeltaStep> = serde_json::from_str(raw).unwrap();
        assert_eq!(steps.len(), 4);
        assert_eq!(steps[0].inserted().map(Fragment::text_content).as_deref(), Some("A"));
        assert_eq!(steps[1].inserted().map(Fragment::child_count), Some(0));
        assert_eq!(steps[2].mark().map(|m| m.name.as_str()), Some("bold"));
        match &steps[3] {
            DeltaStep::StructuralReplace { gap_from, gap_to, insert, structure, .. } => {
                assert_eq!((*gap_from, *gap_to, *insert, *structure), (2, 10, 1, true));
            }
            other => panic!("unexpected step {other:?}"),
        }
    }

    #[test]
    fn test_apply_all() {
        let doc = hello_world();
        let steps = vec![
            DeltaStep::RangeReplace {
                from: 9,
                to: 9,
                slice: Slice::closed(vec![Node::text("?")]),
            },
            DeltaStep::MarkAdd {
                from: 3,
                to: 5,
                mark: Mark::new("italic"),
            },
        ];
        let after = apply_all(&doc, &steps).unwrap();
        assert_eq!(after.text_content(), "Hello!?World!");
    }

    #[test]
    fn test_structural_replace_is_not_applied() {
        let step = DeltaStep::StructuralReplace {
            from: 1,
            to: 11,
            gap_from: 2,
            gap_to: 10,
            insert: 1,
            slice: Slice::default(),
            structure: true,
        };
        assert!(step.apply(&hello_world()).is_err());
    }
}
