//! Producing edited snapshots.
//!
//! Covers what keystroke-sized transactions need: replacing a range inside one
//! parent with closed content, toggling marks over a range, and relabeling
//! block identities after the compactor renamed placeholders. Open slices
//! (joins and splits across parents) are reported as unsupported; callers
//! that have the editor's own post-edit document should pass that instead.

use weft_types::BlockIdentity;

use crate::Result;
use crate::error::CompileError;
use crate::schema;
use crate::snapshot::{DocumentSnapshot, ElementNode, Fragment, Mark, Node, Slice, TextNode};

impl DocumentSnapshot {
    /// Replace `from..to` with `slice`. Both ends must share one parent and
    /// the slice must be closed.
    pub fn replace(&self, from: usize, to: usize, slice: &Slice) -> Result<DocumentSnapshot> {
        if slice.open_start != 0 || slice.open_end != 0 {
            return Err(CompileError::UnsupportedStep(
                "replace with an open slice".to_string(),
            ));
        }
        if from > to {
            return Err(CompileError::UnsupportedStep(format!(
                "inverted replace range {from}..{to}"
            )));
        }

        let rfrom = self.resolve(from)?;
        let rto = self.resolve(to)?;
        let depth = rfrom.depth();
        if rto.depth() != depth || rfrom.shared_depth(to) != depth {
            return Err(CompileError::UnsupportedStep(format!(
                "replace {from}..{to} crosses parents"
            )));
        }

        let parent = rfrom.parent();
        let start = rfrom.start(depth);
        let size = parent.content.size();
        let content = parent
            .content
            .cut(0, from - start)
            .append(&slice.content)
            .append(&parent.content.cut(to - start, size));

        if parent.is_textblock() && content.has_block() {
            return Err(CompileError::UnsupportedStep(
                "block content inside a textblock".to_string(),
            ));
        }
        if schema::is_container(&parent.name) && content.iter().any(Node::is_inline) {
            return Err(CompileError::UnsupportedStep(format!(
                "inline content inside {}",
                parent.name
            )));
        }

        let indices = rfrom.indices();
        let root = rebuild(self.root(), &indices[..depth], content).ok_or_else(|| {
            CompileError::UnsupportedStep(format!("replace {from}..{to} lost its path"))
        })?;
        Ok(DocumentSnapshot::new(root))
    }

    /// Add `mark` to every character in `from..to`, replacing any mark of the
    /// same type.
    pub fn add_mark(&self, from: usize, to: usize, mark: &Mark) -> Result<DocumentSnapshot> {
        self.map_marks(from, to, &|marks: &[Mark]| {
            let mut out: Vec<Mark> = marks.iter().filter(|m| m.name != mark.name).cloned().collect();
            out.push(mark.clone());
            out.sort_by(|a, b| a.name.cmp(&b.name));
            out
        })
    }

    /// Remove marks of `mark`'s type from every character in `from..to`.
    pub fn remove_mark(&self, from: usize, to: usize, mark: &Mark) -> Result<DocumentSnapshot> {
        self.map_marks(from, to, &|marks: &[Mark]| {
            marks.iter().filter(|m| m.name != mark.name).cloned().collect()
        })
    }

    fn map_marks(
        &self,
        from: usize,
        to: usize,
        f: &dyn Fn(&[Mark]) -> Vec<Mark>,
    ) -> Result<DocumentSnapshot> {
        let size = self.size();
        if to > size {
            return Err(CompileError::PositionOutOfBounds { pos: to, size });
        }
        Ok(DocumentSnapshot::new(map_element_marks(
            self.root(),
            0,
            from,
            to,
            f,
        )))
    }

    /// Copy with block ids rewritten through `rename`.
    pub fn relabel_blocks(
        &self,
        rename: &impl Fn(&BlockIdentity) -> Option<BlockIdentity>,
    ) -> DocumentSnapshot {
        DocumentSnapshot::new(relabel_element(self.root(), rename))
    }
}

fn rebuild(node: &ElementNode, path: &[usize], content: Fragment) -> Option<ElementNode> {
    match path.split_first() {
        None => Some(ElementNode {
            name: node.name.clone(),
            attrs: node.attrs.clone(),
            content,
        }),
        Some((&index, rest)) => {
            let child = node.content.child(index)?.as_element()?;
            let rebuilt = rebuild(child, rest, content)?;
            Some(ElementNode {
                name: node.name.clone(),
                attrs: node.attrs.clone(),
                content: node.content.replace_child(index, Node::Element(rebuilt)),
            })
        }
    }
}

fn map_element_marks(
    el: &ElementNode,
    start: usize,
    from: usize,
    to: usize,
    f: &dyn Fn(&[Mark]) -> Vec<Mark>,
) -> ElementNode {
    let mut nodes = Vec::with_capacity(el.content.child_count());
    let mut pos = start;
    for child in el.content.iter() {
        let end = pos + child.node_size();
        let overlaps = end > from && pos < to;
        match child {
            Node::Text(t) if overlaps => {
                let a = from.saturating_sub(pos);
                let b = (to - pos).min(t.len());
                nodes.push(Node::Text(t.cut(0, a)));
                nodes.push(Node::Text(TextNode {
                    text: t.cut(a, b).text,
                    marks: f(&t.marks),
                }));
                nodes.push(Node::Text(t.cut(b, t.len())));
            }
            Node::Element(inner) if overlaps && !inner.is_leaf() => {
                nodes.push(Node::Element(map_element_marks(inner, pos + 1, from, to, f)));
            }
            _ => nodes.push(child.clone()),
        }
        pos = end;
    }
    ElementNode {
        name: el.name.clone(),
        attrs: el.attrs.clone(),
        content: Fragment::from(nodes),
    }
}

fn relabel_element(
    el: &ElementNode,
    rename: &impl Fn(&BlockIdentity) -> Option<BlockIdentity>,
) -> ElementNode {
    let mut attrs = el.attrs.clone();
    if let Some(new_id) = el.block_id().and_then(|id| rename(&id)) {
        attrs.insert(
            schema::ID_ATTR.to_string(),
            serde_json::Value::String(new_id.to_string()),
        );
    }
    let nodes: Vec<Node> = el
        .content
        .iter()
        .map(|child| match child {
            Node::Element(inner) => Node::Element(relabel_element(inner, rename)),
            Node::Text(_) => child.clone(),
        })
        .collect();
    ElementNode {
        name: el.name.clone(),
        attrs,
        content: Fragment::from(nodes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::fixtures::*;

    #[test]
    fn test_insert_character() {
        let doc = hello_world();
        let after = doc.replace(9, 9, &Slice::closed(vec![Node::text("A")])).unwrap();
        assert_eq!(after.text_content(), "Hello!AWorld!");
        assert_eq!(after.size(), 23);
        assert_eq!(after.block_text_len(&BlockIdentity::Local(1)), Some(7));
    }

    #[test]
    fn test_delete_range() {
        let doc = hello_world();
        let after = doc.replace(3, 5, &Slice::default()).unwrap();
        assert_eq!(after.text_content(), "llo!World!");
    }

    #[test]
    fn test_insert_and_remove_block() {
        let doc = hello_world();
        let added = doc
            .replace(21, 21, &Slice::closed(vec![container("new-1", paragraph("Hi"))]))
            .unwrap();
        assert_eq!(added.block_ids().len(), 3);
        assert_eq!(added.text_content(), "Hello!World!Hi");

        let removed = doc.replace(11, 21, &Slice::default()).unwrap();
        assert_eq!(removed.block_ids().len(), 1);
        assert_eq!(removed.size(), 12);
    }

    #[test]
    fn test_replace_rejects_cross_parent() {
        let doc = hello_world();
        let err = doc.replace(5, 15, &Slice::default()).unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedStep(_)));
    }

    #[test]
    fn test_replace_rejects_block_in_textblock() {
        let doc = hello_world();
        let err = doc
            .replace(5, 5, &Slice::closed(vec![paragraph("x")]))
            .unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedStep(_)));
    }

    #[test]
    fn test_add_and_remove_mark() {
        let doc = hello_world();
        let bold = Mark::new("bold");
        let marked = doc.add_mark(4, 7, &bold).unwrap();
        let paragraph = marked
            .find_block(&BlockIdentity::Local(1))
            .and_then(ElementNode::inline_container)
            .unwrap();
        assert_eq!(paragraph.content.child_count(), 3);
        match paragraph.content.child(1) {
            Some(Node::Text(t)) => {
                assert_eq!(t.text, "ell");
                assert_eq!(t.marks, vec![bold.clone()]);
            }
            other => panic!("expected text, got {other:?}"),
        }

        let cleared = marked.remove_mark(4, 7, &bold).unwrap();
        assert_eq!(cleared, doc);
    }

    #[test]
    fn test_relabel_blocks() {
        let doc = hello_world();
        let relabeled = doc.relabel_blocks(&|id: &BlockIdentity| {
            (id == &BlockIdentity::Local(8)).then(|| BlockIdentity::Local(40))
        });
        let ids: Vec<_> = relabeled.block_ids().into_iter().collect();
        assert_eq!(ids, vec![BlockIdentity::Local(1), BlockIdentity::Local(40)]);
    }
}
