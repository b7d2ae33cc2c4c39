//! Fixed documents used when the store has nothing to offer.

use weft_types::{
    AddBlock, BlockIdentity, BlockProps, BlockType, CompiledBlock, CrdtOperation, DocumentId,
    OperationId, OperationPayload, ReplicaId,
};

/// Counter after seeding an empty document: ops 1 and 2 are taken.
pub const SEEDED_NEXT_OPERATION_ID: OperationId = OperationId(3);

/// Two empty paragraphs, `1@temp` then `2@temp`.
pub fn empty_document() -> Vec<CompiledBlock> {
    vec![
        CompiledBlock::empty(BlockIdentity::Local(1), BlockType::Paragraph),
        CompiledBlock::empty(BlockIdentity::Local(2), BlockType::Paragraph),
    ]
}

/// The AddBlock operations that create [`empty_document`] in the store.
pub fn empty_document_history(document_id: &DocumentId, origin: &ReplicaId) -> Vec<CrdtOperation> {
    let add = |op: u64, after: Option<BlockIdentity>| CrdtOperation {
        origin: origin.clone(),
        operation_id: OperationId(op),
        document_id: document_id.clone(),
        block_id: Some(BlockIdentity::Local(op)),
        payload: OperationPayload::AddBlock(AddBlock {
            after_block: after,
            parent_block: None,
            block_type: BlockType::Paragraph,
            props: BlockProps::defaults(),
        }),
    };
    vec![add(1, None), add(2, Some(BlockIdentity::Local(1)))]
}

/// Stand-in document after the store failed to compile one. Never sent
/// anywhere; it only gives the editor something to show.
pub fn fallback_document() -> Vec<CompiledBlock> {
    vec![CompiledBlock::empty(BlockIdentity::Local(1), BlockType::Paragraph)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_matches_document() {
        let history = empty_document_history(&DocumentId::from("doc-1"), &ReplicaId::placeholder());
        let ids: Vec<_> = history.iter().filter_map(|op| op.block_id.clone()).collect();
        let doc_ids: Vec<_> = empty_document().into_iter().map(|b| b.id).collect();
        assert_eq!(ids, doc_ids);
        assert_eq!(
            history[1].as_add_block().unwrap().after_block,
            Some(BlockIdentity::Local(1))
        );
        assert!(history.iter().all(|op| op.operation_id < SEEDED_NEXT_OPERATION_ID));
    }

    #[test]
    fn test_fallback_is_deterministic() {
        assert_eq!(fallback_document(), fallback_document());
    }
}
