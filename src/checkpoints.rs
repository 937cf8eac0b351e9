//! Checkpoint enforcement

use crate::chain_index::{BlockIndex, ChainView, NodeId};
use crate::hash::Hash;
use crate::params::{ChainParams, Checkpoint};
use crate::types::Height;

/// Most recent checkpoint, if any are configured
pub fn latest_checkpoint(params: &ChainParams) -> Option<&Checkpoint> {
    params.latest_checkpoint()
}

/// A block at a checkpointed height must have the checkpointed hash. Heights
/// without a checkpoint always pass.
pub fn verify_checkpoint(params: &ChainParams, height: Height, hash: &Hash) -> bool {
    match params.checkpoint_at(height) {
        Some(checkpoint) => checkpoint.hash == *hash,
        None => true,
    }
}

/// Node of the newest checkpoint the active chain has already passed.
///
/// Returns `None` when no checkpoints are configured or none is connected yet.
pub fn find_previous_checkpoint(
    params: &ChainParams,
    index: &BlockIndex,
    chain: &ChainView,
) -> Option<NodeId> {
    let tip_height = chain.height()?;
    params
        .checkpoints
        .iter()
        .rev()
        .filter(|checkpoint| checkpoint.height <= tip_height)
        .find_map(|checkpoint| {
            let id = chain.node_by_height(checkpoint.height)?;
            (index.node(id).hash == checkpoint.hash).then_some(id)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BlockHeader;

    fn chain(len: u32) -> (BlockIndex, ChainView, Vec<Hash>) {
        let mut index = BlockIndex::new();
        let mut view = ChainView::new();
        let mut parent = None;
        let mut prev_hash = Hash::ZERO;
        let mut hashes = Vec::new();
        for i in 0..len {
            let header = BlockHeader {
                version: 2,
                prev_block_hash: prev_hash,
                merkle_root: Hash::ZERO,
                timestamp: 1_000 + i,
                bits: 0x207fffff,
                nonce: i,
            };
            let id = index.add_node(&header, parent);
            prev_hash = index.node(id).hash;
            hashes.push(prev_hash);
            parent = Some(id);
        }
        view.set_tip(&index, parent);
        (index, view, hashes)
    }

    #[test]
    fn test_verify_checkpoint() {
        let (_, _, hashes) = chain(4);
        let mut params = ChainParams::regtest();
        params.checkpoints = vec![Checkpoint { height: 2, hash: hashes[2] }];
        assert!(verify_checkpoint(&params, 2, &hashes[2]));
        assert!(!verify_checkpoint(&params, 2, &hashes[1]));
        assert!(verify_checkpoint(&params, 3, &hashes[1]));
        assert_eq!(latest_checkpoint(&params).map(|c| c.height), Some(2));
    }

    #[test]
    fn test_find_previous_checkpoint() {
        let (index, view, hashes) = chain(6);
        let mut params = ChainParams::regtest();
        assert_eq!(find_previous_checkpoint(&params, &index, &view), None);

        params.checkpoints = vec![
            Checkpoint { height: 1, hash: hashes[1] },
            Checkpoint { height: 3, hash: hashes[3] },
            Checkpoint { height: 9, hash: Hash([7; 32]) },
        ];
        let found = find_previous_checkpoint(&params, &index, &view).unwrap();
        assert_eq!(index.node(found).height, 3);
    }

    #[test]
    fn test_mismatched_checkpoint_is_not_passed() {
        let (index, view, hashes) = chain(4);
        let mut params = ChainParams::regtest();
        params.checkpoints = vec![
            Checkpoint { height: 1, hash: hashes[1] },
            Checkpoint { height: 2, hash: Hash([1; 32]) },
        ];
        let found = find_previous_checkpoint(&params, &index, &view).unwrap();
        assert_eq!(index.node(found).height, 1);
    }
}
