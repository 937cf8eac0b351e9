//! Transaction merkle tree
//!
//! The tree is stored as a flat array: leaves first, padded to the next power
//! of two, followed by each parent level. A parent with no right child hashes
//! its left child with itself.

use crate::hash::{double_sha256, Hash, HASH_SIZE};
use crate::types::Transaction;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree {
    nodes: Vec<Option<Hash>>,
}

/// SHA256d(left || right)
pub fn hash_merkle_branches(left: &Hash, right: &Hash) -> Hash {
    let mut buf = [0u8; HASH_SIZE * 2];
    buf[..HASH_SIZE].copy_from_slice(left.as_bytes());
    buf[HASH_SIZE..].copy_from_slice(right.as_bytes());
    double_sha256(&buf)
}

/// BuildMerkleTreeStore: [𝒯𝒳] × 𝔹 → MerkleTree
///
/// With `witness` set the leaves are witness hashes and the coinbase leaf is
/// the zero hash.
pub fn build_merkle_tree_store(transactions: &[Transaction], witness: bool) -> MerkleTree {
    let leaves: Vec<Hash> = transactions
        .iter()
        .enumerate()
        .map(|(i, tx)| match (witness, i) {
            (true, 0) => Hash::ZERO,
            (true, _) => tx.wtxid(),
            (false, _) => tx.txid(),
        })
        .collect();
    MerkleTree::from_hashes(&leaves)
}

impl MerkleTree {
    pub fn from_hashes(leaves: &[Hash]) -> Self {
        if leaves.is_empty() {
            return MerkleTree { nodes: Vec::new() };
        }
        let width = leaves.len().next_power_of_two();
        let size = width * 2 - 1;
        let mut nodes: Vec<Option<Hash>> = vec![None; size];
        for (slot, leaf) in nodes.iter_mut().zip(leaves) {
            *slot = Some(*leaf);
        }

        let mut offset = width;
        let mut i = 0;
        while i + 1 < size {
            nodes[offset] = match (nodes[i], nodes[i + 1]) {
                (None, _) => None,
                (Some(left), None) => Some(hash_merkle_branches(&left, &left)),
                (Some(left), Some(right)) => Some(hash_merkle_branches(&left, &right)),
            };
            offset += 1;
            i += 2;
        }
        MerkleTree { nodes }
    }

    /// Root of the tree; the zero hash for an empty tree
    pub fn root(&self) -> Hash {
        self.nodes.last().copied().flatten().unwrap_or(Hash::ZERO)
    }

    pub fn nodes(&self) -> &[Option<Hash>] {
        &self.nodes
    }
}
