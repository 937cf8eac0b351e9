//! Block index and active-chain view
//!
//! Every known header is stored once in an arena owned by `BlockIndex` and
//! referred to by `NodeId`. Nodes link to their parent by id, so ancestor
//! walks never touch reference counts and the whole tree is dropped at once.

use crate::constants::MEDIAN_TIME_BLOCKS;
use crate::hash::Hash;
use crate::params::ChainParams;
use crate::types::*;
use std::collections::HashMap;

/// Handle to a node stored in a `BlockIndex`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Header fields of one indexed block plus its position in the tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockNode {
    pub hash: Hash,
    pub parent: Option<NodeId>,
    pub height: Height,
    pub version: i32,
    pub prev_hash: Hash,
    pub merkle_root: Hash,
    pub timestamp: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockNode {
    pub fn new(header: &BlockHeader, parent: Option<(NodeId, Height)>) -> Self {
        BlockNode {
            hash: header.block_hash(),
            parent: parent.map(|(id, _)| id),
            height: parent.map_or(0, |(_, h)| h + 1),
            version: header.version,
            prev_hash: header.prev_block_hash,
            merkle_root: header.merkle_root,
            timestamp: header.timestamp,
            bits: header.bits,
            nonce: header.nonce,
        }
    }

    /// Reconstructs the header this node was built from
    pub fn header(&self) -> BlockHeader {
        BlockHeader {
            version: self.version,
            prev_block_hash: self.prev_hash,
            merkle_root: self.merkle_root,
            timestamp: self.timestamp,
            bits: self.bits,
            nonce: self.nonce,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BlockIndex {
    nodes: Vec<BlockNode>,
    by_hash: HashMap<Hash, NodeId>,
}

impl BlockIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Indexes `header` as a child of `parent`. A header that is already
    /// indexed keeps its existing node.
    pub fn add_node(&mut self, header: &BlockHeader, parent: Option<NodeId>) -> NodeId {
        let hash = header.block_hash();
        if let Some(&id) = self.by_hash.get(&hash) {
            return id;
        }
        let parent = parent.map(|p| (p, self.node(p).height));
        let id = NodeId(self.nodes.len());
        self.nodes.push(BlockNode::new(header, parent));
        self.by_hash.insert(hash, id);
        id
    }

    pub fn lookup(&self, hash: &Hash) -> Option<NodeId> {
        self.by_hash.get(hash).copied()
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.by_hash.contains_key(hash)
    }

    /// Node behind `id`; ids are only minted by this index and never invalidated
    pub fn node(&self, id: NodeId) -> &BlockNode {
        &self.nodes[id.0]
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// Ancestor of `id` at `height`, or `None` above the node's own height
    pub fn ancestor(&self, id: NodeId, height: Height) -> Option<NodeId> {
        let mut current = id;
        let node = self.node(current);
        if height > node.height {
            return None;
        }
        while self.node(current).height > height {
            current = self.node(current).parent?;
        }
        Some(current)
    }

    /// Ancestor `distance` blocks before `id`
    pub fn relative_ancestor(&self, id: NodeId, distance: Height) -> Option<NodeId> {
        let height = self.node(id).height.checked_sub(distance)?;
        self.ancestor(id, height)
    }

    /// CalcPastMedianTime: median timestamp of the node and up to ten ancestors
    pub fn calc_past_median_time(&self, id: NodeId) -> u32 {
        let mut timestamps = Vec::with_capacity(MEDIAN_TIME_BLOCKS);
        let mut current = Some(id);
        while let Some(node_id) = current {
            if timestamps.len() == MEDIAN_TIME_BLOCKS {
                break;
            }
            let node = self.node(node_id);
            timestamps.push(node.timestamp);
            current = node.parent;
        }
        timestamps.sort_unstable();
        timestamps[timestamps.len() / 2]
    }

    /// Nearest node at or before `from`, at height `floor` or above, that was
    /// mined with `algo`.
    pub fn last_with_algo(
        &self,
        from: Option<NodeId>,
        algo: &str,
        floor: Height,
        params: &ChainParams,
    ) -> Option<NodeId> {
        let mut current = from;
        while let Some(id) = current {
            let node = self.node(id);
            if node.height < floor {
                return None;
            }
            if params.algo_name(node.version, node.height) == Some(algo) {
                return Some(id);
            }
            current = node.parent;
        }
        None
    }
}

/// The active chain as a height-indexed list of nodes
#[derive(Debug, Clone, Default)]
pub struct ChainView {
    nodes: Vec<NodeId>,
}

impl ChainView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tip(&self) -> Option<NodeId> {
        self.nodes.last().copied()
    }

    pub fn height(&self) -> Option<Height> {
        self.nodes.len().checked_sub(1).map(|h| h as Height)
    }

    pub fn node_by_height(&self, height: Height) -> Option<NodeId> {
        self.nodes.get(height as usize).copied()
    }

    pub fn contains(&self, index: &BlockIndex, id: NodeId) -> bool {
        self.node_by_height(index.node(id).height) == Some(id)
    }

    /// Makes `tip` the end of the chain, replacing any diverging suffix
    pub fn set_tip(&mut self, index: &BlockIndex, tip: Option<NodeId>) {
        let tip = match tip {
            Some(tip) => tip,
            None => {
                self.nodes.clear();
                return;
            }
        };
        let height = index.node(tip).height as usize;
        self.nodes.resize(height + 1, tip);

        let mut current = Some(tip);
        while let Some(id) = current {
            let h = index.node(id).height as usize;
            if self.nodes[h] == id && h != height {
                break;
            }
            self.nodes[h] = id;
            current = index.parent(id);
        }
    }
}
