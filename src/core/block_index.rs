//! In-memory DAG of block headers with fork discovery.
//!
//! Nodes live in a slab owned by [`BlockIndex`]; parents are referenced by
//! stable [`NodeIdx`] values instead of heap pointers, so competing
//! branches never form ownership cycles. Nodes are created on first
//! observation and never removed; only their status flips.

use crate::core::block::Header;
use crate::storage::block_store::BlockStore;
use crate::storage::kv::{KvStore, StoreError};
use crate::types::encoding::{Decode, DecodeError, Encode, EncodeSink};
use crate::types::hash::Hash;
use std::collections::HashMap;
use std::ops::BitOr;

/// Stable index of a node inside the slab.
pub type NodeIdx = u32;

/// Validation status bitset of a block node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockStatus(pub u8);

impl BlockStatus {
    /// Block bytes are persisted.
    pub const DATA_STORED: BlockStatus = BlockStatus(1);
    /// Block fully validated and executed.
    pub const VALID: BlockStatus = BlockStatus(1 << 1);
    /// Block failed validation; never eligible as tip.
    pub const VALIDATE_FAILED: BlockStatus = BlockStatus(1 << 2);
    /// Some ancestor failed validation.
    pub const INVALID_ANCESTOR: BlockStatus = BlockStatus(1 << 3);

    pub fn has(&self, flag: BlockStatus) -> bool {
        self.0 & flag.0 != 0
    }

    pub fn known_valid(&self) -> bool {
        self.has(Self::VALID)
    }

    pub fn known_invalid(&self) -> bool {
        self.has(Self::VALIDATE_FAILED) || self.has(Self::INVALID_ANCESTOR)
    }
}

impl BitOr for BlockStatus {
    type Output = BlockStatus;
    fn bitor(self, rhs: BlockStatus) -> BlockStatus {
        BlockStatus(self.0 | rhs.0)
    }
}

impl Encode for BlockStatus {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.0.encode(out);
    }
}

impl Decode for BlockStatus {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(BlockStatus(u8::decode(input)?))
    }
}

/// One observed header and its position in the DAG.
#[derive(Clone, Debug)]
pub struct BlockNode {
    pub header: Header,
    pub hash: Hash,
    pub parent: Option<NodeIdx>,
    pub height: u64,
    pub status: BlockStatus,
}

/// Slab-backed header DAG with hash lookup and dirty-node tracking.
pub struct BlockIndex {
    nodes: Vec<BlockNode>,
    by_hash: HashMap<Hash, NodeIdx>,
    /// Nodes whose status changed since the last flush.
    dirty: Vec<NodeIdx>,
}

impl BlockIndex {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            by_hash: HashMap::new(),
            dirty: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Adds a header, wiring the parent from `previous_hash` when known.
    /// Returns the existing index when the hash was already observed.
    pub fn add_node(&mut self, header: Header, status: BlockStatus) -> NodeIdx {
        let hash = header.compute_hash();
        if let Some(idx) = self.by_hash.get(&hash) {
            return *idx;
        }
        let parent = self.by_hash.get(&header.previous_hash).copied();
        let idx = self.nodes.len() as NodeIdx;
        self.nodes.push(BlockNode {
            height: header.height,
            header,
            hash,
            parent,
            status,
        });
        self.by_hash.insert(hash, idx);
        self.dirty.push(idx);
        idx
    }

    pub fn lookup(&self, hash: &Hash) -> Option<NodeIdx> {
        self.by_hash.get(hash).copied()
    }

    pub fn node(&self, idx: NodeIdx) -> &BlockNode {
        &self.nodes[idx as usize]
    }

    pub fn status(&self, idx: NodeIdx) -> BlockStatus {
        self.nodes[idx as usize].status
    }

    /// Ors `flags` into the node's status and marks it dirty.
    pub fn set_status_flags(&mut self, idx: NodeIdx, flags: BlockStatus) {
        let node = &mut self.nodes[idx as usize];
        node.status = node.status | flags;
        self.dirty.push(idx);
    }

    /// Walks parents until reaching the node at `height`.
    pub fn ancestor(&self, idx: NodeIdx, height: u64) -> Option<NodeIdx> {
        let mut current = idx;
        loop {
            let node = self.node(current);
            if node.height == height {
                return Some(current);
            }
            if node.height < height {
                return None;
            }
            current = node.parent?;
        }
    }

    /// Persists every dirty node through the block store.
    pub fn flush_to<S: KvStore>(&mut self, store: &BlockStore<S>) -> Result<(), StoreError> {
        let dirty = std::mem::take(&mut self.dirty);
        for idx in dirty {
            let node = self.node(idx);
            store.put_block_node(&node.hash, &node.header, node.status)?;
        }
        Ok(())
    }
}

impl Default for BlockIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// The current best-chain tip.
pub struct BestChain {
    tip: Option<NodeIdx>,
}

impl BestChain {
    pub fn new() -> Self {
        Self { tip: None }
    }

    pub fn tip(&self) -> Option<NodeIdx> {
        self.tip
    }

    /// Atomic from the caller's perspective: the accept path holds the
    /// write side while swapping.
    pub fn set_tip(&mut self, idx: NodeIdx) {
        self.tip = Some(idx);
    }

    pub fn height(&self, index: &BlockIndex) -> u64 {
        self.tip.map(|idx| index.node(idx).height).unwrap_or(0)
    }

    /// Nearest common ancestor of `idx` and the current tip.
    pub fn find_fork(&self, index: &BlockIndex, idx: NodeIdx) -> Option<NodeIdx> {
        let tip = self.tip?;

        let mut a = idx;
        let mut b = tip;
        // Level the two walks, then descend in lockstep.
        while index.node(a).height > index.node(b).height {
            a = index.node(a).parent?;
        }
        while index.node(b).height > index.node(a).height {
            b = index.node(b).parent?;
        }
        while a != b {
            a = index.node(a).parent?;
            b = index.node(b).parent?;
        }
        Some(a)
    }
}

impl Default for BestChain {
    fn default() -> Self {
        Self::new()
    }
}
