//! Persistent, append-only block and header storage.
//!
//! Key layout inside the shared KV namespace:
//!
//! ```text
//! b/<hash>            block bytes
//! h/<u64-be>          canonical height → block hash
//! n/<u64-be><hash>    block-node metadata (header + status), height-ordered
//! r/<hash>            execution receipts
//! c                   current chain-state pointer
//! ```

use crate::core::account::Receipt;
use crate::core::block::{Block, Header};
use crate::core::block_index::BlockStatus;
use crate::storage::kv::{KvStore, StoreError};
use crate::types::encoding::{Decode, Encode};
use crate::types::hash::Hash;
use emberchain_derive::BinaryCodec;
use std::sync::Arc;

const BLOCK_PREFIX: &[u8] = b"b/";
const HEIGHT_PREFIX: &[u8] = b"h/";
const NODE_PREFIX: &[u8] = b"n/";
const RECEIPT_PREFIX: &[u8] = b"r/";
const CHAIN_STATE_KEY: &[u8] = b"c";

fn block_key(hash: &Hash) -> Vec<u8> {
    [BLOCK_PREFIX, hash.as_slice()].concat()
}

fn height_key(height: u64) -> Vec<u8> {
    [HEIGHT_PREFIX, &height.to_be_bytes()[..]].concat()
}

fn node_key(height: u64, hash: &Hash) -> Vec<u8> {
    [NODE_PREFIX, &height.to_be_bytes()[..], hash.as_slice()].concat()
}

fn receipt_key(hash: &Hash) -> Vec<u8> {
    [RECEIPT_PREFIX, hash.as_slice()].concat()
}

/// Header plus validation status, persisted so the index survives restarts.
#[derive(BinaryCodec, Clone, Debug, PartialEq, Eq)]
pub struct StoredBlockNode {
    pub header: Header,
    pub status: BlockStatus,
}

/// Pointer to the current best block.
#[derive(BinaryCodec, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainState {
    pub hash: Hash,
    pub height: u64,
}

/// Block, node and chain-state persistence over a [`KvStore`].
pub struct BlockStore<S: KvStore> {
    db: Arc<S>,
}

impl<S: KvStore> BlockStore<S> {
    pub fn new(db: Arc<S>) -> Self {
        Self { db }
    }

    pub fn has_block(&self, hash: &Hash) -> Result<bool, StoreError> {
        Ok(self.db.get(&block_key(hash))?.is_some())
    }

    pub fn put_block(&self, block: &Block) -> Result<(), StoreError> {
        self.db.put(&block_key(&block.hash()), &block.to_bytes())
    }

    pub fn get_block(&self, hash: &Hash) -> Result<Option<Block>, StoreError> {
        match self.db.get(&block_key(hash))? {
            None => Ok(None),
            Some(bytes) => Block::from_bytes(&bytes)
                .map(Some)
                .map_err(|_| StoreError::Corruption(format!("undecodable block {}", hash))),
        }
    }

    pub fn get_block_by_height(&self, height: u64) -> Result<Option<Block>, StoreError> {
        match self.canonical_hash(height)? {
            None => Ok(None),
            Some(hash) => self.get_block(&hash),
        }
    }

    /// Canonical block hash at `height`, when that height is on the best
    /// chain.
    pub fn canonical_hash(&self, height: u64) -> Result<Option<Hash>, StoreError> {
        match self.db.get(&height_key(height))? {
            None => Ok(None),
            Some(bytes) => Hash::from_slice(&bytes)
                .map(Some)
                .ok_or_else(|| StoreError::Corruption("height index entry is not a hash".into())),
        }
    }

    pub fn set_canonical(&self, height: u64, hash: &Hash) -> Result<(), StoreError> {
        self.db.put(&height_key(height), hash.as_slice())
    }

    /// Removes canonical index entries above `height` after a
    /// reorganization.
    pub fn truncate_canonical_above(&self, height: u64) -> Result<(), StoreError> {
        let mut stale = Vec::new();
        self.db.iter_prefix(HEIGHT_PREFIX, &mut |key, _| {
            let raw: [u8; 8] = key[HEIGHT_PREFIX.len()..]
                .try_into()
                .map_err(|_| StoreError::Corruption("malformed height index key".into()))?;
            if u64::from_be_bytes(raw) > height {
                stale.push(key.to_vec());
            }
            Ok(())
        })?;
        for key in stale {
            self.db.delete(&key)?;
        }
        Ok(())
    }

    /// Greatest canonical `(height, hash)` pair, if any block is indexed.
    pub fn highest(&self) -> Result<Option<(u64, Hash)>, StoreError> {
        let mut top: Option<(u64, Hash)> = None;
        self.db.iter_prefix(HEIGHT_PREFIX, &mut |key, value| {
            let raw: [u8; 8] = key[HEIGHT_PREFIX.len()..]
                .try_into()
                .map_err(|_| StoreError::Corruption("malformed height index key".into()))?;
            let hash = Hash::from_slice(value)
                .ok_or_else(|| StoreError::Corruption("height index entry is not a hash".into()))?;
            top = Some((u64::from_be_bytes(raw), hash));
            Ok(())
        })?;
        Ok(top)
    }

    pub fn put_block_node(
        &self,
        hash: &Hash,
        header: &Header,
        status: BlockStatus,
    ) -> Result<(), StoreError> {
        let node = StoredBlockNode {
            header: header.clone(),
            status,
        };
        self.db.put(&node_key(header.height, hash), &node.to_bytes())
    }

    /// Visits every stored block node in ascending height order, the order
    /// the index is reconstructed in at startup.
    pub fn iter_block_nodes(
        &self,
        f: &mut dyn FnMut(StoredBlockNode) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        self.db.iter_prefix(NODE_PREFIX, &mut |_, value| {
            let node = StoredBlockNode::from_bytes(value)
                .map_err(|_| StoreError::Corruption("undecodable block node".into()))?;
            f(node)
        })
    }

    pub fn put_receipts(&self, hash: &Hash, receipts: &[Receipt]) -> Result<(), StoreError> {
        self.db.put(&receipt_key(hash), &receipts.to_vec().to_bytes())
    }

    pub fn get_receipts(&self, hash: &Hash) -> Result<Option<Vec<Receipt>>, StoreError> {
        match self.db.get(&receipt_key(hash))? {
            None => Ok(None),
            Some(bytes) => Vec::<Receipt>::from_bytes(&bytes)
                .map(Some)
                .map_err(|_| StoreError::Corruption("undecodable receipts".into())),
        }
    }

    pub fn put_chain_state(&self, state: &ChainState) -> Result<(), StoreError> {
        self.db.put(CHAIN_STATE_KEY, &state.to_bytes())
    }

    pub fn get_chain_state(&self) -> Result<Option<ChainState>, StoreError> {
        match self.db.get(CHAIN_STATE_KEY)? {
            None => Ok(None),
            Some(bytes) => ChainState::from_bytes(&bytes)
                .map(Some)
                .map_err(|_| StoreError::Corruption("undecodable chain state".into())),
        }
    }
}
