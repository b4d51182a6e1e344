//! Blocks, headers and consensus proofs.

use crate::core::transaction::Transaction;
use crate::crypto::key_pair::PublicKey;
use crate::types::big::Big;
use crate::types::bytes::Bytes;
use crate::types::encoding::Encode;
use crate::types::hash::{Hash, Lazy};
use crate::types::merkle_tree::MerkleTree;
use emberchain_derive::BinaryCodec;

/// Block header: metadata and cryptographic commitments.
///
/// The block hash is the Keccak-256 digest of this structure's canonical
/// encoding; the consensus proof lives on the block, outside the hash.
#[derive(Clone, Debug, PartialEq, Eq, BinaryCodec)]
pub struct Header {
    pub version: u32,
    /// Hash of the parent header; zero for genesis.
    pub previous_hash: Hash,
    pub chain_id: u64,
    /// Position in the chain, genesis = 0.
    pub height: u64,
    /// Unix seconds; must be strictly greater than the parent's.
    pub timestamp: u64,
    pub gas_limit: Big,
    pub gas_used: Big,
    /// Root of the state trie after applying this block.
    pub state_root: Hash,
    /// Merkle root over the transaction list.
    pub tx_root: Hash,
    /// Producer that led this round.
    pub leader_pubkey: PublicKey,
    /// Participating producers, in round order.
    pub minor_pubkeys: Vec<PublicKey>,
}

impl Header {
    pub fn compute_hash(&self) -> Hash {
        let mut h = Hash::keccak();
        self.encode(&mut h);
        h.finalize()
    }
}

/// Opaque consensus artifact validated by a pluggable proof validator.
///
/// Encoded as a `u32` length prefix followed by the raw bytes.
#[derive(Clone, Debug, PartialEq, Eq, Default, BinaryCodec)]
pub struct Proof(pub Bytes);

impl Proof {
    pub fn empty() -> Self {
        Proof(Bytes::empty())
    }
}

/// Immutable block: header, ordered transactions, consensus proof.
///
/// Blocks are validated once on receipt and never modified; the header hash
/// is computed lazily and cached.
#[derive(Clone, Debug, PartialEq, Eq, BinaryCodec)]
pub struct Block {
    pub header: Header,
    pub transactions: Vec<Transaction>,
    pub proof: Proof,

    cached_hash: Lazy<Hash>,
}

impl Block {
    pub fn new(header: Header, transactions: Vec<Transaction>, proof: Proof) -> Self {
        Block {
            header,
            transactions,
            proof,
            cached_hash: Lazy::new(),
        }
    }

    /// The block identifier: hash of the header only.
    pub fn hash(&self) -> Hash {
        self.cached_hash.get_or_compute(|| self.header.compute_hash())
    }

    /// Recomputes the Merkle root of the transaction list.
    pub fn compute_tx_root(&self) -> Hash {
        MerkleTree::from_transactions(&self.transactions)
    }
}
