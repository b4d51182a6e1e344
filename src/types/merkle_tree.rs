//! Merkle root computation for block transaction lists.
//!
//! - An empty list yields the all-zero hash.
//! - Odd levels duplicate their last node before pairing.
//! - Interior nodes are domain-separated from leaf hashes.

use crate::core::transaction::Transaction;
use crate::types::hash::Hash;

const MERKLE_NODE_TAG: &[u8] = b"MERKLE_NODE";

/// Builds deterministic Merkle roots from transaction hashes.
pub struct MerkleTree;

impl MerkleTree {
    fn hash_pair(left: Hash, right: Hash) -> Hash {
        Hash::keccak()
            .chain(MERKLE_NODE_TAG)
            .chain(left.as_slice())
            .chain(right.as_slice())
            .finalize()
    }

    /// Reduces leaf hashes in place to a single root.
    pub fn from_raw(mut nodes: Vec<Hash>) -> Hash {
        if nodes.is_empty() {
            return Hash::zero();
        }

        let mut len = nodes.len();
        while len > 1 {
            let mut write = 0;
            let mut read = 0;
            while read < len {
                let left = nodes[read];
                let right = if read + 1 < len { nodes[read + 1] } else { left };
                nodes[write] = Self::hash_pair(left, right);
                write += 1;
                read += 2;
            }
            len = write;
        }

        nodes[0]
    }

    /// Computes the tx-root over a transaction list, using each
    /// transaction's hash as a leaf.
    pub fn from_transactions(txs: &[Transaction]) -> Hash {
        MerkleTree::from_raw(txs.iter().map(|tx| tx.hash()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(data: &[u8]) -> Hash {
        Hash::digest(data)
    }

    #[test]
    fn empty_list_yields_zero() {
        assert_eq!(MerkleTree::from_raw(Vec::new()), Hash::zero());
    }

    #[test]
    fn single_leaf_is_its_own_root() {
        let l = leaf(b"only");
        assert_eq!(MerkleTree::from_raw(vec![l]), l);
    }

    #[test]
    fn even_count_matches_manual_reduction() {
        let (a, b, c, d) = (leaf(b"a"), leaf(b"b"), leaf(b"c"), leaf(b"d"));
        let expected = MerkleTree::hash_pair(
            MerkleTree::hash_pair(a, b),
            MerkleTree::hash_pair(c, d),
        );
        assert_eq!(MerkleTree::from_raw(vec![a, b, c, d]), expected);
    }

    #[test]
    fn odd_count_duplicates_last_leaf() {
        let (a, b, c) = (leaf(b"a"), leaf(b"b"), leaf(b"c"));
        let expected =
            MerkleTree::hash_pair(MerkleTree::hash_pair(a, b), MerkleTree::hash_pair(c, c));
        assert_eq!(MerkleTree::from_raw(vec![a, b, c]), expected);
    }

    #[test]
    fn order_matters() {
        let (a, b) = (leaf(b"a"), leaf(b"b"));
        assert_ne!(MerkleTree::from_raw(vec![a, b]), MerkleTree::from_raw(vec![b, a]));
    }

    #[test]
    fn interior_nodes_are_domain_separated() {
        let (a, b) = (leaf(b"a"), leaf(b"b"));
        let undomained = Hash::keccak().chain(a.as_slice()).chain(b.as_slice()).finalize();
        assert_ne!(MerkleTree::from_raw(vec![a, b]), undomained);
    }
}
