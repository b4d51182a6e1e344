//! Authenticated state trie producing the per-block state root.

use crate::types::hash::Hash;
use sparse_merkle_tree::blake2b::Blake2bHasher;
use sparse_merkle_tree::default_store::DefaultStore;
use sparse_merkle_tree::traits::Value;
use sparse_merkle_tree::{SparseMerkleTree, H256};

/// Value wrapper stored at trie leaves.
///
/// An empty value hashes to zero, which the sparse tree treats as absence,
/// so deleting a key and never having written it produce the same root.
#[derive(Default, Clone)]
pub struct TrieValue(pub Vec<u8>);

impl Value for TrieValue {
    fn to_h256(&self) -> H256 {
        if self.0.is_empty() {
            return H256::zero();
        }
        H256::from(Hash::digest(&self.0).0)
    }

    fn zero() -> Self {
        Self(Vec::new())
    }
}

type Smt = SparseMerkleTree<Blake2bHasher, TrieValue, DefaultStore<TrieValue>>;

fn to_h256(hash: &Hash) -> H256 {
    H256::from(hash.0)
}

fn from_h256(h: &H256) -> Hash {
    Hash::from_slice(h.as_slice()).unwrap_or_else(Hash::zero)
}

/// Keyed, ordered Merkle map from 32-byte hashed keys to opaque values.
///
/// The root is determined solely by current contents; insertion order never
/// leaks into it. The tree lives in memory and is rebuilt from persisted
/// leaves at startup.
pub struct StateTrie {
    smt: Smt,
}

impl StateTrie {
    pub fn new() -> Self {
        Self { smt: Smt::default() }
    }

    /// Rebuilds a trie from persisted `(key, value)` leaves.
    pub fn from_leaves(leaves: Vec<(Hash, Vec<u8>)>) -> Self {
        let mut trie = Self::new();
        if !leaves.is_empty() {
            trie.smt
                .update_all(
                    leaves
                        .into_iter()
                        .map(|(key, value)| (to_h256(&key), TrieValue(value)))
                        .collect(),
                )
                .expect("rebuilding the trie from stored leaves cannot fail");
        }
        trie
    }

    pub fn insert(&mut self, key: Hash, value: Vec<u8>) {
        self.smt
            .update(to_h256(&key), TrieValue(value))
            .expect("trie update cannot fail with the in-memory store");
    }

    pub fn delete(&mut self, key: Hash) {
        self.insert(key, Vec::new());
    }

    pub fn get(&self, key: Hash) -> Option<Vec<u8>> {
        self.smt
            .get(&to_h256(&key))
            .ok()
            .filter(|v| !v.0.is_empty())
            .map(|v| v.0)
    }

    /// Visits every live leaf; order is unspecified, callers sort when the
    /// result can influence persisted bytes.
    pub fn iter(&self) -> impl Iterator<Item = (Hash, Vec<u8>)> + '_ {
        self.smt
            .store()
            .leaves_map()
            .iter()
            .filter(|(_, v)| !v.0.is_empty())
            .map(|(k, v)| (from_h256(k), v.0.clone()))
    }

    pub fn root(&self) -> Hash {
        from_h256(self.smt.root())
    }
}

impl Default for StateTrie {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(tag: &[u8]) -> Hash {
        Hash::digest(tag)
    }

    #[test]
    fn empty_trie_has_zero_root() {
        assert_eq!(StateTrie::new().root(), Hash::zero());
    }

    #[test]
    fn insert_get_delete() {
        let mut trie = StateTrie::new();
        trie.insert(key(b"a"), b"value".to_vec());
        assert_eq!(trie.get(key(b"a")), Some(b"value".to_vec()));
        trie.delete(key(b"a"));
        assert_eq!(trie.get(key(b"a")), None);
    }

    #[test]
    fn delete_restores_prior_root() {
        let mut trie = StateTrie::new();
        trie.insert(key(b"a"), b"1".to_vec());
        let root_one = trie.root();

        trie.insert(key(b"b"), b"2".to_vec());
        assert_ne!(trie.root(), root_one);

        trie.delete(key(b"b"));
        assert_eq!(trie.root(), root_one);
    }

    #[test]
    fn root_ignores_insertion_order() {
        let mut a = StateTrie::new();
        a.insert(key(b"x"), b"1".to_vec());
        a.insert(key(b"y"), b"2".to_vec());

        let mut b = StateTrie::new();
        b.insert(key(b"y"), b"2".to_vec());
        b.insert(key(b"x"), b"1".to_vec());

        assert_eq!(a.root(), b.root());
    }

    #[test]
    fn rebuild_from_leaves_matches_incremental_root() {
        let mut incremental = StateTrie::new();
        incremental.insert(key(b"k1"), b"v1".to_vec());
        incremental.insert(key(b"k2"), b"v2".to_vec());

        let leaves: Vec<_> = incremental.iter().collect();
        let rebuilt = StateTrie::from_leaves(leaves);
        assert_eq!(rebuilt.root(), incremental.root());
    }

    #[test]
    fn value_changes_move_the_root() {
        let mut trie = StateTrie::new();
        trie.insert(key(b"k"), b"v1".to_vec());
        let before = trie.root();
        trie.insert(key(b"k"), b"v2".to_vec());
        assert_ne!(trie.root(), before);
    }
}
