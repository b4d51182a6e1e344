//! 32-byte Keccak-256 hash type with zero-allocation hashing.

use crate::types::encoding::EncodeSink;
use emberchain_derive::BinaryCodec;
use sha3::{Digest, Keccak256};
use std::fmt;
use std::sync::Mutex;

/// Keccak-256 digest length in bytes.
pub const HASH_LEN: usize = 32;

/// Fixed-size 32-byte Keccak-256 digest used throughout the chain.
///
/// `Copy` on purpose: hashes are passed around constantly during block
/// validation and are cheaper to copy than to reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BinaryCodec, Default, Hash, Ord, PartialOrd)]
pub struct Hash(pub [u8; HASH_LEN]);

impl Hash {
    /// The all-zero hash, used as the genesis parent and as an empty-root
    /// sentinel.
    pub const fn zero() -> Hash {
        Hash([0u8; HASH_LEN])
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH_LEN]
    }

    pub const fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn to_vec(self) -> Vec<u8> {
        self.0.to_vec()
    }

    /// Creates a hash from a byte slice of exactly [`HASH_LEN`] bytes.
    pub fn from_slice(slice: &[u8]) -> Option<Hash> {
        if slice.len() != HASH_LEN {
            return None;
        }
        let mut bytes = [0u8; HASH_LEN];
        bytes.copy_from_slice(slice);
        Some(Hash(bytes))
    }

    /// Starts an incremental Keccak-256 computation.
    pub fn keccak() -> HashBuilder {
        HashBuilder::new()
    }

    /// One-shot Keccak-256 of a byte slice.
    pub fn digest(data: &[u8]) -> Hash {
        Hash(Keccak256::digest(data).into())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x")?;
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Incremental Keccak-256 builder.
///
/// Implements [`EncodeSink`] so any `Encode` type can be hashed directly
/// without an intermediate buffer.
pub struct HashBuilder {
    hasher: Keccak256,
}

impl HashBuilder {
    pub fn new() -> Self {
        Self {
            hasher: Keccak256::new(),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    pub fn chain(mut self, data: &[u8]) -> Self {
        self.hasher.update(data);
        self
    }

    pub fn finalize(self) -> Hash {
        Hash(self.hasher.finalize().into())
    }
}

impl Default for HashBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EncodeSink for HashBuilder {
    fn write(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }
}

/// Lazily computed value derived from immutable data.
///
/// Blocks and transactions never change after construction, so their hash
/// (and a transaction's recovered sender) is computed once and cached. The
/// cache is deliberately transparent: it never takes part in equality or in
/// the wire encoding.
#[derive(Debug, Default)]
pub struct Lazy<T: Copy> {
    cell: Mutex<Option<T>>,
}

impl<T: Copy> Lazy<T> {
    pub fn new() -> Self {
        Self {
            cell: Mutex::new(None),
        }
    }

    /// Returns the cached value, computing and storing it on first use.
    pub fn get_or_compute(&self, f: impl FnOnce() -> T) -> T {
        let mut guard = self.cell.lock().unwrap();
        match *guard {
            Some(value) => value,
            None => {
                let value = f();
                *guard = Some(value);
                value
            }
        }
    }
}

impl<T: Copy> Clone for Lazy<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Mutex::new(*self.cell.lock().unwrap()),
        }
    }
}

// Derived caches are invisible to comparisons: two values differing only in
// what has been memoized are the same value.
impl<T: Copy> PartialEq for Lazy<T> {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl<T: Copy> Eq for Lazy<T> {}

impl<T: Copy> crate::types::encoding::Encode for Lazy<T> {
    fn encode<S: EncodeSink>(&self, _out: &mut S) {}
}

impl<T: Copy> crate::types::encoding::Decode for Lazy<T> {
    fn decode(_input: &mut &[u8]) -> Result<Self, crate::types::encoding::DecodeError> {
        Ok(Self::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keccak_empty_input_matches_known_vector() {
        // Keccak-256 of the empty string.
        let expected = "0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470";
        assert_eq!(Hash::digest(b"").to_string(), expected);
    }

    #[test]
    fn builder_matches_one_shot() {
        let mut builder = Hash::keccak();
        builder.update(b"hello ");
        builder.update(b"world");
        assert_eq!(builder.finalize(), Hash::digest(b"hello world"));
    }

    #[test]
    fn chain_is_update_by_another_name() {
        let chained = Hash::keccak().chain(b"ab").chain(b"cd").finalize();
        assert_eq!(chained, Hash::digest(b"abcd"));
    }

    #[test]
    fn from_slice_requires_exact_length() {
        assert!(Hash::from_slice(&[0u8; 31]).is_none());
        assert!(Hash::from_slice(&[0u8; 33]).is_none());
        assert!(Hash::from_slice(&[0u8; 32]).is_some());
    }

    #[test]
    fn zero_hash_is_zero() {
        assert!(Hash::zero().is_zero());
        assert!(!Hash::digest(b"x").is_zero());
    }

    #[test]
    fn lazy_computes_once() {
        let lazy: Lazy<u64> = Lazy::new();
        let mut calls = 0;
        let first = lazy.get_or_compute(|| {
            calls += 1;
            42
        });
        let second = lazy.get_or_compute(|| {
            calls += 1;
            99
        });
        assert_eq!(calls, 1);
        assert_eq!(first, 42);
        assert_eq!(second, 42);
    }

    #[test]
    fn lazy_is_transparent_to_equality() {
        let a: Lazy<u64> = Lazy::new();
        let b: Lazy<u64> = Lazy::new();
        b.get_or_compute(|| 7);
        assert_eq!(a, b);
    }
}
