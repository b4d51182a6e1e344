//! Core primitive types.
//!
//! - [`hash::Hash`]: 32-byte Keccak-256 digests
//! - [`address::Address`]: 20-byte account identifiers
//! - [`big::Big`]: unsigned amounts with var-length big-endian encoding
//! - [`bytes::Bytes`]: reference-counted payload buffers
//! - [`encoding`]: the canonical binary codec everything hashes through
//! - [`merkle_tree`]: tx-root computation

pub mod address;
pub mod big;
pub mod bytes;
pub mod encoding;
pub mod hash;
pub mod merkle_tree;
