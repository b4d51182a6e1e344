//! Reference-counted byte buffer for transaction payloads and proofs.

use crate::types::encoding::{read_bytes, Decode, DecodeError, Encode, EncodeSink};
use std::ops::Deref;
use std::sync::Arc;

/// Largest payload a single transaction or proof may carry.
const MAX_PAYLOAD_LEN: usize = 1 << 20;

/// A reference-counted, immutable byte buffer.
///
/// Transactions are cloned freely between the index, the store and in-flight
/// blocks during reorganizations; `Arc` keeps those clones cheap. On the
/// wire the buffer is a `u32` length prefix followed by the raw bytes.
#[derive(Debug, Default, Eq, PartialEq, Clone)]
pub struct Bytes(Arc<Vec<u8>>);

impl Bytes {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self(Arc::new(data.into()))
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        self.0.as_slice()
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.as_slice().to_vec()
    }
}

impl Deref for Bytes {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl Encode for Bytes {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        (self.len() as u32).encode(out);
        out.write(self.as_slice());
    }
}

impl Decode for Bytes {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let len = u32::decode(input)? as usize;
        if len > MAX_PAYLOAD_LEN {
            return Err(DecodeError::LengthOverflow);
        }
        let bytes = read_bytes(input, len)?;
        Ok(Bytes::new(bytes))
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(v: Vec<u8>) -> Self {
        Self::new(v)
    }
}

impl From<&[u8]> for Bytes {
    fn from(s: &[u8]) -> Self {
        Self::new(s)
    }
}

impl From<&str> for Bytes {
    fn from(s: &str) -> Self {
        Self::new(s.as_bytes())
    }
}

impl<const N: usize> From<&[u8; N]> for Bytes {
    fn from(arr: &[u8; N]) -> Self {
        Self::new(arr.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_format_is_u32_prefix_plus_raw() {
        let bytes = Bytes::new(b"abc".to_vec()).to_bytes();
        assert_eq!(&bytes[0..4], &3u32.to_le_bytes());
        assert_eq!(&bytes[4..], b"abc");
    }

    #[test]
    fn roundtrip() {
        let original = Bytes::new((0u8..=255).collect::<Vec<_>>());
        let decoded = Bytes::from_bytes(&original.to_bytes()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn empty_roundtrip() {
        let decoded = Bytes::from_bytes(&Bytes::empty().to_bytes()).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn clone_shares_storage() {
        let a = Bytes::new(vec![1, 2, 3]);
        let b = a.clone();
        assert_eq!(a.as_slice().as_ptr(), b.as_slice().as_ptr());
    }

    #[test]
    fn rejects_oversized_prefix() {
        let mut bytes = Vec::new();
        ((MAX_PAYLOAD_LEN + 1) as u32).encode(&mut bytes);
        assert_eq!(Bytes::from_bytes(&bytes), Err(DecodeError::LengthOverflow));
    }
}
