//! secp256k1 key pairs with recoverable ECDSA signatures.
//!
//! Transactions never carry their sender: the 65-byte `r ‖ s ‖ v` signature
//! recovers the signing public key from the signed digest, and the sender
//! address is derived from that key.

use crate::types::address::{decode_hex, Address, ADDRESS_LEN};
use crate::types::encoding::{read_bytes, Decode, DecodeError, Encode, EncodeSink};
use crate::types::hash::Hash;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use rand_core::OsRng;
use std::fmt;

/// Length of a recoverable signature: 64 bytes of `r ‖ s` plus the recovery
/// id byte.
pub const SIGNATURE_LEN: usize = 65;

/// Length of a SEC1-compressed public key.
pub const PUBKEY_LEN: usize = 33;

/// Private signing key.
///
/// Generated from OS entropy; never serialized by this crate.
#[derive(Clone)]
pub struct PrivateKey {
    key: SigningKey,
}

impl PrivateKey {
    /// Generates a fresh random key.
    pub fn new() -> Self {
        Self {
            key: SigningKey::random(&mut OsRng),
        }
    }

    /// Builds a key from raw scalar bytes; `None` when the bytes are not a
    /// valid secp256k1 scalar.
    pub fn from_bytes(bytes: &[u8; 32]) -> Option<Self> {
        SigningKey::from_slice(bytes).ok().map(|key| Self { key })
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            key: *self.key.verifying_key(),
        }
    }

    /// Signs a 32-byte digest, producing a recoverable signature.
    pub fn sign_hash(&self, hash: &Hash) -> RecoverableSignature {
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(hash.as_slice())
            .expect("signing a 32-byte digest with a valid key cannot fail");
        let mut bytes = [0u8; SIGNATURE_LEN];
        bytes[..64].copy_from_slice(&signature.to_bytes());
        bytes[64] = recovery_id.to_byte();
        RecoverableSignature(bytes)
    }
}

impl Default for PrivateKey {
    fn default() -> Self {
        Self::new()
    }
}

/// Public key used for proof validation and address derivation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PublicKey {
    key: VerifyingKey,
}

impl PublicKey {
    /// Derives the account address: the last 20 bytes of the Keccak-256
    /// digest of the uncompressed curve point without its `0x04` tag.
    pub fn address(&self) -> Address {
        let point = self.key.to_encoded_point(false);
        let digest = Hash::digest(&point.as_bytes()[1..]);
        let mut addr = [0u8; ADDRESS_LEN];
        addr.copy_from_slice(&digest.as_slice()[12..]);
        Address(addr)
    }

    /// SEC1-compressed form, the wire representation.
    pub fn to_compressed(&self) -> [u8; PUBKEY_LEN] {
        let point = self.key.to_encoded_point(true);
        let mut bytes = [0u8; PUBKEY_LEN];
        bytes.copy_from_slice(point.as_bytes());
        bytes
    }

    pub fn from_sec1(bytes: &[u8]) -> Option<PublicKey> {
        VerifyingKey::from_sec1_bytes(bytes).ok().map(|key| PublicKey { key })
    }

    /// Parses a `0x`-prefixed compressed-point hex string (genesis config).
    pub fn from_hex(s: &str) -> Option<PublicKey> {
        let hex = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
        Self::from_sec1(&decode_hex(hex)?)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x")?;
        for byte in self.to_compressed() {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl Encode for PublicKey {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        out.write(&self.to_compressed());
    }
}

impl Decode for PublicKey {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let bytes = read_bytes(input, PUBKEY_LEN)?;
        PublicKey::from_sec1(bytes).ok_or(DecodeError::InvalidValue)
    }
}

/// 65-byte recoverable ECDSA signature (`r ‖ s ‖ v`).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RecoverableSignature(pub [u8; SIGNATURE_LEN]);

impl RecoverableSignature {
    /// A structurally valid placeholder used by unsigned templates.
    pub fn empty() -> Self {
        RecoverableSignature([0u8; SIGNATURE_LEN])
    }

    /// Recovers the signing public key from the signed digest.
    ///
    /// Returns `None` when the signature bytes are malformed or do not
    /// resolve to a curve point for this digest.
    pub fn recover(&self, hash: &Hash) -> Option<PublicKey> {
        let signature = Signature::from_slice(&self.0[..64]).ok()?;
        let recovery_id = RecoveryId::from_byte(self.0[64])?;
        VerifyingKey::recover_from_prehash(hash.as_slice(), &signature, recovery_id)
            .ok()
            .map(|key| PublicKey { key })
    }

    /// Convenience check that `hash` was signed by `expected`.
    pub fn verify(&self, hash: &Hash, expected: &PublicKey) -> bool {
        self.recover(hash).is_some_and(|pk| pk == *expected)
    }
}

impl fmt::Debug for RecoverableSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecoverableSignature(0x")?;
        for byte in &self.0[..8] {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, "…)")
    }
}

impl Encode for RecoverableSignature {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        out.write(&self.0);
    }
}

impl Decode for RecoverableSignature {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let bytes = read_bytes(input, SIGNATURE_LEN)?;
        let mut sig = [0u8; SIGNATURE_LEN];
        sig.copy_from_slice(bytes);
        Ok(RecoverableSignature(sig))
    }
}
