//! Pluggable consensus proof validation.
//!
//! The core never interprets a proof beyond handing it to one of these
//! validators: a solo signature for single-producer deployments, or a
//! bitmap multi-signature over a fixed producer set for BFT committees.

use crate::core::block::{Block, Proof};
use crate::core::errors::ValidateError;
use crate::crypto::key_pair::{PrivateKey, PublicKey, RecoverableSignature};
use crate::types::bytes::Bytes;
use crate::types::encoding::Decode;
use emberchain_derive::BinaryCodec;

/// Validates the consensus artifact attached to a block.
pub trait ProofValidator: Send + Sync {
    fn verify(&self, block: &Block) -> Result<(), ValidateError>;
}

/// Accepts every proof. Template construction and tests.
pub struct NoopProofValidator;

impl ProofValidator for NoopProofValidator {
    fn verify(&self, _block: &Block) -> Result<(), ValidateError> {
        Ok(())
    }
}

/// Single-producer proof: one recoverable signature by the block's leader
/// over the block hash.
pub struct SoloValidator {
    /// When set, only this producer may lead.
    producer: Option<PublicKey>,
}

impl SoloValidator {
    pub fn new() -> Self {
        Self { producer: None }
    }

    pub fn with_producer(producer: PublicKey) -> Self {
        Self {
            producer: Some(producer),
        }
    }

    /// Builds the proof for a block this node produced.
    pub fn sign(key: &PrivateKey, block: &Block) -> Proof {
        let sig = key.sign_hash(&block.hash());
        Proof(Bytes::new(sig.0.to_vec()))
    }
}

impl Default for SoloValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl ProofValidator for SoloValidator {
    fn verify(&self, block: &Block) -> Result<(), ValidateError> {
        if let Some(producer) = &self.producer {
            if block.header.leader_pubkey != *producer {
                return Err(ValidateError::InvalidProof);
            }
        }
        let sig = RecoverableSignature::from_bytes(block.proof.0.as_slice())
            .map_err(|_| ValidateError::InvalidProof)?;
        if !sig.verify(&block.hash(), &block.header.leader_pubkey) {
            return Err(ValidateError::InvalidProof);
        }
        Ok(())
    }
}

/// Bitmap multi-signature: one byte per producer, non-zero when that
/// producer signed, followed by the participants' signatures in producer
/// order.
#[derive(BinaryCodec, Clone, Debug, PartialEq, Eq)]
pub struct MultiSignature {
    pub bitmap: Vec<u8>,
    pub sigs: Vec<RecoverableSignature>,
}

/// Committee proof validation over a fixed, ordered producer set.
pub struct MultiSigValidator {
    producers: Vec<PublicKey>,
}

impl MultiSigValidator {
    pub fn new(producers: Vec<PublicKey>) -> Self {
        Self { producers }
    }

    /// Participants required: more than two thirds of the committee.
    fn quorum(&self) -> usize {
        self.producers.len() * 2 / 3 + 1
    }
}

impl ProofValidator for MultiSigValidator {
    fn verify(&self, block: &Block) -> Result<(), ValidateError> {
        let multisig = MultiSignature::from_bytes(block.proof.0.as_slice())
            .map_err(|_| ValidateError::InvalidProof)?;
        if multisig.bitmap.len() != self.producers.len() {
            return Err(ValidateError::InvalidProof);
        }

        let hash = block.hash();
        let mut participants = 0usize;
        let mut sigs = multisig.sigs.iter();
        let mut leader_signed = false;

        for (producer, bit) in self.producers.iter().zip(&multisig.bitmap) {
            if *bit == 0 {
                continue;
            }
            let sig = sigs.next().ok_or(ValidateError::InvalidProof)?;
            if !sig.verify(&hash, producer) {
                return Err(ValidateError::InvalidProof);
            }
            participants += 1;
            if *producer == block.header.leader_pubkey {
                leader_signed = true;
            }
        }

        if sigs.next().is_some() {
            return Err(ValidateError::InvalidProof);
        }
        if participants < self.quorum() || !leader_signed {
            return Err(ValidateError::InvalidProof);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::block::{Header, Proof};
    use crate::crypto::key_pair::PrivateKey;
    use crate::types::big::Big;
    use crate::types::bytes::Bytes;
    use crate::types::encoding::Encode;
    use crate::types::hash::Hash;

    fn block_led_by(leader: &PrivateKey) -> Block {
        let header = Header {
            version: 1,
            previous_hash: Hash::zero(),
            chain_id: 1,
            height: 1,
            timestamp: 1_700_000_000,
            gas_limit: Big(18_000_000),
            gas_used: Big::ZERO,
            state_root: Hash::zero(),
            tx_root: Hash::zero(),
            leader_pubkey: leader.public_key(),
            minor_pubkeys: vec![],
        };
        Block::new(header, vec![], Proof::empty())
    }

    #[test]
    fn solo_accepts_leader_signature() {
        let leader = PrivateKey::new();
        let mut block = block_led_by(&leader);
        block.proof = SoloValidator::sign(&leader, &block);
        assert!(SoloValidator::new().verify(&block).is_ok());
    }

    #[test]
    fn solo_rejects_foreign_signature() {
        let leader = PrivateKey::new();
        let imposter = PrivateKey::new();
        let mut block = block_led_by(&leader);
        block.proof = SoloValidator::sign(&imposter, &block);
        assert_eq!(
            SoloValidator::new().verify(&block),
            Err(ValidateError::InvalidProof)
        );
    }

    #[test]
    fn solo_rejects_malformed_proof() {
        let leader = PrivateKey::new();
        let mut block = block_led_by(&leader);
        block.proof = Proof(Bytes::new(vec![1, 2, 3]));
        assert_eq!(
            SoloValidator::new().verify(&block),
            Err(ValidateError::InvalidProof)
        );
    }

    #[test]
    fn solo_pins_configured_producer() {
        let leader = PrivateKey::new();
        let expected = PrivateKey::new();
        let mut block = block_led_by(&leader);
        block.proof = SoloValidator::sign(&leader, &block);
        assert_eq!(
            SoloValidator::with_producer(expected.public_key()).verify(&block),
            Err(ValidateError::InvalidProof)
        );
    }

    fn multisig_proof(block: &Block, signers: &[(&PrivateKey, bool)]) -> Proof {
        let hash = block.hash();
        let mut bitmap = Vec::new();
        let mut sigs = Vec::new();
        for (key, signs) in signers {
            bitmap.push(*signs as u8);
            if *signs {
                sigs.push(key.sign_hash(&hash));
            }
        }
        Proof(Bytes::new(MultiSignature { bitmap, sigs }.to_bytes()))
    }

    #[test]
    fn multisig_accepts_quorum_with_leader() {
        let keys: Vec<PrivateKey> = (0..4).map(|_| PrivateKey::new()).collect();
        let producers: Vec<PublicKey> = keys.iter().map(|k| k.public_key()).collect();
        let mut block = block_led_by(&keys[0]);
        block.proof = multisig_proof(
            &block,
            &[(&keys[0], true), (&keys[1], true), (&keys[2], true), (&keys[3], false)],
        );
        assert!(MultiSigValidator::new(producers).verify(&block).is_ok());
    }

    #[test]
    fn multisig_rejects_below_quorum() {
        let keys: Vec<PrivateKey> = (0..4).map(|_| PrivateKey::new()).collect();
        let producers: Vec<PublicKey> = keys.iter().map(|k| k.public_key()).collect();
        let mut block = block_led_by(&keys[0]);
        block.proof = multisig_proof(
            &block,
            &[(&keys[0], true), (&keys[1], true), (&keys[2], false), (&keys[3], false)],
        );
        assert_eq!(
            MultiSigValidator::new(producers).verify(&block),
            Err(ValidateError::InvalidProof)
        );
    }

    #[test]
    fn multisig_requires_leader_participation() {
        let keys: Vec<PrivateKey> = (0..4).map(|_| PrivateKey::new()).collect();
        let producers: Vec<PublicKey> = keys.iter().map(|k| k.public_key()).collect();
        let mut block = block_led_by(&keys[0]);
        block.proof = multisig_proof(
            &block,
            &[(&keys[0], false), (&keys[1], true), (&keys[2], true), (&keys[3], true)],
        );
        assert_eq!(
            MultiSigValidator::new(producers).verify(&block),
            Err(ValidateError::InvalidProof)
        );
    }

    #[test]
    fn multisig_rejects_wrong_bitmap_width() {
        let keys: Vec<PrivateKey> = (0..3).map(|_| PrivateKey::new()).collect();
        let producers: Vec<PublicKey> = keys.iter().map(|k| k.public_key()).collect();
        let mut block = block_led_by(&keys[0]);
        block.proof = multisig_proof(&block, &[(&keys[0], true), (&keys[1], true)]);
        assert_eq!(
            MultiSigValidator::new(producers).verify(&block),
            Err(ValidateError::InvalidProof)
        );
    }
}
