//! Transactions: a typed operation plus a recoverable signature.

use crate::crypto::key_pair::{PrivateKey, PublicKey, RecoverableSignature};
use crate::types::address::Address;
use crate::types::big::Big;
use crate::types::bytes::Bytes;
use crate::types::encoding::Encode;
use crate::types::hash::{Hash, Lazy};
use emberchain_derive::BinaryCodec;

/// Operation performed by a transaction.
#[derive(Debug, Clone, Copy, Eq, PartialEq, BinaryCodec)]
pub enum TxType {
    /// Native value transfer.
    Transfer,
    /// Deploys the payload as contract code at a derived address.
    CreateContract,
    /// Invokes an existing contract with the payload as input.
    CallContract,
    /// Binds the payload string as the sender's permanent alias.
    SetAlias,
    /// Delegates `amount` of stake credit to `to` (or to the sender).
    Vote,
    /// Takes back previously delegated credit; matures after the change
    /// cycle.
    CancelVote,
    /// Registers the sender as a block producer with a self-stake pledge.
    Candidate,
    /// Withdraws the producer registration and cancels the self-stake.
    CancelCandidate,
}

/// The signed portion of a transaction.
///
/// The sender never appears here: it is recovered from the signature over
/// this structure's canonical encoding.
#[derive(Debug, Clone, PartialEq, Eq, BinaryCodec)]
pub struct TxData {
    pub tx_type: TxType,
    /// Chain this transaction is bound to; replay protection across chains.
    pub chain_id: u64,
    pub version: u32,
    /// Must equal the sender's account nonce plus one.
    pub nonce: u64,
    pub gas_price: Big,
    pub gas_limit: Big,
    /// Destination; absent for self-directed operations.
    pub to: Option<Address>,
    /// Value moved (Transfer, contract calls, Vote, Candidate) or the
    /// quantity operated on (CancelVote, CancelCandidate).
    pub amount: Option<Big>,
    /// Payload: contract code or input, or the alias string bytes.
    pub data: Bytes,
}

impl TxData {
    /// Digest that is signed: Keccak-256 of the canonical encoding.
    pub fn signing_hash(&self) -> Hash {
        let mut h = Hash::keccak();
        self.encode(&mut h);
        h.finalize()
    }

    pub fn amount_or_zero(&self) -> Big {
        self.amount.unwrap_or(Big::ZERO)
    }
}

/// A signed transaction with lazily computed hash and sender.
#[derive(Debug, Clone, PartialEq, Eq, BinaryCodec)]
pub struct Transaction {
    pub data: TxData,
    pub sig: RecoverableSignature,

    cached_hash: Lazy<Hash>,
    cached_sender: Lazy<Option<Address>>,
}

impl Transaction {
    /// Signs `data` with `key`.
    pub fn new(data: TxData, key: &PrivateKey) -> Self {
        let sig = key.sign_hash(&data.signing_hash());
        Transaction {
            data,
            sig,
            cached_hash: Lazy::new(),
            cached_sender: Lazy::new(),
        }
    }

    /// Wraps pre-built parts (wire decoding, tests).
    pub fn from_parts(data: TxData, sig: RecoverableSignature) -> Self {
        Transaction {
            data,
            sig,
            cached_hash: Lazy::new(),
            cached_sender: Lazy::new(),
        }
    }

    /// The transaction identifier: hash of the signed portion.
    pub fn hash(&self) -> Hash {
        self.cached_hash.get_or_compute(|| self.data.signing_hash())
    }

    /// Public key recovered from the signature, when recovery succeeds.
    pub fn recover_pubkey(&self) -> Option<PublicKey> {
        self.sig.recover(&self.hash())
    }

    /// Sender address recovered from the signature; cached after the first
    /// recovery.
    pub fn sender(&self) -> Option<Address> {
        self.cached_sender
            .get_or_compute(|| self.recover_pubkey().map(|pk| pk.address()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::encoding::Decode;

    const TEST_CHAIN_ID: u64 = 7;

    fn transfer_data(nonce: u64, to: Address, amount: u128) -> TxData {
        TxData {
            tx_type: TxType::Transfer,
            chain_id: TEST_CHAIN_ID,
            version: 1,
            nonce,
            gas_price: Big(1),
            gas_limit: Big(21_000),
            to: Some(to),
            amount: Some(Big(amount)),
            data: Bytes::empty(),
        }
    }

    #[test]
    fn sender_is_recovered_from_signature() {
        let key = PrivateKey::new();
        let tx = Transaction::new(transfer_data(1, Address([9; 20]), 10), &key);
        assert_eq!(tx.sender(), Some(key.public_key().address()));
    }

    #[test]
    fn tampering_changes_recovered_sender() {
        let key = PrivateKey::new();
        let tx = Transaction::new(transfer_data(1, Address([9; 20]), 10), &key);

        let mut tampered_data = tx.data.clone();
        tampered_data.amount = Some(Big(1_000_000));
        let tampered = Transaction::from_parts(tampered_data, tx.sig);

        assert_ne!(tampered.sender(), Some(key.public_key().address()));
    }

    #[test]
    fn hash_covers_only_signed_portion() {
        let key_a = PrivateKey::new();
        let key_b = PrivateKey::new();
        let data = transfer_data(1, Address([9; 20]), 10);
        let tx_a = Transaction::new(data.clone(), &key_a);
        let tx_b = Transaction::new(data, &key_b);
        // Same payload, different signers: identical id, different senders.
        assert_eq!(tx_a.hash(), tx_b.hash());
        assert_ne!(tx_a.sender(), tx_b.sender());
    }

    #[test]
    fn hash_is_deterministic() {
        let key = PrivateKey::new();
        let tx = Transaction::new(transfer_data(3, Address([1; 20]), 5), &key);
        assert_eq!(tx.hash(), tx.hash());
    }

    #[test]
    fn wire_roundtrip() {
        let key = PrivateKey::new();
        let mut data = transfer_data(2, Address([4; 20]), 77);
        data.data = Bytes::new(b"payload".to_vec());
        let tx = Transaction::new(data, &key);

        let decoded = Transaction::from_bytes(&tx.to_bytes()).unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(decoded.sender(), tx.sender());
    }

    #[test]
    fn wire_layout_starts_with_type_tag() {
        let key = PrivateKey::new();
        let tx = Transaction::new(transfer_data(1, Address([2; 20]), 1), &key);
        let bytes = tx.to_bytes();
        assert_eq!(bytes[0], 0); // Transfer tag
        // type:u8 ‖ chain_id:u64 little-endian
        assert_eq!(&bytes[1..9], &TEST_CHAIN_ID.to_le_bytes());
    }

    #[test]
    fn absent_to_and_amount_are_one_byte_tags() {
        let key = PrivateKey::new();
        let data = TxData {
            tx_type: TxType::CancelCandidate,
            chain_id: TEST_CHAIN_ID,
            version: 1,
            nonce: 1,
            gas_price: Big(1),
            gas_limit: Big(21_000),
            to: None,
            amount: None,
            data: Bytes::empty(),
        };
        let tx = Transaction::new(data, &key);
        let decoded = Transaction::from_bytes(&tx.to_bytes()).unwrap();
        assert_eq!(decoded.data.to, None);
        assert_eq!(decoded.data.amount, None);
    }
}
