//! Account and stake records persisted in the state trie.

use crate::types::address::Address;
use crate::types::big::Big;
use crate::types::hash::Hash;
use emberchain_derive::BinaryCodec;
use std::collections::BTreeMap;

/// Canonical account state.
///
/// A zero account (all fields at default, no alias) is indistinguishable
/// from an absent one; [`Account::is_zero`] gates materialization so such
/// records are never written.
#[derive(BinaryCodec, Clone, Debug, PartialEq, Eq, Default)]
pub struct Account {
    /// Count of transactions accepted from this account.
    pub nonce: u64,
    /// Spendable balance in base units.
    pub balance: Big,
    /// Root of the contract storage trie; zero for accounts without storage.
    pub storage_root: Hash,
    /// Keccak-256 of the deployed bytecode; zero for externally owned
    /// accounts.
    pub code_hash: Hash,
    /// Human-readable name, unique chain-wide, immutable once set.
    pub alias: Option<String>,
}

impl Account {
    /// Creates an externally owned account holding `balance`.
    pub fn with_balance(balance: Big) -> Self {
        Account {
            balance,
            ..Account::default()
        }
    }

    pub fn is_contract(&self) -> bool {
        !self.code_hash.is_zero()
    }

    /// True when the record carries no information and must not be stored.
    pub fn is_zero(&self) -> bool {
        self.nonce == 0
            && self.balance.is_zero()
            && self.storage_root.is_zero()
            && self.code_hash.is_zero()
            && self.alias.is_none()
    }
}

/// Stake bookkeeping for one address.
///
/// `received_vote_credit` maps each voter to the credit it has delegated
/// here; `cancel_vote_credit` parks cancelled credit by the height of the
/// cancellation until it matures. Both maps are ordered so their encoding,
/// and therefore the state root, is independent of operation order.
#[derive(BinaryCodec, Clone, Debug, PartialEq, Eq, Default)]
pub struct StakeStorage {
    pub received_vote_credit: BTreeMap<Address, Big>,
    pub cancel_vote_credit: BTreeMap<u64, Big>,
}

impl StakeStorage {
    /// Total credit delegated to this address.
    pub fn total_received(&self) -> Big {
        self.received_vote_credit
            .values()
            .fold(Big::ZERO, |acc, v| acc.saturating_add(*v))
    }

    pub fn is_empty(&self) -> bool {
        self.received_vote_credit.is_empty() && self.cancel_vote_credit.is_empty()
    }
}

/// Execution outcome for one transaction.
#[derive(BinaryCodec, Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: Hash,
    pub gas_used: u64,
    /// False when the variant transition failed and only gas was charged.
    pub success: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::encoding::{Decode, Encode};

    #[test]
    fn default_account_is_zero() {
        assert!(Account::default().is_zero());
    }

    #[test]
    fn any_field_makes_account_nonzero() {
        assert!(!Account::with_balance(Big(1)).is_zero());

        let mut acct = Account::default();
        acct.nonce = 1;
        assert!(!acct.is_zero());

        let mut acct = Account::default();
        acct.alias = Some("genesis".to_string());
        assert!(!acct.is_zero());
    }

    #[test]
    fn account_codec_roundtrip() {
        let mut acct = Account::with_balance(Big(123_456));
        acct.nonce = 9;
        acct.alias = Some("satoshi1".to_string());
        let decoded = Account::from_bytes(&acct.to_bytes()).unwrap();
        assert_eq!(decoded, acct);
    }

    #[test]
    fn contract_detection() {
        let mut acct = Account::default();
        assert!(!acct.is_contract());
        acct.code_hash = Hash::digest(b"code");
        assert!(acct.is_contract());
    }

    #[test]
    fn stake_total_sums_all_voters() {
        let mut stake = StakeStorage::default();
        stake.received_vote_credit.insert(Address([1; 20]), Big(10));
        stake.received_vote_credit.insert(Address([2; 20]), Big(32));
        assert_eq!(stake.total_received(), Big(42));
    }

    #[test]
    fn stake_codec_roundtrip() {
        let mut stake = StakeStorage::default();
        stake.received_vote_credit.insert(Address([3; 20]), Big(7));
        stake.cancel_vote_credit.insert(12, Big(5));
        let decoded = StakeStorage::from_bytes(&stake.to_bytes()).unwrap();
        assert_eq!(decoded, stake);
    }

    #[test]
    fn stake_encoding_is_insertion_order_independent() {
        let mut a = StakeStorage::default();
        a.received_vote_credit.insert(Address([9; 20]), Big(1));
        a.received_vote_credit.insert(Address([1; 20]), Big(2));

        let mut b = StakeStorage::default();
        b.received_vote_credit.insert(Address([1; 20]), Big(2));
        b.received_vote_credit.insert(Address([9; 20]), Big(1));

        assert_eq!(a.to_bytes(), b.to_bytes());
    }
}
