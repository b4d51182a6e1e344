//! Typed, journaled view over the authenticated state trie.
//!
//! Every state mutation runs inside a transaction: writes are journaled in
//! order, applied to the in-memory trie immediately, buffered for the KV
//! store, and either flushed as one atomic batch on `commit` or undone in
//! reverse on `discard`. Sealed per-height journal segments are persisted
//! so `rollback_to` can reconstruct the exact trie at any retained height.
//!
//! Logical keys are preimages (`k/acct/<addr>`, `k/alias/<name>`, ...);
//! the trie key and the persisted leaf key are the Keccak-256 of the
//! preimage, stored under the `s/` namespace.

use crate::core::account::{Account, StakeStorage};
use crate::core::errors::TxError;
use crate::core::params;
use crate::storage::kv::{KvOp, KvSnapshot, KvStore, StoreError};
use crate::storage::state_trie::StateTrie;
use crate::types::address::Address;
use crate::types::big::Big;
use crate::types::encoding::{Decode, Encode};
use crate::types::hash::Hash;
use emberchain_derive::BinaryCodec;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// KV namespace for state-trie leaves.
const LEAF_PREFIX: &[u8] = b"s/";
/// KV namespace for per-height undo journals.
const JOURNAL_PREFIX: &[u8] = b"j/";

fn leaf_db_key(key: &Hash) -> Vec<u8> {
    let mut out = Vec::with_capacity(LEAF_PREFIX.len() + 32);
    out.extend_from_slice(LEAF_PREFIX);
    out.extend_from_slice(key.as_slice());
    out
}

fn journal_db_key(height: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(JOURNAL_PREFIX.len() + 8);
    out.extend_from_slice(JOURNAL_PREFIX);
    out.extend_from_slice(&height.to_be_bytes());
    out
}

fn account_key(addr: &Address) -> Hash {
    Hash::keccak().chain(b"k/acct/").chain(addr.as_slice()).finalize()
}

fn alias_key(alias: &str) -> Hash {
    Hash::keccak().chain(b"k/alias/").chain(alias.as_bytes()).finalize()
}

fn stake_key(addr: &Address) -> Hash {
    Hash::keccak().chain(b"k/stake/").chain(addr.as_slice()).finalize()
}

fn code_key(code_hash: &Hash) -> Hash {
    Hash::keccak().chain(b"k/code/").chain(code_hash.as_slice()).finalize()
}

fn alive_key(addr: &Address) -> Hash {
    Hash::keccak().chain(b"k/alive/").chain(addr.as_slice()).finalize()
}

fn candidates_key() -> Hash {
    Hash::digest(b"k/candidates")
}

fn contract_storage_key(addr: &Address, key: &Hash) -> Hash {
    Hash::keccak()
        .chain(b"k/cstore/")
        .chain(addr.as_slice())
        .chain(key.as_slice())
        .finalize()
}

/// Undo record for one journaled write.
#[derive(BinaryCodec, Clone, Debug, PartialEq, Eq)]
struct JournalEntry {
    key: Hash,
    /// Value before the write; `None` when the key was absent.
    prev: Option<Vec<u8>>,
}

/// An open state transaction.
struct StoreTxn {
    snapshot: Box<dyn KvSnapshot>,
    /// Final value per touched key; `None` marks a deletion.
    overlay: HashMap<Hash, Option<Vec<u8>>>,
    /// Undo entries in write order.
    journal: Vec<JournalEntry>,
    /// `(height, journal length)` at each sealed block boundary.
    seals: Vec<(u64, usize)>,
}

/// State store: trie ownership, transaction lifecycle, typed accessors.
///
/// Owned by the chain service's single writer; readers observe committed
/// state through the service's published snapshots.
pub struct StateStore<S: KvStore> {
    db: Arc<S>,
    trie: StateTrie,
    txn: Option<StoreTxn>,
}

impl<S: KvStore> StateStore<S> {
    /// Opens the store, rebuilding the trie from persisted leaves.
    pub fn open(db: Arc<S>) -> Result<Self, StoreError> {
        let mut leaves = Vec::new();
        db.iter_prefix(LEAF_PREFIX, &mut |key, value| {
            let key_hash = Hash::from_slice(&key[LEAF_PREFIX.len()..]).ok_or_else(|| {
                StoreError::Corruption("state leaf key is not a 32-byte hash".to_string())
            })?;
            leaves.push((key_hash, value.to_vec()));
            Ok(())
        })?;

        Ok(Self {
            db,
            trie: StateTrie::from_leaves(leaves),
            txn: None,
        })
    }

    /// Root of the trie, including any open transaction's writes.
    pub fn state_root(&self) -> Hash {
        self.trie.root()
    }

    pub fn in_txn(&self) -> bool {
        self.txn.is_some()
    }

    /// Starts a transaction; reads fall through to a snapshot captured now.
    pub fn begin(&mut self) {
        assert!(self.txn.is_none(), "nested state transactions are not supported");
        self.txn = Some(StoreTxn {
            snapshot: self.db.snapshot(),
            overlay: HashMap::new(),
            journal: Vec::new(),
            seals: Vec::new(),
        });
    }

    /// Seals the undo journal accumulated since the previous seal as the
    /// journal of `height`. Persisted on commit under `j/<height be>`.
    pub fn record_journal(&mut self, height: u64) {
        let txn = self.txn.as_mut().expect("record_journal requires an open transaction");
        txn.seals.push((height, txn.journal.len()));
    }

    /// Atomically flushes buffered writes and sealed journals.
    pub fn commit(&mut self) -> Result<(), StoreError> {
        let txn = self.txn.take().expect("commit requires an open transaction");

        let mut ops = Vec::with_capacity(txn.overlay.len() + txn.seals.len());
        // Sorted so the flushed batch is byte-for-byte reproducible.
        let mut finals: Vec<(&Hash, &Option<Vec<u8>>)> = txn.overlay.iter().collect();
        finals.sort_by_key(|(key, _)| **key);
        for (key, value) in finals {
            match value {
                Some(bytes) => ops.push(KvOp::Put {
                    key: leaf_db_key(key),
                    value: bytes.clone(),
                }),
                None => ops.push(KvOp::Delete { key: leaf_db_key(key) }),
            }
        }

        let mut start = 0usize;
        for (height, end) in &txn.seals {
            let segment: Vec<JournalEntry> = txn.journal[start..*end].to_vec();
            ops.push(KvOp::Put {
                key: journal_db_key(*height),
                value: segment.to_bytes(),
            });
            start = *end;
        }

        self.db.write_batch(ops)
    }

    /// Reverts the trie by undoing the journal in reverse; durable state is
    /// untouched.
    pub fn discard(&mut self) {
        let txn = self.txn.take().expect("discard requires an open transaction");
        for entry in txn.journal.iter().rev() {
            match &entry.prev {
                Some(value) => self.trie.insert(entry.key, value.clone()),
                None => self.trie.delete(entry.key),
            }
        }
    }

    /// Restores the exact state at `target` by replaying the inverse of
    /// every journal from `from` down to `target + 1`.
    pub fn rollback_to(&mut self, target: u64, from: u64) -> Result<(), StoreError> {
        assert!(self.txn.is_none(), "rollback requires no open transaction");
        for height in ((target + 1)..=from).rev() {
            let key = journal_db_key(height);
            let bytes = self
                .db
                .get(&key)?
                .ok_or_else(|| StoreError::Corruption(format!("missing journal for height {}", height)))?;
            let entries = Vec::<JournalEntry>::from_bytes(&bytes)
                .map_err(|_| StoreError::Corruption(format!("undecodable journal at height {}", height)))?;

            let mut ops = Vec::with_capacity(entries.len() + 1);
            for entry in entries.iter().rev() {
                match &entry.prev {
                    Some(value) => {
                        self.trie.insert(entry.key, value.clone());
                        ops.push(KvOp::Put {
                            key: leaf_db_key(&entry.key),
                            value: value.clone(),
                        });
                    }
                    None => {
                        self.trie.delete(entry.key);
                        ops.push(KvOp::Delete { key: leaf_db_key(&entry.key) });
                    }
                }
            }
            ops.push(KvOp::Delete { key });
            self.db.write_batch(ops)?;
        }
        Ok(())
    }

    /// Position in the open transaction's journal, for scoped reverts.
    pub fn checkpoint(&self) -> usize {
        self.txn
            .as_ref()
            .expect("checkpoint requires an open transaction")
            .journal
            .len()
    }

    /// Undoes every write made after `mark`, leaving earlier writes of the
    /// same transaction intact. Used to drop the effects of a failed
    /// transaction variant while keeping its gas charge.
    pub fn revert_to_checkpoint(&mut self, mark: usize) {
        let undone: Vec<JournalEntry> = {
            let txn = self.txn.as_mut().expect("revert requires an open transaction");
            let undone: Vec<JournalEntry> = txn.journal.drain(mark..).collect();
            for entry in undone.iter().rev() {
                txn.overlay.insert(entry.key, entry.prev.clone());
            }
            undone
        };
        for entry in undone.iter().rev() {
            match &entry.prev {
                Some(value) => self.trie.insert(entry.key, value.clone()),
                None => self.trie.delete(entry.key),
            }
        }
    }

    // ── raw access ─────────────────────────────────────────────────────

    fn get_raw(&self, key: &Hash) -> Option<Vec<u8>> {
        if let Some(txn) = &self.txn {
            if let Some(value) = txn.overlay.get(key) {
                return value.clone();
            }
            return txn.snapshot.get(&leaf_db_key(key));
        }
        self.trie.get(*key)
    }

    fn write_raw(&mut self, key: Hash, value: Option<Vec<u8>>) {
        let prev = self.get_raw(&key);
        let txn = self.txn.as_mut().expect("state writes require an open transaction");
        txn.journal.push(JournalEntry { key, prev });
        txn.overlay.insert(key, value.clone());
        match value {
            Some(bytes) => self.trie.insert(key, bytes),
            None => self.trie.delete(key),
        }
    }

    // ── accounts ───────────────────────────────────────────────────────

    pub fn get_account(&self, addr: &Address) -> Account {
        self.get_raw(&account_key(addr))
            .and_then(|bytes| Account::from_bytes(&bytes).ok())
            .unwrap_or_default()
    }

    /// Stores an account, deleting the key when the record is zero so an
    /// empty account is indistinguishable from an absent one.
    pub fn put_account(&mut self, addr: &Address, account: &Account) {
        let key = account_key(addr);
        if account.is_zero() {
            self.write_raw(key, None);
        } else {
            self.write_raw(key, Some(account.to_bytes()));
        }
    }

    pub fn get_balance(&self, addr: &Address) -> Big {
        self.get_account(addr).balance
    }

    pub fn add_balance(&mut self, addr: &Address, amount: Big) {
        let mut account = self.get_account(addr);
        account.balance = account.balance.saturating_add(amount);
        self.put_account(addr, &account);
    }

    pub fn sub_balance(&mut self, addr: &Address, amount: Big) -> Result<(), TxError> {
        let mut account = self.get_account(addr);
        account.balance = account
            .balance
            .checked_sub(amount)
            .ok_or(TxError::InsufficientBalance)?;
        self.put_account(addr, &account);
        Ok(())
    }

    pub fn get_nonce(&self, addr: &Address) -> u64 {
        self.get_account(addr).nonce
    }

    pub fn set_nonce(&mut self, addr: &Address, nonce: u64) {
        let mut account = self.get_account(addr);
        account.nonce = nonce;
        self.put_account(addr, &account);
    }

    pub fn get_code(&self, addr: &Address) -> Option<Vec<u8>> {
        let account = self.get_account(addr);
        if !account.is_contract() {
            return None;
        }
        self.get_raw(&code_key(&account.code_hash))
    }

    /// Stores contract code and points the account at its hash.
    pub fn put_code(&mut self, addr: &Address, code: &[u8]) {
        let code_hash = Hash::digest(code);
        self.write_raw(code_key(&code_hash), Some(code.to_vec()));
        let mut account = self.get_account(addr);
        account.code_hash = code_hash;
        self.put_account(addr, &account);
    }

    // ── aliases ────────────────────────────────────────────────────────

    pub fn get_alias(&self, addr: &Address) -> Option<String> {
        self.get_account(addr).alias
    }

    /// Reverse lookup: the address an alias is bound to.
    pub fn alias_owner(&self, alias: &str) -> Option<Address> {
        self.get_raw(&alias_key(alias))
            .and_then(|bytes| Address::from_slice(&bytes))
    }

    /// Binds `alias` to `addr`, enforcing format, uniqueness and
    /// immutability.
    pub fn set_alias(&mut self, addr: &Address, alias: &str) -> Result<(), TxError> {
        if alias.len() < params::ALIAS_MIN_LEN {
            return Err(TxError::AliasTooShort);
        }
        if alias.len() > params::ALIAS_MAX_LEN {
            return Err(TxError::AliasTooLong);
        }
        if !alias.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(TxError::AliasUnsupportedChar);
        }

        let mut account = self.get_account(addr);
        if account.alias.is_some() {
            return Err(TxError::AliasImmutable);
        }
        if self.alias_owner(alias).is_some() {
            return Err(TxError::AliasExists);
        }

        self.write_raw(alias_key(alias), Some(addr.as_slice().to_vec()));
        account.alias = Some(alias.to_string());
        self.put_account(addr, &account);
        Ok(())
    }

    // ── stake ──────────────────────────────────────────────────────────

    pub fn get_stake(&self, addr: &Address) -> StakeStorage {
        self.get_raw(&stake_key(addr))
            .and_then(|bytes| StakeStorage::from_bytes(&bytes).ok())
            .unwrap_or_default()
    }

    fn put_stake(&mut self, addr: &Address, stake: &StakeStorage) {
        let key = stake_key(addr);
        if stake.is_empty() {
            self.write_raw(key, None);
        } else {
            self.write_raw(key, Some(stake.to_bytes()));
        }
    }

    /// Delegates `amount` of credit from `from` to `to`.
    ///
    /// The first credit from a given voter registers `to` in the candidate
    /// set, as does a self-vote whose running total reaches the pledge.
    pub fn vote_credit(&mut self, from: &Address, to: &Address, amount: Big) {
        let mut stake = self.get_stake(to);
        let first_credit = !stake.received_vote_credit.contains_key(from);

        let total = stake
            .received_vote_credit
            .get(from)
            .copied()
            .unwrap_or(Big::ZERO)
            .saturating_add(amount);
        stake.received_vote_credit.insert(*from, total);
        self.put_stake(to, &stake);

        if first_credit {
            self.add_candidate(to);
        }
        if from == to && total >= params::pledge_threshold() {
            self.add_candidate(to);
        }
    }

    /// Takes back `amount` of the `from → to` credit, parking it on `from`
    /// under the cancellation height until it matures.
    pub fn cancel_vote_credit(
        &mut self,
        from: &Address,
        to: &Address,
        amount: Big,
        height: u64,
    ) -> Result<(), TxError> {
        let mut stake = self.get_stake(to);
        let credit = *stake
            .received_vote_credit
            .get(from)
            .ok_or(TxError::VoteCreditNotEnough)?;
        let remaining = credit.checked_sub(amount).ok_or(TxError::VoteCreditNotEnough)?;

        if remaining.is_zero() {
            stake.received_vote_credit.remove(from);
        } else {
            stake.received_vote_credit.insert(*from, remaining);
        }

        if from == to && remaining < params::pledge_threshold() {
            self.del_candidate(to);
        }

        if from == to {
            let parked = stake
                .cancel_vote_credit
                .get(&height)
                .copied()
                .unwrap_or(Big::ZERO)
                .saturating_add(amount);
            stake.cancel_vote_credit.insert(height, parked);
            self.put_stake(to, &stake);
        } else {
            self.put_stake(to, &stake);
            let mut from_stake = self.get_stake(from);
            let parked = from_stake
                .cancel_vote_credit
                .get(&height)
                .copied()
                .unwrap_or(Big::ZERO)
                .saturating_add(amount);
            from_stake.cancel_vote_credit.insert(height, parked);
            self.put_stake(from, &from_stake);
        }
        Ok(())
    }

    /// Total credit delegated to `addr`.
    pub fn get_vote_credit(&self, addr: &Address) -> Big {
        self.get_stake(addr).total_received()
    }

    /// Cancelled credit that has matured by `height` but is not yet
    /// liquidated.
    pub fn get_cancel_vote_credit_for_balance(&self, addr: &Address, height: u64) -> Big {
        self.get_stake(addr)
            .cancel_vote_credit
            .iter()
            .filter(|(cancel_height, _)| height >= **cancel_height + params::CHANGE_CYCLE)
            .fold(Big::ZERO, |acc, (_, amount)| acc.saturating_add(*amount))
    }

    /// Moves matured cancellations back into the balance and returns the
    /// liquidated total.
    pub fn liquidate_matured_cancellations(&mut self, addr: &Address, height: u64) -> Big {
        let mut stake = self.get_stake(addr);
        let mut total = Big::ZERO;
        let matured: Vec<u64> = stake
            .cancel_vote_credit
            .iter()
            .filter(|(cancel_height, _)| height >= **cancel_height + params::CHANGE_CYCLE)
            .map(|(cancel_height, _)| *cancel_height)
            .collect();

        if matured.is_empty() {
            return Big::ZERO;
        }
        for cancel_height in matured {
            if let Some(amount) = stake.cancel_vote_credit.remove(&cancel_height) {
                total = total.saturating_add(amount);
            }
        }
        self.put_stake(addr, &stake);
        self.add_balance(addr, total);
        total
    }

    pub fn get_candidates(&self) -> BTreeSet<Address> {
        self.get_raw(&candidates_key())
            .and_then(|bytes| BTreeSet::<Address>::from_bytes(&bytes).ok())
            .unwrap_or_default()
    }

    fn add_candidate(&mut self, addr: &Address) {
        let mut candidates = self.get_candidates();
        if candidates.insert(*addr) {
            self.write_raw(candidates_key(), Some(candidates.to_bytes()));
        }
    }

    fn del_candidate(&mut self, addr: &Address) {
        let mut candidates = self.get_candidates();
        if candidates.remove(addr) {
            let value = if candidates.is_empty() {
                None
            } else {
                Some(candidates.to_bytes())
            };
            self.write_raw(candidates_key(), value);
        }
    }

    // ── contract storage ───────────────────────────────────────────────

    pub fn get_contract_storage(&self, addr: &Address, key: &Hash) -> Option<Vec<u8>> {
        self.get_raw(&contract_storage_key(addr, key))
    }

    pub fn set_contract_storage(&mut self, addr: &Address, key: &Hash, value: Option<Vec<u8>>) {
        self.write_raw(contract_storage_key(addr, key), value);
    }

    // ── producer liveness ──────────────────────────────────────────────

    pub fn get_alive_count(&self, addr: &Address) -> u64 {
        self.get_raw(&alive_key(addr))
            .and_then(|bytes| u64::from_bytes(&bytes).ok())
            .unwrap_or(0)
    }

    /// Bumps the produced-block counter for a leader.
    pub fn increment_alive_count(&mut self, addr: &Address) {
        let count = self.get_alive_count(addr) + 1;
        self.write_raw(alive_key(addr), Some(count.to_bytes()));
    }
}
