//! The chain service: block acceptance, orphan resolution, reorganization
//! and the best-chain view.
//!
//! Ownership is wired explicitly: the service owns the block store, the
//! state store, the block index and the best chain. A single mutex
//! serializes the whole accept pipeline (the single-writer rule); readers
//! get the published [`BestState`] through a read-write lock that the
//! accept path takes exclusively only around the tip swap, and tip events
//! through a bounded broadcast channel that drops old events for slow
//! subscribers.

use crate::core::account::Receipt;
use crate::core::block::{Block, Header, Proof};
use crate::core::block_index::{BestChain, BlockIndex, BlockStatus, NodeIdx};
use crate::core::consensus::ProofValidator;
use crate::core::errors::{ChainError, ValidateError};
use crate::core::executor::{ContractVm, Executor, GasPool};
use crate::core::genesis::{build_genesis_block, GenesisConfig};
use crate::core::params;
use crate::core::transaction::Transaction;
use crate::core::validator::BlockValidator;
use crate::crypto::key_pair::PublicKey;
use crate::storage::block_store::{BlockStore, ChainState};
use crate::storage::kv::{KvStore, StoreError};
use crate::storage::state_store::StateStore;
use crate::types::address::Address;
use crate::types::big::Big;
use crate::types::hash::Hash;
use crate::types::merkle_tree::MerkleTree;
use crate::{info, warn};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::broadcast;

/// Capacity of the event fan-out channel.
const EVENT_CAPACITY: usize = 1000;

/// Orphan pool bound; the oldest orphan is evicted beyond this.
const MAX_ORPHANS: usize = 1024;

/// Outcome of submitting a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accepted {
    /// The block extended or reorganized the best chain.
    pub main: bool,
    /// The block is parked until its parent arrives.
    pub orphan: bool,
}

/// Tip lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    NewTip { height: u64, hash: Hash },
    Detach { height: u64, hash: Hash },
}

/// Snapshot of the best chain, published for readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BestState {
    pub height: u64,
    pub hash: Hash,
    pub state_root: Hash,
    pub timestamp: u64,
}

/// Everything the single writer mutates, behind the accept lock.
struct ChainInner<S: KvStore> {
    block_store: BlockStore<S>,
    state: StateStore<S>,
    index: BlockIndex,
    best: BestChain,
    orphans: HashMap<Hash, Block>,
    /// parent hash → orphans waiting on it.
    prev_orphans: HashMap<Hash, Vec<Hash>>,
    orphan_order: VecDeque<Hash>,
}

/// The chain core service.
pub struct ChainService<S: KvStore, P: ProofValidator, V: ContractVm> {
    chain_id: u64,
    genesis_hash: Hash,
    proof_validator: P,
    executor: Executor<V>,
    inner: Mutex<ChainInner<S>>,
    best_state: RwLock<BestState>,
    events: broadcast::Sender<ChainEvent>,
    stopped: AtomicBool,
}

impl<S: KvStore, P: ProofValidator, V: ContractVm> ChainService<S, P, V> {
    /// Opens or bootstraps the chain: store → index → validator → executor.
    pub fn new(
        chain_id: u64,
        genesis: &GenesisConfig,
        db: Arc<S>,
        proof_validator: P,
        vm: V,
    ) -> Result<Self, ChainError> {
        let block_store = BlockStore::new(Arc::clone(&db));
        let mut state = StateStore::open(db)?;
        let mut index = BlockIndex::new();
        let mut best = BestChain::new();

        let best_state = match block_store.get_chain_state()? {
            Some(chain_state) => {
                Self::init_states(&block_store, &mut index, &mut best, &chain_state)?;
                let tip = index.node(best.tip().expect("tip set by init"));
                BestState {
                    height: tip.height,
                    hash: tip.hash,
                    state_root: state.state_root(),
                    timestamp: tip.header.timestamp,
                }
            }
            None => {
                state.begin();
                let genesis_block = build_genesis_block(genesis, chain_id, &mut state)?;
                state.record_journal(0);
                state.commit()?;

                let hash = genesis_block.hash();
                block_store.put_block(&genesis_block)?;
                let idx = index.add_node(
                    genesis_block.header.clone(),
                    BlockStatus::DATA_STORED | BlockStatus::VALID,
                );
                index.flush_to(&block_store)?;
                best.set_tip(idx);
                block_store.set_canonical(0, &hash)?;
                block_store.put_chain_state(&ChainState { hash, height: 0 })?;
                info!("created chain state from genesis {}", hash);

                BestState {
                    height: 0,
                    hash,
                    state_root: state.state_root(),
                    timestamp: genesis_block.header.timestamp,
                }
            }
        };

        let genesis_hash = block_store
            .canonical_hash(0)?
            .ok_or_else(|| StoreError::Corruption("missing genesis in height index".into()))?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            chain_id,
            genesis_hash,
            proof_validator,
            executor: Executor::new(vm),
            inner: Mutex::new(ChainInner {
                block_store,
                state,
                index,
                best,
                orphans: HashMap::new(),
                prev_orphans: HashMap::new(),
                orphan_order: VecDeque::new(),
            }),
            best_state: RwLock::new(best_state),
            events,
            stopped: AtomicBool::new(false),
        })
    }

    /// Reconstructs the index from stored nodes (ascending height) and
    /// points the best chain at the persisted tip, upgrading its ancestors
    /// to `Valid` for consistency.
    fn init_states(
        block_store: &BlockStore<S>,
        index: &mut BlockIndex,
        best: &mut BestChain,
        chain_state: &ChainState,
    ) -> Result<(), ChainError> {
        block_store.iter_block_nodes(&mut |node| {
            index.add_node(node.header, node.status);
            Ok(())
        })?;

        let tip = index.lookup(&chain_state.hash).ok_or_else(|| {
            StoreError::Corruption(format!("chain tip {} missing from block index", chain_state.hash))
        })?;
        best.set_tip(tip);

        let mut cursor = Some(tip);
        while let Some(idx) = cursor {
            if !index.status(idx).known_valid() {
                info!(
                    "upgrading tip ancestor {} at height {} to valid",
                    index.node(idx).hash,
                    index.node(idx).height
                );
                index.set_status_flags(idx, BlockStatus::VALID);
            }
            cursor = index.node(idx).parent;
        }
        index.flush_to(block_store)?;
        Ok(())
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn genesis_hash(&self) -> Hash {
        self.genesis_hash
    }

    /// The published best-chain snapshot.
    pub fn best_state(&self) -> BestState {
        *self.best_state.read().unwrap()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChainEvent> {
        self.events.subscribe()
    }

    /// Stops ingress, waits for the in-flight accept to finish, flushes
    /// the index.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let mut inner = self.inner.lock().unwrap();
        if let Err(err) = inner.index.flush_to(&inner.block_store) {
            warn!("failed to flush block index on shutdown: {}", err);
        }
        info!("chain service stopped at height {}", self.best_state().height);
    }

    // ── queries ────────────────────────────────────────────────────────

    pub fn get_block(&self, hash: &Hash) -> Result<Option<Block>, ChainError> {
        Ok(self.inner.lock().unwrap().block_store.get_block(hash)?)
    }

    pub fn get_block_by_height(&self, height: u64) -> Result<Option<Block>, ChainError> {
        Ok(self.inner.lock().unwrap().block_store.get_block_by_height(height)?)
    }

    pub fn get_receipts(&self, hash: &Hash) -> Result<Option<Vec<Receipt>>, ChainError> {
        Ok(self.inner.lock().unwrap().block_store.get_receipts(hash)?)
    }

    pub fn has_block(&self, hash: &Hash) -> bool {
        self.inner.lock().unwrap().index.lookup(hash).is_some()
    }

    pub fn get_balance(&self, addr: &Address) -> Big {
        self.inner.lock().unwrap().state.get_balance(addr)
    }

    pub fn get_nonce(&self, addr: &Address) -> u64 {
        self.inner.lock().unwrap().state.get_nonce(addr)
    }

    pub fn get_alias(&self, addr: &Address) -> Option<String> {
        self.inner.lock().unwrap().state.get_alias(addr)
    }

    pub fn alias_owner(&self, alias: &str) -> Option<Address> {
        self.inner.lock().unwrap().state.alias_owner(alias)
    }

    pub fn get_vote_credit(&self, addr: &Address) -> Big {
        self.inner.lock().unwrap().state.get_vote_credit(addr)
    }

    /// Cancelled credit of `addr` that has matured by `height` but has not
    /// yet been liquidated into the balance. Querying at
    /// `height + CHANGE_CYCLE` yields everything still parked, the
    /// "matured-cancel-pending" term of the supply equation.
    pub fn get_cancel_vote_credit_for_balance(&self, addr: &Address, height: u64) -> Big {
        self.inner
            .lock()
            .unwrap()
            .state
            .get_cancel_vote_credit_for_balance(addr, height)
    }

    pub fn get_candidates(&self) -> BTreeSet<Address> {
        self.inner.lock().unwrap().state.get_candidates()
    }

    // ── accept pipeline ────────────────────────────────────────────────

    /// Submits a block to the chain.
    ///
    /// Serialized end to end: for concurrently submitted blocks the final
    /// best chain depends only on cumulative height, with the earlier
    /// accepted block winning ties.
    pub fn process_block(&self, block: Block) -> Result<Accepted, ChainError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(ChainError::Stopped);
        }
        let mut inner = self.inner.lock().unwrap();
        if self.stopped.load(Ordering::SeqCst) {
            return Err(ChainError::Stopped);
        }

        let hash = block.hash();
        if inner.index.lookup(&hash).is_some() {
            return Err(ChainError::BlockExists);
        }
        if inner.orphans.contains_key(&hash) {
            return Err(ChainError::OrphanBlockExists);
        }

        if inner.index.lookup(&block.header.previous_hash).is_none() {
            Self::add_orphan(&mut inner, block);
            return Ok(Accepted {
                main: false,
                orphan: true,
            });
        }

        let main = self.accept_block(&mut inner, block)?;
        self.process_orphans(&mut inner, hash)?;

        info!("accepted block {} at height {}", hash, inner.index.node(inner.index.lookup(&hash).unwrap()).height);
        Ok(Accepted {
            main,
            orphan: false,
        })
    }

    fn add_orphan(inner: &mut ChainInner<S>, block: Block) {
        while inner.orphan_order.len() >= MAX_ORPHANS {
            if let Some(evicted) = inner.orphan_order.pop_front() {
                if let Some(old) = inner.orphans.remove(&evicted) {
                    if let Some(waiting) = inner.prev_orphans.get_mut(&old.header.previous_hash) {
                        waiting.retain(|h| *h != evicted);
                    }
                }
            }
        }
        let hash = block.hash();
        let parent = block.header.previous_hash;
        inner.orphan_order.push_back(hash);
        inner.prev_orphans.entry(parent).or_default().push(hash);
        inner.orphans.insert(hash, block);
        info!("parked orphan block {} waiting on {}", hash, parent);
    }

    /// Accepts any orphans that were waiting on newly connected blocks,
    /// cascading until none remain.
    fn process_orphans(&self, inner: &mut ChainInner<S>, hash: Hash) -> Result<(), ChainError> {
        let mut pending = vec![hash];
        while let Some(parent_hash) = pending.pop() {
            let Some(waiting) = inner.prev_orphans.remove(&parent_hash) else {
                continue;
            };
            for orphan_hash in waiting {
                let Some(orphan) = inner.orphans.remove(&orphan_hash) else {
                    continue;
                };
                inner.orphan_order.retain(|h| *h != orphan_hash);
                self.accept_block(inner, orphan)?;
                pending.push(orphan_hash);
            }
        }
        Ok(())
    }

    /// Persists and indexes a block whose parent is known, then connects,
    /// stores or reorganizes depending on where it lands.
    fn accept_block(&self, inner: &mut ChainInner<S>, block: Block) -> Result<bool, ChainError> {
        let hash = block.hash();
        inner.block_store.put_block(&block)?;
        let node_idx = inner.index.add_node(block.header.clone(), BlockStatus::DATA_STORED);
        inner.index.flush_to(&inner.block_store)?;

        let tip_idx = inner.best.tip().expect("best chain always has a tip");
        let tip_hash = inner.index.node(tip_idx).hash;
        let tip_height = inner.index.node(tip_idx).height;

        if block.header.previous_hash == tip_hash {
            // Extends the main chain.
            match self.connect_block(inner, &block) {
                Ok(()) => {
                    inner.index.set_status_flags(node_idx, BlockStatus::VALID);
                    inner.index.flush_to(&inner.block_store)?;
                    self.mark_state(inner, node_idx)?;
                    let _ = self.events.send(ChainEvent::NewTip {
                        height: block.header.height,
                        hash,
                    });
                    Ok(true)
                }
                Err(err) => {
                    inner.index.set_status_flags(node_idx, BlockStatus::VALIDATE_FAILED);
                    inner.index.flush_to(&inner.block_store)?;
                    Err(err)
                }
            }
        } else if block.header.height <= tip_height {
            info!("block {} stored on a side branch, no reorganize", hash);
            Ok(false)
        } else {
            let (detach, attach) = Self::reorganize_paths(inner, node_idx);
            if attach.is_empty() {
                // Invalid ancestry; the node was flagged inside the walk.
                inner.index.flush_to(&inner.block_store)?;
                return Ok(false);
            }
            info!("reorganize caused by block {} at height {}", hash, block.header.height);
            let result = self.reorganize(inner, detach, attach);
            inner.index.flush_to(&inner.block_store)?;
            result.map(|_| true)
        }
    }

    /// Validates and executes a block on top of the current state, then
    /// commits with its journal.
    fn connect_block(&self, inner: &mut ChainInner<S>, block: &Block) -> Result<(), ChainError> {
        let parent_idx = inner
            .index
            .lookup(&block.header.previous_hash)
            .expect("parent existence checked by caller");
        let parent_header = inner.index.node(parent_idx).header.clone();

        inner.state.begin();
        match self.validate_and_execute(&mut inner.state, block, &parent_header) {
            Ok(receipts) => {
                inner.state.record_journal(block.header.height);
                inner.state.commit()?;
                inner.block_store.put_receipts(&block.hash(), &receipts)?;
                Ok(())
            }
            Err(err) => {
                inner.state.discard();
                Err(err)
            }
        }
    }

    /// Sequential block checks: header rules, consensus proof, body root,
    /// execution with the gas-used comparison, rewards, state root.
    fn validate_and_execute(
        &self,
        state: &mut StateStore<S>,
        block: &Block,
        parent_header: &Header,
    ) -> Result<Vec<Receipt>, ChainError> {
        BlockValidator::verify_header(&block.header, parent_header)?;
        self.proof_validator.verify(block)?;
        BlockValidator::verify_body(block)?;

        let (receipts, fees, gas_used) = self.executor.execute_block(state, block);
        if Big::from(gas_used) != block.header.gas_used {
            return Err(ValidateError::GasUsedMismatch {
                header: block.header.gas_used.as_u64(),
                computed: gas_used,
            }
            .into());
        }
        self.executor.distribute_rewards(state, &block.header, fees);

        let computed = state.state_root();
        if computed != block.header.state_root {
            return Err(ValidateError::StateRootMismatch {
                header: block.header.state_root,
                computed,
            }
            .into());
        }
        Ok(receipts)
    }

    /// Computes the nodes to detach from the main chain (tip first) and to
    /// attach from the fork (ascending). Empty attach means the target has
    /// invalid ancestry.
    fn reorganize_paths(
        inner: &mut ChainInner<S>,
        node_idx: NodeIdx,
    ) -> (Vec<NodeIdx>, Vec<NodeIdx>) {
        let parent = inner.index.node(node_idx).parent;
        if let Some(parent_idx) = parent {
            if inner.index.status(parent_idx).known_invalid() {
                inner.index.set_status_flags(node_idx, BlockStatus::INVALID_ANCESTOR);
                return (Vec::new(), Vec::new());
            }
        }

        let fork = inner.best.find_fork(&inner.index, node_idx);

        let mut attach = Vec::new();
        let mut cursor = Some(node_idx);
        let mut invalid = false;
        while let Some(idx) = cursor {
            if fork == Some(idx) {
                break;
            }
            if inner.index.status(idx).known_invalid() {
                invalid = true;
                break;
            }
            attach.push(idx);
            cursor = inner.index.node(idx).parent;
        }
        if invalid {
            for idx in attach {
                inner.index.set_status_flags(idx, BlockStatus::INVALID_ANCESTOR);
            }
            return (Vec::new(), Vec::new());
        }
        attach.reverse();

        let mut detach = Vec::new();
        let mut cursor = inner.best.tip();
        while let Some(idx) = cursor {
            if fork == Some(idx) {
                break;
            }
            detach.push(idx);
            cursor = inner.index.node(idx).parent;
        }

        (detach, attach)
    }

    /// Rolls back to the fork, replays the attach branch in one state
    /// transaction verifying every state root, and retips. A failed replay
    /// restores the original chain and surfaces the failure.
    fn reorganize(
        &self,
        inner: &mut ChainInner<S>,
        detach: Vec<NodeIdx>,
        attach: Vec<NodeIdx>,
    ) -> Result<(), ChainError> {
        let fork_height = inner.index.node(attach[0]).height - 1;
        let old_height = inner.best.height(&inner.index);

        info!("reorganize: rolling state back to fork height {}", fork_height);
        inner.state.rollback_to(fork_height, old_height)?;

        match self.replay_branch(inner, &attach) {
            Ok(()) => {
                for idx in &detach {
                    let node = inner.index.node(*idx);
                    let _ = self.events.send(ChainEvent::Detach {
                        height: node.height,
                        hash: node.hash,
                    });
                }
                inner.block_store.truncate_canonical_above(fork_height)?;
                for idx in &attach {
                    inner.index.set_status_flags(*idx, BlockStatus::VALID);
                    let node = inner.index.node(*idx);
                    inner.block_store.set_canonical(node.height, &node.hash)?;
                }
                let new_tip = *attach.last().expect("attach verified non-empty");
                self.mark_state(inner, new_tip)?;
                let node = inner.index.node(new_tip);
                let _ = self.events.send(ChainEvent::NewTip {
                    height: node.height,
                    hash: node.hash,
                });
                Ok(())
            }
            Err(err) => {
                warn!("reorganize failed, restoring previous chain: {}", err);
                let restore: Vec<NodeIdx> = detach.into_iter().rev().collect();
                if !restore.is_empty() {
                    self.replay_branch(inner, &restore).map_err(|restore_err| {
                        StoreError::Corruption(format!(
                            "cannot restore chain after aborted reorganize: {}",
                            restore_err
                        ))
                    })?;
                }
                Err(err)
            }
        }
    }

    /// Replays already-stored blocks bottom-up inside one transaction.
    /// The first failing block is marked `ValidateFailed` and the whole
    /// transaction is discarded.
    fn replay_branch(&self, inner: &mut ChainInner<S>, nodes: &[NodeIdx]) -> Result<(), ChainError> {
        inner.state.begin();
        let mut receipts_by_block: Vec<(Hash, Vec<Receipt>)> = Vec::with_capacity(nodes.len());

        for idx in nodes {
            let node = inner.index.node(*idx);
            let (hash, height) = (node.hash, node.height);
            let parent_idx = node
                .parent
                .ok_or_else(|| StoreError::Corruption("attach node without parent".into()))?;
            let parent_header = inner.index.node(parent_idx).header.clone();

            let block = inner
                .block_store
                .get_block(&hash)?
                .ok_or(ChainError::BlockNotFound)?;

            match self.validate_and_execute(&mut inner.state, &block, &parent_header) {
                Ok(receipts) => {
                    inner.state.record_journal(height);
                    receipts_by_block.push((hash, receipts));
                    info!("reorganize: replayed block {} at height {}", hash, height);
                }
                Err(err) => {
                    inner.state.discard();
                    inner.index.set_status_flags(*idx, BlockStatus::VALIDATE_FAILED);
                    return Err(err);
                }
            }
        }

        inner.state.commit()?;
        for (hash, receipts) in receipts_by_block {
            inner.block_store.put_receipts(&hash, &receipts)?;
        }
        Ok(())
    }

    /// Advances the canonical pointers and publishes the new best state.
    fn mark_state(&self, inner: &mut ChainInner<S>, idx: NodeIdx) -> Result<(), ChainError> {
        let node = inner.index.node(idx);
        let (hash, height, timestamp) = (node.hash, node.height, node.header.timestamp);

        inner.block_store.set_canonical(height, &hash)?;
        inner.block_store.put_chain_state(&ChainState { hash, height })?;
        inner.best.set_tip(idx);

        *self.best_state.write().unwrap() = BestState {
            height,
            hash,
            state_root: inner.state.state_root(),
            timestamp,
        };
        Ok(())
    }

    // ── block generation ───────────────────────────────────────────────

    /// Builds a block template on the current tip by executing pending
    /// transactions against a scratch transaction that is discarded.
    ///
    /// The caller (the consensus engine) supplies the timestamp, signs the
    /// result into a [`Proof`] and feeds the block back through
    /// [`Self::process_block`].
    pub fn generate_template(
        &self,
        leader: PublicKey,
        minors: Vec<PublicKey>,
        pending: &[Transaction],
        timestamp: u64,
    ) -> Result<Block, ChainError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(ChainError::Stopped);
        }
        let mut inner = self.inner.lock().unwrap();
        let inner = &mut *inner;

        let tip_idx = inner.best.tip().expect("best chain always has a tip");
        let parent = inner.index.node(tip_idx).header.clone();
        let gas_limit = BlockValidator::next_gas_limit(&parent);

        let mut header = Header {
            version: params::VERSION,
            previous_hash: inner.index.node(tip_idx).hash,
            chain_id: self.chain_id,
            height: parent.height + 1,
            timestamp: timestamp.max(parent.timestamp + 1),
            gas_limit: Big::from(gas_limit),
            gas_used: Big::ZERO,
            state_root: Hash::zero(),
            tx_root: Hash::zero(),
            leader_pubkey: leader,
            minor_pubkeys: minors,
        };

        inner.state.begin();
        let mut pool = GasPool::new(gas_limit);
        let mut fees = Big::ZERO;
        let mut included = Vec::new();
        for tx in pending {
            match self
                .executor
                .execute_tx(&mut inner.state, &header, tx, &mut pool, &mut fees)
            {
                Ok(_) => included.push(tx.clone()),
                Err(err) => warn!("leaving tx {} out of template: {}", tx.hash(), err),
            }
        }
        self.executor.distribute_rewards(&mut inner.state, &header, fees);

        header.gas_used = Big::from(pool.used);
        header.state_root = inner.state.state_root();
        header.tx_root = MerkleTree::from_transactions(&included);
        inner.state.discard();

        Ok(Block::new(header, included, Proof::empty()))
    }
}
