//! Genesis configuration and block construction.

use crate::core::block::{Block, Header, Proof};
use crate::core::errors::ChainError;
use crate::core::params;
use crate::crypto::key_pair::PublicKey;
use crate::storage::kv::KvStore;
use crate::storage::state_store::StateStore;
use crate::types::address::Address;
use crate::types::big::Big;
use crate::types::hash::Hash;
use serde::Deserialize;

/// Pre-mined allocation.
#[derive(Debug, Clone, Deserialize)]
pub struct Preminer {
    /// Hex account address.
    pub addr: String,
    /// Balance in base units.
    pub value: u128,
}

/// Genesis parameters, read from the `--genesis` JSON file.
///
/// ```json
/// {
///   "preminer": [{"addr": "0x…", "value": 10000000000000000000}],
///   "producers": ["0x<33-byte compressed pubkey hex>"],
///   "timestamp": 1700000000
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct GenesisConfig {
    #[serde(default)]
    pub preminer: Vec<Preminer>,
    pub producers: Vec<String>,
    #[serde(default)]
    pub timestamp: u64,
}

impl GenesisConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Parses and validates the producer set; the first entry leads the
    /// genesis block.
    pub fn producer_keys(&self) -> Result<Vec<PublicKey>, ChainError> {
        let keys: Option<Vec<PublicKey>> =
            self.producers.iter().map(|hex| PublicKey::from_hex(hex)).collect();
        let keys = keys.ok_or(ChainError::GenesisProducerNotFound)?;
        if keys.is_empty() {
            return Err(ChainError::GenesisProducerNotFound);
        }
        Ok(keys)
    }

    fn allocations(&self) -> Result<Vec<(Address, Big)>, ChainError> {
        self.preminer
            .iter()
            .map(|entry| {
                entry
                    .addr
                    .parse::<Address>()
                    .map(|addr| (addr, Big(entry.value)))
                    .map_err(|_| ChainError::InvalidGenesisConfig)
            })
            .collect()
    }
}

/// Applies the pre-mine and builds the deterministic genesis block.
///
/// Runs inside an open state transaction; the caller seals the journal for
/// height zero and commits.
pub fn build_genesis_block<S: KvStore>(
    config: &GenesisConfig,
    chain_id: u64,
    store: &mut StateStore<S>,
) -> Result<Block, ChainError> {
    let producers = config.producer_keys()?;
    for (addr, value) in config.allocations()? {
        store.add_balance(&addr, value);
    }

    let header = Header {
        version: params::VERSION,
        previous_hash: Hash::zero(),
        chain_id,
        height: 0,
        timestamp: config.timestamp,
        gas_limit: Big(params::MIN_GAS_LIMIT as u128),
        gas_used: Big::ZERO,
        state_root: store.state_root(),
        tx_root: Hash::zero(),
        leader_pubkey: producers[0],
        minor_pubkeys: producers[1..].to_vec(),
    };
    Ok(Block::new(header, vec![], Proof::empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::key_pair::PrivateKey;
    use crate::storage::kv::MemoryKv;
    use std::sync::Arc;

    fn config_with(preminer: Vec<Preminer>) -> GenesisConfig {
        GenesisConfig {
            preminer,
            producers: vec![PrivateKey::new().public_key().to_string()],
            timestamp: 1_700_000_000,
        }
    }

    #[test]
    fn parses_genesis_json() {
        let producer = PrivateKey::new().public_key();
        let json = format!(
            r#"{{"preminer": [{{"addr": "0x0101010101010101010101010101010101010101", "value": 1000}}],
                 "producers": ["{}"], "timestamp": 42}}"#,
            producer
        );
        let config = GenesisConfig::from_json(&json).unwrap();
        assert_eq!(config.preminer.len(), 1);
        assert_eq!(config.preminer[0].value, 1000);
        assert_eq!(config.timestamp, 42);
        assert_eq!(config.producer_keys().unwrap(), vec![producer]);
    }

    #[test]
    fn empty_producer_set_is_rejected() {
        let config = GenesisConfig {
            preminer: vec![],
            producers: vec![],
            timestamp: 0,
        };
        assert!(matches!(
            config.producer_keys(),
            Err(ChainError::GenesisProducerNotFound)
        ));
    }

    #[test]
    fn genesis_block_commits_the_premine() {
        let mut store = StateStore::open(Arc::new(MemoryKv::new())).unwrap();
        store.begin();

        let rich = Address([7; 20]);
        let config = config_with(vec![Preminer {
            addr: rich.to_string(),
            value: params::UNIT * 1000,
        }]);
        let block = build_genesis_block(&config, 9, &mut store).unwrap();

        assert_eq!(block.header.height, 0);
        assert_eq!(block.header.chain_id, 9);
        assert_eq!(block.header.previous_hash, Hash::zero());
        assert_eq!(block.header.state_root, store.state_root());
        assert_eq!(store.get_balance(&rich), params::coins(1000));
    }

    #[test]
    fn genesis_is_deterministic() {
        let config = config_with(vec![Preminer {
            addr: Address([3; 20]).to_string(),
            value: 500,
        }]);

        let mut store_a = StateStore::open(Arc::new(MemoryKv::new())).unwrap();
        store_a.begin();
        let a = build_genesis_block(&config, 1, &mut store_a).unwrap();

        let mut store_b = StateStore::open(Arc::new(MemoryKv::new())).unwrap();
        store_b.begin();
        let b = build_genesis_block(&config, 1, &mut store_b).unwrap();

        assert_eq!(a.hash(), b.hash());
    }
}
