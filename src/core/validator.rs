//! Header and body validation rules.
//!
//! Proof verification is delegated to [`crate::core::consensus`]; execution
//! and the gas/state-root comparisons run in the chain service, which owns
//! the state.

use crate::core::block::{Block, Header};
use crate::core::errors::ValidateError;
use crate::core::params;

/// Stateless consensus-rule checks.
pub struct BlockValidator;

impl BlockValidator {
    /// Checks a header against its parent; stops at the first violation.
    pub fn verify_header(header: &Header, parent: &Header) -> Result<(), ValidateError> {
        if header.height != parent.height + 1 {
            return Err(ValidateError::InvalidBlockNumber {
                expected: parent.height + 1,
                actual: header.height,
            });
        }
        if header.timestamp <= parent.timestamp {
            return Err(ValidateError::InvalidTimestamp);
        }
        if header.chain_id != parent.chain_id {
            return Err(ValidateError::ChainIdMismatch);
        }
        if header.version != parent.version {
            return Err(ValidateError::VersionMismatch);
        }
        if header.previous_hash != parent.compute_hash() {
            return Err(ValidateError::PreHashMismatch);
        }

        let gas_limit = header.gas_limit.as_u64();
        if header.gas_limit.overflows_u64()
            || !(params::MIN_GAS_LIMIT..=params::MAX_GAS_LIMIT).contains(&gas_limit)
        {
            return Err(ValidateError::GasLimitOutOfBounds(gas_limit));
        }
        let parent_limit = parent.gas_limit.as_u64();
        let delta = gas_limit.abs_diff(parent_limit);
        if delta > parent_limit / params::GAS_LIMIT_BOUND_DIVISOR {
            return Err(ValidateError::GasLimitOutOfBounds(gas_limit));
        }
        Ok(())
    }

    /// Recomputes the tx-root over the body.
    pub fn verify_body(block: &Block) -> Result<(), ValidateError> {
        if block.compute_tx_root() != block.header.tx_root {
            return Err(ValidateError::TxRootMismatch);
        }
        Ok(())
    }

    /// Gas limit for a child of `parent`: unchanged, which is always inside
    /// the allowed drift.
    pub fn next_gas_limit(parent: &Header) -> u64 {
        parent.gas_limit.as_u64()
    }
}
