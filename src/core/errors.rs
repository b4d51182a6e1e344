//! Error taxonomy of the chain core.
//!
//! Three layers: [`ValidateError`] for block-level validation,
//! [`TxError`] for per-transaction failures, and [`ChainError`] for the
//! accept pipeline. Storage infrastructure errors live in
//! [`crate::storage::kv::StoreError`] and are wrapped here.
//!
//! Transaction errors invalidate only the offending transaction; they fail
//! a block solely through the gas-used or state-root checks. Validation
//! errors mark the block node `ValidateFailed` but keep the block stored
//! for diagnostic replay. Storage corruption is fatal to the service.

use crate::storage::kv::StoreError;
use crate::types::hash::Hash;
use emberchain_derive::Error;

/// Block-level validation failures.
#[derive(Debug, PartialEq, Eq, Error)]
pub enum ValidateError {
    #[error("timestamp not after parent's")]
    InvalidTimestamp,
    #[error("invalid block number: expected {expected}, got {actual}")]
    InvalidBlockNumber { expected: u64, actual: u64 },
    #[error("previous hash not matched")]
    PreHashMismatch,
    #[error("chain id not matched")]
    ChainIdMismatch,
    #[error("version not matched")]
    VersionMismatch,
    #[error("consensus proof verification failed")]
    InvalidProof,
    #[error("tx root not matched")]
    TxRootMismatch,
    #[error("state root not matched: header {header}, computed {computed}")]
    StateRootMismatch { header: Hash, computed: Hash },
    #[error("gas limit out of bounds: {0}")]
    GasLimitOutOfBounds(u64),
    #[error("gas used not matched: header {header}, computed {computed}")]
    GasUsedMismatch { header: u64, computed: u64 },
}

/// Per-transaction failures.
#[derive(Debug, PartialEq, Eq, Error)]
pub enum TxError {
    #[error("signature recovery failed")]
    BadSignature,
    #[error("tx chain id not matched")]
    ChainIdMismatch,
    #[error("nonce too low: expected {expected}, got {actual}")]
    NonceTooLow { expected: u64, actual: u64 },
    #[error("nonce too high: expected {expected}, got {actual}")]
    NonceTooHigh { expected: u64, actual: u64 },
    #[error("negative amount in tx")]
    NegativeAmount,
    #[error("intrinsic gas too low: need {needed}, limit {limit}")]
    IntrinsicGasTooLow { needed: u64, limit: u64 },
    #[error("insufficient balance to pay for gas")]
    InsufficientBalanceForGas,
    #[error("not enough balance")]
    InsufficientBalance,
    #[error("gas in tx would exceed the block gas limit")]
    ExceedBlockGasLimit,
    #[error("not support transaction type")]
    UnsupportedTxType,
    #[error("alias already registered")]
    AliasExists,
    #[error("alias too short")]
    AliasTooShort,
    #[error("alias too long")]
    AliasTooLong,
    #[error("alias only supports numbers and letters")]
    AliasUnsupportedChar,
    #[error("alias already set for this address")]
    AliasImmutable,
    #[error("vote credit not enough")]
    VoteCreditNotEnough,
    #[error("self stake below the candidate pledge")]
    CandidatePledgeNotEnough,
    #[error("contract code exceeds the maximum size")]
    CodeTooLarge,
    #[error("contract execution failed: {0}")]
    VmFailed(String),
}

/// Accept-pipeline and service-level failures.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("already have block")]
    BlockExists,
    #[error("already have block (orphan)")]
    OrphanBlockExists,
    #[error("block not exist")]
    BlockNotFound,
    #[error("genesis producer set is empty or invalid")]
    GenesisProducerNotFound,
    #[error("genesis configuration is invalid")]
    InvalidGenesisConfig,
    #[error("service is stopped")]
    Stopped,
    #[error("{0}")]
    Validate(ValidateError),
    #[error("{0}")]
    Tx(TxError),
    #[error("{0}")]
    Store(StoreError),
}

impl From<ValidateError> for ChainError {
    fn from(err: ValidateError) -> Self {
        ChainError::Validate(err)
    }
}

impl From<TxError> for ChainError {
    fn from(err: TxError) -> Self {
        ChainError::Tx(err)
    }
}

impl From<StoreError> for ChainError {
    fn from(err: StoreError) -> Self {
        ChainError::Store(err)
    }
}
