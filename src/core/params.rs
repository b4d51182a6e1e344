//! Chain parameters and gas schedule.

use crate::types::big::Big;

/// Protocol version carried by every header and transaction.
pub const VERSION: u32 = 1;

/// Base units per coin.
pub const UNIT: u128 = 1_000_000_000_000_000_000;

/// Coins minted per block, before fees.
pub const REWARDS: u128 = 30;

/// Self-stake (in coins) required to stand as a block producer.
pub const PLEDGE_LIMIT: u128 = 1_000_000;

/// Blocks between a cancel-vote and its maturation into balance.
pub const CHANGE_CYCLE: u64 = 100;

/// Gas per transaction that does not create a contract.
pub const TX_GAS: u64 = 21_000;
/// Gas per contract-creating transaction.
pub const TX_GAS_CONTRACT_CREATION: u64 = 53_000;
/// Gas per zero byte of transaction payload.
pub const TX_DATA_ZERO_GAS: u64 = 4;
/// Gas per non-zero byte of transaction payload.
pub const TX_DATA_NON_ZERO_GAS: u64 = 68;
/// Gas per byte of a registered alias.
pub const ALIAS_GAS: u64 = 68;
/// Gas per byte of stored contract code.
pub const CREATE_DATA_GAS: u64 = 200;

/// Minimum block gas limit.
pub const MIN_GAS_LIMIT: u64 = 18_000_000;
/// Maximum block gas limit.
pub const MAX_GAS_LIMIT: u64 = 70_000_000;
/// Bound divisor for the per-block gas limit drift.
pub const GAS_LIMIT_BOUND_DIVISOR: u64 = 64;

/// Maximum contract bytecode size.
pub const MAX_CODE_SIZE: usize = 24_576;

/// Shortest permitted alias.
pub const ALIAS_MIN_LEN: usize = 5;
/// Longest permitted alias.
pub const ALIAS_MAX_LEN: usize = 20;

/// Converts whole coins to base units.
pub fn coins(n: u128) -> Big {
    Big(n * UNIT)
}

/// Block subsidy in base units.
pub fn block_reward() -> Big {
    coins(REWARDS)
}

/// Self-stake threshold, in base units, for candidate eligibility.
pub fn pledge_threshold() -> Big {
    coins(PLEDGE_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coin_conversions() {
        assert_eq!(coins(1), Big(UNIT));
        assert_eq!(block_reward(), Big(30 * UNIT));
        assert_eq!(pledge_threshold(), Big(1_000_000 * UNIT));
    }
}
