//! Pure validation predicates over headers and reward amounts.
//!
//! The engine is an injected capability so that alternative algorithms, or
//! trivial engines in tests, can be swapped in without touching the block
//! processor.

pub mod pow;

use std::fmt::{self, Display, Formatter};

use crate::types::basic::{Amount, BlockHeight, CryptoHash, Difficulty};
use crate::types::block::BlockHeader;

pub use pow::PowEngine;

/// Consensus-rule checks consumed by the block processor. Both predicates
/// are referentially transparent and perform no I/O.
pub trait ConsensusEngine: Send + Sync + 'static {
    /// Validates `header` against the consensus rules, in particular its
    /// proof of work.
    fn validate_header(&self, header: &BlockHeader) -> Result<(), ConsensusError>;

    /// Validates that a miner-reward `amount` is allowed for a block at
    /// `height`.
    fn validate_reward_amount(
        &self,
        height: BlockHeight,
        amount: &Amount,
    ) -> Result<(), ConsensusError>;
}

#[derive(Debug)]
pub enum ConsensusError {
    /// A difficulty of zero implies no target at all.
    ZeroDifficulty,
    InsufficientProofOfWork {
        block: CryptoHash,
        difficulty: Difficulty,
    },
    InvalidReward {
        height: BlockHeight,
        expected: Amount,
        got: Amount,
    },
}

impl Display for ConsensusError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ConsensusError::ZeroDifficulty => write!(f, "header difficulty is zero"),
            ConsensusError::InsufficientProofOfWork { block, difficulty } => write!(
                f,
                "header hash {} misses the target for difficulty {}",
                block, difficulty
            ),
            ConsensusError::InvalidReward {
                height,
                expected,
                got,
            } => write!(
                f,
                "reward {} does not match the subsidy {} at height {}",
                got, expected, height
            ),
        }
    }
}
