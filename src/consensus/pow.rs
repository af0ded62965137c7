//! The proof-of-work engine: hash-below-target header validation and the
//! halving subsidy schedule.

use num_bigint::BigUint;

use crate::consensus::{ConsensusEngine, ConsensusError};
use crate::types::basic::{Amount, BlockHeight};
use crate::types::block::BlockHeader;

/// Base block subsidy, in the smallest coin unit.
pub const BASE_SUBSIDY: u64 = 500_000_000;

/// The subsidy halves every this many blocks.
pub const SUBSIDY_HALVING_INTERVAL: u64 = 2_100_000;

// u64 subsidies shift to zero after this many halvings.
const MAX_SUBSIDY_ERAS: u64 = 64;

pub struct PowEngine;

impl PowEngine {
    /// The subsidy a block at `height` may pay its creator.
    pub fn block_subsidy(height: BlockHeight) -> Amount {
        let era = height.int() / SUBSIDY_HALVING_INTERVAL;
        if era >= MAX_SUBSIDY_ERAS {
            Amount::zero()
        } else {
            Amount::from_u64(BASE_SUBSIDY >> era)
        }
    }

    /// Upper bound a header hash may reach: `2^256 / difficulty`.
    fn target(difficulty: &BigUint) -> BigUint {
        (BigUint::from(1u8) << 256u32) / difficulty
    }
}

impl ConsensusEngine for PowEngine {
    fn validate_header(&self, header: &BlockHeader) -> Result<(), ConsensusError> {
        if header.difficulty.is_zero() {
            return Err(ConsensusError::ZeroDifficulty);
        }

        let hash = header.hash();
        let hash_int = BigUint::from_bytes_be(&hash.bytes());
        if hash_int > Self::target(header.difficulty.int()) {
            return Err(ConsensusError::InsufficientProofOfWork {
                block: hash,
                difficulty: header.difficulty.clone(),
            });
        }
        Ok(())
    }

    fn validate_reward_amount(
        &self,
        height: BlockHeight,
        amount: &Amount,
    ) -> Result<(), ConsensusError> {
        let expected = Self::block_subsidy(height);
        if *amount != expected {
            return Err(ConsensusError::InvalidReward {
                height,
                expected,
                got: amount.clone(),
            });
        }
        Ok(())
    }
}
