//! Genesis block construction.

use std::collections::BTreeMap;

use crate::state::{StateDb, StateError};
use crate::store::kv_store::KVStore;
use crate::store::write_batch::ChainWriteBatch;
use crate::types::basic::{Address, Amount, BlockHeight, CryptoHash, Difficulty};
use crate::types::block::{merkle_root, Block, BlockHeader};

/// Parameters of the chain's first block. Two stores initialised from equal
/// configs hold byte-identical genesis blocks.
#[derive(Clone)]
pub struct GenesisConfig {
    /// Difficulty recorded in the genesis header.
    pub difficulty: Difficulty,
    /// Coinbase recorded as the genesis creator.
    pub creator: Address,
    /// Balances credited before any block is processed.
    pub alloc: BTreeMap<Address, Amount>,
    pub timestamp: u64,
}

impl Default for GenesisConfig {
    fn default() -> GenesisConfig {
        GenesisConfig {
            difficulty: Difficulty::from_u64(10_000),
            creator: Address::ZERO,
            alloc: BTreeMap::new(),
            timestamp: 0,
        }
    }
}

impl GenesisConfig {
    /// Builds the genesis block, committing the initial allocations into
    /// `wb`. The caller decides whether the batch is ever written; building
    /// against a scratch batch computes the block without persisting
    /// anything.
    pub(crate) fn build<K: KVStore>(
        &self,
        kv: K,
        wb: &mut ChainWriteBatch<K::WriteBatch>,
    ) -> Result<Block, StateError> {
        let mut state = StateDb::new(CryptoHash::EMPTY, kv)?;
        for (address, amount) in &self.alloc {
            state.add_amount(address, amount)?;
        }
        let state_root = state.commit(wb)?;

        let header = BlockHeader {
            previous_block_hash: CryptoHash::EMPTY,
            creator: self.creator,
            state_root,
            transactions_root: merkle_root(&[]),
            height: BlockHeight::new(0),
            difficulty: self.difficulty.clone(),
            nonce: 0,
            timestamp: self.timestamp,
        };
        Ok(Block::new(header, Vec::new()))
    }
}
