//! The typed encoding layer over the byte key-value store: blocks, headers,
//! total difficulties, the canonical height index, and the HEAD pointer.
//!
//! [BlockchainStore] only encodes and decodes; it never interprets header
//! semantics. All mutation goes through a [ChainWriteBatch], so a caller
//! controls exactly which writes land together.

pub mod kv_store;

pub mod paths;

pub mod rocks;

pub mod write_batch;

use borsh::BorshDeserialize;

use crate::store::kv_store::{KVGet, KVStore, Key, StoreError};
use crate::store::paths::combine;
use crate::store::write_batch::ChainWriteBatch;
use crate::types::basic::{BlockHeight, CryptoHash, TotalDifficulty};
use crate::types::block::{Block, BlockHeader};

#[derive(Clone)]
pub struct BlockchainStore<K: KVStore> {
    kv: K,
}

impl<K: KVStore> BlockchainStore<K> {
    pub fn new(kv: K) -> BlockchainStore<K> {
        BlockchainStore { kv }
    }

    /// The underlying store handle. State views are opened over clones of
    /// this.
    pub fn kv(&self) -> &K {
        &self.kv
    }

    pub fn get_block(&self, hash: &CryptoHash) -> Result<Block, StoreError> {
        let key = Key::Block { block: *hash };
        let bytes = self
            .kv
            .get(&combine(&paths::BLOCKS, &hash.bytes()))?
            .ok_or(StoreError::ValueExpectedButNotFound {
                key: Key::Block { block: *hash },
            })?;
        Block::deserialize(&mut &*bytes)
            .map_err(|err| StoreError::DeserializeValueError { key, source: err })
    }

    pub fn get_header(&self, hash: &CryptoHash) -> Result<BlockHeader, StoreError> {
        let key = Key::Header { block: *hash };
        let bytes = self
            .kv
            .get(&combine(&paths::HEADERS, &hash.bytes()))?
            .ok_or(StoreError::ValueExpectedButNotFound {
                key: Key::Header { block: *hash },
            })?;
        BlockHeader::deserialize(&mut &*bytes)
            .map_err(|err| StoreError::DeserializeValueError { key, source: err })
    }

    pub fn get_total_difficulty(&self, hash: &CryptoHash) -> Result<TotalDifficulty, StoreError> {
        let key = Key::TotalDifficulty { block: *hash };
        let bytes = self
            .kv
            .get(&combine(&paths::TOTAL_DIFFICULTIES, &hash.bytes()))?
            .ok_or(StoreError::ValueExpectedButNotFound {
                key: Key::TotalDifficulty { block: *hash },
            })?;
        TotalDifficulty::deserialize(&mut &*bytes)
            .map_err(|err| StoreError::DeserializeValueError { key, source: err })
    }

    pub fn has_block(&self, hash: &CryptoHash) -> Result<bool, StoreError> {
        self.kv.has(&combine(&paths::BLOCKS, &hash.bytes()))
    }

    /// The hash of the canonical block at `height`, or `None` when the
    /// canonical chain does not reach that height. Non-canonical blocks are
    /// reachable by hash only.
    pub fn get_canonical_hash(&self, height: BlockHeight) -> Result<Option<CryptoHash>, StoreError> {
        match self
            .kv
            .get(&combine(&paths::CANONICAL_HASH_AT_HEIGHT, &height.to_be_bytes()))?
        {
            Some(bytes) => Ok(Some(CryptoHash::deserialize(&mut &*bytes).map_err(
                |err| StoreError::DeserializeValueError {
                    key: Key::CanonicalHashAtHeight { height },
                    source: err,
                },
            )?)),
            None => Ok(None),
        }
    }

    /// The hash of the current best tip, or `None` before first boot.
    pub fn get_head_hash(&self) -> Result<Option<CryptoHash>, StoreError> {
        match self.kv.get(&paths::HEAD_BLOCK)? {
            Some(bytes) => Ok(Some(CryptoHash::deserialize(&mut &*bytes).map_err(
                |err| StoreError::DeserializeValueError {
                    key: Key::HeadBlock,
                    source: err,
                },
            )?)),
            None => Ok(None),
        }
    }

    /// Enqueues block bytes, header bytes and total difficulty on `wb`.
    /// When `becomes_canonical`, also enqueues the HEAD pointer and the
    /// canonical height entry for the block's own height.
    pub fn put_block(
        &self,
        wb: &mut ChainWriteBatch<K::WriteBatch>,
        block: &Block,
        td: &TotalDifficulty,
        becomes_canonical: bool,
    ) -> Result<(), StoreError> {
        wb.set_block(block)?;
        wb.set_header(&block.hash, &block.header)?;
        wb.set_total_difficulty(&block.hash, td)?;
        if becomes_canonical {
            wb.set_canonical_hash(block.header.height, &block.hash)?;
            wb.set_head(&block.hash)?;
        }
        Ok(())
    }

    /// Commits `wb` atomically.
    pub fn write(&mut self, wb: ChainWriteBatch<K::WriteBatch>) -> Result<(), StoreError> {
        self.kv.write(wb.0)
    }
}
