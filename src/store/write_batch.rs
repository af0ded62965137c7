//! A typed write batch over the raw [WriteBatch], forming keys the same way
//! the getters in [crate::store::BlockchainStore] do.
//!
//! Everything a block insertion persists rides a single `ChainWriteBatch`:
//! state trie pages, block and header bytes, total difficulty, the HEAD
//! pointer and the canonical height index. Dropping the batch without
//! writing it discards all of it.

use borsh::BorshSerialize;

use crate::store::kv_store::{Key, StoreError, WriteBatch};
use crate::store::paths::{self, combine};
use crate::types::basic::{BlockHeight, CryptoHash, TotalDifficulty};
use crate::types::block::{Block, BlockHeader};

pub struct ChainWriteBatch<W: WriteBatch>(pub(crate) W);

impl<W: WriteBatch> ChainWriteBatch<W> {
    pub fn new() -> ChainWriteBatch<W> {
        ChainWriteBatch(W::new())
    }

    pub fn set_block(&mut self, block: &Block) -> Result<(), StoreError> {
        self.0.set(
            &combine(&paths::BLOCKS, &block.hash.bytes()),
            &block
                .try_to_vec()
                .map_err(|err| StoreError::SerializeValueError {
                    key: Key::Block { block: block.hash },
                    source: err,
                })?,
        );
        Ok(())
    }

    pub fn set_header(&mut self, hash: &CryptoHash, header: &BlockHeader) -> Result<(), StoreError> {
        self.0.set(
            &combine(&paths::HEADERS, &hash.bytes()),
            &header
                .try_to_vec()
                .map_err(|err| StoreError::SerializeValueError {
                    key: Key::Header { block: *hash },
                    source: err,
                })?,
        );
        Ok(())
    }

    pub fn set_total_difficulty(
        &mut self,
        hash: &CryptoHash,
        td: &TotalDifficulty,
    ) -> Result<(), StoreError> {
        self.0.set(
            &combine(&paths::TOTAL_DIFFICULTIES, &hash.bytes()),
            &td.try_to_vec()
                .map_err(|err| StoreError::SerializeValueError {
                    key: Key::TotalDifficulty { block: *hash },
                    source: err,
                })?,
        );
        Ok(())
    }

    pub fn set_canonical_hash(
        &mut self,
        height: BlockHeight,
        hash: &CryptoHash,
    ) -> Result<(), StoreError> {
        self.0.set(
            &combine(&paths::CANONICAL_HASH_AT_HEIGHT, &height.to_be_bytes()),
            &hash
                .try_to_vec()
                .map_err(|err| StoreError::SerializeValueError {
                    key: Key::CanonicalHashAtHeight { height },
                    source: err,
                })?,
        );
        Ok(())
    }

    pub fn delete_canonical_hash(&mut self, height: BlockHeight) {
        self.0
            .delete(&combine(&paths::CANONICAL_HASH_AT_HEIGHT, &height.to_be_bytes()));
    }

    pub fn set_head(&mut self, hash: &CryptoHash) -> Result<(), StoreError> {
        self.0.set(
            &paths::HEAD_BLOCK,
            &hash
                .try_to_vec()
                .map_err(|err| StoreError::SerializeValueError {
                    key: Key::HeadBlock,
                    source: err,
                })?,
        );
        Ok(())
    }

    pub(crate) fn set_state_node(&mut self, hash: &CryptoHash, bytes: &[u8]) {
        self.0
            .set(&combine(&paths::STATE_NODES, &hash.bytes()), bytes);
    }
}
