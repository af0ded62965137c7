//! A thin, header-level view of the chain.
//!
//! Bodies stay in the [BlockchainStore]; this type serves the paths that
//! only need headers, such as the ancestor walks performed during
//! canonical reindexing.

use crate::store::kv_store::{KVStore, StoreError};
use crate::store::BlockchainStore;
use crate::types::basic::CryptoHash;
use crate::types::block::BlockHeader;

pub struct HeaderChain<K: KVStore> {
    store: BlockchainStore<K>,
    head: BlockHeader,
    head_hash: CryptoHash,
}

impl<K: KVStore> HeaderChain<K> {
    pub fn new(store: BlockchainStore<K>, head: BlockHeader, head_hash: CryptoHash) -> HeaderChain<K> {
        HeaderChain {
            store,
            head,
            head_hash,
        }
    }

    /// Records `header` as the most recently written header. Idempotent:
    /// re-recording the tracked header is a no-op.
    pub fn write_header(&mut self, hash: CryptoHash, header: &BlockHeader) {
        if hash == self.head_hash {
            return;
        }
        self.head = header.clone();
        self.head_hash = hash;
    }

    /// The most recently written header and its hash.
    pub fn head(&self) -> (&BlockHeader, CryptoHash) {
        (&self.head, self.head_hash)
    }

    /// Reads a written header back by hash. Walking `previous_block_hash`
    /// links through this accessor traverses a chain without loading
    /// bodies.
    pub fn get_header(&self, hash: &CryptoHash) -> Result<BlockHeader, StoreError> {
        self.store.get_header(hash)
    }
}
