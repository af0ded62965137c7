//! Defines the [KVStore] trait, which specifies the required interface for
//! the key-value store provided by the user, and the errors that reads and
//! writes through it can surface.
//!
//! The chain needs very little from its store: point reads, an existence
//! probe, and atomic multi-write batches. Writes within a batch passed to
//! [KVStore::write] must be applied atomically and be durable on return.

use std::fmt::{self, Display, Formatter};
use std::io;

use crate::types::basic::{BlockHeight, CryptoHash};

pub trait KVStore: KVGet + Clone + Send + 'static {
    type WriteBatch: WriteBatch;

    /// Atomically applies every write collected in `wb`. Discarding a batch
    /// without calling this is the rollback path.
    fn write(&mut self, wb: Self::WriteBatch) -> Result<(), StoreError>;
}

pub trait KVGet {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    fn has(&self, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.get(key)?.is_some())
    }
}

pub trait WriteBatch {
    fn new() -> Self;
    fn set(&mut self, key: &[u8], value: &[u8]);
    fn delete(&mut self, key: &[u8]);
}

/// Error reading or writing chain records through the key-value store.
#[derive(Debug)]
pub enum StoreError {
    /// The underlying key-value store failed. Fatal: the caller should stop
    /// writing and recover from disk on restart.
    Io { detail: String },
    ValueExpectedButNotFound { key: Key },
    DeserializeValueError { key: Key, source: io::Error },
    SerializeValueError { key: Key, source: io::Error },
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io { detail } => write!(f, "key-value store failure: {}", detail),
            StoreError::ValueExpectedButNotFound { key } => {
                write!(f, "value not found for key: {}", key)
            }
            StoreError::DeserializeValueError { key, source } => {
                write!(f, "failed to deserialize value for key: {}: {}", key, source)
            }
            StoreError::SerializeValueError { key, source } => {
                write!(f, "failed to serialize value for key: {}: {}", key, source)
            }
        }
    }
}

/// The typed keys the chain persists, for error reporting.
#[derive(Debug)]
pub enum Key {
    Block { block: CryptoHash },
    Header { block: CryptoHash },
    TotalDifficulty { block: CryptoHash },
    CanonicalHashAtHeight { height: BlockHeight },
    HeadBlock,
    StateNode { node: CryptoHash },
}

impl Display for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Key::Block { block } => write!(f, "Block bytes for block {}", block),
            Key::Header { block } => write!(f, "Header bytes for block {}", block),
            Key::TotalDifficulty { block } => {
                write!(f, "Total Difficulty for block {}", block)
            }
            Key::CanonicalHashAtHeight { height } => {
                write!(f, "Canonical block hash at height {}", height)
            }
            Key::HeadBlock => write!(f, "Head Block"),
            Key::StateNode { node } => write!(f, "State trie node {}", node),
        }
    }
}
