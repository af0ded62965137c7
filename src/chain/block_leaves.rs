//! In-memory registry of the live chain tips.

use indexmap::IndexMap;

use crate::types::basic::{CryptoHash, TotalDifficulty};
use crate::types::block::Block;

/// A tip of some chain: the block, the state root it committed, and the
/// accumulated difficulty from genesis up to and including it.
#[derive(Clone)]
pub struct BlockIndex {
    block: Block,
    total_difficulty: TotalDifficulty,
}

impl BlockIndex {
    pub fn new(block: Block, total_difficulty: TotalDifficulty) -> BlockIndex {
        BlockIndex {
            block,
            total_difficulty,
        }
    }

    pub fn block(&self) -> &Block {
        &self.block
    }

    pub fn block_hash(&self) -> CryptoHash {
        self.block.hash
    }

    /// The root of the state committed by this tip. A read view can be
    /// opened at it on demand.
    pub fn state_root(&self) -> CryptoHash {
        self.block.header.state_root
    }

    pub fn total_difficulty(&self) -> &TotalDifficulty {
        &self.total_difficulty
    }
}

/// The set of blocks with no known child, keyed by block hash. Expected to
/// stay small: one entry per live fork.
pub struct BlockLeaves {
    leaves: IndexMap<CryptoHash, BlockIndex>,
}

impl BlockLeaves {
    pub fn new() -> BlockLeaves {
        BlockLeaves {
            leaves: IndexMap::new(),
        }
    }

    /// Inserts `index`, replacing any leaf with the same block hash.
    pub fn add(&mut self, index: BlockIndex) {
        self.leaves.insert(index.block_hash(), index);
    }

    /// Drops the leaf with the given hash, typically the parent of a tip
    /// that was just added. Returns whether an entry was removed.
    pub fn remove_by_hash(&mut self, hash: &CryptoHash) -> bool {
        self.leaves.shift_remove(hash).is_some()
    }

    /// The leaf with the greatest total difficulty. Exact ties go to the
    /// lexicographically lowest block hash, so the choice is deterministic
    /// however the registry was rebuilt.
    pub fn best(&self) -> Option<&BlockIndex> {
        self.leaves.values().min_by(|a, b| {
            b.total_difficulty
                .cmp(&a.total_difficulty)
                .then(a.block_hash().cmp(&b.block_hash()))
        })
    }

    /// Whether `index` would become [best](Self::best) if inserted now.
    /// On an equal total difficulty the incumbent wins, so the answer is
    /// `false`; this keeps equal-weight forks from churning the canonical
    /// chain.
    pub fn is_best_candidate(&self, index: &BlockIndex) -> bool {
        match self.best() {
            Some(best) => index.total_difficulty > best.total_difficulty,
            None => true,
        }
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    pub fn hashes(&self) -> Vec<CryptoHash> {
        self.leaves.keys().copied().collect()
    }
}
