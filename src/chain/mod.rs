//! The block chain: validates candidate blocks, applies their transactions
//! to the account state, and commits extensions or forks of the canonical
//! chain.
//!
//! [Blockchain] is thread safe. A single-writer, multi-reader lock guards
//! the mutable chain state: [Blockchain::write_block] takes the write side
//! for the whole insertion, read APIs take the read side and observe either
//! the pre-insert world or the post-insert world, never a hybrid. Every
//! persistent effect of an accepted block rides one write batch, and
//! in-memory tip bookkeeping happens only after that batch commits, so a
//! crash between the two leaves a store the next boot can load coherently.

pub mod block_leaves;

pub mod genesis;

pub mod header_chain;

use std::fmt::{self, Display, Formatter};
use std::sync::RwLock;

use crate::consensus::{ConsensusEngine, ConsensusError};
use crate::logging;
use crate::state::{StateDb, StateError};
use crate::store::kv_store::{KVStore, Key, StoreError};
use crate::store::write_batch::ChainWriteBatch;
use crate::store::BlockchainStore;
use crate::types::basic::{Address, Amount, BlockHeight, CryptoHash, TotalDifficulty};
use crate::types::block::{merkle_root, Block, BlockHeader};
use crate::types::transaction::{Transaction, TxValidationError};

use self::block_leaves::{BlockIndex, BlockLeaves};
use self::genesis::GenesisConfig;
use self::header_chain::HeaderChain;

pub struct Blockchain<K: KVStore, E: ConsensusEngine> {
    // Lock-free handle for the duplicate probe and cross-queries; writes go
    // through the handle inside `inner`.
    store: BlockchainStore<K>,
    engine: E,
    genesis_hash: CryptoHash,
    inner: RwLock<ChainInner<K>>,
}

struct ChainInner<K: KVStore> {
    store: BlockchainStore<K>,
    block_leaves: BlockLeaves,
    header_chain: HeaderChain<K>,
}

impl<K: KVStore, E: ConsensusEngine> Blockchain<K, E> {
    /// Opens the chain over `kv`, installing the genesis block described by
    /// `genesis` on first boot. On later boots the configured genesis must
    /// match the stored one, and the tip registry is rebuilt from the HEAD
    /// pointer.
    pub fn new(kv: K, engine: E, genesis: GenesisConfig) -> Result<Blockchain<K, E>, ChainError> {
        let mut store = BlockchainStore::new(kv);

        let head_hash = match store.get_head_hash()? {
            Some(head_hash) => {
                let mut scratch = ChainWriteBatch::new();
                let genesis_block = genesis.build(store.kv().clone(), &mut scratch)?;
                let stored = store
                    .get_canonical_hash(BlockHeight::new(0))?
                    .ok_or(ChainError::CorruptCanonicalIndex {
                        height: BlockHeight::new(0),
                    })?;
                if stored != genesis_block.hash {
                    return Err(ChainError::GenesisMismatch {
                        computed: genesis_block.hash,
                        stored,
                    });
                }
                head_hash
            }
            None => {
                let mut wb = ChainWriteBatch::new();
                let genesis_block = genesis.build(store.kv().clone(), &mut wb)?;
                let td = TotalDifficulty::from(genesis.difficulty.clone());
                store.put_block(&mut wb, &genesis_block, &td, true)?;
                store.write(wb)?;
                log::info!(
                    "{}, {}",
                    logging::INSTALL_GENESIS,
                    logging::short_hash(&genesis_block.hash)
                );
                genesis_block.hash
            }
        };

        let head = store.get_block(&head_hash)?;
        let td = store.get_total_difficulty(&head_hash)?;

        // The head's state must be recoverable before any block is accepted.
        StateDb::new(head.header.state_root, store.kv().clone())?;

        let genesis_hash = store
            .get_canonical_hash(BlockHeight::new(0))?
            .ok_or(ChainError::CorruptCanonicalIndex {
                height: BlockHeight::new(0),
            })?;

        let header_chain = HeaderChain::new(store.clone(), head.header.clone(), head_hash);
        let mut block_leaves = BlockLeaves::new();
        block_leaves.add(BlockIndex::new(head, td));

        Ok(Blockchain {
            store: store.clone(),
            engine,
            genesis_hash,
            inner: RwLock::new(ChainInner {
                store,
                block_leaves,
                header_chain,
            }),
        })
    }

    /// Writes `block` to the chain: validates it against its parent,
    /// replays its transactions, and commits it as a chain extension or a
    /// fork. When the block overtakes the current best tip in accumulated
    /// difficulty, the canonical height index is rewritten along its
    /// ancestry and HEAD moves to it.
    pub fn write_block(&self, block: &Block) -> Result<(), BlockError> {
        match self.insert_block(block) {
            Ok(()) => Ok(()),
            Err(err) if err.is_validation() => {
                log::debug!(
                    "{}, {}, {}",
                    logging::REJECT_BLOCK,
                    logging::short_hash(&block.hash),
                    err
                );
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    fn insert_block(&self, block: &Block) -> Result<(), BlockError> {
        // Cheap duplicate probe, before the writer lock is taken.
        if self.store.has_block(&block.hash)? {
            return Err(BlockError::AlreadyExists { block: block.hash });
        }

        let mut guard = self.inner.write().expect("chain writer lock poisoned");
        let inner = &mut *guard;

        let parent = match inner.store.get_block(&block.header.previous_block_hash) {
            Ok(parent) => parent,
            Err(StoreError::ValueExpectedButNotFound { .. }) => {
                return Err(BlockError::InvalidParentHash {
                    parent: block.header.previous_block_hash,
                })
            }
            Err(err) => return Err(err.into()),
        };

        validate_block(&self.engine, block, &parent)?;
        let (reward_to, reward_amount) = validate_reward_tx(&self.engine, block)?;

        // Replay the block on a state view rooted at the parent.
        let mut state = StateDb::new(parent.header.state_root, inner.store.kv().clone())?;
        apply_transactions(&mut state, block, reward_to, reward_amount)?;

        let mut wb = ChainWriteBatch::new();
        let computed_root = state.commit(&mut wb)?;
        if computed_root != block.header.state_root {
            // Dropping the batch discards the state pages.
            return Err(BlockError::StateRootMismatch {
                block: block.hash,
                computed: computed_root,
                claimed: block.header.state_root,
            });
        }

        let parent_td = inner.store.get_total_difficulty(&parent.hash)?;
        let td = parent_td + &block.header.difficulty;

        let candidate = BlockIndex::new(block.clone(), td.clone());
        let is_new_best = inner.block_leaves.is_best_candidate(&candidate);

        inner.store.put_block(&mut wb, block, &td, is_new_best)?;
        if is_new_best {
            reindex_canonical_chain(&inner.store, &inner.header_chain, &mut wb, block)?;
        }

        let previous_best = inner.block_leaves.best().map(|best| best.block_hash());

        // The single commit point: state pages, block bytes, header, total
        // difficulty, HEAD and the canonical index land together.
        inner.store.write(wb)?;

        inner.block_leaves.add(candidate);
        inner
            .block_leaves
            .remove_by_hash(&block.header.previous_block_hash);
        inner.header_chain.write_header(block.hash, &block.header);

        log::info!(
            "{}, {}, {}, {}",
            logging::INSERT_BLOCK,
            logging::short_hash(&block.hash),
            block.header.height,
            td
        );
        if is_new_best && previous_best != Some(block.header.previous_block_hash) {
            log::info!(
                "{}, {}, {}",
                logging::REORG_CHAIN,
                logging::short_hash(&block.hash),
                block.header.height
            );
        }

        Ok(())
    }

    /// The HEAD block together with a read view of its state.
    pub fn current_block(&self) -> Result<(Block, StateDb<K>), ChainError> {
        let guard = self.inner.read().expect("chain lock poisoned");
        let best = guard.block_leaves.best().ok_or(ChainError::NoTip)?;
        let state = StateDb::new(best.state_root(), guard.store.kv().clone())?;
        Ok((best.block().clone(), state))
    }

    /// A read view of the state at HEAD.
    pub fn current_state(&self) -> Result<StateDb<K>, ChainError> {
        Ok(self.current_block()?.1)
    }

    /// The canonical block at `height`. A negative height addresses HEAD.
    pub fn get_block_by_height(&self, height: i64, full_tx: bool) -> Result<BlockView, ChainError> {
        if height < 0 {
            return Ok(BlockView::new(self.current_block()?.0, full_tx));
        }

        let guard = self.inner.read().expect("chain lock poisoned");
        let height = BlockHeight::new(height as u64);
        let hash = guard.store.get_canonical_hash(height)?.ok_or(
            ChainError::Store(StoreError::ValueExpectedButNotFound {
                key: Key::CanonicalHashAtHeight { height },
            }),
        )?;
        Ok(BlockView::new(guard.store.get_block(&hash)?, full_tx))
    }

    /// Any stored block by hash, canonical or not.
    pub fn get_block_by_hash(&self, hash: &CryptoHash, full_tx: bool) -> Result<BlockView, ChainError> {
        let guard = self.inner.read().expect("chain lock poisoned");
        Ok(BlockView::new(guard.store.get_block(hash)?, full_tx))
    }

    /// Read-only handle to the typed store, for cross-queries.
    pub fn get_store(&self) -> &BlockchainStore<K> {
        &self.store
    }

    pub fn genesis_hash(&self) -> CryptoHash {
        self.genesis_hash
    }

    /// Hashes of the live tips.
    pub fn leaf_hashes(&self) -> Vec<CryptoHash> {
        self.inner
            .read()
            .expect("chain lock poisoned")
            .block_leaves
            .hashes()
    }
}

fn validate_block<E: ConsensusEngine>(
    engine: &E,
    block: &Block,
    parent: &Block,
) -> Result<(), BlockError> {
    if block.header.hash() != block.hash {
        return Err(BlockError::HashMismatch { block: block.hash });
    }

    let computed = merkle_root(&block.transactions);
    if computed != block.header.transactions_root {
        return Err(BlockError::TransactionsRootMismatch {
            block: block.hash,
            computed,
            claimed: block.header.transactions_root,
        });
    }

    if block.header.height != parent.header.height + 1 {
        return Err(BlockError::InvalidHeight {
            block: block.hash,
            height: block.header.height,
            parent_height: parent.header.height,
        });
    }

    engine
        .validate_header(&block.header)
        .map_err(BlockError::Consensus)
}

fn validate_reward_tx<E: ConsensusEngine>(
    engine: &E,
    block: &Block,
) -> Result<(Address, Amount), BlockError> {
    let Some(reward_tx) = block.transactions.first() else {
        return Err(BlockError::EmptyTransactions { block: block.hash });
    };

    let Some(to) = reward_tx.data.to else {
        return Err(BlockError::InvalidToAddress { tx: reward_tx.hash });
    };

    if to != block.header.creator {
        return Err(BlockError::CoinbaseMismatch {
            tx: reward_tx.hash,
            to,
            creator: block.header.creator,
        });
    }

    engine
        .validate_reward_amount(block.header.height, &reward_tx.data.amount)
        .map_err(|source| BlockError::InvalidReward {
            tx: reward_tx.hash,
            source,
        })?;

    Ok((to, reward_tx.data.amount.clone()))
}

/// Applies the reward transaction and then every user transaction in list
/// order; order is a consensus input.
fn apply_transactions<K: KVStore>(
    state: &mut StateDb<K>,
    block: &Block,
    reward_to: Address,
    reward_amount: Amount,
) -> Result<(), BlockError> {
    state.add_amount(&reward_to, &reward_amount)?;

    for tx in block.transactions.iter().skip(1) {
        tx.validate(state).map_err(|err| match err {
            TxValidationError::State(err) => BlockError::from(err),
            err => BlockError::TxValidationFailed {
                tx: tx.hash,
                source: err,
            },
        })?;

        let Some(to) = tx.data.to else {
            return Err(BlockError::ContractCreationUnsupported { tx: tx.hash });
        };

        state.sub_amount(&tx.data.from, &tx.data.amount)?;
        state.set_nonce(&tx.data.from, tx.data.account_nonce + 1)?;
        state.add_amount(&to, &tx.data.amount)?;
    }

    Ok(())
}

/// Rewrites the canonical height index along the ancestry of the new best
/// tip, all through `wb`.
///
/// Heights above the tip are deleted until a height with no mapping is
/// found: if the displaced chain was shorter there is nothing to do, if it
/// was longer its tail is cleaned up. Ancestor mappings are then
/// overwritten walking parent links until the first height whose canonical
/// entry already matches; that entry is the fork point, so the walk stops
/// there.
fn reindex_canonical_chain<K: KVStore>(
    store: &BlockchainStore<K>,
    header_chain: &HeaderChain<K>,
    wb: &mut ChainWriteBatch<K::WriteBatch>,
    block: &Block,
) -> Result<(), BlockError> {
    let mut height = block.header.height + 1;
    while store.get_canonical_hash(height)?.is_some() {
        wb.delete_canonical_hash(height);
        height += 1;
    }

    let mut hash = block.header.previous_block_hash;
    while !hash.is_empty() {
        let header = header_chain.get_header(&hash)?;
        match store.get_canonical_hash(header.height)? {
            Some(canonical) if canonical == hash => break,
            _ => wb.set_canonical_hash(header.height, &hash)?,
        }
        hash = header.previous_block_hash;
    }

    Ok(())
}

/// Block rendition returned by the read API. `full_tx` selects whether the
/// transactions come in full or as hashes only.
pub struct BlockView {
    pub hash: CryptoHash,
    pub header: BlockHeader,
    pub transactions: BlockTransactions,
}

pub enum BlockTransactions {
    Hashes(Vec<CryptoHash>),
    Full(Vec<Transaction>),
}

impl BlockView {
    pub fn new(block: Block, full_tx: bool) -> BlockView {
        let transactions = if full_tx {
            BlockTransactions::Full(block.transactions)
        } else {
            BlockTransactions::Hashes(block.transactions.iter().map(|tx| tx.hash).collect())
        };
        BlockView {
            hash: block.hash,
            header: block.header,
            transactions,
        }
    }
}

/// Why a candidate block was not written. Every variant except `State` and
/// `Store` is a verdict on the block itself; those two surface store or
/// state-database failures the node cannot validate its way around.
#[derive(Debug)]
pub enum BlockError {
    AlreadyExists {
        block: CryptoHash,
    },
    /// The parent is not in the store. The caller may requeue the block if
    /// its ancestors are still in flight.
    InvalidParentHash {
        parent: CryptoHash,
    },
    HashMismatch {
        block: CryptoHash,
    },
    TransactionsRootMismatch {
        block: CryptoHash,
        computed: CryptoHash,
        claimed: CryptoHash,
    },
    InvalidHeight {
        block: CryptoHash,
        height: BlockHeight,
        parent_height: BlockHeight,
    },
    EmptyTransactions {
        block: CryptoHash,
    },
    InvalidToAddress {
        tx: CryptoHash,
    },
    CoinbaseMismatch {
        tx: CryptoHash,
        to: Address,
        creator: Address,
    },
    InvalidReward {
        tx: CryptoHash,
        source: ConsensusError,
    },
    Consensus(ConsensusError),
    ContractCreationUnsupported {
        tx: CryptoHash,
    },
    TxValidationFailed {
        tx: CryptoHash,
        source: TxValidationError,
    },
    StateRootMismatch {
        block: CryptoHash,
        computed: CryptoHash,
        claimed: CryptoHash,
    },
    State(StateError),
    Store(StoreError),
}

impl BlockError {
    /// Whether this error is a verdict on the block (reject it and move on)
    /// rather than a store or state failure.
    pub fn is_validation(&self) -> bool {
        match self {
            BlockError::State(StateError::InsufficientBalance { .. }) => true,
            BlockError::State(_) | BlockError::Store(_) => false,
            _ => true,
        }
    }
}

impl From<StoreError> for BlockError {
    fn from(err: StoreError) -> Self {
        BlockError::Store(err)
    }
}

impl From<StateError> for BlockError {
    fn from(err: StateError) -> Self {
        BlockError::State(err)
    }
}

impl Display for BlockError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BlockError::AlreadyExists { block } => {
                write!(f, "block {} already exists", block)
            }
            BlockError::InvalidParentHash { parent } => {
                write!(f, "parent block {} is not in the store", parent)
            }
            BlockError::HashMismatch { block } => {
                write!(f, "cached hash of block {} does not match its header", block)
            }
            BlockError::TransactionsRootMismatch {
                block,
                computed,
                claimed,
            } => write!(
                f,
                "block {} claims transactions root {} but its transactions hash to {}",
                block, claimed, computed
            ),
            BlockError::InvalidHeight {
                block,
                height,
                parent_height,
            } => write!(
                f,
                "block {} sits at height {} over a parent at height {}",
                block, height, parent_height
            ),
            BlockError::EmptyTransactions { block } => {
                write!(f, "block {} carries no transactions", block)
            }
            BlockError::InvalidToAddress { tx } => {
                write!(f, "reward transaction {} has no recipient", tx)
            }
            BlockError::CoinbaseMismatch { tx, to, creator } => write!(
                f,
                "reward transaction {} pays {} but the header creator is {}",
                tx, to, creator
            ),
            BlockError::InvalidReward { tx, source } => {
                write!(f, "reward transaction {}: {}", tx, source)
            }
            BlockError::Consensus(err) => Display::fmt(err, f),
            BlockError::ContractCreationUnsupported { tx } => {
                write!(f, "transaction {} creates a contract, which is unsupported", tx)
            }
            BlockError::TxValidationFailed { tx, source } => {
                write!(f, "transaction {} failed validation: {}", tx, source)
            }
            BlockError::StateRootMismatch {
                block,
                computed,
                claimed,
            } => write!(
                f,
                "block {} claims state root {} but applying it produced {}",
                block, claimed, computed
            ),
            BlockError::State(err) => Display::fmt(err, f),
            BlockError::Store(err) => Display::fmt(err, f),
        }
    }
}

/// Failure opening or reading the chain, as opposed to rejecting a block.
#[derive(Debug)]
pub enum ChainError {
    Store(StoreError),
    State(StateError),
    /// The configured genesis does not reproduce the one in the store.
    GenesisMismatch {
        computed: CryptoHash,
        stored: CryptoHash,
    },
    CorruptCanonicalIndex {
        height: BlockHeight,
    },
    NoTip,
}

impl From<StoreError> for ChainError {
    fn from(err: StoreError) -> Self {
        ChainError::Store(err)
    }
}

impl From<StateError> for ChainError {
    fn from(err: StateError) -> Self {
        ChainError::State(err)
    }
}

impl Display for ChainError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ChainError::Store(err) => Display::fmt(err, f),
            ChainError::State(err) => Display::fmt(err, f),
            ChainError::GenesisMismatch { computed, stored } => write!(
                f,
                "configured genesis hashes to {} but the store holds {}",
                computed, stored
            ),
            ChainError::CorruptCanonicalIndex { height } => {
                write!(f, "no canonical mapping at height {}", height)
            }
            ChainError::NoTip => write!(f, "the tip registry is empty"),
        }
    }
}
