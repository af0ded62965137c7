//! Shared fixtures: the in-memory KV store, a permissive consensus engine,
//! and block/transaction builders.

pub(crate) mod logging;

pub(crate) mod mem_db;

use std::collections::BTreeMap;

use ed25519_dalek::SigningKey;

use pyrite::chain::genesis::GenesisConfig;
use pyrite::chain::Blockchain;
use pyrite::consensus::{ConsensusEngine, ConsensusError};
use pyrite::state::StateDb;
use pyrite::store::write_batch::ChainWriteBatch;
use pyrite::types::basic::{Address, Amount, BlockHeight, Difficulty};
use pyrite::types::block::{merkle_root, Block, BlockHeader};
use pyrite::types::transaction::{Transaction, TransactionData};

use mem_db::MemDB;

/// Accepts every header and every reward amount, so tests drive consensus
/// decisions through difficulty values alone.
pub(crate) struct PermissiveEngine;

impl ConsensusEngine for PermissiveEngine {
    fn validate_header(&self, _header: &BlockHeader) -> Result<(), ConsensusError> {
        Ok(())
    }

    fn validate_reward_amount(
        &self,
        _height: BlockHeight,
        _amount: &Amount,
    ) -> Result<(), ConsensusError> {
        Ok(())
    }
}

/// Reward paid by every block the builders below produce.
pub(crate) const REWARD: u64 = 500;

/// Difficulty recorded in the test genesis.
pub(crate) const GENESIS_DIFFICULTY: u64 = 100;

/// Balance the test genesis allocates to [funded_key]'s address.
pub(crate) const FUNDED_BALANCE: u64 = 10_000;

/// Deterministic key whose address the test genesis funds.
pub(crate) fn funded_key() -> SigningKey {
    SigningKey::from_bytes(&[7u8; 32])
}

pub(crate) fn funded_address() -> Address {
    Address::from_public_key(&funded_key().verifying_key())
}

pub(crate) fn addr(tag: u8) -> Address {
    Address::new([tag; 20])
}

pub(crate) fn genesis_config() -> GenesisConfig {
    let mut alloc = BTreeMap::new();
    alloc.insert(funded_address(), Amount::from_u64(FUNDED_BALANCE));
    GenesisConfig {
        difficulty: Difficulty::from_u64(GENESIS_DIFFICULTY),
        alloc,
        ..GenesisConfig::default()
    }
}

pub(crate) fn test_chain(kv: MemDB) -> Blockchain<MemDB, PermissiveEngine> {
    Blockchain::new(kv, PermissiveEngine, genesis_config()).unwrap()
}

/// Builds a child of `parent` carrying `difficulty`, a reward of [REWARD]
/// to `creator`, and `txs`. The claimed state root is computed by replaying
/// the transactions over `kv` into a scratch batch, so nothing persists.
/// `nonce` differentiates otherwise-identical siblings.
pub(crate) fn make_block(
    kv: &MemDB,
    parent: &Block,
    creator: Address,
    difficulty: u64,
    nonce: u64,
    txs: Vec<Transaction>,
) -> Block {
    let reward_tx = Transaction::new_reward(
        creator,
        Amount::from_u64(REWARD),
        parent.header.timestamp + 10,
    );
    let mut transactions = vec![reward_tx];
    transactions.extend(txs);

    let state_root = {
        let mut state = StateDb::new(parent.header.state_root, kv.clone()).unwrap();
        state
            .add_amount(&creator, &transactions[0].data.amount)
            .unwrap();
        for tx in &transactions[1..] {
            let to = tx.data.to.unwrap();
            state.sub_amount(&tx.data.from, &tx.data.amount).unwrap();
            state
                .set_nonce(&tx.data.from, tx.data.account_nonce + 1)
                .unwrap();
            state.add_amount(&to, &tx.data.amount).unwrap();
        }
        let mut scratch = ChainWriteBatch::new();
        state.commit(&mut scratch).unwrap()
    };

    let header = BlockHeader {
        previous_block_hash: parent.hash,
        creator,
        state_root,
        transactions_root: merkle_root(&transactions),
        height: parent.header.height + 1,
        difficulty: Difficulty::from_u64(difficulty),
        nonce,
        timestamp: parent.header.timestamp + 10,
    };
    Block::new(header, transactions)
}

/// A signed transfer from `key`'s address.
pub(crate) fn transfer(
    key: &SigningKey,
    to: Address,
    amount: u64,
    account_nonce: u64,
) -> Transaction {
    Transaction::new_signed(
        TransactionData {
            from: Address::from_public_key(&key.verifying_key()),
            to: Some(to),
            amount: Amount::from_u64(amount),
            account_nonce,
            payload: Vec::new(),
            timestamp: 1,
        },
        key,
    )
}
