//! End-to-end scenarios for the block processor over the in-memory store:
//! linear extension, losing and winning forks, reorganizations, rejection
//! paths, and restart recovery.

mod common;

use log::LevelFilter;

use pyrite::chain::{BlockError, BlockTransactions, Blockchain, ChainError};
use pyrite::types::basic::{Amount, BlockHeight, CryptoHash, Difficulty, TotalDifficulty};
use pyrite::types::block::{merkle_root, Block, BlockHeader};
use pyrite::types::transaction::{Transaction, TransactionData};

use common::logging::setup_logger;
use common::mem_db::MemDB;
use common::{
    addr, funded_address, funded_key, make_block, test_chain, transfer, PermissiveEngine,
    FUNDED_BALANCE, GENESIS_DIFFICULTY, REWARD,
};

fn canonical_hash(
    chain: &Blockchain<MemDB, PermissiveEngine>,
    height: u64,
) -> Option<CryptoHash> {
    chain
        .get_store()
        .get_canonical_hash(BlockHeight::new(height))
        .unwrap()
}

fn sorted(mut hashes: Vec<CryptoHash>) -> Vec<CryptoHash> {
    hashes.sort();
    hashes
}

/// A structurally valid child of `parent` whose claimed state root is just
/// the parent's. Useful for transactions that must be rejected before the
/// root is ever compared.
fn block_with_raw_txs(parent: &Block, user_txs: Vec<Transaction>) -> Block {
    let reward = Transaction::new_reward(addr(0xAA), Amount::from_u64(REWARD), 10);
    let mut transactions = vec![reward];
    transactions.extend(user_txs);
    let header = BlockHeader {
        previous_block_hash: parent.hash,
        creator: addr(0xAA),
        state_root: parent.header.state_root,
        transactions_root: merkle_root(&transactions),
        height: parent.header.height + 1,
        difficulty: Difficulty::from_u64(60),
        nonce: 0,
        timestamp: 10,
    };
    Block::new(header, transactions)
}

#[test]
fn extends_canonical_chain() {
    setup_logger(LevelFilter::Debug);

    let kv = MemDB::new();
    let chain = test_chain(kv.clone());
    let (genesis, _) = chain.current_block().unwrap();

    let b1 = make_block(&kv, &genesis, addr(0xAA), 60, 0, vec![]);
    chain.write_block(&b1).unwrap();

    let (head, state) = chain.current_block().unwrap();
    assert_eq!(head.hash, b1.hash);
    assert_eq!(
        chain.get_store().get_total_difficulty(&b1.hash).unwrap(),
        TotalDifficulty::from_u64(GENESIS_DIFFICULTY + 60)
    );
    assert_eq!(canonical_hash(&chain, 1), Some(b1.hash));
    assert_eq!(
        state.get_balance(&addr(0xAA)).unwrap(),
        Amount::from_u64(REWARD)
    );
    assert_eq!(
        state.get_balance(&funded_address()).unwrap(),
        Amount::from_u64(FUNDED_BALANCE)
    );
}

#[test]
fn losing_fork_becomes_a_leaf_but_not_head() {
    setup_logger(LevelFilter::Debug);

    let kv = MemDB::new();
    let chain = test_chain(kv.clone());
    let (genesis, _) = chain.current_block().unwrap();

    let b1 = make_block(&kv, &genesis, addr(0xAA), 60, 0, vec![]);
    chain.write_block(&b1).unwrap();

    // Sibling of b1 with a lower difficulty.
    let b1_fork = make_block(&kv, &genesis, addr(0xBB), 40, 1, vec![]);
    chain.write_block(&b1_fork).unwrap();

    assert_eq!(chain.current_block().unwrap().0.hash, b1.hash);
    assert_eq!(
        chain
            .get_store()
            .get_total_difficulty(&b1_fork.hash)
            .unwrap(),
        TotalDifficulty::from_u64(GENESIS_DIFFICULTY + 40)
    );
    assert_eq!(canonical_hash(&chain, 1), Some(b1.hash));
    assert_eq!(
        sorted(chain.leaf_hashes()),
        sorted(vec![b1.hash, b1_fork.hash])
    );
}

#[test]
fn overtaking_fork_reorganizes_the_canonical_chain() {
    setup_logger(LevelFilter::Debug);

    let kv = MemDB::new();
    let chain = test_chain(kv.clone());
    let (genesis, _) = chain.current_block().unwrap();

    let b1 = make_block(&kv, &genesis, addr(0xAA), 60, 0, vec![]);
    chain.write_block(&b1).unwrap();
    let b1_fork = make_block(&kv, &genesis, addr(0xBB), 40, 1, vec![]);
    chain.write_block(&b1_fork).unwrap();

    // 100 + 40 + 50 = 190 beats 100 + 60 = 160.
    let b2_fork = make_block(&kv, &b1_fork, addr(0xBB), 50, 0, vec![]);
    chain.write_block(&b2_fork).unwrap();

    let (head, state) = chain.current_block().unwrap();
    assert_eq!(head.hash, b2_fork.hash);
    assert_eq!(canonical_hash(&chain, 1), Some(b1_fork.hash));
    assert_eq!(canonical_hash(&chain, 2), Some(b2_fork.hash));
    assert_eq!(canonical_hash(&chain, 3), None);
    assert_eq!(
        sorted(chain.leaf_hashes()),
        sorted(vec![b1.hash, b2_fork.hash])
    );

    // The state at HEAD reflects the fork branch only: 0xBB earned both
    // rewards, 0xAA earned nothing.
    assert_eq!(
        state.get_balance(&addr(0xBB)).unwrap(),
        Amount::from_u64(2 * REWARD)
    );
    assert_eq!(state.get_balance(&addr(0xAA)).unwrap(), Amount::zero());
}

#[test]
fn reorg_cleans_up_a_longer_displaced_chain() {
    setup_logger(LevelFilter::Debug);

    let kv = MemDB::new();
    let chain = test_chain(kv.clone());
    let (genesis, _) = chain.current_block().unwrap();

    // A three-block chain of low difficulty. Children can only be built
    // once their parent's state is in the store.
    let a1 = make_block(&kv, &genesis, addr(0xAA), 10, 0, vec![]);
    chain.write_block(&a1).unwrap();
    let a2 = make_block(&kv, &a1, addr(0xAA), 10, 0, vec![]);
    chain.write_block(&a2).unwrap();
    let a3 = make_block(&kv, &a2, addr(0xAA), 10, 0, vec![]);
    chain.write_block(&a3).unwrap();

    // A single heavy sibling of a1 displaces all three.
    let b1 = make_block(&kv, &genesis, addr(0xBB), 60, 1, vec![]);
    chain.write_block(&b1).unwrap();

    assert_eq!(chain.current_block().unwrap().0.hash, b1.hash);
    assert_eq!(canonical_hash(&chain, 1), Some(b1.hash));
    assert_eq!(canonical_hash(&chain, 2), None);
    assert_eq!(canonical_hash(&chain, 3), None);
}

#[test]
fn state_root_mismatch_leaves_no_trace() {
    setup_logger(LevelFilter::Debug);

    let kv = MemDB::new();
    let chain = test_chain(kv.clone());
    let (genesis, _) = chain.current_block().unwrap();

    let good = make_block(&kv, &genesis, addr(0xAA), 60, 0, vec![]);
    let mut header = good.header.clone();
    header.state_root = CryptoHash::new([0xDE; 32]);
    let bad = Block::new(header, good.transactions.clone());

    let before = kv.contents();
    assert!(matches!(
        chain.write_block(&bad),
        Err(BlockError::StateRootMismatch { .. })
    ));
    assert_eq!(kv.contents(), before);
    assert_eq!(chain.leaf_hashes(), vec![genesis.hash]);
}

#[test]
fn duplicate_insertion_is_rejected_without_writes() {
    setup_logger(LevelFilter::Debug);

    let kv = MemDB::new();
    let chain = test_chain(kv.clone());
    let (genesis, _) = chain.current_block().unwrap();

    let b1 = make_block(&kv, &genesis, addr(0xAA), 60, 0, vec![]);
    chain.write_block(&b1).unwrap();

    let before = kv.contents();
    assert!(matches!(
        chain.write_block(&b1),
        Err(BlockError::AlreadyExists { .. })
    ));
    assert_eq!(kv.contents(), before);
}

#[test]
fn reward_recipient_must_match_the_creator() {
    setup_logger(LevelFilter::Debug);

    let kv = MemDB::new();
    let chain = test_chain(kv.clone());
    let (genesis, _) = chain.current_block().unwrap();

    // Reward pays 0xBB while the header names 0xCC as creator.
    let built = make_block(&kv, &genesis, addr(0xBB), 60, 0, vec![]);
    let mut header = built.header.clone();
    header.creator = addr(0xCC);
    let bad = Block::new(header, built.transactions.clone());

    let before = kv.contents();
    assert!(matches!(
        chain.write_block(&bad),
        Err(BlockError::CoinbaseMismatch { .. })
    ));
    assert_eq!(kv.contents(), before);
}

#[test]
fn user_transactions_move_balances_and_nonces() {
    setup_logger(LevelFilter::Debug);

    let kv = MemDB::new();
    let chain = test_chain(kv.clone());
    let (genesis, _) = chain.current_block().unwrap();

    let key = funded_key();
    let txs = vec![
        transfer(&key, addr(0x11), 1_500, 0),
        transfer(&key, addr(0x22), 500, 1),
    ];
    let b1 = make_block(&kv, &genesis, addr(0xAA), 60, 0, txs);
    chain.write_block(&b1).unwrap();

    let state = chain.current_state().unwrap();
    assert_eq!(
        state.get_balance(&funded_address()).unwrap(),
        Amount::from_u64(FUNDED_BALANCE - 2_000)
    );
    assert_eq!(
        state.get_balance(&addr(0x11)).unwrap(),
        Amount::from_u64(1_500)
    );
    assert_eq!(
        state.get_balance(&addr(0x22)).unwrap(),
        Amount::from_u64(500)
    );
    assert_eq!(state.get_nonce(&funded_address()).unwrap(), 2);
}

#[test]
fn stale_nonce_fails_validation() {
    setup_logger(LevelFilter::Debug);

    let kv = MemDB::new();
    let chain = test_chain(kv.clone());
    let (genesis, _) = chain.current_block().unwrap();

    // The account nonce is 0; a transaction spending nonce 5 must fail
    // before state is even applied, so the claimed root is irrelevant.
    let bad = block_with_raw_txs(&genesis, vec![transfer(&funded_key(), addr(0x11), 100, 5)]);

    assert!(matches!(
        chain.write_block(&bad),
        Err(BlockError::TxValidationFailed { .. })
    ));
}

#[test]
fn overspending_transaction_fails_validation() {
    setup_logger(LevelFilter::Debug);

    let kv = MemDB::new();
    let chain = test_chain(kv.clone());
    let (genesis, _) = chain.current_block().unwrap();

    let bad = block_with_raw_txs(
        &genesis,
        vec![transfer(&funded_key(), addr(0x11), FUNDED_BALANCE + 1, 0)],
    );

    assert!(matches!(
        chain.write_block(&bad),
        Err(BlockError::TxValidationFailed { .. })
    ));
}

#[test]
fn contract_creation_is_rejected_by_name() {
    setup_logger(LevelFilter::Debug);

    let kv = MemDB::new();
    let chain = test_chain(kv.clone());
    let (genesis, _) = chain.current_block().unwrap();

    let key = funded_key();
    let creation = Transaction::new_signed(
        TransactionData {
            from: funded_address(),
            to: None,
            amount: Amount::from_u64(1),
            account_nonce: 0,
            payload: vec![0x60, 0x60],
            timestamp: 1,
        },
        &key,
    );
    let bad = block_with_raw_txs(&genesis, vec![creation]);

    assert!(matches!(
        chain.write_block(&bad),
        Err(BlockError::ContractCreationUnsupported { .. })
    ));
}

#[test]
fn structural_defects_are_rejected() {
    setup_logger(LevelFilter::Debug);

    let kv = MemDB::new();
    let chain = test_chain(kv.clone());
    let (genesis, _) = chain.current_block().unwrap();

    // Unknown parent.
    let orphan = {
        let mut header = make_block(&kv, &genesis, addr(0xAA), 60, 0, vec![]).header;
        header.previous_block_hash = CryptoHash::new([0x77; 32]);
        Block::new(header, vec![])
    };
    assert!(matches!(
        chain.write_block(&orphan),
        Err(BlockError::InvalidParentHash { .. })
    ));

    // Tampered cached hash.
    let good = make_block(&kv, &genesis, addr(0xAA), 60, 0, vec![]);
    let mut mismatched = good.clone();
    mismatched.hash = CryptoHash::new([0x01; 32]);
    assert!(matches!(
        chain.write_block(&mismatched),
        Err(BlockError::HashMismatch { .. })
    ));

    // Tampered transactions root.
    let mut header = good.header.clone();
    header.transactions_root = CryptoHash::new([0x02; 32]);
    let bad_root = Block::new(header, good.transactions.clone());
    assert!(matches!(
        chain.write_block(&bad_root),
        Err(BlockError::TransactionsRootMismatch { .. })
    ));

    // Height not parent + 1.
    let mut header = good.header.clone();
    header.height = BlockHeight::new(5);
    let bad_height = Block::new(header, good.transactions.clone());
    assert!(matches!(
        chain.write_block(&bad_height),
        Err(BlockError::InvalidHeight { .. })
    ));
}

#[test]
fn equal_total_difficulty_keeps_the_incumbent() {
    setup_logger(LevelFilter::Debug);

    let kv = MemDB::new();
    let chain = test_chain(kv.clone());
    let (genesis, _) = chain.current_block().unwrap();

    let b1 = make_block(&kv, &genesis, addr(0xAA), 60, 0, vec![]);
    chain.write_block(&b1).unwrap();

    // Same difficulty, same parent: the challenger becomes a leaf but the
    // canonical chain does not move.
    let rival = make_block(&kv, &genesis, addr(0xBB), 60, 1, vec![]);
    chain.write_block(&rival).unwrap();

    assert_eq!(chain.current_block().unwrap().0.hash, b1.hash);
    assert_eq!(canonical_hash(&chain, 1), Some(b1.hash));
    assert_eq!(sorted(chain.leaf_hashes()), sorted(vec![b1.hash, rival.hash]));
}

#[test]
fn insertion_orders_converge_on_the_heaviest_tip() {
    setup_logger(LevelFilter::Debug);

    // Two branches: A = a1(60), a2(10); B = f1(40), f2(50). B's tip wins
    // with 190 over A's 170. The blocks are built once on a scratch chain
    // so that each parent's state exists while its child is assembled.
    let blocks = {
        let kv = MemDB::new();
        let chain = test_chain(kv.clone());
        let (genesis, _) = chain.current_block().unwrap();
        let a1 = make_block(&kv, &genesis, addr(0xAA), 60, 0, vec![]);
        chain.write_block(&a1).unwrap();
        let a2 = make_block(&kv, &a1, addr(0xAA), 10, 0, vec![]);
        chain.write_block(&a2).unwrap();
        let f1 = make_block(&kv, &genesis, addr(0xBB), 40, 1, vec![]);
        chain.write_block(&f1).unwrap();
        let f2 = make_block(&kv, &f1, addr(0xBB), 50, 0, vec![]);
        chain.write_block(&f2).unwrap();
        [a1, a2, f1, f2]
    };

    let mut heads = Vec::new();
    // Two parent-before-child insertion orders over the four blocks, each
    // replayed on a fresh store.
    for order in [[0usize, 1, 2, 3], [2, 0, 3, 1]] {
        let chain = test_chain(MemDB::new());
        for i in order {
            chain.write_block(&blocks[i]).unwrap();
        }
        assert_eq!(chain.current_block().unwrap().0.hash, blocks[3].hash);
        heads.push((
            chain.current_block().unwrap().0.hash,
            canonical_hash(&chain, 1),
            canonical_hash(&chain, 2),
        ));
    }
    assert_eq!(heads[0], heads[1]);
}

#[test]
fn canonical_entries_reach_genesis_in_exactly_their_height() {
    setup_logger(LevelFilter::Debug);

    let kv = MemDB::new();
    let chain = test_chain(kv.clone());
    let (genesis, _) = chain.current_block().unwrap();

    let a1 = make_block(&kv, &genesis, addr(0xAA), 10, 0, vec![]);
    chain.write_block(&a1).unwrap();
    let a2 = make_block(&kv, &a1, addr(0xAA), 10, 0, vec![]);
    chain.write_block(&a2).unwrap();
    let f1 = make_block(&kv, &genesis, addr(0xBB), 15, 1, vec![]);
    chain.write_block(&f1).unwrap();
    let f2 = make_block(&kv, &f1, addr(0xBB), 15, 0, vec![]);
    chain.write_block(&f2).unwrap();

    let head_height = chain.current_block().unwrap().0.header.height.int();
    for h in 0..=head_height {
        let mut hash = canonical_hash(&chain, h).unwrap();
        let mut hops = 0;
        while hash != chain.genesis_hash() {
            hash = chain
                .get_store()
                .get_header(&hash)
                .unwrap()
                .previous_block_hash;
            hops += 1;
        }
        assert_eq!(hops, h);
    }
}

#[test]
fn restart_recovers_head_state_and_leaves() {
    setup_logger(LevelFilter::Debug);

    let kv = MemDB::new();
    let (b1_hash, fork_hash) = {
        let chain = test_chain(kv.clone());
        let (genesis, _) = chain.current_block().unwrap();
        let b1 = make_block(&kv, &genesis, addr(0xAA), 60, 0, vec![]);
        chain.write_block(&b1).unwrap();
        let fork = make_block(&kv, &genesis, addr(0xBB), 40, 1, vec![]);
        chain.write_block(&fork).unwrap();
        (b1.hash, fork.hash)
    };

    // A fresh instance over the same bytes converges on the same head.
    let chain = test_chain(kv.clone());
    let (head, state) = chain.current_block().unwrap();
    assert_eq!(head.hash, b1_hash);
    assert_eq!(
        state.get_balance(&addr(0xAA)).unwrap(),
        Amount::from_u64(REWARD)
    );
    // Only HEAD is rebuilt into the registry; the side fork stays reachable
    // by hash.
    assert_eq!(chain.leaf_hashes(), vec![b1_hash]);
    assert!(chain.get_store().has_block(&fork_hash).unwrap());
}

#[test]
fn mismatched_genesis_config_is_refused() {
    setup_logger(LevelFilter::Debug);

    let kv = MemDB::new();
    drop(test_chain(kv.clone()));

    let mut other = common::genesis_config();
    other.timestamp = 99;
    assert!(matches!(
        Blockchain::new(kv, PermissiveEngine, other),
        Err(ChainError::GenesisMismatch { .. })
    ));
}

#[test]
fn read_api_serves_blocks_by_height_and_hash() {
    setup_logger(LevelFilter::Debug);

    let kv = MemDB::new();
    let chain = test_chain(kv.clone());
    let (genesis, _) = chain.current_block().unwrap();

    let key = funded_key();
    let b1 = make_block(
        &kv,
        &genesis,
        addr(0xAA),
        60,
        0,
        vec![transfer(&key, addr(0x11), 100, 0)],
    );
    chain.write_block(&b1).unwrap();

    // Negative height addresses HEAD.
    let head_view = chain.get_block_by_height(-1, false).unwrap();
    assert_eq!(head_view.hash, b1.hash);
    match head_view.transactions {
        BlockTransactions::Hashes(hashes) => {
            assert_eq!(hashes, vec![b1.transactions[0].hash, b1.transactions[1].hash])
        }
        BlockTransactions::Full(_) => panic!("expected hashes only"),
    }

    let full = chain.get_block_by_hash(&b1.hash, true).unwrap();
    match full.transactions {
        BlockTransactions::Full(txs) => assert_eq!(txs.len(), 2),
        BlockTransactions::Hashes(_) => panic!("expected full transactions"),
    }

    assert_eq!(chain.get_block_by_height(0, false).unwrap().hash, genesis.hash);
    assert!(chain.get_block_by_height(9, false).is_err());
}
