//! Definitions for the block and header types and their hashing rules.

use borsh::{BorshDeserialize, BorshSerialize};
pub use sha2::Sha256 as CryptoHasher;
use sha2::Digest;

use crate::types::basic::{Address, BlockHeight, CryptoHash, Difficulty};
use crate::types::transaction::Transaction;

// Domain tags for the transactions Merkle tree.
const MERKLE_LEAF_PREFIX: u8 = 0x00;
const MERKLE_INTERNAL_PREFIX: u8 = 0x01;

#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
pub struct BlockHeader {
    pub previous_block_hash: CryptoHash,
    /// Coinbase address: the miner the block's reward transaction pays.
    pub creator: Address,
    /// Root of the account state after applying this block's transactions.
    pub state_root: CryptoHash,
    /// Merkle root over the block's transaction hashes.
    pub transactions_root: CryptoHash,
    pub height: BlockHeight,
    pub difficulty: Difficulty,
    /// Proof-of-work nonce.
    pub nonce: u64,
    pub timestamp: u64,
}

impl BlockHeader {
    /// SHA-256 over the Borsh encoding of every header field.
    pub fn hash(&self) -> CryptoHash {
        let mut hasher = CryptoHasher::new();
        hasher.update(&self.try_to_vec().unwrap());
        CryptoHash::new(hasher.finalize().into())
    }
}

#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
pub struct Block {
    /// Cached [BlockHeader::hash] of `header`.
    pub hash: CryptoHash,
    pub header: BlockHeader,
    /// `transactions[0]` is the miner-reward transaction.
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn new(header: BlockHeader, transactions: Vec<Transaction>) -> Block {
        Block {
            hash: header.hash(),
            header,
            transactions,
        }
    }
}

/// Merkle root over the hashes of `transactions`: a binary SHA-256 tree with
/// domain-separated leaf and internal nodes; an odd node is promoted to the
/// next level unchanged. The empty list hashes to [CryptoHash::EMPTY].
pub fn merkle_root(transactions: &[Transaction]) -> CryptoHash {
    if transactions.is_empty() {
        return CryptoHash::EMPTY;
    }

    let mut level: Vec<CryptoHash> = transactions.iter().map(|tx| hash_leaf(&tx.hash)).collect();
    while level.len() > 1 {
        let mut next = Vec::with_capacity((level.len() + 1) / 2);
        let mut i = 0;
        while i < level.len() {
            if i + 1 < level.len() {
                next.push(hash_internal(&level[i], &level[i + 1]));
            } else {
                next.push(level[i]);
            }
            i += 2;
        }
        level = next;
    }
    level[0]
}

fn hash_leaf(tx_hash: &CryptoHash) -> CryptoHash {
    let mut hasher = CryptoHasher::new();
    hasher.update([MERKLE_LEAF_PREFIX]);
    hasher.update(tx_hash.bytes());
    CryptoHash::new(hasher.finalize().into())
}

fn hash_internal(left: &CryptoHash, right: &CryptoHash) -> CryptoHash {
    let mut hasher = CryptoHasher::new();
    hasher.update([MERKLE_INTERNAL_PREFIX]);
    hasher.update(left.bytes());
    hasher.update(right.bytes());
    CryptoHash::new(hasher.finalize().into())
}
