//! The per-address account record.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::basic::{Amount, CryptoHash};

/// State carried for one address. `code_hash` and `storage_root` are
/// reserved for contract accounts, which the chain does not execute yet;
/// both stay [CryptoHash::EMPTY].
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Account {
    pub balance: Amount,
    pub nonce: u64,
    pub code_hash: CryptoHash,
    pub storage_root: CryptoHash,
}

impl Account {
    pub fn empty() -> Account {
        Account {
            balance: Amount::zero(),
            nonce: 0,
            code_hash: CryptoHash::EMPTY,
            storage_root: CryptoHash::EMPTY,
        }
    }
}
