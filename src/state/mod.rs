//! The versioned account state.
//!
//! Account records live in a content-addressed Merkle-Patricia trie keyed
//! by address. A [StateDb] is a view of that trie at one root hash:
//!
//! 1. Used read-only, `get_balance`/`get_nonce`/`get_account` never mutate
//!    anything and views at different roots are fully independent.
//! 2. Used mutably, `add_amount`/`sub_amount`/`set_nonce` buffer changes in
//!    memory until [StateDb::commit] folds them into the trie, serialises
//!    the dirty trie nodes into a write batch, and returns the new root.
//!
//! Committing touches only the batch; the underlying store is unchanged
//! until the caller writes the batch, so a rejected block leaves no trace.

pub mod account;

mod trie;

use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::io;

use borsh::{BorshDeserialize, BorshSerialize};

use crate::state::account::Account;
use crate::state::trie::Trie;
use crate::store::kv_store::{KVStore, StoreError};
use crate::store::write_batch::ChainWriteBatch;
use crate::types::basic::{Address, Amount, CryptoHash};

pub struct StateDb<K: KVStore> {
    trie: Trie<K>,
    root: CryptoHash,
    dirty: HashMap<Address, Account>,
}

impl<K: KVStore> StateDb<K> {
    /// Opens a view of the state committed at `root`. Fails with
    /// [StateError::MissingStateNode] when a non-empty root is not present
    /// in the store.
    pub fn new(root: CryptoHash, kv: K) -> Result<StateDb<K>, StateError> {
        Ok(StateDb {
            trie: Trie::open(kv, root)?,
            root,
            dirty: HashMap::new(),
        })
    }

    /// The root this view was opened at. Mutations do not move it until
    /// [StateDb::commit].
    pub fn root(&self) -> CryptoHash {
        self.root
    }

    pub fn get_account(&self, address: &Address) -> Result<Option<Account>, StateError> {
        if let Some(account) = self.dirty.get(address) {
            return Ok(Some(account.clone()));
        }
        match self.trie.get(&address.bytes())? {
            Some(bytes) => Ok(Some(Account::deserialize(&mut &*bytes).map_err(
                |source| StateError::DeserializeAccount {
                    address: *address,
                    source,
                },
            )?)),
            None => Ok(None),
        }
    }

    /// Zero for addresses without an account.
    pub fn get_balance(&self, address: &Address) -> Result<Amount, StateError> {
        Ok(self
            .get_account(address)?
            .map(|account| account.balance)
            .unwrap_or_else(Amount::zero))
    }

    /// Zero for addresses without an account.
    pub fn get_nonce(&self, address: &Address) -> Result<u64, StateError> {
        Ok(self
            .get_account(address)?
            .map(|account| account.nonce)
            .unwrap_or(0))
    }

    /// Credits `amount`, creating the account when absent.
    pub fn add_amount(&mut self, address: &Address, amount: &Amount) -> Result<(), StateError> {
        let mut account = self.take_or_create(address)?;
        account.balance += amount;
        self.dirty.insert(*address, account);
        Ok(())
    }

    /// Debits `amount`. Fails with [StateError::InsufficientBalance] when
    /// the balance would go negative, leaving the account untouched.
    pub fn sub_amount(&mut self, address: &Address, amount: &Amount) -> Result<(), StateError> {
        let account = self.take_or_create(address)?;
        match account.balance.checked_sub(amount) {
            Some(balance) => {
                let mut account = account;
                account.balance = balance;
                self.dirty.insert(*address, account);
                Ok(())
            }
            None => {
                let balance = account.balance.clone();
                self.dirty.insert(*address, account);
                Err(StateError::InsufficientBalance {
                    address: *address,
                    balance,
                    amount: amount.clone(),
                })
            }
        }
    }

    pub fn set_nonce(&mut self, address: &Address, nonce: u64) -> Result<(), StateError> {
        let mut account = self.take_or_create(address)?;
        account.nonce = nonce;
        self.dirty.insert(*address, account);
        Ok(())
    }

    /// Folds every touched account into the trie, serialises the dirty trie
    /// nodes into `wb`, and returns the new root. Equal mutations over
    /// equal source roots commit to equal roots, whatever their order.
    pub fn commit(
        &mut self,
        wb: &mut ChainWriteBatch<K::WriteBatch>,
    ) -> Result<CryptoHash, StateError> {
        let mut touched: Vec<(Address, Account)> = self.dirty.drain().collect();
        touched.sort_by_key(|(address, _)| *address);
        for (address, account) in touched {
            let bytes = account
                .try_to_vec()
                .map_err(|source| StateError::SerializeAccount { address, source })?;
            self.trie.insert(&address.bytes(), bytes)?;
        }
        let root = self.trie.commit(wb)?;
        self.root = root;
        Ok(root)
    }

    fn take_or_create(&mut self, address: &Address) -> Result<Account, StateError> {
        match self.dirty.remove(address) {
            Some(account) => Ok(account),
            None => Ok(self.get_account(address)?.unwrap_or_else(Account::empty)),
        }
    }
}

/// Error reading or committing the account state.
#[derive(Debug)]
pub enum StateError {
    /// A trie node referenced from a root or another node is absent from
    /// the store. Fatal: the state database is corrupt.
    MissingStateNode { node: CryptoHash },
    InsufficientBalance {
        address: Address,
        balance: Amount,
        amount: Amount,
    },
    DeserializeNode { node: CryptoHash, source: io::Error },
    SerializeNode { source: io::Error },
    DeserializeAccount { address: Address, source: io::Error },
    SerializeAccount { address: Address, source: io::Error },
    Store(StoreError),
}

impl From<StoreError> for StateError {
    fn from(err: StoreError) -> Self {
        StateError::Store(err)
    }
}

impl Display for StateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            StateError::MissingStateNode { node } => {
                write!(f, "state trie node {} is missing from the store", node)
            }
            StateError::InsufficientBalance {
                address,
                balance,
                amount,
            } => write!(
                f,
                "account {} holds {} but {} was debited",
                address, balance, amount
            ),
            StateError::DeserializeNode { node, source } => {
                write!(f, "failed to deserialize state trie node {}: {}", node, source)
            }
            StateError::SerializeNode { source } => {
                write!(f, "failed to serialize state trie node: {}", source)
            }
            StateError::DeserializeAccount { address, source } => {
                write!(f, "failed to deserialize account {}: {}", address, source)
            }
            StateError::SerializeAccount { address, source } => {
                write!(f, "failed to serialize account {}: {}", address, source)
            }
            StateError::Store(err) => Display::fmt(err, f),
        }
    }
}
