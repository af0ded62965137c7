//! Transactions: the signed transfer records carried by blocks.

use std::fmt::{self, Display, Formatter};

use borsh::{BorshDeserialize, BorshSerialize};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use sha2::Digest;

use crate::state::{StateDb, StateError};
use crate::store::kv_store::KVStore;
use crate::types::basic::{Address, Amount, CryptoHash};
use crate::types::block::CryptoHasher;

/// The fields of a transaction that are hashed and signed.
#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
pub struct TransactionData {
    pub from: Address,
    /// `None` signals contract creation, which the chain rejects.
    pub to: Option<Address>,
    pub amount: Amount,
    /// The sender's account nonce this transaction spends.
    pub account_nonce: u64,
    pub payload: Vec<u8>,
    pub timestamp: u64,
}

/// Ed25519 authorization over a transaction hash. The sender address must
/// be the address of `public_key`.
#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
pub struct TransactionSignature {
    pub public_key: [u8; 32],
    pub signature: [u8; 64],
}

#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
pub struct Transaction {
    /// Cached [hash](Transaction::hash_of) of `data`.
    pub hash: CryptoHash,
    pub data: TransactionData,
    /// `None` only for the miner-reward transaction, which is unsigned.
    pub signature: Option<TransactionSignature>,
}

impl Transaction {
    /// SHA-256 over the Borsh encoding of `data`.
    pub fn hash_of(data: &TransactionData) -> CryptoHash {
        let mut hasher = CryptoHasher::new();
        hasher.update(&data.try_to_vec().unwrap());
        CryptoHash::new(hasher.finalize().into())
    }

    /// Builds and signs a user transaction. `data.from` should be the
    /// address of `key`'s verifying key, or validation will reject it.
    pub fn new_signed(data: TransactionData, key: &SigningKey) -> Transaction {
        let hash = Self::hash_of(&data);
        let signature = key.sign(&hash.bytes());
        Transaction {
            hash,
            data,
            signature: Some(TransactionSignature {
                public_key: key.verifying_key().to_bytes(),
                signature: signature.to_bytes(),
            }),
        }
    }

    /// The unsigned miner-reward transaction placed first in every block.
    pub fn new_reward(to: Address, amount: Amount, timestamp: u64) -> Transaction {
        let data = TransactionData {
            from: Address::ZERO,
            to: Some(to),
            amount,
            account_nonce: 0,
            payload: Vec::new(),
            timestamp,
        };
        Transaction {
            hash: Self::hash_of(&data),
            data,
            signature: None,
        }
    }

    /// Checks the Ed25519 signature and that the signing key owns the
    /// sender address.
    pub fn verify_signature(&self) -> Result<(), TxValidationError> {
        let Some(sig) = &self.signature else {
            return Err(TxValidationError::MissingSignature { tx: self.hash });
        };
        let key = VerifyingKey::from_bytes(&sig.public_key)
            .map_err(|_| TxValidationError::InvalidSignature { tx: self.hash })?;
        if Address::from_public_key(&key) != self.data.from {
            return Err(TxValidationError::InvalidSignature { tx: self.hash });
        }
        let signature = Signature::from_bytes(&sig.signature);
        key.verify(&self.hash.bytes(), &signature)
            .map_err(|_| TxValidationError::InvalidSignature { tx: self.hash })
    }

    /// Admission checks against the pre-state this transaction will execute
    /// on: cached hash integrity, signature, account nonce, spendable
    /// balance.
    pub fn validate<K: KVStore>(&self, state: &StateDb<K>) -> Result<(), TxValidationError> {
        if self.hash != Self::hash_of(&self.data) {
            return Err(TxValidationError::HashMismatch { tx: self.hash });
        }
        self.verify_signature()?;

        let nonce = state.get_nonce(&self.data.from)?;
        if nonce != self.data.account_nonce {
            return Err(TxValidationError::NonceMismatch {
                tx: self.hash,
                expected: nonce,
                got: self.data.account_nonce,
            });
        }

        let balance = state.get_balance(&self.data.from)?;
        if balance < self.data.amount {
            return Err(TxValidationError::InsufficientBalance {
                tx: self.hash,
                balance,
                amount: self.data.amount.clone(),
            });
        }

        Ok(())
    }
}

/// Why a transaction failed admission.
#[derive(Debug)]
pub enum TxValidationError {
    MissingSignature {
        tx: CryptoHash,
    },
    InvalidSignature {
        tx: CryptoHash,
    },
    HashMismatch {
        tx: CryptoHash,
    },
    NonceMismatch {
        tx: CryptoHash,
        expected: u64,
        got: u64,
    },
    InsufficientBalance {
        tx: CryptoHash,
        balance: Amount,
        amount: Amount,
    },
    /// The state view itself failed; not a verdict on the transaction.
    State(StateError),
}

impl From<StateError> for TxValidationError {
    fn from(err: StateError) -> Self {
        TxValidationError::State(err)
    }
}

impl Display for TxValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TxValidationError::MissingSignature { tx } => {
                write!(f, "transaction {} carries no signature", tx)
            }
            TxValidationError::InvalidSignature { tx } => {
                write!(f, "invalid signature on transaction {}", tx)
            }
            TxValidationError::HashMismatch { tx } => {
                write!(f, "cached hash of transaction {} does not match its data", tx)
            }
            TxValidationError::NonceMismatch { tx, expected, got } => write!(
                f,
                "transaction {} carries nonce {} but the account is at {}",
                tx, got, expected
            ),
            TxValidationError::InsufficientBalance {
                tx,
                balance,
                amount,
            } => write!(
                f,
                "transaction {} moves {} but the sender holds {}",
                tx, amount, balance
            ),
            TxValidationError::State(err) => write!(f, "state read failed: {}", err),
        }
    }
}
