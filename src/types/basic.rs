//! Newtypes for the scalar quantities that flow through the chain core.
//!
//! These follow the newtype pattern: a private field, `new` and accessor
//! methods, and arithmetic operator impls only where the domain calls for
//! them. `Amount`, `Difficulty` and `TotalDifficulty` wrap arbitrary
//! precision unsigned integers and are serialized as their big-endian
//! magnitude bytes.

use std::fmt::{self, Debug, Display, Formatter};
use std::io;
use std::ops::{Add, AddAssign};

use borsh::{BorshDeserialize, BorshSerialize};
use num_bigint::BigUint;
use sha2::Digest;

/// 256-bit content address. Used for blocks, headers, state roots and state
/// trie nodes, with a distinguished [empty](CryptoHash::EMPTY) value.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize)]
pub struct CryptoHash([u8; 32]);

impl CryptoHash {
    /// The all-zero hash: previous-block hash of genesis, root of the empty
    /// state trie.
    pub const EMPTY: CryptoHash = CryptoHash([0u8; 32]);

    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }
}

impl Display for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Debug for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// 20-byte account identifier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize)]
pub struct Address([u8; 20]);

impl Address {
    /// The zero address: sender of reward transactions and the default
    /// genesis coinbase.
    pub const ZERO: Address = Address([0u8; 20]);

    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; 20] {
        self.0
    }

    /// The address owned by an Ed25519 key: the last 20 bytes of the
    /// SHA-256 of the verifying key.
    pub fn from_public_key(key: &ed25519_dalek::VerifyingKey) -> Address {
        let digest = sha2::Sha256::digest(key.as_bytes());
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest[12..]);
        Address(bytes)
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Debug for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Height of a block in the chain. Genesis sits at height 0.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct BlockHeight(u64);

impl BlockHeight {
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }

    pub fn to_be_bytes(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl Display for BlockHeight {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Add<u64> for BlockHeight {
    type Output = BlockHeight;

    fn add(self, rhs: u64) -> Self::Output {
        BlockHeight(self.0.add(rhs))
    }
}

impl AddAssign<u64> for BlockHeight {
    fn add_assign(&mut self, rhs: u64) {
        self.0.add_assign(rhs)
    }
}

/// Arbitrary-precision non-negative quantity of coin.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Amount(BigUint);

impl Amount {
    pub fn new(int: BigUint) -> Self {
        Self(int)
    }

    pub fn from_u64(int: u64) -> Self {
        Self(BigUint::from(int))
    }

    pub fn zero() -> Self {
        Self(BigUint::default())
    }

    pub fn is_zero(&self) -> bool {
        self.0 == BigUint::default()
    }

    pub fn int(&self) -> &BigUint {
        &self.0
    }

    /// `self - rhs`, or `None` when the result would be negative.
    pub fn checked_sub(&self, rhs: &Amount) -> Option<Amount> {
        if self.0 >= rhs.0 {
            Some(Amount(&self.0 - &rhs.0))
        } else {
            None
        }
    }
}

impl AddAssign<&Amount> for Amount {
    fn add_assign(&mut self, rhs: &Amount) {
        self.0 += &rhs.0
    }
}

impl Display for Amount {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl BorshSerialize for Amount {
    fn serialize<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        serialize_biguint(&self.0, writer)
    }
}

impl BorshDeserialize for Amount {
    fn deserialize(buf: &mut &[u8]) -> io::Result<Self> {
        Ok(Amount(deserialize_biguint(buf)?))
    }
}

/// Per-block proof-of-work difficulty.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Difficulty(BigUint);

impl Difficulty {
    pub fn new(int: BigUint) -> Self {
        Self(int)
    }

    pub fn from_u64(int: u64) -> Self {
        Self(BigUint::from(int))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == BigUint::default()
    }

    pub fn int(&self) -> &BigUint {
        &self.0
    }
}

impl Display for Difficulty {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl BorshSerialize for Difficulty {
    fn serialize<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        serialize_biguint(&self.0, writer)
    }
}

impl BorshDeserialize for Difficulty {
    fn deserialize(buf: &mut &[u8]) -> io::Result<Self> {
        Ok(Difficulty(deserialize_biguint(buf)?))
    }
}

/// Sum of per-block difficulties from genesis to a given block, measuring
/// the cumulative work behind it.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct TotalDifficulty(BigUint);

impl TotalDifficulty {
    pub fn new(int: BigUint) -> Self {
        Self(int)
    }

    pub fn from_u64(int: u64) -> Self {
        Self(BigUint::from(int))
    }

    pub fn int(&self) -> &BigUint {
        &self.0
    }
}

impl From<Difficulty> for TotalDifficulty {
    fn from(difficulty: Difficulty) -> Self {
        TotalDifficulty(difficulty.0)
    }
}

impl Add<&Difficulty> for TotalDifficulty {
    type Output = TotalDifficulty;

    fn add(self, rhs: &Difficulty) -> Self::Output {
        TotalDifficulty(self.0 + &rhs.0)
    }
}

impl Display for TotalDifficulty {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl BorshSerialize for TotalDifficulty {
    fn serialize<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        serialize_biguint(&self.0, writer)
    }
}

impl BorshDeserialize for TotalDifficulty {
    fn deserialize(buf: &mut &[u8]) -> io::Result<Self> {
        Ok(TotalDifficulty(deserialize_biguint(buf)?))
    }
}

fn serialize_biguint<W: io::Write>(int: &BigUint, writer: &mut W) -> io::Result<()> {
    int.to_bytes_be().serialize(writer)
}

fn deserialize_biguint(buf: &mut &[u8]) -> io::Result<BigUint> {
    Ok(BigUint::from_bytes_be(&Vec::<u8>::deserialize(buf)?))
}
