//! Event names and formatting helpers for the chain's log lines.
//!
//! The chain logs through the [log](https://docs.rs/log/latest/log/) crate;
//! set up a logging implementation to get the messages onto a terminal or
//! into a file. Messages are CSVs (Comma Separated Values) whose first
//! value is the event name in PascalCase. Hashes are rendered as the first
//! seven characters of their Base64 encoding.
//!
//! Accepted blocks and canonical-chain changes are logged at `info`;
//! rejected blocks at `debug`. Validation verdicts are the caller's to act
//! on and are never logged at `error` here.

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};

use crate::types::basic::CryptoHash;

pub(crate) const INSTALL_GENESIS: &str = "InstallGenesis";
pub(crate) const INSERT_BLOCK: &str = "InsertBlock";
pub(crate) const REORG_CHAIN: &str = "ReorgChain";
pub(crate) const REJECT_BLOCK: &str = "RejectBlock";

// Get a more readable representation of a hash by base64-encoding it and
// taking the first 7 characters.
pub(crate) fn short_hash(hash: &CryptoHash) -> String {
    let encoded = STANDARD_NO_PAD.encode(hash.bytes());
    if encoded.len() > 7 {
        encoded[0..7].to_string()
    } else {
        encoded
    }
}
