//! Byte-prefixes that specify where each persisted chain variable lives in
//! the user-provided key-value store.
//!
//! Mappings ("block hash to block bytes", "height to canonical hash") store
//! each entry under the concatenation of the variable's one-byte prefix and
//! the serialized lookup key: a hash's 32 bytes, or a height's big-endian
//! `u64` bytes. Single values (the HEAD pointer) sit directly under their
//! prefix. State trie nodes occupy their own namespace, keyed by node hash
//! and owned entirely by the state database.

// Key namespaces
pub const BLOCKS: [u8; 1] = [0];
pub const HEADERS: [u8; 1] = [1];
pub const TOTAL_DIFFICULTIES: [u8; 1] = [2];
pub const CANONICAL_HASH_AT_HEIGHT: [u8; 1] = [3];
pub const HEAD_BLOCK: [u8; 1] = [4];
pub const STATE_NODES: [u8; 1] = [5];

/// Concatenate two byteslices into one vector.
pub fn combine(a: &[u8], b: &[u8]) -> Vec<u8> {
    let mut res = Vec::with_capacity(a.len() + b.len());
    res.extend_from_slice(a);
    res.extend_from_slice(b);
    res
}
