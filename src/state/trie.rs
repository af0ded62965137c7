//! Content-addressed Merkle-Patricia trie backing the account state.
//!
//! Keys are split into 4-bit nibbles and stored across three node kinds:
//! leaves (remaining path + value), extensions (shared path segment +
//! single child) and branches (16 children + optional value). Persisted
//! nodes reference children by hash; a node's address is the SHA-256 of
//! its Borsh encoding, stored under [paths::STATE_NODES].
//!
//! A mutable trie keeps the nodes it has modified in memory. [Trie::commit]
//! serialises them into a write batch bottom-up and returns the new root
//! address; the store itself is untouched until the caller writes the
//! batch. The structure of the trie is a function of its contents alone,
//! so equal insertions over equal source roots commit to equal roots in
//! any order.

use borsh::{BorshDeserialize, BorshSerialize};
use sha2::Digest;

use crate::state::StateError;
use crate::store::kv_store::{KVGet, KVStore};
use crate::store::paths::{self, combine};
use crate::store::write_batch::ChainWriteBatch;
use crate::types::basic::CryptoHash;
use crate::types::block::CryptoHasher;

/// Reference to a subtree: absent, persisted under a hash, or modified in
/// memory.
enum Link {
    Empty,
    Hash(CryptoHash),
    Node(Box<Node>),
}

enum Node {
    Leaf {
        path: Vec<u8>,
        value: Vec<u8>,
    },
    Extension {
        path: Vec<u8>,
        child: Link,
    },
    Branch {
        children: [Link; 16],
        value: Option<Vec<u8>>,
    },
}

/// The persisted form of a node: children are always hashes.
#[derive(BorshSerialize, BorshDeserialize)]
enum StoredNode {
    Leaf {
        path: Vec<u8>,
        value: Vec<u8>,
    },
    Extension {
        path: Vec<u8>,
        child: CryptoHash,
    },
    Branch {
        children: [Option<CryptoHash>; 16],
        value: Option<Vec<u8>>,
    },
}

pub(crate) struct Trie<K: KVStore> {
    kv: K,
    root: Link,
}

impl<K: KVStore> Trie<K> {
    /// Opens the trie at `root`. [CryptoHash::EMPTY] denotes the empty
    /// trie; any other root must be present in the store.
    pub fn open(kv: K, root: CryptoHash) -> Result<Trie<K>, StateError> {
        let root = if root.is_empty() {
            Link::Empty
        } else {
            if !kv.has(&node_key(&root))? {
                return Err(StateError::MissingStateNode { node: root });
            }
            Link::Hash(root)
        };
        Ok(Trie { kv, root })
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StateError> {
        let path = nibbles(key);
        self.get_at(&self.root, &path)
    }

    /// Inserts `value` at `key`, replacing any previous value. The touched
    /// path is materialised in memory until the next [Trie::commit].
    pub fn insert(&mut self, key: &[u8], value: Vec<u8>) -> Result<(), StateError> {
        let path = nibbles(key);
        let root = std::mem::replace(&mut self.root, Link::Empty);
        self.root = self.insert_at(root, &path, value)?;
        Ok(())
    }

    /// Serialises every in-memory node into `wb` bottom-up and returns the
    /// new root address.
    pub fn commit(
        &mut self,
        wb: &mut ChainWriteBatch<K::WriteBatch>,
    ) -> Result<CryptoHash, StateError> {
        let root = std::mem::replace(&mut self.root, Link::Empty);
        let (root, hash) = commit_link::<K>(root, wb)?;
        self.root = root;
        Ok(hash)
    }

    fn get_at(&self, link: &Link, path: &[u8]) -> Result<Option<Vec<u8>>, StateError> {
        match link {
            Link::Empty => Ok(None),
            Link::Hash(hash) => {
                let node = self.load(hash)?;
                self.get_in(&node, path)
            }
            Link::Node(node) => self.get_in(node, path),
        }
    }

    fn get_in(&self, node: &Node, path: &[u8]) -> Result<Option<Vec<u8>>, StateError> {
        match node {
            Node::Leaf {
                path: leaf_path,
                value,
            } => Ok((leaf_path.as_slice() == path).then(|| value.clone())),
            Node::Extension {
                path: ext_path,
                child,
            } => match path.strip_prefix(ext_path.as_slice()) {
                Some(rest) => self.get_at(child, rest),
                None => Ok(None),
            },
            Node::Branch { children, value } => match path.split_first() {
                None => Ok(value.clone()),
                Some((nibble, rest)) => self.get_at(&children[*nibble as usize], rest),
            },
        }
    }

    fn insert_at(&self, link: Link, path: &[u8], value: Vec<u8>) -> Result<Link, StateError> {
        let node = match link {
            Link::Empty => {
                return Ok(Link::Node(Box::new(Node::Leaf {
                    path: path.to_vec(),
                    value,
                })))
            }
            Link::Hash(hash) => self.load(&hash)?,
            Link::Node(node) => *node,
        };
        Ok(Link::Node(Box::new(self.insert_in(node, path, value)?)))
    }

    fn insert_in(&self, node: Node, path: &[u8], value: Vec<u8>) -> Result<Node, StateError> {
        match node {
            Node::Leaf {
                path: leaf_path,
                value: leaf_value,
            } => {
                if leaf_path.as_slice() == path {
                    return Ok(Node::Leaf {
                        path: leaf_path,
                        value,
                    });
                }

                // Diverging leaf: split into a branch under the shared
                // prefix.
                let common = common_prefix_len(&leaf_path, path);
                let mut children: [Link; 16] = std::array::from_fn(|_| Link::Empty);
                let mut branch_value = None;

                let leaf_rest = &leaf_path[common..];
                match leaf_rest.split_first() {
                    None => branch_value = Some(leaf_value),
                    Some((nibble, rest)) => {
                        children[*nibble as usize] = Link::Node(Box::new(Node::Leaf {
                            path: rest.to_vec(),
                            value: leaf_value,
                        }))
                    }
                }

                let new_rest = &path[common..];
                match new_rest.split_first() {
                    None => branch_value = Some(value),
                    Some((nibble, rest)) => {
                        children[*nibble as usize] = Link::Node(Box::new(Node::Leaf {
                            path: rest.to_vec(),
                            value,
                        }))
                    }
                }

                Ok(wrap_in_prefix(&path[..common], Node::Branch {
                    children,
                    value: branch_value,
                }))
            }
            Node::Extension {
                path: ext_path,
                child,
            } => {
                let common = common_prefix_len(&ext_path, path);
                if common == ext_path.len() {
                    // The new path runs through the whole extension.
                    let child = self.insert_at(child, &path[common..], value)?;
                    return Ok(Node::Extension {
                        path: ext_path,
                        child,
                    });
                }

                // Split the extension at the divergence point.
                let mut children: [Link; 16] = std::array::from_fn(|_| Link::Empty);
                let mut branch_value = None;

                let ext_rest = &ext_path[common..];
                children[ext_rest[0] as usize] = if ext_rest.len() == 1 {
                    child
                } else {
                    Link::Node(Box::new(Node::Extension {
                        path: ext_rest[1..].to_vec(),
                        child,
                    }))
                };

                let new_rest = &path[common..];
                match new_rest.split_first() {
                    None => branch_value = Some(value),
                    Some((nibble, rest)) => {
                        children[*nibble as usize] = Link::Node(Box::new(Node::Leaf {
                            path: rest.to_vec(),
                            value,
                        }))
                    }
                }

                Ok(wrap_in_prefix(&path[..common], Node::Branch {
                    children,
                    value: branch_value,
                }))
            }
            Node::Branch {
                mut children,
                value: branch_value,
            } => match path.split_first() {
                None => Ok(Node::Branch {
                    children,
                    value: Some(value),
                }),
                Some((nibble, rest)) => {
                    let idx = *nibble as usize;
                    let child = std::mem::replace(&mut children[idx], Link::Empty);
                    children[idx] = self.insert_at(child, rest, value)?;
                    Ok(Node::Branch {
                        children,
                        value: branch_value,
                    })
                }
            },
        }
    }

    fn load(&self, hash: &CryptoHash) -> Result<Node, StateError> {
        let bytes = self
            .kv
            .get(&node_key(hash))?
            .ok_or(StateError::MissingStateNode { node: *hash })?;
        let stored = StoredNode::deserialize(&mut &*bytes).map_err(|source| {
            StateError::DeserializeNode {
                node: *hash,
                source,
            }
        })?;
        Ok(match stored {
            StoredNode::Leaf { path, value } => Node::Leaf { path, value },
            StoredNode::Extension { path, child } => Node::Extension {
                path,
                child: Link::Hash(child),
            },
            StoredNode::Branch { children, value } => Node::Branch {
                children: children.map(|child| match child {
                    Some(hash) => Link::Hash(hash),
                    None => Link::Empty,
                }),
                value,
            },
        })
    }
}

fn commit_link<K: KVStore>(
    link: Link,
    wb: &mut ChainWriteBatch<K::WriteBatch>,
) -> Result<(Link, CryptoHash), StateError> {
    let node = match link {
        Link::Empty => return Ok((Link::Empty, CryptoHash::EMPTY)),
        Link::Hash(hash) => return Ok((Link::Hash(hash), hash)),
        Link::Node(node) => node,
    };

    let stored = match *node {
        Node::Leaf { path, value } => StoredNode::Leaf { path, value },
        Node::Extension { path, child } => {
            let (_, child_hash) = commit_link::<K>(child, wb)?;
            StoredNode::Extension {
                path,
                child: child_hash,
            }
        }
        Node::Branch { children, value } => {
            let mut hashes: [Option<CryptoHash>; 16] = [None; 16];
            for (i, child) in children.into_iter().enumerate() {
                hashes[i] = match child {
                    Link::Empty => None,
                    child => Some(commit_link::<K>(child, wb)?.1),
                };
            }
            StoredNode::Branch {
                children: hashes,
                value,
            }
        }
    };

    let bytes = stored
        .try_to_vec()
        .map_err(|source| StateError::SerializeNode { source })?;
    let hash = CryptoHash::new(CryptoHasher::digest(&bytes).into());
    wb.set_state_node(&hash, &bytes);
    Ok((Link::Hash(hash), hash))
}

/// Wraps `node` in an extension carrying `prefix`, or returns it unchanged
/// when the prefix is empty.
fn wrap_in_prefix(prefix: &[u8], node: Node) -> Node {
    if prefix.is_empty() {
        node
    } else {
        Node::Extension {
            path: prefix.to_vec(),
            child: Link::Node(Box::new(node)),
        }
    }
}

fn node_key(hash: &CryptoHash) -> Vec<u8> {
    combine(&paths::STATE_NODES, &hash.bytes())
}

fn nibbles(key: &[u8]) -> Vec<u8> {
    key.iter().flat_map(|byte| [byte >> 4, byte & 0x0f]).collect()
}

fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}
