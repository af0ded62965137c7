//! A simple, volatile, in-memory implementation of [`KVStore`].

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use pyrite::store::kv_store::{KVGet, KVStore, StoreError, WriteBatch};

/// An in-memory implementation of [`KVStore`].
#[derive(Clone)]
pub(crate) struct MemDB(Arc<Mutex<HashMap<Vec<u8>, Vec<u8>>>>);

impl MemDB {
    /// Create a new, empty `MemDB`.
    pub(crate) fn new() -> MemDB {
        MemDB(Arc::new(Mutex::new(HashMap::new())))
    }

    /// Snapshot of every key-value pair, for byte-level comparisons.
    pub(crate) fn contents(&self) -> HashMap<Vec<u8>, Vec<u8>> {
        self.0.lock().unwrap().clone()
    }
}

impl KVGet for MemDB {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.0.lock().unwrap().get(key).cloned())
    }
}

impl KVStore for MemDB {
    type WriteBatch = MemWriteBatch;

    fn write(&mut self, wb: MemWriteBatch) -> Result<(), StoreError> {
        let mut map = self.0.lock().unwrap();
        for (key, value) in wb.insertions {
            map.insert(key, value);
        }
        for key in wb.deletions {
            map.remove(&key);
        }
        Ok(())
    }
}

// A simple implementation of [`WriteBatch`].
pub(crate) struct MemWriteBatch {
    insertions: HashMap<Vec<u8>, Vec<u8>>,
    deletions: HashSet<Vec<u8>>,
}

impl WriteBatch for MemWriteBatch {
    fn new() -> Self {
        MemWriteBatch {
            insertions: HashMap::new(),
            deletions: HashSet::new(),
        }
    }

    fn set(&mut self, key: &[u8], value: &[u8]) {
        let _ = self.deletions.remove(key);
        self.insertions.insert(key.to_vec(), value.to_vec());
    }

    fn delete(&mut self, key: &[u8]) {
        let _ = self.insertions.remove(key);
        self.deletions.insert(key.to_vec());
    }
}
