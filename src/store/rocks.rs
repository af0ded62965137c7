//! RocksDB-backed implementation of the key-value store contract, for
//! production deployments.

use std::path::Path;
use std::sync::Arc;

use crate::store::kv_store::{KVGet, KVStore, StoreError, WriteBatch};

#[derive(Clone)]
pub struct RocksDBStore(Arc<rocksdb::DB>);

impl RocksDBStore {
    pub fn open(path: impl AsRef<Path>) -> Result<RocksDBStore, StoreError> {
        let mut options = rocksdb::Options::default();
        options.create_if_missing(true);
        let db = rocksdb::DB::open(&options, path).map_err(io_error)?;
        Ok(RocksDBStore(Arc::new(db)))
    }
}

impl KVGet for RocksDBStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.0.get(key).map_err(io_error)
    }
}

impl KVStore for RocksDBStore {
    type WriteBatch = RocksWriteBatch;

    fn write(&mut self, wb: RocksWriteBatch) -> Result<(), StoreError> {
        self.0.write(wb.0).map_err(io_error)
    }
}

pub struct RocksWriteBatch(rocksdb::WriteBatch);

impl WriteBatch for RocksWriteBatch {
    fn new() -> Self {
        RocksWriteBatch(rocksdb::WriteBatch::default())
    }

    fn set(&mut self, key: &[u8], value: &[u8]) {
        self.0.put(key, value)
    }

    fn delete(&mut self, key: &[u8]) {
        self.0.delete(key)
    }
}

fn io_error(err: rocksdb::Error) -> StoreError {
    StoreError::Io {
        detail: err.to_string(),
    }
}
