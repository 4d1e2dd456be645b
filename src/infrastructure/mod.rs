pub mod collaborators;
pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;

use crate::application::StoreSet;
use in_memory::{
    InMemoryCertificateStore, InMemoryEnrollmentStore, InMemoryPaymentStore, InMemoryProgressStore,
};
use std::sync::Arc;

impl StoreSet {
    /// Volatile stores for tests and ephemeral runs.
    pub fn in_memory() -> Self {
        Self {
            payments: Arc::new(InMemoryPaymentStore::new()),
            enrollments: Arc::new(InMemoryEnrollmentStore::new()),
            progress: Arc::new(InMemoryProgressStore::new()),
            certificates: Arc::new(InMemoryCertificateStore::new()),
        }
    }

    /// All four stores backed by one RocksDB database.
    #[cfg(feature = "storage-rocksdb")]
    pub fn rocksdb<P: AsRef<std::path::Path>>(path: P) -> crate::error::Result<Self> {
        let store = rocksdb::RocksDbStore::open(path)?;
        Ok(Self {
            payments: Arc::new(store.clone()),
            enrollments: Arc::new(store.clone()),
            progress: Arc::new(store.clone()),
            certificates: Arc::new(store),
        })
    }
}
