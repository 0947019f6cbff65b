#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use capchat_core::{Address, Directory, KeyStore};

use super::{Storage, StorageError};

/// In-memory storage implementation for testing and simulation
///
/// Uses `HashMap`s keyed by address. All state is wrapped in
/// `Arc<Mutex<>>` to allow Clone and concurrent access; clones share the
/// same maps. A poisoned lock surfaces as [`StorageError::Poisoned`].
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryStorageInner>>,
}

#[derive(Default)]
struct MemoryStorageInner {
    key_stores: HashMap<Address, KeyStore>,
    directories: HashMap<Address, Directory>,
}

impl MemoryStorage {
    /// Create a new empty `MemoryStorage`
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryStorageInner>, StorageError> {
        self.inner.lock().map_err(|_| StorageError::Poisoned)
    }

    /// Number of stored instances of either kind.
    ///
    /// Useful for debugging and testing.
    pub fn instance_count(&self) -> Result<usize, StorageError> {
        let inner = self.lock()?;
        Ok(inner.key_stores.len() + inner.directories.len())
    }
}

impl Storage for MemoryStorage {
    fn store_key_store(&self, address: Address, store: &KeyStore) -> Result<(), StorageError> {
        self.lock()?.key_stores.insert(address, store.clone());
        Ok(())
    }

    fn load_key_store(&self, address: Address) -> Result<Option<KeyStore>, StorageError> {
        Ok(self.lock()?.key_stores.get(&address).cloned())
    }

    fn list_key_stores(&self) -> Result<Vec<Address>, StorageError> {
        Ok(self.lock()?.key_stores.keys().copied().collect())
    }

    fn store_directory(
        &self,
        address: Address,
        directory: &Directory,
    ) -> Result<(), StorageError> {
        self.lock()?.directories.insert(address, directory.clone());
        Ok(())
    }

    fn load_directory(&self, address: Address) -> Result<Option<Directory>, StorageError> {
        Ok(self.lock()?.directories.get(&address).cloned())
    }

    fn list_directories(&self) -> Result<Vec<Address>, StorageError> {
        Ok(self.lock()?.directories.keys().copied().collect())
    }
}
