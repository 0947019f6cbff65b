//! Redb-backed durable storage implementation.
//!
//! Uses Redb's ACID transactions with Copy-on-Write for crash safety.
//! All hosted instances survive restarts.

use std::{fmt::Display, path::Path, sync::Arc};

use capchat_core::{Address, Directory, KeyStore};
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Serialize, de::DeserializeOwned};

use super::{Storage, StorageError};

/// Table: key_stores
/// Key: address [20 bytes]
/// Value: CBOR-encoded KeyStore
const KEY_STORES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("key_stores");

/// Table: directories
/// Key: address [20 bytes]
/// Value: CBOR-encoded Directory
const DIRECTORIES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("directories");

type Table = TableDefinition<'static, &'static [u8], &'static [u8]>;

fn io(err: impl Display) -> StorageError {
    StorageError::Io(err.to_string())
}

fn serialization(err: impl Display) -> StorageError {
    StorageError::Serialization(err.to_string())
}

/// Durable storage backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStorage {
    db: Arc<Database>,
}

impl RedbStorage {
    /// Open or create a Redb database at the given path.
    ///
    /// Creates tables if they don't exist (KEY_STORES, DIRECTORIES).
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref()).map_err(io)?;

        let txn = db.begin_write().map_err(io)?;
        {
            let _ = txn.open_table(KEY_STORES).map_err(io)?;
            let _ = txn.open_table(DIRECTORIES).map_err(io)?;
        }
        txn.commit().map_err(io)?;

        Ok(Self { db: Arc::new(db) })
    }

    fn put<T: Serialize>(
        &self,
        table: Table,
        address: Address,
        value: &T,
    ) -> Result<(), StorageError> {
        let mut bytes = Vec::new();
        ciborium::into_writer(value, &mut bytes).map_err(serialization)?;

        let txn = self.db.begin_write().map_err(io)?;
        {
            let mut table = txn.open_table(table).map_err(io)?;
            table.insert(address.as_bytes().as_slice(), bytes.as_slice()).map_err(io)?;
        }
        txn.commit().map_err(io)?;

        Ok(())
    }

    fn get<T: DeserializeOwned>(
        &self,
        table: Table,
        address: Address,
    ) -> Result<Option<T>, StorageError> {
        let txn = self.db.begin_read().map_err(io)?;
        let table = txn.open_table(table).map_err(io)?;

        let Some(guard) = table.get(address.as_bytes().as_slice()).map_err(io)? else {
            return Ok(None);
        };

        ciborium::from_reader(guard.value()).map(Some).map_err(serialization)
    }

    fn addresses(&self, table: Table) -> Result<Vec<Address>, StorageError> {
        let txn = self.db.begin_read().map_err(io)?;
        let table = txn.open_table(table).map_err(io)?;

        let mut addresses = Vec::new();
        for entry in table.iter().map_err(io)? {
            let (key, _) = entry.map_err(io)?;
            addresses.push(Address::from_slice(key.value()).map_err(serialization)?);
        }

        Ok(addresses)
    }
}

impl Storage for RedbStorage {
    fn store_key_store(&self, address: Address, store: &KeyStore) -> Result<(), StorageError> {
        self.put(KEY_STORES, address, store)
    }

    fn load_key_store(&self, address: Address) -> Result<Option<KeyStore>, StorageError> {
        self.get(KEY_STORES, address)
    }

    fn list_key_stores(&self) -> Result<Vec<Address>, StorageError> {
        self.addresses(KEY_STORES)
    }

    fn store_directory(
        &self,
        address: Address,
        directory: &Directory,
    ) -> Result<(), StorageError> {
        self.put(DIRECTORIES, address, directory)
    }

    fn load_directory(&self, address: Address) -> Result<Option<Directory>, StorageError> {
        self.get(DIRECTORIES, address)
    }

    fn list_directories(&self) -> Result<Vec<Address>, StorageError> {
        self.addresses(DIRECTORIES)
    }
}
