//! Storage abstraction for hosted instances.
//!
//! Trait-based abstraction for persisting key stores and directories by
//! address. The trait is synchronous (no async) to match the synchronous
//! state machines it backs.

mod error;
mod memory;
mod redb;

use capchat_core::{Address, Directory, KeyStore};
pub use error::StorageError;
pub use memory::MemoryStorage;

pub use self::redb::RedbStorage;

/// Storage for key stores and directories.
///
/// Must be Clone (shared between the ledger handle and tests), Send + Sync
/// (thread-safe), and synchronous. Implementations typically share internal
/// state via Arc, so clones access the same underlying storage.
pub trait Storage: Clone + Send + Sync + 'static {
    /// Store the full state of a key store, replacing any previous state.
    fn store_key_store(&self, address: Address, store: &KeyStore) -> Result<(), StorageError>;

    /// Load a key store. `None` if nothing is stored at `address`.
    fn load_key_store(&self, address: Address) -> Result<Option<KeyStore>, StorageError>;

    /// Addresses of all stored key stores. Order is not guaranteed.
    fn list_key_stores(&self) -> Result<Vec<Address>, StorageError>;

    /// Store the full state of a directory, replacing any previous state.
    fn store_directory(&self, address: Address, directory: &Directory)
    -> Result<(), StorageError>;

    /// Load a directory. `None` if nothing is stored at `address`.
    fn load_directory(&self, address: Address) -> Result<Option<Directory>, StorageError>;

    /// Addresses of all stored directories. Order is not guaranteed.
    fn list_directories(&self) -> Result<Vec<Address>, StorageError>;
}
