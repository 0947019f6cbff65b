//! CapChat ledger: the host that orders calls.
//!
//! Key stores and directories are passive state machines. This crate gives
//! them addresses, a total order of calls, durable storage, and log output.
//!
//! # Architecture
//!
//! - [`LedgerDriver`]: action-based core. Takes a [`LedgerEvent`], returns
//!   [`LedgerAction`]s (reply, emit, persist, log). No I/O.
//! - [`Ledger`]: thread-safe handle. Serializes events through one lock and
//!   executes the driver's actions against a [`Storage`] backend.
//! - [`storage`]: in-memory and redb-backed persistence.
//! - [`SystemEnv`]: production clock and OS randomness for addresses.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod driver;
pub mod error;
pub mod ledger;
pub mod storage;
pub mod system_env;

pub use driver::{
    DirectoryCall, KeyStoreCall, LedgerAction, LedgerConfig, LedgerDriver, LedgerEvent, Reply,
};
pub use error::LedgerError;
pub use ledger::{Ledger, Receipt};
pub use storage::{MemoryStorage, RedbStorage, Storage, StorageError};
pub use system_env::SystemEnv;
