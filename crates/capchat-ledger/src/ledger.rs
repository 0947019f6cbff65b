//! Thread-safe ledger handle.
//!
//! Wraps a [`LedgerDriver`] behind a single lock so every call, from any
//! thread, observes the effects of all calls ordered before it. Actions the
//! driver returns are executed while the lock is still held: storage writes
//! and log output follow the same total order as the calls themselves.

#![allow(clippy::disallowed_types, reason = "Synchronous calls; one lock is the total order")]

use std::sync::{Arc, Mutex, MutexGuard};

use capchat_core::{Address, Directory, Environment, Event, KeyBundle, KeyStore, LogLevel};

use crate::{
    driver::{
        DirectoryCall, KeyStoreCall, LedgerAction, LedgerConfig, LedgerDriver, LedgerEvent, Reply,
    },
    error::LedgerError,
    storage::Storage,
};

/// Result of one call: the returned value and the records it emitted, in
/// emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    /// Value returned to the caller
    pub reply: Reply,
    /// Records emitted by the call
    pub events: Vec<Event>,
}

impl Receipt {
    /// Names of the emitted records, in order.
    pub fn event_names(&self) -> Vec<&'static str> {
        self.events.iter().map(Event::name).collect()
    }

    /// Returns true if the call was refused.
    pub fn is_unauthorized(&self) -> bool {
        self.events.iter().any(|event| matches!(event, Event::Unauthorized { .. }))
    }
}

/// Shared, totally ordered host for key stores and directories.
///
/// Clone is cheap; clones share the same driver and storage.
pub struct Ledger<E: Environment, S: Storage> {
    driver: Arc<Mutex<LedgerDriver<E>>>,
    storage: S,
}

impl<E: Environment, S: Storage> Clone for Ledger<E, S> {
    fn clone(&self) -> Self {
        Self { driver: Arc::clone(&self.driver), storage: self.storage.clone() }
    }
}

impl<E: Environment, S: Storage> Ledger<E, S> {
    /// Create a ledger with no hosted instances over empty `storage`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::StorageInUse`] if `storage` already holds instances;
    /// use [`open`](Self::open) to resume them.
    pub fn new(env: E, storage: S, config: LedgerConfig) -> Result<Self, LedgerError> {
        let instances = storage.list_key_stores()?.len() + storage.list_directories()?.len();
        if instances > 0 {
            return Err(LedgerError::StorageInUse { instances });
        }
        Ok(Self { driver: Arc::new(Mutex::new(LedgerDriver::new(env, config))), storage })
    }

    /// Resume a ledger from every instance in `storage`.
    pub fn open(env: E, storage: S, config: LedgerConfig) -> Result<Self, LedgerError> {
        let driver = LedgerDriver::restore(env, config, &storage)?;
        Ok(Self { driver: Arc::new(Mutex::new(driver)), storage })
    }

    fn lock(&self) -> Result<MutexGuard<'_, LedgerDriver<E>>, LedgerError> {
        self.driver.lock().map_err(|_| LedgerError::Poisoned)
    }

    /// Apply one event and execute the resulting actions.
    ///
    /// # Errors
    ///
    /// Malformed calls (unknown target) fail before any state changes. If
    /// persisting fails, the instance is rolled back to its state before the
    /// call and no records are logged: the call did not happen.
    pub fn submit(&self, event: LedgerEvent) -> Result<Receipt, LedgerError> {
        let mut driver = self.lock()?;
        let actions = driver.process_event(event)?;
        let result = self.execute(actions);
        if result.is_err() {
            driver.rollback();
        }
        drop(driver);
        result
    }

    /// Deploy a key store owned by `caller`, returning its address.
    pub fn deploy_key_store(
        &self,
        caller: Address,
        bundle: KeyBundle,
    ) -> Result<Address, LedgerError> {
        let receipt = self.submit(LedgerEvent::DeployKeyStore { caller, bundle })?;
        deployed_address(receipt.reply)
    }

    /// Deploy a directory owned by `caller`, returning its address.
    pub fn deploy_directory(&self, caller: Address) -> Result<Address, LedgerError> {
        let receipt = self.submit(LedgerEvent::DeployDirectory { caller })?;
        deployed_address(receipt.reply)
    }

    /// Invoke `call` on the key store at `target`.
    pub fn call_key_store(
        &self,
        caller: Address,
        target: Address,
        call: KeyStoreCall,
    ) -> Result<Receipt, LedgerError> {
        self.submit(LedgerEvent::KeyStoreCall { caller, target, call })
    }

    /// Invoke `call` on the directory at `target`.
    pub fn call_directory(
        &self,
        caller: Address,
        target: Address,
        call: DirectoryCall,
    ) -> Result<Receipt, LedgerError> {
        self.submit(LedgerEvent::DirectoryCall { caller, target, call })
    }

    /// Snapshot of the key store at `address`.
    pub fn key_store(&self, address: Address) -> Result<Option<KeyStore>, LedgerError> {
        Ok(self.lock()?.key_store(address).cloned())
    }

    /// Snapshot of the directory at `address`.
    pub fn directory(&self, address: Address) -> Result<Option<Directory>, LedgerError> {
        Ok(self.lock()?.directory(address).cloned())
    }

    /// Number of hosted instances of either kind.
    pub fn instance_count(&self) -> Result<usize, LedgerError> {
        Ok(self.lock()?.instance_count())
    }

    /// Storage backend.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    fn execute(&self, actions: Vec<LedgerAction<E::Instant>>) -> Result<Receipt, LedgerError> {
        let mut reply = Reply::Done;
        let mut events = Vec::new();

        for action in actions {
            match action {
                LedgerAction::Reply { caller, reply: value } => {
                    tracing::trace!(%caller, reply = ?value, "Reply");
                    reply = value;
                },
                LedgerAction::Emit { source, event } => events.push((source, event)),
                LedgerAction::PersistKeyStore { address, store } => {
                    self.storage.store_key_store(address, &store)?;
                },
                LedgerAction::PersistDirectory { address, directory } => {
                    self.storage.store_directory(address, &directory)?;
                },
                LedgerAction::Log { level, message, .. } => match level {
                    LogLevel::Info => tracing::info!("{message}"),
                    LogLevel::Warn => tracing::warn!("{message}"),
                },
            }
        }

        // Records are logged only once every write has landed.
        for (source, event) in &events {
            log_event(*source, event);
        }

        Ok(Receipt { reply, events: events.into_iter().map(|(_, event)| event).collect() })
    }
}

fn deployed_address(reply: Reply) -> Result<Address, LedgerError> {
    match reply {
        Reply::Deployed(address) => Ok(address),
        other => Err(LedgerError::UnexpectedReply(other)),
    }
}

fn log_event(source: Address, event: &Event) {
    let name = event.name();
    match event.level() {
        LogLevel::Info => tracing::info!(%source, event = name, "{event}"),
        LogLevel::Warn => tracing::warn!(%source, event = name, "{event}"),
    }
}
