//! Ledger driver.
//!
//! Hosts every key store and directory, allocates their addresses, and
//! applies calls one at a time. The driver is action-based: it never touches
//! storage or logs directly, it returns [`LedgerAction`]s for the runtime to
//! execute.
//!
//! Calls to an address that hosts no instance of the right kind are malformed
//! and fail before any state is read. Everything else, including refused
//! callers, succeeds and yields a reply plus the emitted records.

use std::collections::HashMap;

use capchat_core::{
    Address, Directory, Environment, Event, KeyBundle, KeyStore, LogLevel, Outcome, PoolPolicy,
    PublicKey, Signature, Username,
};
use serde::{Deserialize, Serialize};

use crate::{error::LedgerError, storage::Storage};

/// Random draws allowed before giving up on a fresh address.
const MAX_ADDRESS_ATTEMPTS: usize = 16;

/// Ledger configuration
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Pool thresholds applied to newly deployed key stores
    pub pool_policy: PoolPolicy,
    /// Maximum hosted instances (key stores plus directories)
    pub max_instances: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self { pool_policy: PoolPolicy::default(), max_instances: 100_000 }
    }
}

/// Calls on a hosted key store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyStoreCall {
    /// Read the identity key
    IdentityKey,
    /// Read the signed prekey
    SignedPreKey,
    /// Read the signed prekey signature halves
    GetSignedPreKeySig,
    /// Rotate signed prekey and signature (owner)
    UpdateSignedPreKey {
        /// New signed prekey
        key: PublicKey,
        /// Signature over the new key
        sig: Signature,
    },
    /// Grant friend capability (owner)
    AddFriend {
        /// Identity to befriend
        friend: Address,
    },
    /// Revoke friend capability (owner)
    RemoveFriend {
        /// Identity to drop
        friend: Address,
    },
    /// Append one-time prekeys (owner)
    AddOneTimePreKeys {
        /// Keys to append
        keys: Vec<PublicKey>,
    },
    /// Consume one one-time prekey (friend)
    GetOneTimePreKey,
    /// Evaluate validity
    IsValid,
    /// Read the owner
    Owner,
    /// Read the username
    Username,
    /// Read the registration id
    RegistrationId,
    /// Read the pool size
    OneTimePreKeyCount,
}

impl KeyStoreCall {
    fn is_mutating(&self) -> bool {
        matches!(
            self,
            Self::UpdateSignedPreKey { .. }
                | Self::AddFriend { .. }
                | Self::RemoveFriend { .. }
                | Self::AddOneTimePreKeys { .. }
                | Self::GetOneTimePreKey
        )
    }
}

/// Calls on a hosted directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DirectoryCall {
    /// Swap the delegate (directory owner)
    UpdateLogic {
        /// New delegate
        caddr: Address,
    },
    /// Insert or overwrite a mapping (delegate)
    Add {
        /// Username key
        username: Username,
        /// Store address
        caddr: Address,
    },
    /// Delete a mapping (delegate)
    Remove {
        /// Username key
        username: Username,
    },
    /// Resolve a mapping (delegate, silent zero otherwise)
    Get {
        /// Username key
        username: Username,
    },
    /// Read the current delegate
    Logic,
    /// Read the owner
    Owner,
}

impl DirectoryCall {
    fn is_mutating(&self) -> bool {
        matches!(self, Self::UpdateLogic { .. } | Self::Add { .. } | Self::Remove { .. })
    }
}

/// Events that the ledger driver processes.
#[derive(Debug, Clone)]
pub enum LedgerEvent {
    /// Create a key store owned by `caller`
    DeployKeyStore {
        /// Owner of the new store
        caller: Address,
        /// Creation-time material
        bundle: KeyBundle,
    },

    /// Create a directory owned by `caller`
    DeployDirectory {
        /// Owner of the new directory
        caller: Address,
    },

    /// Invoke an operation on a key store
    KeyStoreCall {
        /// Identity making the call
        caller: Address,
        /// Key store address
        target: Address,
        /// Operation
        call: KeyStoreCall,
    },

    /// Invoke an operation on a directory
    DirectoryCall {
        /// Identity making the call
        caller: Address,
        /// Directory address
        target: Address,
        /// Operation
        call: DirectoryCall,
    },
}

/// Value returned to the caller of a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reply {
    /// Address of a newly deployed instance
    Deployed(Address),
    /// Operation with no return value completed (or was refused)
    Done,
    /// A public key
    Key(PublicKey),
    /// Signature as two 32-byte halves
    SignatureHalves([[u8; 32]; 2]),
    /// A count (pool size)
    Count(usize),
    /// Drawn one-time prekey; `None` on depletion or refusal
    OneTimePreKey(Option<PublicKey>),
    /// A boolean (validity)
    Bool(bool),
    /// An address (lookup result, owner, delegate)
    Address(Address),
    /// A username
    Username(Username),
    /// A registration id
    RegistrationId(u32),
}

/// Actions that the ledger driver produces.
///
/// Generic over `I` (Instant type) to support virtual time in tests.
#[derive(Debug, Clone)]
pub enum LedgerAction<I = std::time::Instant> {
    /// Deliver the call's return value
    Reply {
        /// Caller being answered
        caller: Address,
        /// Returned value
        reply: Reply,
    },

    /// Publish an event record
    Emit {
        /// Instance that emitted the record
        source: Address,
        /// The record
        event: Event,
    },

    /// Persist updated key store state
    PersistKeyStore {
        /// Store address
        address: Address,
        /// Full state after the call
        store: KeyStore,
    },

    /// Persist updated directory state
    PersistDirectory {
        /// Directory address
        address: Address,
        /// Full state after the call
        directory: Directory,
    },

    /// Log a message (for debugging/monitoring)
    Log {
        /// Log level
        level: LogLevel,
        /// Message to log
        message: String,
        /// When the event occurred
        timestamp: I,
    },
}

/// State an event replaced, kept so a failed persist can be undone.
#[derive(Debug)]
enum Undo {
    KeyStore { address: Address, prior: Option<KeyStore> },
    Directory { address: Address, prior: Option<Directory> },
}

/// Emit actions for the outcome's records, in order.
fn emit_all<I>(source: Address, events: Vec<Event>) -> Vec<LedgerAction<I>> {
    events.into_iter().map(|event| LedgerAction::Emit { source, event }).collect()
}

/// Action-based ledger driver.
///
/// Applies one event at a time; callers needing concurrency must serialize
/// access (see [`Ledger`](crate::Ledger)).
pub struct LedgerDriver<E: Environment> {
    /// Hosted key stores by address
    key_stores: HashMap<Address, KeyStore>,
    /// Hosted directories by address
    directories: HashMap<Address, Directory>,
    /// Environment (time, RNG)
    env: E,
    /// Ledger configuration
    config: LedgerConfig,
    /// Prior state of the instance the last event changed
    undo: Option<Undo>,
}

impl<E: Environment> LedgerDriver<E> {
    /// Create an empty ledger driver.
    pub fn new(env: E, config: LedgerConfig) -> Self {
        Self {
            key_stores: HashMap::new(),
            directories: HashMap::new(),
            env,
            config,
            undo: None,
        }
    }

    /// Rebuild a driver from every instance in `storage`.
    pub fn restore(
        env: E,
        config: LedgerConfig,
        storage: &impl Storage,
    ) -> Result<Self, LedgerError> {
        let mut driver = Self::new(env, config);

        for address in storage.list_key_stores()? {
            if let Some(store) = storage.load_key_store(address)? {
                driver.key_stores.insert(address, store);
            }
        }
        for address in storage.list_directories()? {
            if let Some(directory) = storage.load_directory(address)? {
                driver.directories.insert(address, directory);
            }
        }

        tracing::info!(
            key_stores = driver.key_stores.len(),
            directories = driver.directories.len(),
            "Restored ledger state"
        );

        Ok(driver)
    }

    /// Process a ledger event and return actions to execute.
    ///
    /// This is the main entry point for the ledger driver.
    pub fn process_event(
        &mut self,
        event: LedgerEvent,
    ) -> Result<Vec<LedgerAction<E::Instant>>, LedgerError> {
        self.undo = None;
        match event {
            LedgerEvent::DeployKeyStore { caller, bundle } => {
                self.handle_deploy_key_store(caller, bundle)
            },
            LedgerEvent::DeployDirectory { caller } => self.handle_deploy_directory(caller),
            LedgerEvent::KeyStoreCall { caller, target, call } => {
                self.handle_key_store_call(caller, target, call)
            },
            LedgerEvent::DirectoryCall { caller, target, call } => {
                self.handle_directory_call(caller, target, call)
            },
        }
    }

    /// Revert the instance changed by the last processed event.
    ///
    /// The runtime calls this when executing that event's actions failed, so
    /// hosted state never runs ahead of storage. A no-op if the last event
    /// changed nothing.
    pub fn rollback(&mut self) {
        match self.undo.take() {
            Some(Undo::KeyStore { address, prior: Some(store) }) => {
                self.key_stores.insert(address, store);
            },
            Some(Undo::KeyStore { address, prior: None }) => {
                self.key_stores.remove(&address);
            },
            Some(Undo::Directory { address, prior: Some(directory) }) => {
                self.directories.insert(address, directory);
            },
            Some(Undo::Directory { address, prior: None }) => {
                self.directories.remove(&address);
            },
            None => {},
        }
    }

    /// Hosted key store at `address`.
    pub fn key_store(&self, address: Address) -> Option<&KeyStore> {
        self.key_stores.get(&address)
    }

    /// Hosted directory at `address`.
    pub fn directory(&self, address: Address) -> Option<&Directory> {
        self.directories.get(&address)
    }

    /// Number of hosted instances of either kind.
    pub fn instance_count(&self) -> usize {
        self.key_stores.len() + self.directories.len()
    }

    /// Ledger configuration in force.
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    fn allocate_address(&self) -> Result<Address, LedgerError> {
        if self.instance_count() >= self.config.max_instances {
            return Err(LedgerError::CapacityExceeded { max: self.config.max_instances });
        }

        for _ in 0..MAX_ADDRESS_ATTEMPTS {
            let address = self.env.random_address();
            if !self.key_stores.contains_key(&address) && !self.directories.contains_key(&address)
            {
                return Ok(address);
            }
        }

        Err(LedgerError::AddressExhausted { attempts: MAX_ADDRESS_ATTEMPTS })
    }

    fn handle_deploy_key_store(
        &mut self,
        caller: Address,
        bundle: KeyBundle,
    ) -> Result<Vec<LedgerAction<E::Instant>>, LedgerError> {
        let address = self.allocate_address()?;
        let store = KeyStore::with_policy(caller, bundle, self.config.pool_policy);

        let actions = vec![
            LedgerAction::PersistKeyStore { address, store: store.clone() },
            LedgerAction::Log {
                level: LogLevel::Info,
                message: format!(
                    "Key store {address} deployed by {caller} (valid: {})",
                    store.is_valid()
                ),
                timestamp: self.env.now(),
            },
            LedgerAction::Reply { caller, reply: Reply::Deployed(address) },
        ];

        self.key_stores.insert(address, store);
        self.undo = Some(Undo::KeyStore { address, prior: None });
        Ok(actions)
    }

    fn handle_deploy_directory(
        &mut self,
        caller: Address,
    ) -> Result<Vec<LedgerAction<E::Instant>>, LedgerError> {
        let address = self.allocate_address()?;
        let directory = Directory::new(caller);

        let actions = vec![
            LedgerAction::PersistDirectory { address, directory: directory.clone() },
            LedgerAction::Log {
                level: LogLevel::Info,
                message: format!("Directory {address} deployed by {caller}"),
                timestamp: self.env.now(),
            },
            LedgerAction::Reply { caller, reply: Reply::Deployed(address) },
        ];

        self.directories.insert(address, directory);
        self.undo = Some(Undo::Directory { address, prior: None });
        Ok(actions)
    }

    fn handle_key_store_call(
        &mut self,
        caller: Address,
        target: Address,
        call: KeyStoreCall,
    ) -> Result<Vec<LedgerAction<E::Instant>>, LedgerError> {
        let store =
            self.key_stores.get_mut(&target).ok_or(LedgerError::UnknownKeyStore(target))?;
        let mutating = call.is_mutating();
        let prior = mutating.then(|| store.clone());

        let outcome = match call {
            KeyStoreCall::IdentityKey => Outcome::new(Reply::Key(store.identity_key())),
            KeyStoreCall::SignedPreKey => Outcome::new(Reply::Key(store.signed_pre_key())),
            KeyStoreCall::GetSignedPreKeySig => {
                Outcome::new(Reply::SignatureHalves(store.get_signed_pre_key_sig()))
            },
            KeyStoreCall::UpdateSignedPreKey { key, sig } => {
                store.update_signed_pre_key(caller, key, sig).map(|()| Reply::Done)
            },
            KeyStoreCall::AddFriend { friend } => {
                store.add_friend(caller, friend).map(|()| Reply::Done)
            },
            KeyStoreCall::RemoveFriend { friend } => {
                store.remove_friend(caller, friend).map(|()| Reply::Done)
            },
            KeyStoreCall::AddOneTimePreKeys { keys } => {
                store.add_one_time_pre_keys(caller, &keys).map(Reply::Count)
            },
            KeyStoreCall::GetOneTimePreKey => {
                store.get_one_time_pre_key(caller).map(Reply::OneTimePreKey)
            },
            KeyStoreCall::IsValid => Outcome::new(Reply::Bool(store.is_valid())),
            KeyStoreCall::Owner => Outcome::new(Reply::Address(store.owner())),
            KeyStoreCall::Username => Outcome::new(Reply::Username(store.username())),
            KeyStoreCall::RegistrationId => {
                Outcome::new(Reply::RegistrationId(store.registration_id()))
            },
            KeyStoreCall::OneTimePreKeyCount => {
                Outcome::new(Reply::Count(store.one_time_pre_key_count()))
            },
        };

        let persist = mutating && !outcome.is_unauthorized();
        let mut actions = emit_all(target, outcome.events);
        if persist {
            actions.push(LedgerAction::PersistKeyStore { address: target, store: store.clone() });
            self.undo = Some(Undo::KeyStore { address: target, prior });
        }
        actions.push(LedgerAction::Reply { caller, reply: outcome.value });

        Ok(actions)
    }

    fn handle_directory_call(
        &mut self,
        caller: Address,
        target: Address,
        call: DirectoryCall,
    ) -> Result<Vec<LedgerAction<E::Instant>>, LedgerError> {
        let directory =
            self.directories.get_mut(&target).ok_or(LedgerError::UnknownDirectory(target))?;
        let mutating = call.is_mutating();
        let prior = mutating.then(|| directory.clone());

        let outcome = match call {
            DirectoryCall::UpdateLogic { caddr } => {
                directory.update_logic(caller, caddr).map(|()| Reply::Done)
            },
            DirectoryCall::Add { username, caddr } => {
                directory.add(caller, username, caddr).map(|()| Reply::Done)
            },
            DirectoryCall::Remove { username } => {
                directory.remove(caller, username).map(|()| Reply::Done)
            },
            DirectoryCall::Get { username } => {
                Outcome::new(Reply::Address(directory.get(caller, username)))
            },
            DirectoryCall::Logic => Outcome::new(Reply::Address(directory.logic())),
            DirectoryCall::Owner => Outcome::new(Reply::Address(directory.owner())),
        };

        let persist = mutating && !outcome.is_unauthorized();
        let mut actions = emit_all(target, outcome.events);
        if persist {
            actions.push(LedgerAction::PersistDirectory {
                address: target,
                directory: directory.clone(),
            });
            self.undo = Some(Undo::Directory { address: target, prior });
        }
        actions.push(LedgerAction::Reply { caller, reply: outcome.value });

        Ok(actions)
    }
}

impl<E: Environment> std::fmt::Debug for LedgerDriver<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerDriver")
            .field("key_stores", &self.key_stores.len())
            .field("directories", &self.directories.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
