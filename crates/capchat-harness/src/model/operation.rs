//! Operations for model-based testing.
//!
//! Operations name identities, stores and usernames by small indices so
//! random sequences keep hitting the same few instances. Both the model and
//! the real ledger resolve indices the same way.

use arbitrary::Arbitrary;
use capchat_core::{Address, KeyBundle, PublicKey, Signature, Username};

/// Identity index. Resolves to a fixed non-zero address.
pub type IdentityId = u8;

/// Key store index, taken modulo the number of deployed stores.
pub type StoreId = u8;

/// Username index (kept small so registrations collide).
pub type NameId = u8;

/// Number of distinct identities operations can act as.
pub const IDENTITIES: u8 = 4;

/// Number of distinct usernames.
pub const NAMES: u8 = 3;

/// Largest number of keys a single replenish or deploy carries.
pub const MAX_KEYS_PER_OP: u8 = 6;

/// Identity 0 deploys the shared directory.
pub const DIRECTORY_OWNER: IdentityId = 0;

/// Operations that can be applied to the system.
#[derive(Debug, Clone, Arbitrary)]
pub enum Operation {
    /// Deploy a fully populated key store.
    DeployKeyStore {
        /// Owner of the new store.
        owner: IdentityId,
        /// Seed for the initial one-time prekeys.
        seed: u8,
        /// Initial pool size (reduced modulo `MAX_KEYS_PER_OP + 1`).
        pool: u8,
    },

    /// Rotate the signed prekey.
    UpdateSignedPreKey {
        /// Calling identity.
        caller: IdentityId,
        /// Target store.
        store: StoreId,
        /// Seed for the new key.
        seed: u8,
    },

    /// Grant friend capability.
    AddFriend {
        /// Calling identity.
        caller: IdentityId,
        /// Target store.
        store: StoreId,
        /// Identity to befriend.
        friend: IdentityId,
    },

    /// Revoke friend capability.
    RemoveFriend {
        /// Calling identity.
        caller: IdentityId,
        /// Target store.
        store: StoreId,
        /// Identity to drop.
        friend: IdentityId,
    },

    /// Replenish the pool.
    AddOneTimePreKeys {
        /// Calling identity.
        caller: IdentityId,
        /// Target store.
        store: StoreId,
        /// Seed for the new keys.
        seed: u8,
        /// Number of keys (reduced modulo `MAX_KEYS_PER_OP + 1`).
        count: u8,
    },

    /// Draw one one-time prekey.
    GetOneTimePreKey {
        /// Calling identity.
        caller: IdentityId,
        /// Target store.
        store: StoreId,
    },

    /// Swap the directory delegate. `None` installs the zero address.
    UpdateLogic {
        /// Calling identity.
        caller: IdentityId,
        /// New delegate.
        logic: Option<IdentityId>,
    },

    /// Map a username. `None` maps to the zero address.
    Register {
        /// Calling identity.
        caller: IdentityId,
        /// Username.
        name: NameId,
        /// Store to map to.
        store: Option<StoreId>,
    },

    /// Remove a username mapping.
    Deregister {
        /// Calling identity.
        caller: IdentityId,
        /// Username.
        name: NameId,
    },

    /// Resolve a username.
    Lookup {
        /// Calling identity.
        caller: IdentityId,
        /// Username.
        name: NameId,
    },
}

/// Address of identity `id`.
pub fn identity(id: IdentityId) -> Address {
    Address::new([id % IDENTITIES + 1; 20])
}

/// Username `id`.
pub fn username(id: NameId) -> Username {
    Username::new(format!("user-{}", id % NAMES).as_bytes())
}

/// Deterministic non-zero key material for `(seed, index)`.
pub fn key(seed: u8, index: u8) -> PublicKey {
    let mut bytes = [0x5a; 32];
    bytes[0] = seed;
    bytes[1] = index;
    PublicKey::new(bytes)
}

/// Keys for one replenish or deploy.
pub fn keys(seed: u8, count: u8) -> Vec<PublicKey> {
    (0..count % (MAX_KEYS_PER_OP + 1)).map(|i| key(seed, i)).collect()
}

/// Bundle for a deploy: every fixed field non-zero, pool from `keys`.
pub fn bundle(owner: IdentityId, seed: u8, pool: u8) -> KeyBundle {
    KeyBundle {
        username: username(owner),
        registration_id: u32::from(owner % IDENTITIES) + 1,
        identity_key: key(0xf0, owner),
        signed_pre_key: key(0xf1, owner),
        signed_pre_key_sig: Signature::from_halves([0xf2; 32], [0xf3; 32]),
        one_time_pre_keys: keys(seed, pool),
    }
}

/// Observable result of one operation.
///
/// Compared between the model and the real ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    /// Names of emitted records, in order.
    pub events: Vec<&'static str>,
    /// Returned value.
    pub value: ObservedValue,
}

impl Observation {
    /// Observation with no records.
    pub fn silent(value: ObservedValue) -> Self {
        Self { events: Vec::new(), value }
    }

    /// Observation of a refused call.
    pub fn unauthorized(value: ObservedValue) -> Self {
        Self { events: vec!["Unauthorized"], value }
    }
}

/// Returned value, with store addresses replaced by their index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservedValue {
    /// Operation targeted a store before any was deployed.
    Skipped,
    /// Store deployed; whether it reports itself valid.
    Deployed {
        /// Result of `is_valid` right after deploy.
        valid: bool,
    },
    /// No return value.
    Unit,
    /// Pool size after a replenish (0 when refused).
    Count(usize),
    /// Drawn key, if any.
    Key(Option<PublicKey>),
    /// Lookup result: index of the mapped store, `None` for zero.
    Store(Option<usize>),
}
