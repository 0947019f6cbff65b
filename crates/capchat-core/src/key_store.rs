//! Per-identity prekey store.
//!
//! A [`KeyStore`] holds one party's identity key, rotating signed prekey and
//! signature, a pool of one-time prekeys, and the set of friends allowed to
//! consume from that pool. It stores and serves bytes; it never generates or
//! verifies key material.
//!
//! # Access
//!
//! | Operation | Caller |
//! |---|---|
//! | getters, [`KeyStore::is_valid`] | anyone |
//! | [`KeyStore::update_signed_pre_key`], friend management, replenishment | owner |
//! | [`KeyStore::get_one_time_pre_key`] | friend |
//!
//! Refused callers get the log-and-default treatment from [`crate::auth`].
//!
//! # Pool
//!
//! Consumption swap-removes slot 0, so keys do not come out in insertion
//! order. Every key comes out exactly once.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{
    auth::{Action, Outcome, authorize, guarded},
    event::Event,
    types::{Address, PublicKey, Signature, Username},
};

/// Default minimum number of one-time prekeys for a valid store.
pub const DEFAULT_MIN_ONE_TIME_PRE_KEYS: usize = 3;

/// Default low-water mark: a draw leaving fewer keys than this is signaled.
pub const DEFAULT_LOW_WATER_MARK: usize = 3;

/// Thresholds governing the one-time prekey pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolPolicy {
    /// Fewest one-time prekeys a valid store may hold
    pub min_one_time_pre_keys: usize,
    /// Remaining count below which a draw also emits `OneTimePreKeysLow`
    pub low_water_mark: usize,
}

impl Default for PoolPolicy {
    fn default() -> Self {
        Self {
            min_one_time_pre_keys: DEFAULT_MIN_ONE_TIME_PRE_KEYS,
            low_water_mark: DEFAULT_LOW_WATER_MARK,
        }
    }
}

/// Creation-time material. Every field is defaultable; an all-default
/// bundle builds a legal store that reports itself invalid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyBundle {
    /// Informational label
    pub username: Username,
    /// Registration id, non-zero when valid
    pub registration_id: u32,
    /// Long-term identity key
    pub identity_key: PublicKey,
    /// Current signed prekey
    pub signed_pre_key: PublicKey,
    /// Signature over `signed_pre_key`
    pub signed_pre_key_sig: Signature,
    /// Initial one-time prekey pool
    pub one_time_pre_keys: Vec<PublicKey>,
}

/// Key material and friend list for one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyStore {
    owner: Address,
    username: Username,
    registration_id: u32,
    identity_key: PublicKey,
    signed_pre_key: PublicKey,
    signed_pre_key_sig: Signature,
    one_time_pre_keys: Vec<PublicKey>,
    friends: BTreeSet<Address>,
    policy: PoolPolicy,
}

impl KeyStore {
    /// Create a store owned by `owner` with the default pool policy.
    pub fn new(owner: Address, bundle: KeyBundle) -> Self {
        Self::with_policy(owner, bundle, PoolPolicy::default())
    }

    /// Create a store with explicit pool thresholds.
    ///
    /// Never fails: a degenerate bundle yields a store whose
    /// [`is_valid`](Self::is_valid) is false.
    pub fn with_policy(owner: Address, bundle: KeyBundle, policy: PoolPolicy) -> Self {
        Self {
            owner,
            username: bundle.username,
            registration_id: bundle.registration_id,
            identity_key: bundle.identity_key,
            signed_pre_key: bundle.signed_pre_key,
            signed_pre_key_sig: bundle.signed_pre_key_sig,
            one_time_pre_keys: bundle.one_time_pre_keys,
            friends: BTreeSet::new(),
            policy,
        }
    }

    /// Creator of the store. Never changes.
    pub fn owner(&self) -> Address {
        self.owner
    }

    /// Informational username.
    pub fn username(&self) -> Username {
        self.username
    }

    /// Registration id.
    pub fn registration_id(&self) -> u32 {
        self.registration_id
    }

    /// Long-term identity key.
    pub fn identity_key(&self) -> PublicKey {
        self.identity_key
    }

    /// Current signed prekey.
    pub fn signed_pre_key(&self) -> PublicKey {
        self.signed_pre_key
    }

    /// Current signed prekey signature as its two 32-byte halves.
    pub fn get_signed_pre_key_sig(&self) -> [[u8; 32]; 2] {
        self.signed_pre_key_sig.halves()
    }

    /// Current signed prekey signature.
    pub fn signed_pre_key_sig(&self) -> Signature {
        self.signed_pre_key_sig
    }

    /// Pool thresholds in force.
    pub fn policy(&self) -> PoolPolicy {
        self.policy
    }

    /// Number of unconsumed one-time prekeys.
    pub fn one_time_pre_key_count(&self) -> usize {
        self.one_time_pre_keys.len()
    }

    /// Whether `who` holds friend capability.
    pub fn is_friend(&self, who: Address) -> bool {
        self.friends.contains(&who)
    }

    /// Current friends, in address order.
    pub fn friends(&self) -> impl Iterator<Item = Address> + '_ {
        self.friends.iter().copied()
    }

    /// Replace the signed prekey and its signature together.
    pub fn update_signed_pre_key(
        &mut self,
        caller: Address,
        key: PublicKey,
        sig: Signature,
    ) -> Outcome<()> {
        guarded(authorize(caller == self.owner, caller, Action::UpdateSignedPreKey), || {
            self.signed_pre_key = key;
            self.signed_pre_key_sig = sig;
            Outcome::with_event((), Event::SignedPreKeyUpdated)
        })
    }

    /// Grant friend capability to `friend`.
    pub fn add_friend(&mut self, caller: Address, friend: Address) -> Outcome<()> {
        guarded(authorize(caller == self.owner, caller, Action::AddFriend), || {
            self.friends.insert(friend);
            Outcome::with_event((), Event::FriendAdded { friend })
        })
    }

    /// Revoke friend capability from `friend`.
    pub fn remove_friend(&mut self, caller: Address, friend: Address) -> Outcome<()> {
        guarded(authorize(caller == self.owner, caller, Action::RemoveFriend), || {
            self.friends.remove(&friend);
            Outcome::with_event((), Event::FriendRemoved { friend })
        })
    }

    /// Append `keys` to the pool. Returns the new pool size.
    pub fn add_one_time_pre_keys(&mut self, caller: Address, keys: &[PublicKey]) -> Outcome<usize> {
        guarded(authorize(caller == self.owner, caller, Action::AddOneTimePreKeys), || {
            self.one_time_pre_keys.extend_from_slice(keys);
            let count = self.one_time_pre_keys.len();
            Outcome::with_event(count, Event::OneTimePreKeysAdded { count })
        })
    }

    /// Consume one one-time prekey.
    ///
    /// Returns `None` with only `OneTimePreKeysDepleted` when the pool is
    /// empty. Otherwise returns the key with `OneTimePreKey`, followed by
    /// `OneTimePreKeysLow` when the remaining count is below the low-water
    /// mark.
    pub fn get_one_time_pre_key(&mut self, caller: Address) -> Outcome<Option<PublicKey>> {
        guarded(authorize(self.is_friend(caller), caller, Action::GetOneTimePreKey), || {
            if self.one_time_pre_keys.is_empty() {
                return Outcome::with_event(None, Event::OneTimePreKeysDepleted);
            }

            let otpk = self.one_time_pre_keys.swap_remove(0);
            let remaining = self.one_time_pre_keys.len();

            let outcome = Outcome::with_event(Some(otpk), Event::OneTimePreKey { otpk });
            if remaining < self.policy.low_water_mark {
                outcome.emit(Event::OneTimePreKeysLow { count: remaining })
            } else {
                outcome
            }
        })
    }

    /// Whether the store can bootstrap sessions.
    ///
    /// True iff the username is non-empty, the registration id is non-zero,
    /// identity key, signed prekey and signature are non-zero, and the pool
    /// holds at least `min_one_time_pre_keys` keys, none of them zero.
    pub fn is_valid(&self) -> bool {
        !self.username.is_empty()
            && self.registration_id != 0
            && !self.identity_key.is_zero()
            && !self.signed_pre_key.is_zero()
            && !self.signed_pre_key_sig.is_zero()
            && self.one_time_pre_keys.len() >= self.policy.min_one_time_pre_keys
            && self.one_time_pre_keys.iter().all(|k| !k.is_zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: Address = Address::new([1; 20]);
    const FRIEND: Address = Address::new([2; 20]);
    const STRANGER: Address = Address::new([3; 20]);

    fn key(n: u8) -> PublicKey {
        PublicKey::new([n; 32])
    }

    fn bundle(otpks: usize) -> KeyBundle {
        KeyBundle {
            username: Username::from("alice"),
            registration_id: 1234,
            identity_key: key(0xa0),
            signed_pre_key: key(0xa1),
            signed_pre_key_sig: Signature::from_halves([0xa2; 32], [0xa3; 32]),
            one_time_pre_keys: (1..=otpks as u8).map(key).collect(),
        }
    }

    fn store_with_friend(otpks: usize) -> KeyStore {
        let mut store = KeyStore::new(OWNER, bundle(otpks));
        let _ = store.add_friend(OWNER, FRIEND);
        store
    }

    #[test]
    fn full_bundle_is_valid() {
        assert!(KeyStore::new(OWNER, bundle(5)).is_valid());
    }

    #[test]
    fn short_pool_is_invalid() {
        assert!(!KeyStore::new(OWNER, bundle(2)).is_valid());
        assert!(KeyStore::new(OWNER, bundle(3)).is_valid());
    }

    #[test]
    fn default_bundle_is_legal_but_invalid() {
        let store = KeyStore::new(OWNER, KeyBundle::default());
        assert!(!store.is_valid());
        assert_eq!(store.one_time_pre_key_count(), 0);
        assert!(store.identity_key().is_zero());
    }

    #[test]
    fn policy_threshold_is_configurable() {
        let policy = PoolPolicy { min_one_time_pre_keys: 6, ..PoolPolicy::default() };
        assert!(!KeyStore::with_policy(OWNER, bundle(5), policy).is_valid());
        assert!(KeyStore::with_policy(OWNER, bundle(6), policy).is_valid());
    }

    #[test]
    fn draw_reports_key_then_low() {
        let mut store = store_with_friend(3);

        let outcome = store.get_one_time_pre_key(FRIEND);
        let otpk = outcome.value.expect("pool not empty");
        assert_eq!(
            outcome.events,
            vec![Event::OneTimePreKey { otpk }, Event::OneTimePreKeysLow { count: 2 }]
        );
    }

    #[test]
    fn empty_pool_reports_depleted_only() {
        let mut store = store_with_friend(0);

        let outcome = store.get_one_time_pre_key(FRIEND);
        assert_eq!(outcome.value, None);
        assert_eq!(outcome.events, vec![Event::OneTimePreKeysDepleted]);
    }

    #[test]
    fn owner_is_not_implicitly_a_friend() {
        let mut store = KeyStore::new(OWNER, bundle(5));

        let outcome = store.get_one_time_pre_key(OWNER);
        assert!(outcome.is_unauthorized());
        assert_eq!(store.one_time_pre_key_count(), 5);
    }

    #[test]
    fn removed_friend_loses_access() {
        let mut store = store_with_friend(5);
        let _ = store.remove_friend(OWNER, FRIEND);

        let outcome = store.get_one_time_pre_key(FRIEND);
        assert_eq!(outcome.unauthorized().map(|d| d.action), Some(Action::GetOneTimePreKey));
        assert_eq!(outcome.value, None);
    }

    #[test]
    fn replenish_reports_new_total() {
        let mut store = store_with_friend(5);
        for _ in 0..3 {
            let _ = store.get_one_time_pre_key(FRIEND);
        }

        let outcome = store.add_one_time_pre_keys(OWNER, &[key(10), key(11), key(12)]);
        assert_eq!(outcome.value, 5);
        assert_eq!(outcome.events, vec![Event::OneTimePreKeysAdded { count: 5 }]);
    }

    #[test]
    fn stranger_cannot_rotate_signed_pre_key() {
        let mut store = KeyStore::new(OWNER, bundle(5));
        let before = store.clone();

        let outcome = store.update_signed_pre_key(STRANGER, key(0xff), Signature::ZERO);

        assert_eq!(
            outcome.events,
            vec![Event::Unauthorized { from: STRANGER, action: Action::UpdateSignedPreKey }]
        );
        assert_eq!(store, before);
    }

    #[test]
    fn rotation_replaces_key_and_signature() {
        let mut store = KeyStore::new(OWNER, bundle(5));
        let sig = Signature::from_halves([0xb0; 32], [0xb1; 32]);

        let outcome = store.update_signed_pre_key(OWNER, key(0xb2), sig);

        assert_eq!(outcome.event_names(), vec!["SignedPreKeyUpdated"]);
        assert_eq!(store.signed_pre_key(), key(0xb2));
        assert_eq!(store.get_signed_pre_key_sig(), [[0xb0; 32], [0xb1; 32]]);
    }
}
