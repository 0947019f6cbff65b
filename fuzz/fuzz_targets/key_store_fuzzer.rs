//! Fuzz target for KeyStore access control and pool accounting
//!
//! # Strategy
//!
//! - Owner calls: rotations, friend changes, replenishment
//! - Friend and stranger draws against a shrinking pool
//! - Zero keys and zero signatures mixed into every field
//!
//! # Invariants
//!
//! - A refused call changes nothing and emits exactly one Unauthorized
//! - Every key drawn was added before and is never drawn twice
//! - Pool size equals keys added minus keys drawn
//! - Low-water signaling matches the remaining count
//! - Validity is a pure function of the current state

#![no_main]

use std::collections::BTreeMap;

use arbitrary::Arbitrary;
use capchat_core::{
    Address, Event, KeyBundle, KeyStore, PoolPolicy, PublicKey, Signature, Username,
};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Clone, Arbitrary)]
struct StoreScenario {
    initial_keys: Vec<u8>,
    min_one_time_pre_keys: u8,
    low_water_mark: u8,
    calls: Vec<FuzzedCall>,
}

#[derive(Debug, Clone, Arbitrary)]
struct FuzzedCall {
    caller: u8,
    op: StoreOp,
}

#[derive(Debug, Clone, Arbitrary)]
enum StoreOp {
    UpdateSignedPreKey { key: u8, sig: [u8; 2] },
    AddFriend { friend: u8 },
    RemoveFriend { friend: u8 },
    AddOneTimePreKeys { keys: Vec<u8> },
    GetOneTimePreKey,
}

/// Four non-zero identities; identity 0 owns the store.
fn identity(n: u8) -> Address {
    Address::new([n % 4 + 1; 20])
}

/// Byte 0 maps to the zero key so degenerate material gets exercised.
fn key(n: u8) -> PublicKey {
    PublicKey::new([n; 32])
}

fuzz_target!(|scenario: StoreScenario| {
    let owner = identity(0);
    let policy = PoolPolicy {
        min_one_time_pre_keys: usize::from(scenario.min_one_time_pre_keys % 8),
        low_water_mark: usize::from(scenario.low_water_mark % 8),
    };
    let initial: Vec<PublicKey> = scenario.initial_keys.iter().take(16).map(|&n| key(n)).collect();

    let bundle = KeyBundle {
        username: Username::from("fuzz"),
        registration_id: 1,
        identity_key: key(0xaa),
        signed_pre_key: key(0xbb),
        signed_pre_key_sig: Signature::from_halves([0xcc; 32], [0xdd; 32]),
        one_time_pre_keys: initial.clone(),
    };
    let mut store = KeyStore::with_policy(owner, bundle, policy);

    // Multiset of keys that may still be drawn
    let mut outstanding: BTreeMap<PublicKey, usize> = BTreeMap::new();
    for k in &initial {
        *outstanding.entry(*k).or_default() += 1;
    }

    for call in scenario.calls.iter().take(64) {
        let caller = identity(call.caller);
        let before = store.clone();

        let events = match &call.op {
            StoreOp::UpdateSignedPreKey { key: k, sig } => {
                let sig = Signature::from_halves([sig[0]; 32], [sig[1]; 32]);
                let outcome = store.update_signed_pre_key(caller, key(*k), sig);
                if !outcome.is_unauthorized() {
                    assert_eq!(store.signed_pre_key(), key(*k));
                    assert_eq!(store.signed_pre_key_sig(), sig);
                }
                outcome.events
            },
            StoreOp::AddFriend { friend } => {
                let outcome = store.add_friend(caller, identity(*friend));
                if !outcome.is_unauthorized() {
                    assert!(store.is_friend(identity(*friend)));
                }
                outcome.events
            },
            StoreOp::RemoveFriend { friend } => {
                let outcome = store.remove_friend(caller, identity(*friend));
                if !outcome.is_unauthorized() {
                    assert!(!store.is_friend(identity(*friend)));
                }
                outcome.events
            },
            StoreOp::AddOneTimePreKeys { keys } => {
                let keys: Vec<PublicKey> = keys.iter().take(16).map(|&n| key(n)).collect();
                let outcome = store.add_one_time_pre_keys(caller, &keys);
                if outcome.is_unauthorized() {
                    assert_eq!(outcome.value, 0);
                } else {
                    for k in &keys {
                        *outstanding.entry(*k).or_default() += 1;
                    }
                    assert_eq!(outcome.value, before.one_time_pre_key_count() + keys.len());
                }
                outcome.events
            },
            StoreOp::GetOneTimePreKey => {
                let outcome = store.get_one_time_pre_key(caller);
                match outcome.value {
                    Some(drawn) => {
                        let left = outstanding.get_mut(&drawn).expect("drawn key was added");
                        assert!(*left > 0, "key drawn more than it was added");
                        *left -= 1;

                        let remaining = store.one_time_pre_key_count();
                        let low = outcome.events.iter().any(|e| e.name() == "OneTimePreKeysLow");
                        assert_eq!(low, remaining < policy.low_water_mark);
                    },
                    None if !outcome.is_unauthorized() => {
                        assert_eq!(before.one_time_pre_key_count(), 0);
                        assert_eq!(outcome.events, vec![Event::OneTimePreKeysDepleted]);
                    },
                    None => {},
                }
                outcome.events
            },
        };

        let refused = events.iter().any(|e| matches!(e, Event::Unauthorized { .. }));
        if refused {
            assert_eq!(events.len(), 1, "refusal must emit exactly one record");
            assert_eq!(store, before, "refusal must not mutate");
        }

        let pool: usize = outstanding.values().sum();
        assert_eq!(store.one_time_pre_key_count(), pool);
        assert_eq!(store.is_valid(), store.clone().is_valid());
    }
});
