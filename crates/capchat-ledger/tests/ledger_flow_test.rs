//! End-to-end flows through the ledger: deploy, befriend, draw, register,
//! resolve, and resume from durable storage.

use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
};

use capchat_core::{
    Address, Directory, Event, KeyBundle, KeyStore, PoolPolicy, PublicKey, Signature, Username,
};
use capchat_harness::SimEnv;
use capchat_ledger::{
    DirectoryCall, KeyStoreCall, Ledger, LedgerAction, LedgerConfig, LedgerDriver, LedgerError,
    LedgerEvent, MemoryStorage, RedbStorage, Reply, Storage, StorageError,
};
use tempfile::TempDir;

const ALICE: Address = Address::new([0xa1; 20]);
const BOB: Address = Address::new([0xb0; 20]);
const MALLORY: Address = Address::new([0x66; 20]);
const REGISTRAR: Address = Address::new([0x77; 20]);

fn otpk(n: u8) -> PublicKey {
    PublicKey::new([n; 32])
}

fn alice_bundle(pool: u8) -> KeyBundle {
    KeyBundle {
        username: Username::from("alice"),
        registration_id: 42,
        identity_key: PublicKey::new([0x11; 32]),
        signed_pre_key: PublicKey::new([0x22; 32]),
        signed_pre_key_sig: Signature::from_halves([0x33; 32], [0x44; 32]),
        one_time_pre_keys: (1..=pool).map(otpk).collect(),
    }
}

fn memory_ledger(seed: u64) -> Ledger<SimEnv, MemoryStorage> {
    Ledger::new(SimEnv::with_seed(seed), MemoryStorage::new(), LedgerConfig::default())
        .expect("empty storage")
}

#[test]
fn friend_draws_until_depleted() {
    let ledger = memory_ledger(1);
    let store = ledger.deploy_key_store(ALICE, alice_bundle(4)).expect("deploy");

    let valid = ledger.call_key_store(BOB, store, KeyStoreCall::IsValid).expect("call");
    assert_eq!(valid.reply, Reply::Bool(true));

    let refused = ledger.call_key_store(BOB, store, KeyStoreCall::GetOneTimePreKey).expect("call");
    assert_eq!(refused.reply, Reply::OneTimePreKey(None));
    assert_eq!(refused.events, vec![Event::Unauthorized {
        from: BOB,
        action: capchat_core::Action::GetOneTimePreKey
    }]);

    let added = ledger
        .call_key_store(ALICE, store, KeyStoreCall::AddFriend { friend: BOB })
        .expect("call");
    assert_eq!(added.event_names(), vec!["FriendAdded"]);

    // [1, 2, 3, 4] -> 1 out, 4 moves to the front
    let first = ledger.call_key_store(BOB, store, KeyStoreCall::GetOneTimePreKey).expect("call");
    assert_eq!(first.reply, Reply::OneTimePreKey(Some(otpk(1))));
    assert_eq!(first.event_names(), vec!["OneTimePreKey"]);

    let second = ledger.call_key_store(BOB, store, KeyStoreCall::GetOneTimePreKey).expect("call");
    assert_eq!(second.reply, Reply::OneTimePreKey(Some(otpk(4))));
    assert_eq!(second.event_names(), vec!["OneTimePreKey", "OneTimePreKeysLow"]);

    for _ in 0..2 {
        ledger.call_key_store(BOB, store, KeyStoreCall::GetOneTimePreKey).expect("call");
    }

    let empty = ledger.call_key_store(BOB, store, KeyStoreCall::GetOneTimePreKey).expect("call");
    assert_eq!(empty.reply, Reply::OneTimePreKey(None));
    assert_eq!(empty.event_names(), vec!["OneTimePreKeysDepleted"]);

    let valid = ledger.call_key_store(BOB, store, KeyStoreCall::IsValid).expect("call");
    assert_eq!(valid.reply, Reply::Bool(false));
}

#[test]
fn getters_return_creation_material() {
    let ledger = memory_ledger(2);
    let store = ledger.deploy_key_store(ALICE, alice_bundle(3)).expect("deploy");
    let call = |call| ledger.call_key_store(MALLORY, store, call).expect("call").reply;

    assert_eq!(call(KeyStoreCall::Owner), Reply::Address(ALICE));
    assert_eq!(call(KeyStoreCall::Username), Reply::Username(Username::from("alice")));
    assert_eq!(call(KeyStoreCall::RegistrationId), Reply::RegistrationId(42));
    assert_eq!(call(KeyStoreCall::IdentityKey), Reply::Key(PublicKey::new([0x11; 32])));
    assert_eq!(call(KeyStoreCall::SignedPreKey), Reply::Key(PublicKey::new([0x22; 32])));
    assert_eq!(call(KeyStoreCall::GetSignedPreKeySig), Reply::SignatureHalves([[0x33; 32], [
        0x44; 32
    ]]));
    assert_eq!(call(KeyStoreCall::OneTimePreKeyCount), Reply::Count(3));
}

#[test]
fn registrar_resolves_usernames() {
    let ledger = memory_ledger(3);
    let store = ledger.deploy_key_store(ALICE, alice_bundle(3)).expect("deploy");
    let directory = ledger.deploy_directory(ALICE).expect("deploy");
    let alice = Username::from("alice");

    let early = ledger
        .call_directory(REGISTRAR, directory, DirectoryCall::Add { username: alice, caddr: store })
        .expect("call");
    assert!(early.is_unauthorized());

    ledger
        .call_directory(ALICE, directory, DirectoryCall::UpdateLogic { caddr: REGISTRAR })
        .expect("call");
    let added = ledger
        .call_directory(REGISTRAR, directory, DirectoryCall::Add { username: alice, caddr: store })
        .expect("call");
    assert_eq!(added.event_names(), vec!["MappingAdded"]);

    let found = ledger
        .call_directory(REGISTRAR, directory, DirectoryCall::Get { username: alice })
        .expect("call");
    assert_eq!(found.reply, Reply::Address(store));
    assert!(found.events.is_empty());

    let hidden = ledger
        .call_directory(MALLORY, directory, DirectoryCall::Get { username: alice })
        .expect("call");
    assert_eq!(hidden.reply, Reply::Address(Address::ZERO));
    assert!(hidden.events.is_empty());

    let removed = ledger
        .call_directory(REGISTRAR, directory, DirectoryCall::Remove { username: alice })
        .expect("call");
    assert_eq!(removed.event_names(), vec!["MappingRemoved"]);

    let gone = ledger
        .call_directory(REGISTRAR, directory, DirectoryCall::Get { username: alice })
        .expect("call");
    assert_eq!(gone.reply, Reply::Address(Address::ZERO));

    let logic = ledger.call_directory(MALLORY, directory, DirectoryCall::Logic).expect("call");
    assert_eq!(logic.reply, Reply::Address(REGISTRAR));
    let owner = ledger.call_directory(MALLORY, directory, DirectoryCall::Owner).expect("call");
    assert_eq!(owner.reply, Reply::Address(ALICE));
}

#[test]
fn calls_to_wrong_kind_are_malformed() {
    let ledger = memory_ledger(4);
    let store = ledger.deploy_key_store(ALICE, KeyBundle::default()).expect("deploy");
    let directory = ledger.deploy_directory(ALICE).expect("deploy");

    let err = ledger.call_key_store(ALICE, directory, KeyStoreCall::IsValid).expect_err("kind");
    assert_eq!(err, LedgerError::UnknownKeyStore(directory));
    assert!(err.is_malformed_call());

    let err = ledger.call_directory(ALICE, store, DirectoryCall::Logic).expect_err("kind");
    assert_eq!(err, LedgerError::UnknownDirectory(store));
}

#[test]
fn refused_calls_leave_storage_untouched() {
    let ledger = memory_ledger(5);
    let store = ledger.deploy_key_store(ALICE, alice_bundle(3)).expect("deploy");
    let stored = |ledger: &Ledger<SimEnv, MemoryStorage>| {
        ledger.storage().load_key_store(store).expect("load").expect("stored")
    };
    let before = stored(&ledger);

    for call in [
        KeyStoreCall::UpdateSignedPreKey { key: otpk(9), sig: Signature::ZERO },
        KeyStoreCall::AddFriend { friend: MALLORY },
        KeyStoreCall::RemoveFriend { friend: ALICE },
        KeyStoreCall::AddOneTimePreKeys { keys: vec![otpk(9)] },
        KeyStoreCall::GetOneTimePreKey,
    ] {
        let receipt = ledger.call_key_store(MALLORY, store, call).expect("call");
        assert!(receipt.is_unauthorized());
        assert_eq!(receipt.events.len(), 1);
    }
    assert_eq!(stored(&ledger), before);

    ledger
        .call_key_store(ALICE, store, KeyStoreCall::AddFriend { friend: BOB })
        .expect("call");
    let after = stored(&ledger);
    assert_ne!(after, before);
    assert!(after.is_friend(BOB));
}

#[test]
fn ledger_resumes_from_redb() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("ledger.redb");

    let (store, directory) = {
        let storage = RedbStorage::open(&path).expect("open");
        let ledger = Ledger::open(SimEnv::with_seed(6), storage, LedgerConfig::default())
            .expect("open ledger");

        let store = ledger.deploy_key_store(ALICE, alice_bundle(5)).expect("deploy");
        let directory = ledger.deploy_directory(ALICE).expect("deploy");
        ledger
            .call_key_store(ALICE, store, KeyStoreCall::AddFriend { friend: BOB })
            .expect("call");
        ledger.call_key_store(BOB, store, KeyStoreCall::GetOneTimePreKey).expect("call");
        ledger
            .call_directory(ALICE, directory, DirectoryCall::UpdateLogic { caddr: REGISTRAR })
            .expect("call");
        ledger
            .call_directory(REGISTRAR, directory, DirectoryCall::Add {
                username: Username::from("alice"),
                caddr: store,
            })
            .expect("call");
        (store, directory)
    };

    let storage = RedbStorage::open(&path).expect("reopen");
    let ledger = Ledger::open(SimEnv::with_seed(7), storage, LedgerConfig::default())
        .expect("resume ledger");
    assert_eq!(ledger.instance_count().expect("count"), 2);

    let count = ledger.call_key_store(BOB, store, KeyStoreCall::OneTimePreKeyCount).expect("call");
    assert_eq!(count.reply, Reply::Count(4));

    let drawn = ledger.call_key_store(BOB, store, KeyStoreCall::GetOneTimePreKey).expect("call");
    assert_eq!(drawn.event_names(), vec!["OneTimePreKey"]);

    let found = ledger
        .call_directory(REGISTRAR, directory, DirectoryCall::Get {
            username: Username::from("alice"),
        })
        .expect("call");
    assert_eq!(found.reply, Reply::Address(store));
}

#[test]
fn instance_limit_is_enforced() {
    let config = LedgerConfig { max_instances: 1, ..Default::default() };
    let ledger = Ledger::new(SimEnv::with_seed(8), MemoryStorage::new(), config).expect("ledger");

    ledger.deploy_directory(ALICE).expect("first deploy");
    let err = ledger.deploy_key_store(ALICE, KeyBundle::default()).expect_err("over limit");

    assert_eq!(err, LedgerError::CapacityExceeded { max: 1 });
    assert_eq!(ledger.instance_count().expect("count"), 1);
}

#[test]
fn pool_policy_applies_to_new_stores() {
    let config = LedgerConfig {
        pool_policy: PoolPolicy { min_one_time_pre_keys: 1, low_water_mark: 1 },
        ..Default::default()
    };
    let ledger = Ledger::new(SimEnv::with_seed(9), MemoryStorage::new(), config).expect("ledger");
    let store = ledger.deploy_key_store(ALICE, alice_bundle(2)).expect("deploy");
    ledger
        .call_key_store(ALICE, store, KeyStoreCall::AddFriend { friend: BOB })
        .expect("call");

    let valid = ledger.call_key_store(BOB, store, KeyStoreCall::IsValid).expect("call");
    assert_eq!(valid.reply, Reply::Bool(true));

    let first = ledger.call_key_store(BOB, store, KeyStoreCall::GetOneTimePreKey).expect("call");
    assert_eq!(first.event_names(), vec!["OneTimePreKey"]);
    let last = ledger.call_key_store(BOB, store, KeyStoreCall::GetOneTimePreKey).expect("call");
    assert_eq!(last.event_names(), vec!["OneTimePreKey", "OneTimePreKeysLow"]);
}

#[test]
fn driver_orders_emit_then_persist_then_reply() {
    let mut driver = LedgerDriver::new(SimEnv::with_seed(10), LedgerConfig::default());

    let actions = driver
        .process_event(LedgerEvent::DeployKeyStore { caller: ALICE, bundle: alice_bundle(3) })
        .expect("deploy");
    let Some(LedgerAction::Reply { reply: Reply::Deployed(store), .. }) = actions.last() else {
        panic!("deploy must end with a reply: {actions:?}");
    };
    let store = *store;
    assert!(driver.key_store(store).is_some());

    let actions = driver
        .process_event(LedgerEvent::KeyStoreCall {
            caller: ALICE,
            target: store,
            call: KeyStoreCall::AddFriend { friend: BOB },
        })
        .expect("call");
    assert!(matches!(actions.as_slice(), [
        LedgerAction::Emit { event: Event::FriendAdded { .. }, .. },
        LedgerAction::PersistKeyStore { .. },
        LedgerAction::Reply { reply: Reply::Done, .. },
    ]));

    let actions = driver
        .process_event(LedgerEvent::KeyStoreCall {
            caller: MALLORY,
            target: store,
            call: KeyStoreCall::AddFriend { friend: MALLORY },
        })
        .expect("call");
    assert!(matches!(actions.as_slice(), [
        LedgerAction::Emit { event: Event::Unauthorized { .. }, .. },
        LedgerAction::Reply { reply: Reply::Done, .. },
    ]));

    let actions = driver
        .process_event(LedgerEvent::KeyStoreCall {
            caller: MALLORY,
            target: store,
            call: KeyStoreCall::OneTimePreKeyCount,
        })
        .expect("call");
    assert!(matches!(actions.as_slice(), [LedgerAction::Reply { reply: Reply::Count(3), .. }]));
}

#[test]
fn same_seed_allocates_same_addresses() {
    let a = memory_ledger(11);
    let b = memory_ledger(11);

    for _ in 0..3 {
        assert_eq!(
            a.deploy_key_store(ALICE, KeyBundle::default()).expect("deploy"),
            b.deploy_key_store(ALICE, KeyBundle::default()).expect("deploy")
        );
    }
}

/// Memory storage whose writes fail while `failing` is set.
#[derive(Clone, Default)]
struct FailingStorage {
    inner: MemoryStorage,
    failing: Arc<AtomicBool>,
}

impl FailingStorage {
    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Io("disk full".to_string()));
        }
        Ok(())
    }
}

impl Storage for FailingStorage {
    fn store_key_store(&self, address: Address, store: &KeyStore) -> Result<(), StorageError> {
        self.check()?;
        self.inner.store_key_store(address, store)
    }

    fn load_key_store(&self, address: Address) -> Result<Option<KeyStore>, StorageError> {
        self.inner.load_key_store(address)
    }

    fn list_key_stores(&self) -> Result<Vec<Address>, StorageError> {
        self.inner.list_key_stores()
    }

    fn store_directory(
        &self,
        address: Address,
        directory: &Directory,
    ) -> Result<(), StorageError> {
        self.check()?;
        self.inner.store_directory(address, directory)
    }

    fn load_directory(&self, address: Address) -> Result<Option<Directory>, StorageError> {
        self.inner.load_directory(address)
    }

    fn list_directories(&self) -> Result<Vec<Address>, StorageError> {
        self.inner.list_directories()
    }
}

#[test]
fn failed_persist_keeps_drawn_key_in_pool() {
    let storage = FailingStorage::default();
    let ledger = Ledger::new(SimEnv::with_seed(12), storage.clone(), LedgerConfig::default())
        .expect("ledger");
    let store = ledger.deploy_key_store(ALICE, alice_bundle(5)).expect("deploy");
    ledger
        .call_key_store(ALICE, store, KeyStoreCall::AddFriend { friend: BOB })
        .expect("call");

    storage.set_failing(true);
    let err = ledger
        .call_key_store(BOB, store, KeyStoreCall::GetOneTimePreKey)
        .expect_err("write fails");
    assert_eq!(err, LedgerError::Storage(StorageError::Io("disk full".to_string())));

    let count = ledger.call_key_store(BOB, store, KeyStoreCall::OneTimePreKeyCount).expect("call");
    assert_eq!(count.reply, Reply::Count(5));
    assert_eq!(
        ledger.key_store(store).expect("snapshot"),
        storage.load_key_store(store).expect("load")
    );

    storage.set_failing(false);
    let mut delivered = Vec::new();
    loop {
        let receipt =
            ledger.call_key_store(BOB, store, KeyStoreCall::GetOneTimePreKey).expect("call");
        match receipt.reply {
            Reply::OneTimePreKey(Some(key)) => delivered.push(key),
            _ => break,
        }
    }
    delivered.sort_by_key(|key| *key.as_bytes());
    assert_eq!(delivered, (1..=5).map(otpk).collect::<Vec<_>>());
}

#[test]
fn failed_persist_undoes_deploy_and_directory_write() {
    let storage = FailingStorage::default();
    let ledger = Ledger::new(SimEnv::with_seed(13), storage.clone(), LedgerConfig::default())
        .expect("ledger");
    let directory = ledger.deploy_directory(ALICE).expect("deploy");

    storage.set_failing(true);
    ledger.deploy_key_store(ALICE, alice_bundle(3)).expect_err("write fails");
    assert_eq!(ledger.instance_count().expect("count"), 1);

    ledger
        .call_directory(ALICE, directory, DirectoryCall::UpdateLogic { caddr: REGISTRAR })
        .expect_err("write fails");
    let snapshot = ledger.directory(directory).expect("snapshot").expect("hosted");
    assert!(snapshot.logic().is_zero());

    storage.set_failing(false);
    let updated = ledger
        .call_directory(ALICE, directory, DirectoryCall::UpdateLogic { caddr: REGISTRAR })
        .expect("call");
    assert_eq!(updated.event_names(), vec!["NewLogic"]);
}

#[test]
fn concurrent_friends_draw_each_key_once() {
    const THREADS: u8 = 8;
    const DRAWS: usize = 10;
    const KEYS: u8 = 50;

    let ledger = memory_ledger(14);
    let store = ledger.deploy_key_store(ALICE, alice_bundle(KEYS)).expect("deploy");
    let friends: Vec<Address> = (0..THREADS).map(|n| Address::new([0xc0 + n; 20])).collect();
    for friend in &friends {
        ledger
            .call_key_store(ALICE, store, KeyStoreCall::AddFriend { friend: *friend })
            .expect("call");
    }

    let handles: Vec<_> = friends
        .into_iter()
        .map(|friend| {
            let ledger = ledger.clone();
            thread::spawn(move || {
                (0..DRAWS)
                    .map(|_| {
                        ledger
                            .call_key_store(friend, store, KeyStoreCall::GetOneTimePreKey)
                            .expect("draw")
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut delivered = HashSet::new();
    let mut depleted = 0;
    for handle in handles {
        for receipt in handle.join().expect("thread") {
            match receipt.reply {
                Reply::OneTimePreKey(Some(key)) => {
                    assert!(delivered.insert(key), "key {key} delivered twice");
                },
                Reply::OneTimePreKey(None) => {
                    assert_eq!(receipt.event_names(), vec!["OneTimePreKeysDepleted"]);
                    depleted += 1;
                },
                other => panic!("unexpected reply {other:?}"),
            }
        }
    }

    let originals: HashSet<PublicKey> = (1..=KEYS).map(otpk).collect();
    assert_eq!(delivered, originals);
    assert_eq!(depleted, usize::from(THREADS) * DRAWS - usize::from(KEYS));
    assert_eq!(
        ledger.key_store(store).expect("snapshot").expect("hosted").one_time_pre_key_count(),
        0
    );
}
