//! Fuzz target for decoding stored instance snapshots
//!
//! # Strategy
//!
//! - Random bytes: arbitrary CBOR handed to the key store and directory
//!   decoders
//! - Decoded snapshots are loaded into a ledger and exercised
//!
//! # Invariants
//!
//! - NEVER panic on malformed snapshots
//! - A snapshot that decodes re-encodes and decodes to the same value
//! - A ledger restored from decoded snapshots answers calls without error

#![no_main]

use arbitrary::Arbitrary;
use capchat_core::{Address, Directory, KeyStore, Username};
use capchat_ledger::{
    DirectoryCall, KeyStoreCall, Ledger, LedgerConfig, MemoryStorage, Storage, SystemEnv,
};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Clone, Arbitrary)]
enum Snapshot {
    KeyStore { bytes: Vec<u8>, caller: [u8; 20] },
    Directory { bytes: Vec<u8>, caller: [u8; 20] },
}

fn round_trip<T>(value: &T) -> T
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    let mut encoded = Vec::new();
    ciborium::into_writer(value, &mut encoded).expect("decoded snapshot re-encodes");
    ciborium::from_reader(encoded.as_slice()).expect("re-encoded snapshot decodes")
}

fuzz_target!(|snapshot: Snapshot| {
    let address = Address::new([0x42; 20]);
    let storage = MemoryStorage::new();

    match snapshot {
        Snapshot::KeyStore { bytes, caller } => {
            let Ok(store) = ciborium::from_reader::<KeyStore, _>(bytes.as_slice()) else {
                return;
            };
            assert_eq!(round_trip(&store), store);
            storage.store_key_store(address, &store).expect("memory store");

            let ledger = Ledger::open(SystemEnv::new(), storage, LedgerConfig::default())
                .expect("restore");
            let caller = Address::new(caller);
            ledger.call_key_store(caller, address, KeyStoreCall::IsValid).expect("is valid");
            ledger
                .call_key_store(caller, address, KeyStoreCall::GetOneTimePreKey)
                .expect("draw");
        },
        Snapshot::Directory { bytes, caller } => {
            let Ok(directory) = ciborium::from_reader::<Directory, _>(bytes.as_slice()) else {
                return;
            };
            assert_eq!(round_trip(&directory), directory);
            storage.store_directory(address, &directory).expect("memory store");

            let ledger = Ledger::open(SystemEnv::new(), storage, LedgerConfig::default())
                .expect("restore");
            let caller = Address::new(caller);
            ledger
                .call_directory(caller, address, DirectoryCall::Get {
                    username: Username::from("fuzz"),
                })
                .expect("get");
        },
    }
});
