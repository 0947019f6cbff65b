//! Fuzz target for Directory delegate gating
//!
//! # Strategy
//!
//! - Owner and non-owner delegate swaps, including the zero delegate
//! - Writes and reads from delegates, former delegates and strangers
//! - Mappings to the zero address
//!
//! # Invariants
//!
//! - Only the owner swaps the delegate; only the current delegate writes
//! - The zero delegate authorizes nobody
//! - Reads never emit records; non-delegate reads see the zero address
//! - Entries survive delegate swaps
//! - Delegate reads agree with a reference map

#![no_main]

use std::collections::BTreeMap;

use arbitrary::Arbitrary;
use capchat_core::{Address, Directory, Username};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Clone, Arbitrary)]
enum DirectoryOp {
    UpdateLogic { caller: u8, logic: u8 },
    Add { caller: u8, name: u8, caddr: u8 },
    Remove { caller: u8, name: u8 },
    Get { caller: u8, name: u8 },
}

/// 0 is the zero address; 1 owns the directory.
fn address(n: u8) -> Address {
    Address::new([n % 5; 20])
}

fn username(n: u8) -> Username {
    Username::new(&[b'u', n % 4])
}

fuzz_target!(|ops: Vec<DirectoryOp>| {
    let owner = address(1);
    let mut directory = Directory::new(owner);
    let mut reference: BTreeMap<Username, Address> = BTreeMap::new();

    for op in ops.iter().take(128) {
        let before = directory.clone();
        let logic = directory.logic();
        let is_delegate = |caller: Address| !logic.is_zero() && caller == logic;

        match *op {
            DirectoryOp::UpdateLogic { caller, logic: new } => {
                let outcome = directory.update_logic(address(caller), address(new));
                if address(caller) == owner {
                    assert!(!outcome.is_unauthorized());
                    assert_eq!(directory.logic(), address(new));
                } else {
                    assert!(outcome.is_unauthorized());
                    assert_eq!(directory, before);
                }
            },
            DirectoryOp::Add { caller, name, caddr } => {
                let outcome = directory.add(address(caller), username(name), address(caddr));
                if is_delegate(address(caller)) {
                    assert!(!outcome.is_unauthorized());
                    if address(caddr).is_zero() {
                        reference.remove(&username(name));
                    } else {
                        reference.insert(username(name), address(caddr));
                    }
                } else {
                    assert!(outcome.is_unauthorized());
                    assert_eq!(directory, before);
                }
            },
            DirectoryOp::Remove { caller, name } => {
                let outcome = directory.remove(address(caller), username(name));
                if is_delegate(address(caller)) {
                    assert!(!outcome.is_unauthorized());
                    reference.remove(&username(name));
                } else {
                    assert!(outcome.is_unauthorized());
                    assert_eq!(directory, before);
                }
            },
            DirectoryOp::Get { caller, name } => {
                let found = directory.get(address(caller), username(name));
                let expected = if is_delegate(address(caller)) {
                    reference.get(&username(name)).copied().unwrap_or(Address::ZERO)
                } else {
                    Address::ZERO
                };
                assert_eq!(found, expected);
                assert_eq!(directory, before);
            },
        }

        assert_eq!(directory.len(), reference.len());
    }
});
