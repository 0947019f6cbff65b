//! Directory scenarios: delegate swaps, delegate-gated mappings, silent
//! reads.

use capchat_core::{Action, Address, Directory, Event, Username};

const OWNER: Address = Address::new([0x01; 20]);
const INIT_LOGIC: Address = Address::new([0x02; 20]);
const NEW_LOGIC: Address = Address::new([0x03; 20]);
const ALICE_STORE: Address = Address::new([0xa1; 20]);
const BOB_STORE: Address = Address::new([0xb0; 20]);

fn others() -> Vec<Address> {
    (10..20).map(|n| Address::new([n; 20])).collect()
}

fn directory() -> Directory {
    let mut dir = Directory::new(OWNER);
    let _ = dir.update_logic(OWNER, INIT_LOGIC);
    dir
}

#[test]
fn owner_updates_logic() {
    let mut dir = directory();
    assert_eq!(dir.logic(), INIT_LOGIC);

    let outcome = dir.update_logic(OWNER, NEW_LOGIC);

    assert_eq!(outcome.events, vec![Event::NewLogic { caddr: NEW_LOGIC }]);
    assert_eq!(dir.logic(), NEW_LOGIC);
}

#[test]
fn only_owner_updates_logic() {
    let mut dir = directory();

    for caller in others().into_iter().chain([INIT_LOGIC]) {
        let outcome = dir.update_logic(caller, caller);
        assert_eq!(
            outcome.events,
            vec![Event::Unauthorized { from: caller, action: Action::UpdateLogic }]
        );
    }
    assert_eq!(dir.logic(), INIT_LOGIC);
}

#[test]
fn add_pads_username_and_resolves() {
    let mut dir = directory();

    for (name, store) in [("alice", ALICE_STORE), ("bob", BOB_STORE)] {
        let outcome = dir.add(INIT_LOGIC, Username::from(name), store);
        assert_eq!(outcome.events.len(), 1);

        let Event::MappingAdded { username, caddr } = &outcome.events[0] else {
            panic!("expected MappingAdded, got {:?}", outcome.events);
        };
        let mut padded = [0u8; 32];
        padded[..name.len()].copy_from_slice(name.as_bytes());
        assert_eq!(username.as_bytes(), &padded);
        assert_eq!(*caddr, store);
    }

    assert_eq!(dir.get(INIT_LOGIC, Username::from("alice")), ALICE_STORE);
    assert_eq!(dir.get(INIT_LOGIC, Username::from("bob")), BOB_STORE);
}

#[test]
fn only_delegate_adds_and_removes() {
    let mut dir = directory();
    let alice = Username::from("alice");
    let _ = dir.add(INIT_LOGIC, alice, ALICE_STORE);
    let before = dir.clone();

    for caller in others().into_iter().chain([OWNER]) {
        let outcome = dir.add(caller, alice, caller);
        assert_eq!(outcome.events, vec![Event::Unauthorized { from: caller, action: Action::Add }]);

        let outcome = dir.remove(caller, alice);
        assert_eq!(
            outcome.events,
            vec![Event::Unauthorized { from: caller, action: Action::Remove }]
        );

        assert_eq!(dir.get(caller, alice), Address::ZERO);
    }

    assert_eq!(dir, before);
}

#[test]
fn remove_then_lookup_is_zero() {
    let mut dir = directory();
    let alice = Username::from("alice");
    let _ = dir.add(INIT_LOGIC, alice, ALICE_STORE);

    let outcome = dir.remove(INIT_LOGIC, alice);

    assert_eq!(outcome.events, vec![Event::MappingRemoved { username: alice }]);
    assert_eq!(dir.get(INIT_LOGIC, alice), Address::ZERO);
    assert!(dir.is_empty());
}

#[test]
fn swapped_out_delegate_loses_authority_without_rollback() {
    let mut dir = directory();
    let alice = Username::from("alice");
    let bob = Username::from("bob");
    let _ = dir.add(INIT_LOGIC, alice, ALICE_STORE);

    let _ = dir.update_logic(OWNER, NEW_LOGIC);

    let outcome = dir.add(INIT_LOGIC, bob, BOB_STORE);
    assert!(outcome.is_unauthorized());
    let outcome = dir.remove(INIT_LOGIC, alice);
    assert!(outcome.is_unauthorized());
    assert_eq!(dir.get(INIT_LOGIC, alice), Address::ZERO);

    // the new delegate still sees what the old one wrote
    assert_eq!(dir.get(NEW_LOGIC, alice), ALICE_STORE);
    assert_eq!(dir.get(NEW_LOGIC, bob), Address::ZERO);
}

#[test]
fn absent_and_unauthorized_reads_look_the_same() {
    let dir = directory();
    let ghost = Username::from("ghost");

    assert_eq!(dir.get(INIT_LOGIC, ghost), dir.get(OWNER, ghost));
}
