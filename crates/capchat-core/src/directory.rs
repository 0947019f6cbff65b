//! Username directory with delegated write authority.
//!
//! The directory maps [`Username`]s to store [`Address`]es. It enforces who
//! may write, never what the registration policy is: every read and write of
//! a mapping is reserved to the single current delegate, and only the
//! directory owner may swap that delegate.
//!
//! The delegate is held as an address and checked by identity equality on
//! each call, so policy can evolve by deploying a new delegate and pointing
//! the directory at it. A new directory has no delegate (the zero address,
//! which never authorizes).
//!
//! Absent entries read as the zero address. An unauthorized `get` also reads
//! as the zero address and emits nothing, so the two are indistinguishable to
//! the caller.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    auth::{Action, Outcome, authorize, guarded},
    event::Event,
    types::{Address, Username},
};

/// Username to address mapping gated by a swappable delegate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directory {
    owner: Address,
    logic: Address,
    entries: BTreeMap<Username, Address>,
}

impl Directory {
    /// Create an empty directory with no delegate.
    pub fn new(owner: Address) -> Self {
        Self { owner, logic: Address::ZERO, entries: BTreeMap::new() }
    }

    /// Creator of the directory. Never changes.
    pub fn owner(&self) -> Address {
        self.owner
    }

    /// Currently authorized delegate (zero when none).
    pub fn logic(&self) -> Address {
        self.logic
    }

    /// Number of stored mappings.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no mappings are stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_delegate(&self, caller: Address) -> bool {
        !self.logic.is_zero() && caller == self.logic
    }

    /// Hand write authority to `caddr`.
    ///
    /// Entries written by the previous delegate are left untouched.
    pub fn update_logic(&mut self, caller: Address, caddr: Address) -> Outcome<()> {
        guarded(authorize(caller == self.owner, caller, Action::UpdateLogic), || {
            self.logic = caddr;
            Outcome::with_event((), Event::NewLogic { caddr })
        })
    }

    /// Insert or overwrite `username -> caddr`.
    ///
    /// Mapping to the zero address stores nothing, since zero already reads
    /// as absent.
    pub fn add(&mut self, caller: Address, username: Username, caddr: Address) -> Outcome<()> {
        guarded(authorize(self.is_delegate(caller), caller, Action::Add), || {
            if caddr.is_zero() {
                self.entries.remove(&username);
            } else {
                self.entries.insert(username, caddr);
            }
            Outcome::with_event((), Event::MappingAdded { username, caddr })
        })
    }

    /// Delete the mapping for `username`, if any.
    pub fn remove(&mut self, caller: Address, username: Username) -> Outcome<()> {
        guarded(authorize(self.is_delegate(caller), caller, Action::Remove), || {
            self.entries.remove(&username);
            Outcome::with_event((), Event::MappingRemoved { username })
        })
    }

    /// Resolve `username`. Returns the zero address when absent or when the
    /// caller is not the delegate; neither case emits a record.
    pub fn get(&self, caller: Address, username: Username) -> Address {
        authorize(self.is_delegate(caller), caller, Action::Get)
            .ok()
            .and_then(|()| self.entries.get(&username).copied())
            .unwrap_or(Address::ZERO)
    }
}
