//! Check-and-report authorization shared by every privileged operation.
//!
//! A privileged operation evaluates a caller-identity predicate first. When
//! the predicate fails the operation:
//!
//! 1. mutates nothing,
//! 2. still returns normally,
//! 3. carries exactly one [`Event::Unauthorized`] naming the caller and the
//!    operation, and
//! 4. returns the default value of its result type.
//!
//! Denials are therefore observable by audit consumers without ever becoming
//! an error. Operations compose the primitive as
//! `guarded(authorize(predicate, caller, Action::X), || { ...mutate... })`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{event::Event, types::Address};

/// Guarded operations, named exactly as their public operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Key store: rotate signed prekey (owner)
    UpdateSignedPreKey,
    /// Key store: grant friend capability (owner)
    AddFriend,
    /// Key store: revoke friend capability (owner)
    RemoveFriend,
    /// Key store: replenish one-time prekeys (owner)
    AddOneTimePreKeys,
    /// Key store: consume one one-time prekey (friend)
    GetOneTimePreKey,
    /// Directory: swap the authorized delegate (directory owner)
    UpdateLogic,
    /// Directory: insert a mapping (delegate)
    Add,
    /// Directory: delete a mapping (delegate)
    Remove,
    /// Directory: read a mapping (delegate)
    Get,
}

impl Action {
    /// Public operation name carried in `Unauthorized` records.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UpdateSignedPreKey => "updateSignedPreKey",
            Self::AddFriend => "addFriend",
            Self::RemoveFriend => "removeFriend",
            Self::AddOneTimePreKeys => "addOneTimePreKeys",
            Self::GetOneTimePreKey => "getOneTimePreKey",
            Self::UpdateLogic => "updateLogic",
            Self::Add => "add",
            Self::Remove => "remove",
            Self::Get => "get",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed caller-identity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unauthorized {
    /// Caller that was refused
    pub from: Address,
    /// Operation that was attempted
    pub action: Action,
}

impl From<Unauthorized> for Event {
    fn from(denied: Unauthorized) -> Self {
        Self::Unauthorized { from: denied.from, action: denied.action }
    }
}

/// Evaluate a caller-identity predicate for `action`.
pub fn authorize(allowed: bool, from: Address, action: Action) -> Result<(), Unauthorized> {
    if allowed { Ok(()) } else { Err(Unauthorized { from, action }) }
}

/// Run `op` if `check` passed, otherwise log-and-default.
///
/// All state mutation of a guarded operation must live inside `op`.
pub fn guarded<T: Default>(
    check: Result<(), Unauthorized>,
    op: impl FnOnce() -> Outcome<T>,
) -> Outcome<T> {
    match check {
        Ok(()) => op(),
        Err(denied) => Outcome::denied(denied),
    }
}

/// Result of an operation: its return value plus the records it emitted, in
/// emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct Outcome<T> {
    /// Returned value (the type's default on denial)
    pub value: T,
    /// Emitted records
    pub events: Vec<Event>,
}

impl<T> Outcome<T> {
    /// Outcome with no records.
    pub fn new(value: T) -> Self {
        Self { value, events: Vec::new() }
    }

    /// Outcome with a single record.
    pub fn with_event(value: T, event: Event) -> Self {
        Self { value, events: vec![event] }
    }

    /// Append a record.
    pub fn emit(mut self, event: Event) -> Self {
        self.events.push(event);
        self
    }

    /// Default value plus exactly one `Unauthorized` record.
    pub fn denied(denied: Unauthorized) -> Self
    where
        T: Default,
    {
        Self::with_event(T::default(), denied.into())
    }

    /// The denial, if this outcome is the unauthorized path.
    pub fn unauthorized(&self) -> Option<Unauthorized> {
        match self.events.as_slice() {
            [Event::Unauthorized { from, action }] => {
                Some(Unauthorized { from: *from, action: *action })
            },
            _ => None,
        }
    }

    /// Whether this outcome is the unauthorized path.
    pub fn is_unauthorized(&self) -> bool {
        self.unauthorized().is_some()
    }

    /// Record names in emission order.
    pub fn event_names(&self) -> Vec<&'static str> {
        self.events.iter().map(Event::name).collect()
    }

    /// Transform the value, keeping the records.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome { value: f(self.value), events: self.events }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CALLER: Address = Address::new([7; 20]);

    #[test]
    fn action_names_match_public_operations() {
        assert_eq!(Action::UpdateSignedPreKey.as_str(), "updateSignedPreKey");
        assert_eq!(Action::AddOneTimePreKeys.as_str(), "addOneTimePreKeys");
        assert_eq!(Action::GetOneTimePreKey.to_string(), "getOneTimePreKey");
        assert_eq!(Action::UpdateLogic.as_str(), "updateLogic");
        assert_eq!(Action::Remove.as_str(), "remove");
    }

    #[test]
    fn denied_runs_nothing_and_reports_once() {
        let mut touched = false;
        let outcome: Outcome<u32> = guarded(authorize(false, CALLER, Action::AddFriend), || {
            touched = true;
            Outcome::new(9)
        });

        assert!(!touched);
        assert_eq!(outcome.value, 0);
        assert_eq!(
            outcome.events,
            vec![Event::Unauthorized { from: CALLER, action: Action::AddFriend }]
        );
        assert_eq!(
            outcome.unauthorized(),
            Some(Unauthorized { from: CALLER, action: Action::AddFriend })
        );
    }

    #[test]
    fn granted_runs_op() {
        let outcome = guarded(authorize(true, CALLER, Action::Add), || {
            Outcome::with_event(5u8, Event::SignedPreKeyUpdated)
        });

        assert_eq!(outcome.value, 5);
        assert!(!outcome.is_unauthorized());
        assert_eq!(outcome.event_names(), vec!["SignedPreKeyUpdated"]);
    }
}
