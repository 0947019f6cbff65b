//! Structured records emitted by key store and directory operations.
//!
//! Records are returned to the caller inside an [`Outcome`](crate::auth::Outcome)
//! rather than written to a log directly. The host decides where they go; the
//! ledger turns each one into a log line at [`Event::level`].
//!
//! Monitors watching for misuse subscribe to [`Event::Unauthorized`] across
//! all components. Pool health is tracked through
//! [`Event::OneTimePreKeysLow`] and [`Event::OneTimePreKeysDepleted`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    auth::Action,
    types::{Address, PublicKey, Username},
};

/// Severity a host should log a record at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    /// Informational message
    Info,
    /// Warning
    Warn,
}

/// A record emitted by an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// Caller failed the operation's identity check; nothing was mutated
    Unauthorized {
        /// Caller that was refused
        from: Address,
        /// Operation that was attempted
        action: Action,
    },

    /// Signed prekey and its signature were replaced together
    SignedPreKeyUpdated,

    /// Identity was granted friend capability
    FriendAdded {
        /// New friend
        friend: Address,
    },

    /// Identity lost friend capability
    FriendRemoved {
        /// Former friend
        friend: Address,
    },

    /// One-time prekeys were appended to the pool
    OneTimePreKeysAdded {
        /// Pool size after the append
        count: usize,
    },

    /// A one-time prekey was consumed and handed to the caller
    OneTimePreKey {
        /// The consumed key
        otpk: PublicKey,
    },

    /// A draw left the pool below the low-water mark
    OneTimePreKeysLow {
        /// Keys remaining after the draw
        count: usize,
    },

    /// A draw was attempted against an empty pool
    OneTimePreKeysDepleted,

    /// Directory write authority moved to a new delegate
    NewLogic {
        /// Newly authorized delegate
        caddr: Address,
    },

    /// Directory mapping was inserted or overwritten
    MappingAdded {
        /// Username key
        username: Username,
        /// Address it now resolves to
        caddr: Address,
    },

    /// Directory mapping was deleted
    MappingRemoved {
        /// Username key
        username: Username,
    },
}

impl Event {
    /// Record name, stable for event consumers.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unauthorized { .. } => "Unauthorized",
            Self::SignedPreKeyUpdated => "SignedPreKeyUpdated",
            Self::FriendAdded { .. } => "FriendAdded",
            Self::FriendRemoved { .. } => "FriendRemoved",
            Self::OneTimePreKeysAdded { .. } => "OneTimePreKeysAdded",
            Self::OneTimePreKey { .. } => "OneTimePreKey",
            Self::OneTimePreKeysLow { .. } => "OneTimePreKeysLow",
            Self::OneTimePreKeysDepleted => "OneTimePreKeysDepleted",
            Self::NewLogic { .. } => "NewLogic",
            Self::MappingAdded { .. } => "MappingAdded",
            Self::MappingRemoved { .. } => "MappingRemoved",
        }
    }

    /// Severity for hosts that log records.
    pub fn level(&self) -> LogLevel {
        match self {
            Self::Unauthorized { .. }
            | Self::OneTimePreKeysLow { .. }
            | Self::OneTimePreKeysDepleted => LogLevel::Warn,
            _ => LogLevel::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthorized { from, action } => {
                write!(f, "Unauthorized(from={from}, action={action})")
            },
            Self::FriendAdded { friend } => write!(f, "FriendAdded(friend={friend})"),
            Self::FriendRemoved { friend } => write!(f, "FriendRemoved(friend={friend})"),
            Self::OneTimePreKeysAdded { count } => write!(f, "OneTimePreKeysAdded(count={count})"),
            Self::OneTimePreKey { otpk } => write!(f, "OneTimePreKey(otpk={otpk})"),
            Self::OneTimePreKeysLow { count } => write!(f, "OneTimePreKeysLow(count={count})"),
            Self::NewLogic { caddr } => write!(f, "NewLogic(caddr={caddr})"),
            Self::MappingAdded { username, caddr } => {
                write!(f, "MappingAdded(username={username}, caddr={caddr})")
            },
            Self::MappingRemoved { username } => write!(f, "MappingRemoved(username={username})"),
            Self::SignedPreKeyUpdated | Self::OneTimePreKeysDepleted => f.write_str(self.name()),
        }
    }
}
