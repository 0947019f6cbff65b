//! Ledger error types.
//!
//! None of these are authorization failures. A refused caller gets a
//! successful [`Receipt`](crate::Receipt) carrying an `Unauthorized` record;
//! errors here mean the call itself was malformed or the host failed.

use capchat_core::Address;
use thiserror::Error;

use crate::{driver::Reply, storage::StorageError};

/// Errors from ledger processing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Call targeted an address with no key store
    #[error("no key store at {0}")]
    UnknownKeyStore(Address),

    /// Call targeted an address with no directory
    #[error("no directory at {0}")]
    UnknownDirectory(Address),

    /// Deploy would exceed the configured instance limit
    #[error("instance limit reached ({max})")]
    CapacityExceeded {
        /// Configured limit
        max: usize,
    },

    /// Random address allocation kept colliding
    #[error("could not allocate a fresh address after {attempts} attempts")]
    AddressExhausted {
        /// Attempts made
        attempts: usize,
    },

    /// Persisting or restoring state failed
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A fresh ledger was handed storage that already holds instances
    #[error("storage already holds {instances} instances; open it to resume")]
    StorageInUse {
        /// Instances found in storage
        instances: usize,
    },

    /// Driver answered with a reply of the wrong kind
    #[error("unexpected reply {0:?}")]
    UnexpectedReply(Reply),

    /// Ledger lock was poisoned by a panicking thread
    #[error("ledger lock poisoned")]
    Poisoned,
}

impl LedgerError {
    /// Returns true if the call was malformed and rejected before any state
    /// was read. Resubmitting the same call cannot succeed.
    pub fn is_malformed_call(&self) -> bool {
        matches!(self, Self::UnknownKeyStore(_) | Self::UnknownDirectory(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_targets_are_malformed() {
        assert!(LedgerError::UnknownKeyStore(Address::ZERO).is_malformed_call());
        assert!(LedgerError::UnknownDirectory(Address::ZERO).is_malformed_call());
        assert!(!LedgerError::CapacityExceeded { max: 1 }.is_malformed_call());
        assert!(!LedgerError::UnexpectedReply(Reply::Done).is_malformed_call());
        assert!(!LedgerError::Storage(StorageError::Io("disk".to_string())).is_malformed_call());
    }
}
