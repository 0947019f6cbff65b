//! CapChat core: prekey stores and the username directory.
//!
//! Two access-controlled state machines for asynchronous key exchange:
//!
//! - [`KeyStore`]: one party's identity key, signed prekey, a depleting pool
//!   of one-time prekeys, and the friends allowed to draw from it.
//! - [`Directory`]: username to store-address resolution, written only by a
//!   single swappable delegate.
//!
//! Both compose the check-and-report primitive in [`auth`]: a refused caller
//! changes nothing, still returns normally, and leaves exactly one
//! [`Event::Unauthorized`] record.
//!
//! # Sans-IO
//!
//! Nothing here performs I/O or logging. Operations take the caller's
//! [`Address`] explicitly and return an [`Outcome`] holding the value and the
//! emitted [`Event`]s. Hosts (see `capchat-ledger`) supply the total order of
//! calls, persistence, and log output.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod directory;
pub mod env;
pub mod error;
pub mod event;
pub mod key_store;
pub mod types;

pub use auth::{Action, Outcome, Unauthorized};
pub use directory::Directory;
pub use env::Environment;
pub use error::EncodingError;
pub use event::{Event, LogLevel};
pub use key_store::{KeyBundle, KeyStore, PoolPolicy};
pub use types::{Address, PublicKey, Signature, Username};
