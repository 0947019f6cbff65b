//! Reference model for model-based testing.
//!
//! Random [`Operation`] sequences are applied to both [`ModelWorld`] and a
//! real ledger; each step's [`Observation`] and the final
//! [`ObservableState`] must agree.

mod operation;
mod world;

pub use operation::{
    DIRECTORY_OWNER, IDENTITIES, IdentityId, MAX_KEYS_PER_OP, NAMES, NameId, Observation,
    ObservedValue, Operation, StoreId, bundle, identity, key, keys, username,
};
pub use world::{ModelStore, ModelWorld, ObservableState};
