//! Deterministic simulation harness for CapChat testing.
//!
//! # Simulation
//!
//! [`SimEnv`] implements the core `Environment` with a seeded RNG and a
//! manual clock, so ledgers built on it allocate reproducible addresses.
//!
//! # Model-Based Testing
//!
//! The `model` module provides a reference implementation. Operations are
//! applied to both the model and a real ledger, and their observations are
//! compared.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod model;
pub mod sim_env;

pub use model::{
    IdentityId, ModelStore, ModelWorld, NameId, ObservableState, Observation, ObservedValue,
    Operation, StoreId,
};
pub use sim_env::{SimEnv, SimInstant};
