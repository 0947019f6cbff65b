//! Environment abstraction for deterministic testing.
//!
//! Decouples hosts of the state machines from system resources (time,
//! randomness). Simulation uses a virtual clock and seeded RNG; production
//! uses the system clock and OS entropy.

use std::time::Duration;

use crate::types::{ADDRESS_LEN, Address};

/// Abstract environment providing time and randomness.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// - `now()` never goes backwards
/// - `random_bytes()` uses cryptographically secure entropy in production
pub trait Environment: Clone + Send + Sync + 'static {
    /// The specific instant type used by this environment.
    ///
    /// Production environments use `std::time::Instant`, simulation
    /// environments a virtual instant.
    type Instant: Copy + Ord + Send + Sync + std::fmt::Debug + std::ops::Sub<Output = Duration>;

    /// Current time (monotonic).
    fn now(&self) -> Self::Instant;

    /// Fills the provided buffer with random bytes.
    ///
    /// Given the same seed, a simulation environment produces the same
    /// sequence of bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    /// Generates a random non-zero address for a newly deployed instance.
    fn random_address(&self) -> Address {
        let mut bytes = [0u8; ADDRESS_LEN];
        loop {
            self.random_bytes(&mut bytes);
            let address = Address::new(bytes);
            if !address.is_zero() {
                return address;
            }
        }
    }
}
