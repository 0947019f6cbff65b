//! Model world: the reference implementation.
//!
//! Tracks owners, friend sets, pools and directory entries with plain
//! collections and predicts, for every operation, the records emitted and
//! the value returned. It is the oracle the real ledger is checked against.

use std::collections::{BTreeMap, BTreeSet};

use capchat_core::{PoolPolicy, PublicKey};

use super::operation::{
    DIRECTORY_OWNER, IDENTITIES, IdentityId, NAMES, NameId, Observation, ObservedValue, Operation,
    StoreId, keys,
};

/// Model of one key store.
#[derive(Debug, Clone)]
pub struct ModelStore {
    /// Owning identity.
    pub owner: IdentityId,
    /// Identities allowed to draw.
    pub friends: BTreeSet<IdentityId>,
    /// One-time prekey pool in draw order.
    pub pool: Vec<PublicKey>,
}

/// Observable state for oracle comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservableState {
    /// Pool size per store, in deploy order.
    pub pool_sizes: Vec<usize>,
    /// Sorted friend identities per store, in deploy order.
    pub friends: Vec<Vec<IdentityId>>,
    /// Current delegate, `None` for zero.
    pub logic: Option<IdentityId>,
    /// Mapped store per username index as the current delegate resolves
    /// it. All `None` while the delegate is zero.
    pub entries: Vec<Option<usize>>,
}

/// Model world.
///
/// One directory (owned by [`DIRECTORY_OWNER`]) and any number of key
/// stores, addressed by deploy index.
#[derive(Debug, Clone)]
pub struct ModelWorld {
    policy: PoolPolicy,
    stores: Vec<ModelStore>,
    logic: Option<IdentityId>,
    entries: BTreeMap<NameId, usize>,
}

impl ModelWorld {
    /// Create an empty world using `policy` for every store.
    pub fn new(policy: PoolPolicy) -> Self {
        Self { policy, stores: Vec::new(), logic: None, entries: BTreeMap::new() }
    }

    /// Deployed stores, in deploy order.
    pub fn stores(&self) -> &[ModelStore] {
        &self.stores
    }

    /// Resolve a store index against the deployed stores.
    pub fn resolve_store(&self, store: StoreId) -> Option<usize> {
        if self.stores.is_empty() {
            None
        } else {
            Some(usize::from(store) % self.stores.len())
        }
    }

    /// Apply an operation and return what the real system should observe.
    pub fn apply(&mut self, op: &Operation) -> Observation {
        match *op {
            Operation::DeployKeyStore { owner, seed, pool } => {
                let pool = keys(seed, pool);
                let valid = pool.len() >= self.policy.min_one_time_pre_keys;
                self.stores.push(ModelStore {
                    owner: owner % IDENTITIES,
                    friends: BTreeSet::new(),
                    pool,
                });
                Observation::silent(ObservedValue::Deployed { valid })
            },
            Operation::UpdateSignedPreKey { caller, store, .. } => {
                self.owner_op(caller, store, "SignedPreKeyUpdated", ObservedValue::Unit, |_| {})
            },
            Operation::AddFriend { caller, store, friend } => {
                self.owner_op(caller, store, "FriendAdded", ObservedValue::Unit, |s| {
                    s.friends.insert(friend % IDENTITIES);
                })
            },
            Operation::RemoveFriend { caller, store, friend } => {
                self.owner_op(caller, store, "FriendRemoved", ObservedValue::Unit, |s| {
                    s.friends.remove(&(friend % IDENTITIES));
                })
            },
            Operation::AddOneTimePreKeys { caller, store, seed, count } => {
                let Some(index) = self.resolve_store(store) else {
                    return Observation::silent(ObservedValue::Skipped);
                };
                let target = &mut self.stores[index];
                if caller % IDENTITIES != target.owner {
                    return Observation::unauthorized(ObservedValue::Count(0));
                }
                target.pool.extend(keys(seed, count));
                Observation {
                    events: vec!["OneTimePreKeysAdded"],
                    value: ObservedValue::Count(target.pool.len()),
                }
            },
            Operation::GetOneTimePreKey { caller, store } => self.draw(caller, store),
            Operation::UpdateLogic { caller, logic } => {
                if caller % IDENTITIES != DIRECTORY_OWNER {
                    return Observation::unauthorized(ObservedValue::Unit);
                }
                self.logic = logic.map(|l| l % IDENTITIES);
                Observation { events: vec!["NewLogic"], value: ObservedValue::Unit }
            },
            Operation::Register { caller, name, store } => {
                let index = match store {
                    Some(store) => match self.resolve_store(store) {
                        Some(index) => Some(index),
                        None => return Observation::silent(ObservedValue::Skipped),
                    },
                    None => None,
                };
                if !self.is_delegate(caller) {
                    return Observation::unauthorized(ObservedValue::Unit);
                }
                let name = name % NAMES;
                match index {
                    Some(index) => self.entries.insert(name, index),
                    None => self.entries.remove(&name),
                };
                Observation { events: vec!["MappingAdded"], value: ObservedValue::Unit }
            },
            Operation::Deregister { caller, name } => {
                if !self.is_delegate(caller) {
                    return Observation::unauthorized(ObservedValue::Unit);
                }
                self.entries.remove(&(name % NAMES));
                Observation { events: vec!["MappingRemoved"], value: ObservedValue::Unit }
            },
            Operation::Lookup { caller, name } => {
                let found = if self.is_delegate(caller) {
                    self.entries.get(&(name % NAMES)).copied()
                } else {
                    None
                };
                Observation::silent(ObservedValue::Store(found))
            },
        }
    }

    /// Extract observable state for comparison.
    pub fn observable_state(&self) -> ObservableState {
        ObservableState {
            pool_sizes: self.stores.iter().map(|s| s.pool.len()).collect(),
            friends: self.stores.iter().map(|s| s.friends.iter().copied().collect()).collect(),
            logic: self.logic,
            entries: (0..NAMES)
                .map(|name| self.logic.and_then(|_| self.entries.get(&name).copied()))
                .collect(),
        }
    }

    fn is_delegate(&self, caller: IdentityId) -> bool {
        self.logic == Some(caller % IDENTITIES)
    }

    fn owner_op(
        &mut self,
        caller: IdentityId,
        store: StoreId,
        event: &'static str,
        value: ObservedValue,
        mutate: impl FnOnce(&mut ModelStore),
    ) -> Observation {
        let Some(index) = self.resolve_store(store) else {
            return Observation::silent(ObservedValue::Skipped);
        };
        let target = &mut self.stores[index];
        if caller % IDENTITIES != target.owner {
            return Observation::unauthorized(value);
        }
        mutate(target);
        Observation { events: vec![event], value }
    }

    fn draw(&mut self, caller: IdentityId, store: StoreId) -> Observation {
        let Some(index) = self.resolve_store(store) else {
            return Observation::silent(ObservedValue::Skipped);
        };
        let low_water_mark = self.policy.low_water_mark;
        let target = &mut self.stores[index];
        if !target.friends.contains(&(caller % IDENTITIES)) {
            return Observation::unauthorized(ObservedValue::Key(None));
        }
        if target.pool.is_empty() {
            return Observation {
                events: vec!["OneTimePreKeysDepleted"],
                value: ObservedValue::Key(None),
            };
        }

        // First key out; the last key fills its slot.
        let key = target.pool.swap_remove(0);
        let mut events = vec!["OneTimePreKey"];
        if target.pool.len() < low_water_mark {
            events.push("OneTimePreKeysLow");
        }
        Observation { events, value: ObservedValue::Key(Some(key)) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deploy_then_draw_as_friend() {
        let mut world = ModelWorld::new(PoolPolicy::default());
        let deployed = world.apply(&Operation::DeployKeyStore { owner: 0, seed: 1, pool: 4 });
        assert_eq!(deployed.value, ObservedValue::Deployed { valid: true });

        let refused = world.apply(&Operation::GetOneTimePreKey { caller: 1, store: 0 });
        assert_eq!(refused, Observation::unauthorized(ObservedValue::Key(None)));

        world.apply(&Operation::AddFriend { caller: 0, store: 0, friend: 1 });
        let drawn = world.apply(&Operation::GetOneTimePreKey { caller: 1, store: 0 });
        assert_eq!(drawn.events, vec!["OneTimePreKey"]);
        assert_eq!(world.observable_state().pool_sizes, vec![3]);

        let low = world.apply(&Operation::GetOneTimePreKey { caller: 1, store: 0 });
        assert_eq!(low.events, vec!["OneTimePreKey", "OneTimePreKeysLow"]);
    }

    #[test]
    fn store_ops_skip_without_stores() {
        let mut world = ModelWorld::new(PoolPolicy::default());
        let observed = world.apply(&Operation::AddFriend { caller: 0, store: 3, friend: 1 });
        assert_eq!(observed, Observation::silent(ObservedValue::Skipped));
    }

    #[test]
    fn zero_delegate_authorizes_nobody() {
        let mut world = ModelWorld::new(PoolPolicy::default());
        world.apply(&Operation::UpdateLogic { caller: DIRECTORY_OWNER, logic: None });

        for caller in 0..IDENTITIES {
            let observed = world.apply(&Operation::Deregister { caller, name: 0 });
            assert_eq!(observed, Observation::unauthorized(ObservedValue::Unit));
        }
    }
}
