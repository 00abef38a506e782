//! Keyed set difference between observed and desired entries

use std::collections::BTreeMap;
use std::fmt::Debug;

/// An entry with a stable key, identity fields and mutable fields.
pub trait Keyed: Clone {
    type Key: Ord + Clone + Debug;

    fn key(&self) -> Self::Key;

    /// Fields that cannot change in place. A change means delete and re-add.
    fn identity_eq(&self, other: &Self) -> bool;

    /// Fields that can be updated in place.
    fn mutable_eq(&self, other: &Self) -> bool;

    /// Key for per-link mutual exclusion, if pushes of this entry need serialising.
    fn lock_key(&self) -> Option<u64>;
}

/// Changes to push, applied in `del`, `add`, `update` order
#[derive(Debug, Clone, PartialEq)]
pub struct Plan<T> {
    pub del: Vec<T>,
    pub add: Vec<T>,
    pub update: Vec<T>,
}

impl<T> Default for Plan<T> {
    fn default() -> Self {
        Self {
            del: Vec::new(),
            add: Vec::new(),
            update: Vec::new(),
        }
    }
}

impl<T: Keyed> Plan<T> {
    pub fn is_empty(&self) -> bool {
        self.del.is_empty() && self.add.is_empty() && self.update.is_empty()
    }

    pub fn len(&self) -> usize {
        self.del.len() + self.add.len() + self.update.len()
    }

    pub fn lock_keys(&self) -> Vec<u64> {
        self.del
            .iter()
            .chain(&self.add)
            .chain(&self.update)
            .filter_map(|e| e.lock_key())
            .collect()
    }
}

/// Compute what to push so that `observed` becomes `desired`.
///
/// `None` means the object was never pushed, so every desired entry is added.
pub fn diff<T: Keyed>(observed: Option<&[T]>, desired: &[T]) -> Plan<T> {
    let Some(observed) = observed else {
        return Plan {
            add: desired.to_vec(),
            ..Default::default()
        };
    };

    let old: BTreeMap<T::Key, &T> = observed.iter().map(|e| (e.key(), e)).collect();
    let new: BTreeMap<T::Key, &T> = desired.iter().map(|e| (e.key(), e)).collect();

    let mut plan = Plan::default();
    for (key, entry) in &old {
        match new.get(key) {
            None => plan.del.push((*entry).clone()),
            Some(wanted) if !entry.identity_eq(wanted) => plan.del.push((*entry).clone()),
            Some(_) => {}
        }
    }
    for (key, entry) in &new {
        match old.get(key) {
            None => plan.add.push((*entry).clone()),
            Some(had) if !had.identity_eq(entry) => plan.add.push((*entry).clone()),
            Some(had) if !had.mutable_eq(entry) => plan.update.push((*entry).clone()),
            Some(_) => {}
        }
    }
    plan
}

/// Observed state already matches the desired entries.
pub fn converged<T: Keyed>(observed: Option<&[T]>, desired: &[T]) -> bool {
    match observed {
        None => false,
        Some(observed) => observed.len() == desired.len() && diff(Some(observed), desired).is_empty(),
    }
}
