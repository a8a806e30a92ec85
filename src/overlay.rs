// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! # Weak-keyed association overlays
//!
//! An [`Overlay`] layers writes and deletions over an existing, read-only association keyed by
//! compound identity, without touching the association itself. Entries are held through weak
//! handles, so the overlay never keeps a key alive; [`Overlay::purge`] drops the entries whose
//! key has gone away.
use crate::{Compound, RandomState, Value, WeakCompound, create_map};
use std::{collections::HashMap, hash::BuildHasher};

/// A read-only association from compounds (by identity) to values.
pub trait Association {
    fn get(&self, key: &Compound) -> Option<Value>;

    fn contains(&self, key: &Compound) -> bool {
        self.get(key).is_some()
    }
}

impl<S: BuildHasher> Association for HashMap<Compound, Value, S> {
    fn get(&self, key: &Compound) -> Option<Value> {
        HashMap::get(self, key).cloned()
    }

    fn contains(&self, key: &Compound) -> bool {
        self.contains_key(key)
    }
}

impl<A: Association + ?Sized> Association for &A {
    fn get(&self, key: &Compound) -> Option<Value> {
        (**self).get(key)
    }

    fn contains(&self, key: &Compound) -> bool {
        (**self).contains(key)
    }
}

/// Writes and tombstones layered over an [`Association`].
#[derive(Debug)]
pub struct Overlay<A> {
    original: A,
    written: HashMap<usize, (WeakCompound, Value), RandomState>,
    removed: HashMap<usize, WeakCompound, RandomState>,
}

impl<A: Association> Overlay<A> {
    pub fn new(original: A) -> Self {
        Self {
            original,
            written: create_map(),
            removed: create_map(),
        }
    }

    pub fn original(&self) -> &A {
        &self.original
    }

    pub fn into_original(self) -> A {
        self.original
    }

    fn is_removed(&self, key: &Compound) -> bool {
        self.removed
            .get(&key.addr())
            .is_some_and(|weak| weak.points_to(key))
    }

    fn written(&self, key: &Compound) -> Option<&Value> {
        self.written
            .get(&key.addr())
            .filter(|(weak, _)| weak.points_to(key))
            .map(|(_, value)| value)
    }

    /// Associates `value` with `key`, lifting an earlier deletion.
    pub fn set(&mut self, key: &Compound, value: impl Into<Value>) -> &mut Self {
        self.removed.remove(&key.addr());
        self.written
            .insert(key.addr(), (key.downgrade(), value.into()));
        self
    }

    /// Hides `key`, whether it was written here or present in the original.
    ///
    /// Returns true if the overlay itself held a value for `key`.
    pub fn delete(&mut self, key: &Compound) -> bool {
        self.removed.insert(key.addr(), key.downgrade());
        self.written.remove(&key.addr()).is_some()
    }

    pub fn has(&self, key: &Compound) -> bool {
        self.contains(key)
    }

    /// Forgets entries and tombstones whose key no longer exists.
    pub fn purge(&mut self) {
        self.written.retain(|_, (weak, _)| weak.upgrade().is_some());
        self.removed.retain(|_, weak| weak.upgrade().is_some());
    }

    /// Number of values written through the overlay, including ones whose key is gone.
    pub fn written_len(&self) -> usize {
        self.written.len()
    }
}

impl<A: Association> Association for Overlay<A> {
    fn get(&self, key: &Compound) -> Option<Value> {
        if let Some(value) = self.written(key) {
            return Some(value.clone());
        }
        if self.is_removed(key) {
            return None;
        }
        self.original.get(key)
    }

    fn contains(&self, key: &Compound) -> bool {
        self.written(key).is_some() || (!self.is_removed(key) && self.original.contains(key))
    }
}
