// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use crate::{Path, RandomState, create_map, create_set};
use std::collections::{HashMap, HashSet};

/// Reverse-dependency index: for each path, the paths whose pending changes keep its copy alive.
///
/// A path may list itself; structural sequence operations do so to pin their copy.
#[derive(Debug)]
pub(crate) struct Dependents(HashMap<Path, HashSet<Path, RandomState>, RandomState>);

impl Default for Dependents {
    fn default() -> Self {
        Self(create_map())
    }
}

impl Dependents {
    pub(crate) fn add(&mut self, at: &Path, dependent: Path) {
        self.0.entry(at.clone()).or_insert_with(create_set).insert(dependent);
    }

    /// Removes one contribution, dropping the entry once it is empty.
    pub(crate) fn remove(&mut self, at: &Path, dependent: &Path) -> bool {
        let Some(set) = self.0.get_mut(at) else {
            return false;
        };
        let removed = set.remove(dependent);
        if set.is_empty() {
            self.0.remove(at);
        }
        removed
    }

    pub(crate) fn count(&self, at: &Path) -> usize {
        self.0.get(at).map_or(0, HashSet::len)
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, at: &Path, dependent: &Path) -> bool {
        self.0.get(at).is_some_and(|set| set.contains(dependent))
    }

    pub(crate) fn remove_all(&mut self, at: &Path) {
        self.0.remove(at);
    }

    pub(crate) fn clear(&mut self) {
        self.0.clear();
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
