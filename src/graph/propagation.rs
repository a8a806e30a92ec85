// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! # Change propagation
//!
//! Writes go to the copy of the written-to descriptor. Creating that copy is itself a write to
//! the parent (the parent's slot now has to point at the copy), so copies cascade up to the
//! root. Writing the base value back is a *revert*: it drops the change record, and once a
//! descriptor has no pending changes left its copy is discarded and the parent is reconsidered
//! (*pruning*), so a round trip costs nothing in the final value.
//!
//! Every recorded change at `parent.key` is registered as a dependent of the parent's path. A
//! descriptor keeps its copy exactly as long as it has dependents.
use super::{Graph, NodeId};
use crate::{
    DraftError, Key, Kind, RandomState, Value,
    value::{Compound, Data},
};
use indexmap::IndexMap;
use std::hash::Hash;
use tracing::trace;

impl Graph {
    /// Records that the normalized `key` of `id` now holds `value`; `None` removes the key.
    pub(crate) fn change(
        &mut self,
        id: NodeId,
        key: Key,
        value: Option<Value>,
    ) -> Result<(), DraftError> {
        let d = self.node(id);
        if d.kind == Kind::Sequence {
            if value.is_none() {
                return Err(DraftError::protocol(&d.path, "delete", d.kind));
            }
            let len = self.effective(id).map_or(0, |c| c.len());
            match key {
                Key::Index(index) if index > len => {
                    return Err(DraftError::out_of_bounds(&d.path, index, len));
                }
                Key::Index(_) => {}
                _ => return Err(DraftError::protocol(&d.path, "set", d.kind)),
            }
        }
        if !d.reshaped && d.base_entry(&key) == value {
            return self.revert(id, &key);
        }

        let copy = self.ensure_copy(id)?;
        let d = self.node(id);
        let (kind, path) = (d.kind, d.path.clone());
        let child_path = path.child(key.clone());
        if kind == Kind::Set {
            let occupant = match self.changed.get(&child_path) {
                Some(recorded) => recorded.clone(),
                None => copy.data().get(&key),
            };
            replace_member(&copy, occupant.as_ref(), value.clone());
        } else {
            let mut data = copy.data_mut();
            match &value {
                Some(v) => data
                    .write(&key, v.clone())
                    .map_err(|_| DraftError::protocol(&path, "set", kind))?,
                None => {
                    data.delete(&key);
                }
            }
        }

        let occupant = value.clone().unwrap_or_default();
        match self.node(id).children.get(&key).copied() {
            Some(_) if value.is_none() => self.retire(id, key),
            Some(child) if self.value(child) != occupant => self.repoint(child, occupant),
            Some(_) => {}
            None => {
                self.create_child(id, key, occupant);
            }
        }
        trace!(path = %child_path, removed = value.is_none(), "changed");
        self.changed.insert(child_path.clone(), value);
        self.changed_by.add(&path, child_path);
        Ok(())
    }

    /// Undoes the pending change of the normalized `key` of `id`, restoring the base value.
    pub(crate) fn revert(&mut self, id: NodeId, key: &Key) -> Result<(), DraftError> {
        let d = self.node(id);
        let path = d.path.clone();
        let Some(copy) = d.copy.clone() else {
            return Err(DraftError::inconsistent(&path, "revert on a node without a copy"));
        };
        let Some(child) = d.children.get(key).copied() else {
            return Err(DraftError::inconsistent(
                &path.child(key.clone()),
                "revert without a child descriptor",
            ));
        };
        let original = d.base_entry(key);
        let child_path = self.node(child).path.clone();
        let previous = self.changed.shift_remove(&child_path);
        self.changed_by.remove(&path, &child_path);

        match &original {
            None => self.retire(id, key.clone()),
            Some(realigned) if self.value(child) != *realigned => {
                self.repoint(child, realigned.clone());
            }
            Some(_) => {}
        }
        trace!(path = %child_path, "reverted");

        if self.changed_by.count(&path) == 0 {
            self.discard_copy(id);
            if id != NodeId::ROOT {
                self.prune(id)?;
            }
        } else {
            self.resync(id, &copy, key, original, previous);
        }
        Ok(())
    }

    /// Reconsiders the parent after `id` lost its copy.
    fn prune(&mut self, id: NodeId) -> Result<(), DraftError> {
        let d = self.node(id);
        let Some(key) = d.key.clone() else {
            return Ok(());
        };
        let (parent, base) = (d.parent, d.base.clone());
        let p = self.node(parent);
        if !p.reshaped && p.base_entry(&key).as_ref() == Some(&base) {
            self.revert(parent, &key)
        } else {
            // the node itself was replaced earlier in the session; keep that replacement
            self.change(parent, key, Some(base))
        }
    }

    /// Puts the base value of a reverted key back into a copy that stays alive.
    fn resync(
        &self,
        id: NodeId,
        copy: &Compound,
        key: &Key,
        original: Option<Value>,
        previous: Option<Option<Value>>,
    ) {
        let d = self.node(id);
        if d.kind == Kind::Set {
            let occupant = previous.unwrap_or_else(|| copy.data().get(key));
            replace_member(copy, occupant.as_ref(), original);
            return;
        }
        let base_index = d.base.as_compound().and_then(|b| b.data().index_of(key));
        let mut data = copy.data_mut();
        match (&mut *data, key) {
            (Data::Object(fields), Key::Field(name)) => {
                restore(fields, name.clone(), original, base_index);
            }
            (Data::Map(entries), Key::Entry(k)) => {
                restore(entries, k.clone(), original, base_index);
            }
            (Data::Sequence(items), Key::Index(i)) => {
                if let (Some(slot), Some(v)) = (items.get_mut(*i), original) {
                    *slot = v;
                }
            }
            _ => {}
        }
    }

    /// Returns the copy of `id`, creating it (and cascading up) if needed.
    pub(crate) fn ensure_copy(&mut self, id: NodeId) -> Result<Compound, DraftError> {
        let d = self.node(id);
        if let Some(copy) = &d.copy {
            return Ok(copy.clone());
        }
        let Some(base) = d.base.as_compound() else {
            return Err(DraftError::inconsistent(&d.path, "cannot copy a non-compound value"));
        };
        let copy = base.shallow_copy();
        let (parent, key) = (d.parent, d.key.clone());
        trace!(path = %d.path, "copied");
        self.node_mut(id).copy = Some(copy.clone());
        self.modified.insert(id);
        if let Some(key) = key {
            self.change(parent, key, Some(Value::Compound(copy.clone())))?;
        }
        Ok(copy)
    }

    fn discard_copy(&mut self, id: NodeId) {
        if self.node_mut(id).copy.take().is_some() {
            self.modified.remove(&id);
            trace!(path = %self.node(id).path, "discarded copy");
        }
    }

    /// Makes `id` wrap `base` from now on, dropping everything tracked below it.
    pub(crate) fn repoint(&mut self, id: NodeId, base: Value) {
        self.clean_subtree(id);
        self.discard_copy(id);
        let d = self.node_mut(id);
        d.kind = base.kind();
        d.base = base;
        d.reshaped = false;
    }

    fn clean_subtree(&mut self, id: NodeId) {
        let children: Vec<NodeId> = self
            .node_mut(id)
            .children
            .drain()
            .map(|(_, child)| child)
            .collect();
        let path = self.node(id).path.clone();
        self.changed_by.remove_all(&path);
        for child in children {
            self.detach(child);
        }
    }

    fn detach(&mut self, id: NodeId) {
        self.clean_subtree(id);
        self.discard_copy(id);
        let d = self.node_mut(id);
        d.detached = true;
        let path = d.path.clone();
        self.changed.shift_remove(&path);
    }

    /// Detaches the child at `key` and leaves an empty placeholder in its place.
    ///
    /// Drafts for the removed node go stale; the placeholder keeps the key revertible.
    fn retire(&mut self, id: NodeId, key: Key) {
        if let Some(child) = self.node_mut(id).children.remove(&key) {
            self.detach(child);
        }
        self.create_child(id, key, Value::Null);
    }

    /// Applies a structural operation to a sequence.
    ///
    /// `f` returns its result and the first index whose element moved or vanished; child
    /// descriptors from there on are detached. The copy is pinned by a self-dependency, since
    /// element reverts can no longer restore the base.
    pub(crate) fn reshape<R>(
        &mut self,
        id: NodeId,
        f: impl FnOnce(&mut Vec<Value>) -> (R, Option<usize>),
    ) -> Result<R, DraftError> {
        let d = self.node(id);
        if d.kind != Kind::Sequence {
            return Err(DraftError::protocol(&d.path, "reshape", d.kind));
        }
        let copy = self.ensure_copy(id)?;
        let (result, shifted) = {
            let mut data = copy.data_mut();
            let Data::Sequence(items) = &mut *data else {
                return Err(DraftError::inconsistent(
                    &self.node(id).path,
                    "sequence descriptor holds a different shape",
                ));
            };
            f(items)
        };

        let path = self.node(id).path.clone();
        if let Some(start) = shifted {
            let moved: Vec<(Key, NodeId)> = self
                .node(id)
                .children
                .iter()
                .filter(|(key, _)| key.as_index().is_some_and(|i| i >= start))
                .map(|(key, &child)| (key.clone(), child))
                .collect();
            for (key, child) in moved {
                self.node_mut(id).children.remove(&key);
                let child_path = self.node(child).path.clone();
                self.changed_by.remove(&path, &child_path);
                self.detach(child);
            }
        }
        self.node_mut(id).reshaped = true;
        trace!(path = %path, "reshaped");
        self.changed
            .insert(path.clone(), Some(Value::Compound(copy)));
        self.changed_by.add(&path, path.clone());
        Ok(result)
    }

    /// Writes `value` under the normalized `key` unless it is already there.
    pub(crate) fn write(&mut self, id: NodeId, key: Key, value: Value) -> Result<(), DraftError> {
        let d = self.node(id);
        if !matches!(d.kind, Kind::Object | Kind::Sequence | Kind::Map) {
            return Err(DraftError::protocol(&d.path, "set", d.kind));
        }
        if self.lookup(id, &key).as_ref() == Some(&value) {
            return Ok(());
        }
        self.change(id, key, Some(value))
    }

    /// Removes the normalized `key`, returning false if it was not there.
    ///
    /// On sequences this is structural: later elements move down.
    pub(crate) fn delete(&mut self, id: NodeId, key: Key) -> Result<bool, DraftError> {
        let d = self.node(id);
        match d.kind {
            Kind::Sequence => {
                let len = self.effective(id).map_or(0, |c| c.len());
                let Some(index) = key.as_index().filter(|&i| i < len) else {
                    return Ok(false);
                };
                self.reshape(id, |items| {
                    items.remove(index);
                    ((), Some(index))
                })?;
                Ok(true)
            }
            Kind::Set => {
                let tracked = match self.lookup(id, &key) {
                    Some(element) => self.set_member_key(id, &element),
                    // written through its draft, the member now sits in the set as a copy
                    None if self.tracks_replaced_member(id, &key) => key,
                    None => return Ok(false),
                };
                self.change(id, tracked, None)?;
                Ok(true)
            }
            Kind::Object | Kind::Map => {
                if self.lookup(id, &key).is_none() {
                    return Ok(false);
                }
                self.change(id, key, None)?;
                Ok(true)
            }
            kind => Err(DraftError::protocol(&d.path, "remove", kind)),
        }
    }

    /// Adds `element` to a set, returning false if it was already a member.
    pub(crate) fn insert_member(&mut self, id: NodeId, element: Value) -> Result<bool, DraftError> {
        let d = self.node(id);
        if d.kind != Kind::Set {
            return Err(DraftError::protocol(&d.path, "insert", d.kind));
        }
        let key = Key::Entry(element.clone());
        if self.lookup(id, &key).is_some() {
            return Ok(false);
        }
        self.change(id, key, Some(element))?;
        Ok(true)
    }

    /// Removes every entry of a container.
    pub(crate) fn clear(&mut self, id: NodeId) -> Result<(), DraftError> {
        let d = self.node(id);
        let kind = d.kind;
        let Some(current) = self.effective(id) else {
            return Err(DraftError::protocol(&d.path, "clear", kind));
        };
        if current.is_empty() {
            return Ok(());
        }
        match kind {
            Kind::Sequence => self.reshape(id, |items| {
                items.clear();
                ((), Some(0))
            }),
            Kind::Set => {
                for element in current.values() {
                    self.delete(id, Key::Entry(element))?;
                }
                Ok(())
            }
            _ => {
                for key in current.keys() {
                    self.change(id, key, None)?;
                }
                Ok(())
            }
        }
    }
}

/// Swaps `occupant` for `value` in a set, keeping the occupant's position.
fn replace_member(copy: &Compound, occupant: Option<&Value>, value: Option<Value>) {
    let mut data = copy.data_mut();
    let Data::Set(elements) = &mut *data else {
        return;
    };
    let position = occupant.and_then(|o| elements.get_index_of(o));
    if let Some(o) = occupant {
        elements.shift_remove(o);
    }
    if let Some(v) = value {
        let (index, inserted) = elements.insert_full(v);
        if let (true, Some(position)) = (inserted, position) {
            elements.move_index(index, position);
        }
    }
}

/// Puts `original` back under `key`, at its base position if it had to be re-inserted.
fn restore<K: Hash + Eq>(
    map: &mut IndexMap<K, Value, RandomState>,
    key: K,
    original: Option<Value>,
    base_index: Option<usize>,
) {
    match original {
        Some(v) => {
            let (index, replaced) = map.insert_full(key, v);
            if let (None, Some(target)) = (replaced, base_index) {
                map.move_index(index, target.min(map.len() - 1));
            }
        }
        None => {
            map.shift_remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Path, value};

    fn key(k: &str) -> Key {
        Key::from(k)
    }

    fn paths(g: &Graph) -> Vec<String> {
        g.changes().keys().map(Path::to_string).collect()
    }

    #[test]
    fn change_cascades_copies_to_the_root() {
        let base = value!({ "a" => { "bar" => 1 }, "b" => {} });
        let mut g = Graph::new(base.clone());
        let a = g.child(NodeId::ROOT, &key("a")).unwrap();
        g.write(a, key("bar"), Value::from(2)).unwrap();

        assert!(g.node(NodeId::ROOT).copy.is_some());
        assert!(g.node(a).copy.is_some());
        assert_eq!(paths(&g), ["a", "a.bar"]);
        let root = g.value(NodeId::ROOT);
        assert_ne!(root, base);
        assert_eq!(root.get("b"), base.get("b"));
        assert_eq!(root.get("a").unwrap().get("bar"), Some(Value::from(2)));
    }

    #[test]
    fn writing_the_base_back_prunes_every_copy() {
        let base = value!({ "a" => { "bar" => 1 } });
        let mut g = Graph::new(base.clone());
        let a = g.child(NodeId::ROOT, &key("a")).unwrap();
        g.write(a, key("bar"), Value::from(2)).unwrap();
        g.write(a, key("bar"), Value::from(1)).unwrap();

        assert!(g.node(NodeId::ROOT).copy.is_none());
        assert!(g.node(a).copy.is_none());
        assert!(g.changes().is_empty());
        assert!(g.changed_by.is_empty());
        assert!(g.modified.is_empty());
        assert_eq!(g.value(NodeId::ROOT), base);
    }

    #[test]
    fn revert_keeps_sibling_changes() {
        let base = value!({ "x" => 1, "y" => 2 });
        let mut g = Graph::new(base.clone());
        g.write(NodeId::ROOT, key("x"), Value::from(10)).unwrap();
        g.write(NodeId::ROOT, key("y"), Value::from(20)).unwrap();
        g.write(NodeId::ROOT, key("x"), Value::from(1)).unwrap();

        assert_eq!(paths(&g), ["y"]);
        let root = g.value(NodeId::ROOT);
        assert!(root.deep_eq(&value!({ "x" => 1, "y" => 20 })));
    }

    #[test]
    fn delete_then_restore_returns_to_base() {
        let base = value!({ "x" => 1, "y" => 2 });
        let mut g = Graph::new(base.clone());
        assert!(g.delete(NodeId::ROOT, key("x")).unwrap());
        assert_eq!(g.lookup(NodeId::ROOT, &key("x")), None);
        assert_eq!(g.changes().get(&Path::root().child(key("x"))), Some(&None));
        g.write(NodeId::ROOT, key("x"), Value::from(1)).unwrap();
        assert_eq!(g.value(NodeId::ROOT), base);
    }

    #[test]
    fn restored_fields_keep_their_base_position() {
        let base = value!({ "x" => 1, "y" => 2, "z" => 3 });
        let mut g = Graph::new(base);
        g.delete(NodeId::ROOT, key("x")).unwrap();
        g.write(NodeId::ROOT, key("z"), Value::from(30)).unwrap();
        g.write(NodeId::ROOT, key("x"), Value::from(1)).unwrap();
        let keys: Vec<String> = g
            .effective(NodeId::ROOT)
            .unwrap()
            .keys()
            .iter()
            .map(Key::to_string)
            .collect();
        assert_eq!(keys, ["x", "y", "z"]);
    }

    #[test]
    fn prune_keeps_an_earlier_replacement() {
        let base = value!({ "a" => { "n" => 1 } });
        let mut g = Graph::new(base.clone());
        let replacement = value!({ "n" => 5 });
        g.write(NodeId::ROOT, key("a"), replacement.clone()).unwrap();
        let a = g.child(NodeId::ROOT, &key("a")).unwrap();
        g.write(a, key("n"), Value::from(6)).unwrap();
        g.write(a, key("n"), Value::from(5)).unwrap();

        // the copy of the replacement is gone, the replacement itself stays
        assert_eq!(g.value(NodeId::ROOT).get("a"), Some(replacement));
    }

    #[test]
    fn replacing_a_subtree_detaches_old_grandchildren() {
        let base = value!({ "a" => { "b" => { "c" => 1 } } });
        let mut g = Graph::new(base);
        let a = g.child(NodeId::ROOT, &key("a")).unwrap();
        let b = g.child(a, &key("b")).unwrap();
        g.write(b, key("c"), Value::from(2)).unwrap();
        g.write(NodeId::ROOT, key("a"), value!({ "fresh" => true }))
            .unwrap();

        assert!(g.is_live(a));
        assert!(!g.is_live(b));
        assert_eq!(paths(&g), ["a"]);
        assert_eq!(g.lookup(a, &key("fresh")), Some(Value::from(true)));
    }

    #[test]
    fn reshape_pins_the_copy() {
        let base = value!({ "list" => [{ "v" => 1 }, { "v" => 2 }] });
        let mut g = Graph::new(base.clone());
        let list = g.child(NodeId::ROOT, &key("list")).unwrap();
        let first = g.child(list, &Key::Index(0)).unwrap();
        let second = g.child(list, &Key::Index(1)).unwrap();
        g.write(first, key("v"), Value::from(10)).unwrap();
        g.reshape(list, |items| (items.pop(), Some(1))).unwrap();
        g.write(first, key("v"), Value::from(1)).unwrap();

        assert!(!g.is_live(second));
        assert!(g.is_live(first));
        assert!(g.node(list).copy.is_some());
        let list = g.value(NodeId::ROOT).get("list").unwrap();
        assert_eq!(list.as_compound().unwrap().len(), 1);
        assert_eq!(list.get(0), base.get("list").unwrap().get(0));
    }

    #[test]
    fn sequence_writes_are_bounds_checked() {
        let base = value!([1, 2]);
        let mut g = Graph::new(base);
        assert_eq!(
            g.write(NodeId::ROOT, Key::Index(5), Value::from(1)),
            Err(DraftError::OutOfBounds {
                path: Path::root(),
                index: 5,
                len: 2
            })
        );
        g.write(NodeId::ROOT, Key::Index(2), Value::from(3)).unwrap();
        assert!(g.value(NodeId::ROOT).deep_eq(&value!([1, 2, 3])));
        assert!(g.node(NodeId::ROOT).copy.is_some());
        assert!(g.modified.contains(&NodeId::ROOT));
    }

    #[test]
    fn revert_without_copy_is_inconsistent() {
        let mut g = Graph::new(value!({ "a" => 1 }));
        assert!(matches!(
            g.revert(NodeId::ROOT, &key("a")),
            Err(DraftError::InternalConsistency { .. })
        ));
    }

    #[test]
    fn set_element_replacement_keeps_position() {
        let member = value!({ "v" => 1 });
        let base = Value::set([Value::from(0), member.clone(), Value::from(2)]);
        let mut g = Graph::new(base.clone());
        let child = g.set_member_child(NodeId::ROOT, &member).unwrap();
        g.write(child, key("v"), Value::from(9)).unwrap();

        let elements = g.effective(NodeId::ROOT).unwrap().values();
        assert_eq!(elements.len(), 3);
        assert_eq!(elements[0], Value::from(0));
        assert!(elements[1].deep_eq(&value!({ "v" => 9 })));
        assert_ne!(elements[1], member);

        g.write(child, key("v"), Value::from(1)).unwrap();
        assert_eq!(g.value(NodeId::ROOT), base);
    }

    #[test]
    fn set_insert_and_remove_round_trip() {
        let base = Value::set([Value::from(1)]);
        let mut g = Graph::new(base.clone());
        assert!(g.insert_member(NodeId::ROOT, Value::from(2)).unwrap());
        assert!(!g.insert_member(NodeId::ROOT, Value::from(2)).unwrap());
        assert!(g.delete(NodeId::ROOT, Key::Entry(Value::from(2))).unwrap());
        assert_eq!(g.value(NodeId::ROOT), base);

        assert!(g.delete(NodeId::ROOT, Key::Entry(Value::from(1))).unwrap());
        assert!(g.effective(NodeId::ROOT).unwrap().is_empty());
        assert!(g.insert_member(NodeId::ROOT, Value::from(1)).unwrap());
        assert_eq!(g.value(NodeId::ROOT), base);
    }

    #[test]
    fn removing_a_tracked_child_detaches_it() {
        let base = value!({ "a" => { "n" => 1 }, "b" => 1 });
        let mut g = Graph::new(base.clone());
        let a = g.child(NodeId::ROOT, &key("a")).unwrap();
        g.write(a, key("n"), Value::from(2)).unwrap();
        assert!(g.delete(NodeId::ROOT, key("a")).unwrap());

        assert!(!g.is_live(a));
        assert_eq!(paths(&g), ["a"]);
        assert_eq!(g.child(NodeId::ROOT, &key("a")), None);

        g.write(NodeId::ROOT, key("a"), base.get("a").unwrap())
            .unwrap();
        assert!(g.changes().is_empty());
        assert_eq!(g.value(NodeId::ROOT), base);
    }

    #[test]
    fn removing_a_child_added_in_the_session_detaches_it() {
        let base = value!({});
        let mut g = Graph::new(base.clone());
        g.write(NodeId::ROOT, key("a"), value!({ "n" => 1 })).unwrap();
        let a = g.child(NodeId::ROOT, &key("a")).unwrap();
        assert!(g.delete(NodeId::ROOT, key("a")).unwrap());

        assert!(!g.is_live(a));
        assert_eq!(g.value(NodeId::ROOT), base);
    }

    #[test]
    fn written_set_members_can_still_be_removed() {
        let member = value!({ "v" => 1 });
        let base = Value::set([Value::from(0), member.clone()]);
        let mut g = Graph::new(base);
        let child = g.set_member_child(NodeId::ROOT, &member).unwrap();
        g.write(child, key("v"), Value::from(2)).unwrap();
        assert_eq!(g.lookup(NodeId::ROOT, &Key::Entry(member.clone())), None);

        assert!(g.delete(NodeId::ROOT, Key::Entry(member.clone())).unwrap());
        assert!(!g.is_live(child));
        assert_eq!(g.effective(NodeId::ROOT).unwrap().values(), [Value::from(0)]);
        assert!(!g.delete(NodeId::ROOT, Key::Entry(member)).unwrap());
    }

    #[test]
    fn clearing_an_empty_container_is_a_no_op() {
        let base = Value::map([]);
        let mut g = Graph::new(base.clone());
        g.clear(NodeId::ROOT).unwrap();
        assert!(g.node(NodeId::ROOT).copy.is_none());

        g.write(NodeId::ROOT, Key::Entry(Value::from("k")), Value::from(1))
            .unwrap();
        g.clear(NodeId::ROOT).unwrap();
        assert_eq!(g.value(NodeId::ROOT), base);
    }
}
